use anyhow::Result;
use peel_tutor::utils::logging;
use peel_tutor::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    config.validate()?;

    // 初始化并运行应用
    App::initialize(config)?.run().await?;

    Ok(())
}
