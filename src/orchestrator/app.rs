//! 服务端应用 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：创建上游客户端，组装服务
//! 2. **监听端口**：启动 axum 服务
//! 3. **优雅退出**：收到 Ctrl-C 后停止接收新请求，等待在途请求结束

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::infrastructure::{OpenAiFiles, OpenAiResponses};
use crate::orchestrator::routes::{router, AppState};
use crate::utils::logging::log_startup;

/// 应用主结构
pub struct App {
    config: Config,
    state: AppState,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let generator = Arc::new(OpenAiResponses::new(&config)?);
        let store = Arc::new(OpenAiFiles::new(&config)?);
        let state = AppState::new(generator, store, &config);

        Ok(Self { config, state })
    }

    /// 运行服务直到收到退出信号
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .with_context(|| format!("无法监听 {}", self.config.bind_addr))?;

        info!("🌐 监听 http://{}", listener.local_addr()?);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("{}", "=".repeat(60));
        info!("👋 服务已停止 - {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        info!("{}", "=".repeat(60));
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("\n🛑 收到退出信号，等待在途请求完成...");
    }
}
