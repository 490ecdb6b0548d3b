//! 超时控制
//!
//! 超时后直接丢弃进行中的 future，上游请求随之取消

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{AppError, AppResult};

/// 在给定时限内等待一次调用
///
/// # 参数
/// - `what`: 调用名称（用于日志和错误信息）
/// - `deadline`: 时限
/// - `fut`: 调用本身
pub async fn with_deadline<T, F>(what: &str, deadline: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("⏱️ {} 超时（{} 秒），已取消", what, deadline.as_secs());
            Err(AppError::timeout(what, deadline.as_secs()))
        }
    }
}
