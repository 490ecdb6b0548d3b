//! 文档接收服务 - 业务能力层
//!
//! 只负责"校验并上传一个文件"，不关心会话

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ValidationError};
use crate::infrastructure::DocumentStore;
use crate::models::AttachmentRef;
use crate::utils::with_deadline;

/// 唯一接受的文档类型
pub const ACCEPTED_MIME: &str = "application/pdf";

/// 上传前的本地校验，任何一项失败都不会发出网络请求
pub fn check_upload(size: usize, declared_mime: &str, max_bytes: usize) -> Result<(), ValidationError> {
    let mime = declared_mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime != ACCEPTED_MIME {
        return Err(ValidationError::UnsupportedType {
            mime: declared_mime.to_string(),
        });
    }
    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if size > max_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// 文档接收服务
///
/// 职责：
/// - 类型与大小校验（失败即返回，不做部分上传）
/// - 转发字节到外部存储，返回引用
/// - 失败不重试，由调用方决定
pub struct DocumentIngestor {
    store: Arc<dyn DocumentStore>,
    max_upload_bytes: usize,
    timeout: Duration,
}

impl DocumentIngestor {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            max_upload_bytes: config.max_upload_bytes,
            timeout: config.request_timeout(),
        }
    }

    /// 接收一个文件
    ///
    /// # 参数
    /// - `file_name`: 原始文件名
    /// - `bytes`: 文件内容
    /// - `declared_mime`: 客户端声明的类型
    ///
    /// # 返回
    /// 外部存储返回的附件引用；相同内容重复上传会得到不同引用
    pub async fn ingest(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        declared_mime: &str,
    ) -> AppResult<AttachmentRef> {
        if let Err(e) = check_upload(bytes.len(), declared_mime, self.max_upload_bytes) {
            warn!("拒绝上传 {}: {}", file_name, e);
            return Err(e.into());
        }

        let size = bytes.len();
        let id = with_deadline(
            "upload",
            self.timeout,
            self.store.store(file_name, bytes, ACCEPTED_MIME),
        )
        .await?;

        info!("📎 已上传 {}（{} 字节）→ {}", file_name, size, id);
        Ok(id)
    }
}
