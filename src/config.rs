use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 指定 TOML 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "PEEL_TUTOR_CONFIG";

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP 监听地址
    pub bind_addr: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 生成服务配置 ---
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub model_name: String,
    pub vision_model_name: String,
    /// 预置知识库（向量库）ID，为空时不挂 file_search
    pub vector_store_id: String,
    /// 每次上游调用的超时时间（秒）
    pub request_timeout_secs: u64,
    /// 上传文件大小上限（字节）
    pub max_upload_bytes: usize,
    // --- 终端客户端配置 ---
    pub server_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            verbose_logging: false,
            openai_api_key: String::new(),
            openai_api_base: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o".to_string(),
            vision_model_name: "gpt-4o".to_string(),
            vector_store_id: String::new(),
            request_timeout_secs: 60,
            max_upload_bytes: 20 * 1024 * 1024,
            server_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// TOML 配置文件，所有字段可选
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bind_addr: Option<String>,
    verbose_logging: Option<bool>,
    openai_api_key: Option<String>,
    openai_api_base: Option<String>,
    model_name: Option<String>,
    vision_model_name: Option<String>,
    vector_store_id: Option<String>,
    request_timeout_secs: Option<u64>,
    max_upload_bytes: Option<usize>,
    server_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 先读 `PEEL_TUTOR_CONFIG` 指向的 TOML 文件（如有），再叠加环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let content =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFailed {
                        path: path.clone(),
                        source,
                    })?;
                Self::from_toml_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 解析 TOML 配置，缺失的键保留默认值
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let default = Self::default();
        Ok(Self {
            bind_addr: file.bind_addr.unwrap_or(default.bind_addr),
            verbose_logging: file.verbose_logging.unwrap_or(default.verbose_logging),
            openai_api_key: file.openai_api_key.unwrap_or(default.openai_api_key),
            openai_api_base: file.openai_api_base.unwrap_or(default.openai_api_base),
            model_name: file.model_name.unwrap_or(default.model_name),
            vision_model_name: file.vision_model_name.unwrap_or(default.vision_model_name),
            vector_store_id: file.vector_store_id.unwrap_or(default.vector_store_id),
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(default.request_timeout_secs),
            max_upload_bytes: file.max_upload_bytes.unwrap_or(default.max_upload_bytes),
            server_url: file.server_url.unwrap_or(default.server_url),
        })
    }

    fn with_env_overrides(self) -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(self.bind_addr),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(self.openai_api_key),
            openai_api_base: std::env::var("OPENAI_API_BASE").unwrap_or(self.openai_api_base),
            model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.model_name),
            vision_model_name: std::env::var("VISION_MODEL_NAME").unwrap_or(self.vision_model_name),
            vector_store_id: std::env::var("VECTOR_STORE_ID").unwrap_or(self.vector_store_id),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.request_timeout_secs),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(self.max_upload_bytes),
            server_url: std::env::var("TUTOR_SERVER_URL").unwrap_or(self.server_url),
        }
    }

    /// 服务端启动前的检查
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openai_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "request_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_upload_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
