//! # PEEL Tutor
//!
//! 历史作文 PEEL 段落写作辅导：服务端代理生成模型，客户端驱动写作流程
//!
//! ## 架构设计
//!
//! 服务端采用四层架构，客户端复用模型层：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 外部生成服务和文档存储，只暴露能力
//! - `OpenAiResponses` - 文本生成（整段 / 流式）
//! - `OpenAiFiles` - 文档上传
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每次调用互相独立
//! - `DocumentIngestor` - 校验并上传文档
//! - `PeelService` - 论点 / 论据 / 解释点评
//! - `ChatService` - 按模式自由聊天
//! - `VisionService` - 图片分析
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 客户端的写作流程
//! - `Session` - 不可变的会话快照和阶段转换
//! - `TutorFlow` - 调用服务端并推进会话
//! - `render` - 快照到终端文本的纯函数
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 服务端生命周期
//! - `orchestrator/routes` - HTTP 接口
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{HttpTutorApi, TutorApi};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{router, App, AppState};
pub use workflow::{Session, TutorFlow};
