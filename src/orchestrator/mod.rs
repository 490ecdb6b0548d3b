//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责对外暴露 HTTP 接口和管理服务生命周期，是整个服务端的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 服务端应用
//! - 管理应用生命周期（初始化、运行、优雅退出）
//! - 创建上游客户端（Responses、Files）
//!
//! ### `routes` - HTTP 接口
//! - 解析请求，调用服务
//! - 把错误映射为状态码和 `{error}` 响应体
//!
//! ## 层次关系
//!
//! ```text
//! app (监听端口，持有 AppState)
//!     ↓
//! routes (每个接口一个 handler)
//!     ↓
//! services (能力层：ingest / peel / chat / vision)
//!     ↓
//! infrastructure (基础设施：OpenAiResponses / OpenAiFiles)
//! ```
//!
//! ## 设计原则
//!
//! 1. **无业务逻辑**：handler 只做转发和错误映射
//! 2. **无会话状态**：阶段顺序由客户端负责，服务端每次请求独立
//! 3. **向下依赖**：编排层 → services → infrastructure

pub mod app;
pub mod routes;

// 重新导出主要类型
pub use app::App;
pub use routes::{router, AppState};
