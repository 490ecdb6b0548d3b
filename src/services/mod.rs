pub mod chat_service;
pub mod ingest_service;
pub mod peel_service;
pub mod vision_service;

pub use chat_service::ChatService;
pub use ingest_service::{check_upload, DocumentIngestor, ACCEPTED_MIME};
pub use peel_service::{classify_feedback, PeelService};
pub use vision_service::VisionService;
