pub mod prompts;
pub mod stage;
pub mod wire;

pub use prompts::Mode;
pub use stage::{EvidenceChoice, NextStep, Stage};
pub use wire::{
    AttachmentRef, ChatRequest, EvidenceOptions, EvidenceRequest, ExplanationRequest,
    ExplanationResponse, PointsRequest, PointsResponse, VisionRequest,
};
