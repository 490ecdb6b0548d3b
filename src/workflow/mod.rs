pub mod render;
pub mod session;
pub mod tutor_flow;

pub use render::render;
pub use session::{Action, Message, Session, Speaker};
pub use tutor_flow::TutorFlow;
