pub mod deadline;
pub mod logging;

pub use deadline::with_deadline;
pub use logging::truncate_text;
