pub mod tutor_client;

pub use tutor_client::{HttpTutorApi, TutorApi};
