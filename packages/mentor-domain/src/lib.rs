//! Pure career-mentor logic shared by the service and the API: knowledge models, query and
//! response classification, confidence heuristics, prompt assembly, and conversation types.

pub mod classify;
pub mod confidence;
pub mod conversation;
pub mod knowledge;
pub mod prompt;
pub mod time_serde;

mod error;

pub use error::ValidationError;
