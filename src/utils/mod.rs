pub mod countries;
pub mod error;

pub use error::{ErrorCode, OcrError};
