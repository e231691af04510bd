pub mod result_validator;

pub use result_validator::ResultValidator;
