pub mod data;

pub use data::{ExtractOptions, MrzResult, ProgressFn, ProgressStatus, ProgressUpdate};
