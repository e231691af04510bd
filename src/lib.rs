pub mod models;
pub mod mrz_extractor;
pub mod processing;
pub mod utils;
pub mod validation;

pub use models::{ExtractOptions, MrzResult, ProgressStatus, ProgressUpdate};
pub use mrz_extractor::{MrzExtractor, MrzSession, ProcessingCache};
pub use processing::{RecognitionEngine, TesseractEngine};
pub use utils::{ErrorCode, OcrError};
