pub mod image_processor;
pub mod mrz_parser;
pub mod ocr;
pub mod td3;

pub use image_processor::{ImageProcessor, PreprocessedImage};
pub use mrz_parser::{MrzParser, ParsedMrz};
pub use ocr::{OcrModel, Recognition, RecognitionAdapter, RecognitionEngine, TesseractEngine};
