use std::io::Write;
use std::sync::Arc;
use async_trait::async_trait;
use log::{debug, info, warn};
use tempfile::NamedTempFile;
use tesseract::{PageSegMode, Tesseract};
use tokio_util::sync::CancellationToken;
use crate::models::{ProgressStatus, ProgressUpdate};
use crate::utils::{ErrorCode, OcrError};

/// The full MRZ alphabet; the engine is told to consider nothing else.
const MRZ_CHAR_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789<";
/// Aggregate confidence below this is unusable text.
const CONFIDENCE_THRESHOLD: f32 = 60.0;
/// Shorter output than this from the primary model triggers the fallback.
const MIN_USABLE_TEXT: usize = 20;

/// One recognition pass: the raw text plus the engine's aggregate
/// confidence (0-100).
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

/// Which trained model a recognition attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrModel {
    /// Monospaced model tuned for machine-readable zones.
    Mrz,
    /// General-purpose text model, the one-shot fallback.
    General,
}

impl OcrModel {
    fn lang(&self) -> &'static str {
        match self {
            OcrModel::Mrz => "mrz",
            OcrModel::General => "eng",
        }
    }
}

/// Seam over the OCR engine so the pipeline can be exercised without a
/// Tesseract installation. Implementations own the whole worker
/// lifecycle for one call: init, configure, recognize, release.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn recognize(&self, png: &[u8], model: OcrModel) -> Result<Recognition, OcrError>;
}

/// Tesseract-backed engine. Each call spins up a fresh worker on a
/// blocking thread and tears it down before returning, so worker
/// lifetimes never outlive the attempt.
pub struct TesseractEngine;

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    async fn recognize(&self, png: &[u8], model: OcrModel) -> Result<Recognition, OcrError> {
        let png = png.to_vec();
        tokio::task::spawn_blocking(move || Self::recognize_blocking(&png, model))
            .await
            .map_err(|e| {
                OcrError::with_technical(
                    ErrorCode::ProcessingFailed,
                    format!("recognition task failed: {}", e),
                )
            })?
    }
}

impl TesseractEngine {
    fn recognize_blocking(png: &[u8], model: OcrModel) -> Result<Recognition, OcrError> {
        // The engine reads from a path, so stage the crop in a temp file.
        let mut temp_file = NamedTempFile::new().map_err(|e| {
            OcrError::with_technical(
                ErrorCode::ProcessingFailed,
                format!("failed to create temp file: {}", e),
            )
        })?;
        temp_file.write_all(png).map_err(|e| {
            OcrError::with_technical(
                ErrorCode::ProcessingFailed,
                format!("failed to write temp file: {}", e),
            )
        })?;
        let path = temp_file.path().to_str().ok_or_else(|| {
            OcrError::with_technical(ErrorCode::ProcessingFailed, "non-UTF8 temp path")
        })?;

        // Restrict the engine to the MRZ alphabet and tell it the crop is
        // one dense block of text. The worker is released on every exit
        // path when `tess` drops.
        let mut tess = Tesseract::new(None, Some(model.lang()))
            .map_err(|e| {
                OcrError::with_technical(
                    ErrorCode::EngineLoadFailed,
                    format!("engine init failed for {:?}: {}", model, e),
                )
            })?
            .set_variable("tessedit_char_whitelist", MRZ_CHAR_WHITELIST)
            .map_err(|e| {
                OcrError::with_technical(
                    ErrorCode::EngineLoadFailed,
                    format!("engine configuration failed: {}", e),
                )
            })?;
        tess.set_page_seg_mode(PageSegMode::PsmSingleBlock);

        let mut tess = tess.set_image(path).map_err(|e| {
            OcrError::with_technical(
                ErrorCode::ProcessingFailed,
                format!("engine rejected image: {}", e),
            )
        })?;

        let text = tess.get_text().map_err(|e| {
            OcrError::with_technical(
                ErrorCode::ProcessingFailed,
                format!("recognition failed: {}", e),
            )
        })?;
        let confidence = tess.mean_text_conf() as f32;

        Ok(Recognition { text, confidence })
    }
}

/// RecognitionAdapter drives the engine with the primary/fallback model
/// strategy, the confidence gate, and cooperative cancellation.
pub struct RecognitionAdapter {
    engine: Arc<dyn RecognitionEngine>,
}

impl RecognitionAdapter {
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        RecognitionAdapter { engine }
    }

    /// Run recognition over the preprocessed MRZ band.
    ///
    /// The MRZ-tuned model goes first; an engine error or empty/too-short
    /// output falls back once to the general model. A second failure is
    /// terminal. The cancellation signal is observed before and after
    /// each (long-running) engine call. Progress lands in the 60-90 band
    /// of the overall pipeline.
    pub async fn recognize(
        &self,
        png: &[u8],
        signal: &CancellationToken,
        progress: &(dyn Fn(ProgressUpdate) + Send + Sync),
    ) -> Result<String, OcrError> {
        check_cancelled(signal)?;
        progress(ProgressUpdate {
            status: ProgressStatus::Recognizing,
            percentage: 60,
        });

        let primary = self.engine.recognize(png, OcrModel::Mrz).await;
        check_cancelled(signal)?;

        let recognition = match primary {
            Ok(r) if r.text.trim().len() >= MIN_USABLE_TEXT => r,
            outcome => {
                match &outcome {
                    Ok(r) => debug!(
                        "primary model produced {} usable chars; falling back",
                        r.text.trim().len()
                    ),
                    Err(e) => warn!("primary recognition attempt failed: {}", e),
                }
                progress(ProgressUpdate {
                    status: ProgressStatus::Recognizing,
                    percentage: 75,
                });
                let fallback = self.engine.recognize(png, OcrModel::General).await;
                check_cancelled(signal)?;
                // A second failure is terminal; the primary failure is
                // already logged.
                fallback?
            }
        };

        progress(ProgressUpdate {
            status: ProgressStatus::Recognizing,
            percentage: 90,
        });

        if recognition.confidence < CONFIDENCE_THRESHOLD {
            return Err(OcrError::with_technical(
                ErrorCode::ImageTooBlurry,
                format!(
                    "aggregate confidence {:.0}% below threshold {:.0}%",
                    recognition.confidence, CONFIDENCE_THRESHOLD
                ),
            ));
        }

        info!(
            "recognition complete: {} chars at {:.0}% confidence",
            recognition.text.len(),
            recognition.confidence
        );
        Ok(recognition.text)
    }
}

pub(crate) fn check_cancelled(signal: &CancellationToken) -> Result<(), OcrError> {
    if signal.is_cancelled() {
        Err(OcrError::new(ErrorCode::Cancelled))
    } else {
        Ok(())
    }
}
