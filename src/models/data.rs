use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Validated identity fields read from the passport MRZ.
///
/// A value of this type has already passed the plausibility battery in
/// `validation::result_validator`. Fields that could not be recovered are
/// empty strings, never absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MrzResult {
    /// 6-12 characters, contains at least one letter and one digit.
    pub passport_number: String,
    /// Display country name resolved from the 3-letter ICAO code, or the
    /// raw uppercase code when no mapping exists.
    pub nationality: String,
    /// ISO `YYYY-MM-DD`, or empty if unrecoverable.
    pub birth_date: String,
    /// ISO `YYYY-MM-DD`, or empty if unrecoverable.
    pub expiry_date: String,
}

/// Pipeline stage names reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Loading,
    Preprocessing,
    Recognizing,
    Parsing,
    Complete,
}

/// Progress checkpoint delivered to the caller. Percentages are monotonic
/// non-decreasing within one extraction; cache hits emit nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    pub percentage: u8,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Per-call configuration for `MrzExtractor::extract`.
#[derive(Clone, Default)]
pub struct ExtractOptions {
    /// Whole-pipeline deadline. Defaults to 20 seconds.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation signal, checked at every stage boundary.
    pub signal: Option<CancellationToken>,
    /// Stage checkpoint callback.
    pub on_progress: Option<ProgressFn>,
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("timeout", &self.timeout)
            .field("signal", &self.signal.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
