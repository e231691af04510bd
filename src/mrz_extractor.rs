use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info};
use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use crate::models::{ExtractOptions, MrzResult, ProgressFn, ProgressStatus, ProgressUpdate};
use crate::processing::image_processor::ImageProcessor;
use crate::processing::mrz_parser::MrzParser;
use crate::processing::ocr::{check_cancelled, RecognitionAdapter, RecognitionEngine};
use crate::validation::ResultValidator;
use crate::utils::{ErrorCode, OcrError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Bounded cache of completed extractions keyed by content hash.
/// Injected into the extractor rather than living as module state so
/// tests and embedders control its lifetime. Evicts the least recently
/// used entry at capacity; cleared on session reset; never persisted.
pub struct ProcessingCache {
    inner: Mutex<LruCache<String, MrzResult>>,
}

impl ProcessingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        ProcessingCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<MrzResult> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: String, result: MrzResult) {
        self.inner.lock().unwrap().put(key, result);
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessingCache {
    fn default() -> Self {
        ProcessingCache::new(DEFAULT_CACHE_CAPACITY)
    }
}

type PipelineFuture = Shared<BoxFuture<'static, Result<MrzResult, OcrError>>>;

/// Public entry point of the pipeline: sequences preprocess → recognize →
/// parse → validate with timeout, cancellation, progress reporting,
/// caching and identical-image deduplication.
pub struct MrzExtractor {
    engine: Arc<dyn RecognitionEngine>,
    cache: Arc<ProcessingCache>,
    in_flight: Arc<Mutex<HashMap<String, PipelineFuture>>>,
}

impl MrzExtractor {
    pub fn new(engine: Arc<dyn RecognitionEngine>, cache: Arc<ProcessingCache>) -> Self {
        MrzExtractor {
            engine,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<ProcessingCache> {
        &self.cache
    }

    /// Extract validated MRZ fields from a passport image.
    ///
    /// Byte-identical images hit the cache without running the pipeline
    /// or emitting progress. Concurrent calls with identical content
    /// share one underlying execution; if that shared execution fails,
    /// the joining caller starts one fresh attempt instead of inheriting
    /// the stale failure.
    pub async fn extract(
        &self,
        image: &[u8],
        options: ExtractOptions,
    ) -> Result<MrzResult, OcrError> {
        if image.is_empty() {
            return Err(OcrError::with_technical(
                ErrorCode::InvalidInput,
                "empty image buffer",
            ));
        }

        let hash = format!("{:x}", Sha256::digest(image));

        if let Some(result) = self.cache.get(&hash) {
            debug!("cache hit for {}", &hash[..12]);
            return Ok(result);
        }

        // Join an identical in-flight request instead of duplicating it.
        let existing = self.in_flight.lock().unwrap().get(&hash).cloned();
        if let Some(shared) = existing {
            debug!("joining in-flight extraction for {}", &hash[..12]);
            match shared.await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!("joined extraction failed ({:?}); retrying fresh", e.code);
                }
            }
        }

        let shared = {
            let mut map = self.in_flight.lock().unwrap();
            // A run that is no longer in the map has already written its
            // result to the cache, so recheck before starting fresh.
            if let Some(result) = self.cache.get(&hash) {
                return Ok(result);
            }
            match map.get(&hash) {
                // Lost a race to another fresh starter; share theirs.
                Some(shared) => shared.clone(),
                None => {
                    let shared = self
                        .pipeline_future(image.to_vec(), hash.clone(), options)
                        .boxed()
                        .shared();
                    map.insert(hash.clone(), shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    /// Build the owning future for one pipeline run: the timeout race,
    /// the in-flight bookkeeping and the success-only cache write all
    /// live here so they happen exactly once per content hash.
    fn pipeline_future(
        &self,
        image: Vec<u8>,
        hash: String,
        options: ExtractOptions,
    ) -> impl std::future::Future<Output = Result<MrzResult, OcrError>> + Send + 'static {
        let engine = Arc::clone(&self.engine);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            let deadline = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
            // Work on a child token so a timeout can request cancellation
            // without poisoning the caller's own signal.
            let signal = options
                .signal
                .as_ref()
                .map(CancellationToken::child_token)
                .unwrap_or_default();
            let reporter = ProgressReporter::new(options.on_progress.clone());

            let pipeline = run_pipeline(engine, image, signal.clone(), reporter);
            let outcome = match tokio::time::timeout(deadline, pipeline).await {
                Ok(result) => result,
                Err(_) => {
                    // Whichever settles first wins; the abandoned attempt
                    // still observes the cancelled token and releases its
                    // worker when its blocking call returns.
                    signal.cancel();
                    Err(OcrError::with_technical(
                        ErrorCode::ProcessingTimeout,
                        format!("pipeline exceeded {:?}", deadline),
                    ))
                }
            };

            // A success lands in the cache before the hash leaves the
            // in-flight map, so a caller that finds the map empty can
            // trust the cache. Failures are never cached.
            if let Ok(result) = &outcome {
                cache.put(hash.clone(), result.clone());
            }
            in_flight.lock().unwrap().remove(&hash);
            outcome
        }
    }
}

/// The four pipeline stages, with a cancellation check after every
/// suspension point and progress at the fixed checkpoints.
async fn run_pipeline(
    engine: Arc<dyn RecognitionEngine>,
    image: Vec<u8>,
    signal: CancellationToken,
    reporter: ProgressReporter,
) -> Result<MrzResult, OcrError> {
    check_cancelled(&signal)?;
    reporter.emit(ProgressStatus::Loading, 10);

    let preprocessed = tokio::task::spawn_blocking(move || ImageProcessor::preprocess(&image))
        .await
        .map_err(|e| {
            OcrError::with_technical(
                ErrorCode::ProcessingFailed,
                format!("preprocess task failed: {}", e),
            )
        })??;
    check_cancelled(&signal)?;
    reporter.emit(ProgressStatus::Preprocessing, 20);

    let adapter = RecognitionAdapter::new(engine);
    let raw_text = adapter
        .recognize(&preprocessed.png, &signal, &|update| {
            reporter.emit(update.status, update.percentage)
        })
        .await?;
    check_cancelled(&signal)?;
    reporter.emit(ProgressStatus::Parsing, 90);

    let parsed = MrzParser::parse(&raw_text)?;
    ResultValidator::validate(&parsed.result, &parsed.nationality_code)?;
    check_cancelled(&signal)?;

    reporter.emit(ProgressStatus::Complete, 100);
    info!(
        "extraction complete: passport number {} chars, nationality {}",
        parsed.result.passport_number.len(),
        parsed.nationality_code
    );
    Ok(parsed.result)
}

/// Wraps the caller's progress callback and keeps percentages monotonic
/// non-decreasing within one extraction.
#[derive(Clone)]
struct ProgressReporter {
    callback: Option<ProgressFn>,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressFn>) -> Self {
        ProgressReporter {
            callback,
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    fn emit(&self, status: ProgressStatus, percentage: u8) {
        let previous = self.last.fetch_max(percentage, Ordering::SeqCst);
        if percentage < previous {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(ProgressUpdate { status, percentage });
        }
    }
}

/// Session-scoped handle over a shared extractor. Owns a cancellation
/// scope covering every extraction started through it; `reset` cancels
/// that scope and clears the shared cache without cancelling work
/// started by other sessions.
pub struct MrzSession {
    extractor: Arc<MrzExtractor>,
    scope: Mutex<CancellationToken>,
}

impl MrzSession {
    pub fn new(extractor: Arc<MrzExtractor>) -> Self {
        MrzSession {
            extractor,
            scope: Mutex::new(CancellationToken::new()),
        }
    }

    pub async fn extract(
        &self,
        image: &[u8],
        mut options: ExtractOptions,
    ) -> Result<MrzResult, OcrError> {
        let scope = self.scope.lock().unwrap().clone();
        let signal = scope.child_token();

        // Propagate the caller's own signal into the session scope. The
        // watcher exits when the caller cancels, the session resets, or
        // this call finishes (the drop guard fires `done`).
        let done = CancellationToken::new();
        let _done_guard = done.clone().drop_guard();
        if let Some(caller) = options.signal.take() {
            let linked = signal.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = caller.cancelled() => linked.cancel(),
                    _ = linked.cancelled() => {}
                    _ = done.cancelled() => {}
                }
            });
        }

        options.signal = Some(signal);
        self.extractor.extract(image, options).await
    }

    /// Cancel this session's in-flight extractions and clear the shared
    /// cache. Other sessions keep running.
    pub fn reset(&self) {
        let mut scope = self.scope.lock().unwrap();
        scope.cancel();
        *scope = CancellationToken::new();
        self.extractor.cache().clear();
    }
}
