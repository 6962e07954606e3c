//! Batch inference engine.
//!
//! Drives the classifier adapter over every record of a corpus, applies the
//! fallback policy on per-record failures, and exposes progress. Records are
//! processed in corpus order with one worker, or by a bounded pool of
//! scoped threads whose results are written back by corpus index.

use crate::classifier::{ClassifierAdapter, ClassifierError};
use crate::corpus::{Corpus, Prediction};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Maximum length of a fallback diagnostic, in characters
pub const DIAGNOSTIC_MAX_CHARS: usize = 50;

/// Errors that abort a batch
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Classifier defect on record {index}: {source}")]
    AdapterDefect {
        index: usize,
        source: ClassifierError,
    },
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker threads; 1 means strictly sequential
    pub workers: usize,
    /// Label assigned when classification fails
    pub fallback_label: String,
    /// Confidence assigned when classification fails
    pub fallback_confidence: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            fallback_label: "NEUTRAL".to_string(),
            fallback_confidence: 0.5,
        }
    }
}

impl RunnerConfig {
    fn fallback(&self) -> Prediction {
        Prediction::new(self.fallback_label.clone(), self.fallback_confidence)
    }
}

/// Point-in-time view of engine progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Records whose outcome has been applied
    pub processed: usize,
    /// Records in the batch
    pub total: usize,
}

impl ProgressSnapshot {
    /// Completion percentage (100 for an empty batch)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 / self.total as f64 * 100.0
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Shared progress counters, readable from any thread
#[derive(Debug, Clone, Default)]
pub struct Progress {
    processed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl Progress {
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }

    fn reset(&self, total: usize) {
        self.processed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    fn advance(&self) -> ProgressSnapshot {
        let processed = self.processed.fetch_add(1, Ordering::AcqRel) + 1;
        ProgressSnapshot {
            processed,
            total: self.total.load(Ordering::Acquire),
        }
    }
}

/// Cooperative cancellation flag
///
/// Records not yet dispatched when the flag is raised stay unclassified.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A record that received the fallback prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRecord {
    /// Zero-based corpus index
    pub index: usize,
    /// Truncated error message
    pub diagnostic: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Records in the batch
    pub total: usize,
    /// Records that received a prediction (model or fallback)
    pub processed: usize,
    /// Records classified by the fallback policy, in corpus order
    pub fallbacks: Vec<FallbackRecord>,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.fallbacks.len()
    }
}

/// Batch inference engine
pub struct InferenceEngine {
    config: RunnerConfig,
    progress: Progress,
    cancel: CancelToken,
}

impl InferenceEngine {
    /// Create an engine with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create an engine with custom configuration
    #[must_use]
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            progress: Progress::default(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Handle for observing progress from another thread
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Handle for cancelling the run from another thread
    ///
    /// Cancellation is permanent: once raised, every later run on this
    /// engine stops before dispatching a record. Build a new engine to run
    /// again.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Classify every record in the corpus
    ///
    /// Every record is (re-)classified independently; prior predictions are
    /// overwritten. A failing record receives the fallback prediction and
    /// the batch continues.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::AdapterDefect`] if the adapter reports a
    /// defect (such as an out-of-range confidence). Records completed before
    /// the defect keep their predictions; the rest stay unclassified.
    pub fn run(
        &self,
        corpus: &mut Corpus,
        adapter: &ClassifierAdapter,
    ) -> Result<RunSummary, RunnerError> {
        self.run_with_progress(corpus, adapter, |_| {})
    }

    /// Like [`run`](Self::run), invoking `on_progress` after each applied record
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_with_progress<F>(
        &self,
        corpus: &mut Corpus,
        adapter: &ClassifierAdapter,
        mut on_progress: F,
    ) -> Result<RunSummary, RunnerError>
    where
        F: FnMut(ProgressSnapshot),
    {
        let start = Instant::now();
        let total = corpus.len();
        self.progress.reset(total);

        tracing::info!(
            records = total,
            workers = self.config.workers,
            classifier = adapter.name(),
            "Starting batch inference"
        );

        let mut fallbacks = Vec::new();
        let mut apply = |corpus: &mut Corpus,
                         index: usize,
                         outcome: Result<Prediction, ClassifierError>|
         -> Result<(), RunnerError> {
            self.apply_outcome(corpus, index, outcome, &mut fallbacks)?;
            on_progress(self.progress.advance());
            Ok(())
        };

        let cancelled = if self.config.workers <= 1 {
            self.run_sequential(corpus, adapter, &mut apply)?
        } else {
            self.run_pooled(corpus, adapter, &mut apply)?
        };

        let summary = RunSummary {
            total,
            processed: self.progress.snapshot().processed,
            fallbacks,
            cancelled,
            elapsed: start.elapsed(),
        };

        tracing::info!(
            processed = summary.processed,
            fallbacks = summary.fallback_count(),
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis(),
            "Batch inference finished"
        );

        Ok(summary)
    }

    fn run_sequential<A>(
        &self,
        corpus: &mut Corpus,
        adapter: &ClassifierAdapter,
        apply: &mut A,
    ) -> Result<bool, RunnerError>
    where
        A: FnMut(&mut Corpus, usize, Result<Prediction, ClassifierError>) -> Result<(), RunnerError>,
    {
        for index in 0..corpus.len() {
            if self.cancel.is_cancelled() {
                return Ok(true);
            }
            let outcome = adapter.classify(&corpus.records()[index].text);
            apply(corpus, index, outcome)?;
        }
        Ok(false)
    }

    fn run_pooled<A>(
        &self,
        corpus: &mut Corpus,
        adapter: &ClassifierAdapter,
        apply: &mut A,
    ) -> Result<bool, RunnerError>
    where
        A: FnMut(&mut Corpus, usize, Result<Prediction, ClassifierError>) -> Result<(), RunnerError>,
    {
        let texts: Vec<String> = corpus.iter().map(|r| r.text.clone()).collect();
        let next = AtomicUsize::new(0);
        // Local stop flag so an aborted batch does not poison the caller's token
        let stop = AtomicBool::new(false);
        let workers = self.config.workers.min(texts.len().max(1));
        let mut first_error = None;

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();

            for _ in 0..workers {
                let tx = tx.clone();
                let texts = &texts;
                let next = &next;
                let cancel = &self.cancel;
                let stop = &stop;
                scope.spawn(move || loop {
                    if cancel.is_cancelled() || stop.load(Ordering::Acquire) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::AcqRel);
                    let Some(text) = texts.get(index) else {
                        break;
                    };
                    if tx.send((index, adapter.classify(text))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (index, outcome) in rx {
                if first_error.is_some() {
                    continue;
                }
                if let Err(e) = apply(corpus, index, outcome) {
                    stop.store(true, Ordering::Release);
                    first_error = Some(e);
                }
            }
        });

        match first_error {
            Some(e) => Err(e),
            None => Ok(self.cancel.is_cancelled() && next.load(Ordering::Acquire) < texts.len()),
        }
    }

    fn apply_outcome(
        &self,
        corpus: &mut Corpus,
        index: usize,
        outcome: Result<Prediction, ClassifierError>,
        fallbacks: &mut Vec<FallbackRecord>,
    ) -> Result<(), RunnerError> {
        let prediction = match outcome {
            Ok(prediction) => {
                tracing::debug!(
                    record = index,
                    label = %prediction.label,
                    confidence = prediction.confidence,
                    "Classified record"
                );
                prediction
            }
            Err(e) if e.is_defect() => {
                tracing::error!(record = index, error = %e, "Classifier defect, aborting batch");
                return Err(RunnerError::AdapterDefect { index, source: e });
            }
            Err(e) => {
                let diagnostic = truncate_diagnostic(&e.to_string());
                tracing::warn!(
                    record = index,
                    error = %diagnostic,
                    "Classification failed, applying fallback"
                );
                let pos = fallbacks
                    .binary_search_by_key(&index, |f: &FallbackRecord| f.index)
                    .unwrap_or_else(|p| p);
                fallbacks.insert(pos, FallbackRecord { index, diagnostic });
                self.config.fallback()
            }
        };

        corpus.records_mut()[index].set_prediction(prediction);
        Ok(())
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_diagnostic(message: &str) -> String {
    message.chars().take(DIAGNOSTIC_MAX_CHARS).collect()
}
