//! # FinSent Eval
//!
//! Batch sentiment classification and evaluation for labelled
//! financial-news corpora.
//!
//! ## Architecture
//!
//! ```text
//! Labelled corpus (label, text; Latin-1, no header)
//!        ↓
//! Corpus (optional seeded sample)
//!        ↓
//! Classifier adapter (truncation, range check, error capture)
//!        ↓
//! Batch inference (fallback per record, progress, optional worker pool)
//!        ↓
//! Aggregate statistics (distribution, confidence, agreement, top-K)
//!        ↓
//! Reports (CSV, workbook, text and JSON summaries)
//!        ↓
//! Chart data (derived from the CSV only)
//! ```
//!
//! The classifier is an opaque capability behind [`Classifier`]; the
//! built-in [`LexiconClassifier`] keeps the pipeline runnable offline and
//! [`CommandClassifier`] delegates to any external model process.

pub mod chart;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod runner;

pub use chart::{BoxStats, ChartData, ChartError, ConfidenceHistogram, HistogramBin, LeaderboardEntry};
pub use classifier::{
    parse_response, truncate_chars, Classifier, ClassifierAdapter, ClassifierError,
    CommandClassifier, LexiconClassifier, RawPrediction, DEFAULT_MAX_INPUT_CHARS,
};
pub use config::{ClassifierConfig, ConfigError, PipelineConfig};
pub use corpus::{Corpus, CorpusError, Prediction, Record};
pub use metrics::{
    aggregate, aggregate_with, top_k, AggregateOptions, AggregateStatistics, Agreement,
    ConfidenceStats, ContractViolation, LabelCount, LabelExamples, RecordRef,
};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};
pub use report::{
    read_corpus, read_results, render_statistics, summary_text, ExportContext, ExportError,
    ExportedFiles, ReportExporter, ResultRow,
};
pub use runner::{
    CancelToken, FallbackRecord, InferenceEngine, Progress, ProgressSnapshot, RunSummary,
    RunnerConfig, RunnerError,
};
