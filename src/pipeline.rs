//! End-to-end orchestration: ingest, classify, aggregate, export.
//!
//! All run state flows through explicit values (`Corpus`,
//! `AggregateStatistics`), so independent pipelines can run side by side.

use crate::classifier::ClassifierAdapter;
use crate::config::{ConfigError, PipelineConfig};
use crate::corpus::{Corpus, CorpusError};
use crate::metrics::{aggregate_with, AggregateStatistics, ContractViolation};
use crate::report::{ExportContext, ExportError, ExportedFiles, ReportExporter};
use crate::runner::{
    CancelToken, InferenceEngine, Progress, ProgressSnapshot, RunSummary, RunnerError,
};
use thiserror::Error;

/// Fatal pipeline failure, tagged with the stage that failed
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingestion failed: {0}")]
    Ingestion(#[from] CorpusError),

    #[error("inference aborted: {0}")]
    Inference(#[from] RunnerError),

    #[error("inference aborted: cancelled after {processed} of {total} records")]
    Cancelled { processed: usize, total: usize },

    #[error("aggregation failed: {0}")]
    Aggregation(#[from] ContractViolation),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

/// Everything a successful run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub corpus: Corpus,
    pub summary: RunSummary,
    pub statistics: AggregateStatistics,
    pub files: ExportedFiles,
}

/// Configured sentiment pipeline
pub struct Pipeline {
    config: PipelineConfig,
    engine: InferenceEngine,
}

impl Pipeline {
    /// Create a pipeline after validating the configuration
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let engine = InferenceEngine::with_config(config.runner_config());
        Ok(Self { config, engine })
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        self.engine.progress()
    }

    /// Cancellation handle; once raised it stays raised for this pipeline
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.engine.cancel_token()
    }

    /// Load the configured corpus, sampled if a sample size is set
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Ingestion`] if the corpus cannot be read.
    pub fn load_corpus(&self) -> Result<Corpus, PipelineError> {
        let corpus = Corpus::load(&self.config.data_path)?;
        Ok(match self.config.sample_size {
            Some(n) => {
                let sampled = corpus.sample(n, self.config.seed);
                tracing::info!(records = sampled.len(), seed = self.config.seed, "Sampled corpus");
                sampled
            }
            None => corpus,
        })
    }

    /// Run the whole pipeline with the configured classifier
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, tagged with its stage.
    pub fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        self.run_with_progress(|_| {})
    }

    /// Like [`run`](Self::run), reporting inference progress
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_with_progress<F>(&self, on_progress: F) -> Result<PipelineOutcome, PipelineError>
    where
        F: FnMut(ProgressSnapshot),
    {
        let corpus = self.load_corpus()?;
        let adapter = self.config.adapter();
        self.process(corpus, &adapter, on_progress)
    }

    /// Classify, aggregate and export an already loaded corpus
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, tagged with its stage. Nothing is
    /// exported unless inference completed for every record.
    pub fn process<F>(
        &self,
        mut corpus: Corpus,
        adapter: &ClassifierAdapter,
        on_progress: F,
    ) -> Result<PipelineOutcome, PipelineError>
    where
        F: FnMut(ProgressSnapshot),
    {
        let summary = self
            .engine
            .run_with_progress(&mut corpus, adapter, on_progress)?;
        if summary.cancelled {
            return Err(PipelineError::Cancelled {
                processed: summary.processed,
                total: summary.total,
            });
        }

        let statistics = aggregate_with(&corpus, self.config.aggregate_options())?;
        tracing::info!(
            records = statistics.total,
            agreement = format!("{:.1}%", statistics.agreement.percentage),
            fallbacks = summary.fallback_count(),
            "Aggregated statistics"
        );

        let context = ExportContext::new(
            corpus.source.clone(),
            adapter.name(),
            summary.fallback_count(),
        );
        let files = ReportExporter::new(&self.config.output_dir).export(
            &corpus,
            &statistics,
            &context,
        )?;

        Ok(PipelineOutcome {
            corpus,
            summary,
            statistics,
            files,
        })
    }
}
