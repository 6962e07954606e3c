//! Chart-ready data derived from an exported results table.
//!
//! Only the four canonical columns of the results table are read, so chart
//! data can be regenerated at any time without re-running inference. No
//! rendering happens here; the output is a JSON document a plotting tool
//! can consume directly.

use crate::corpus::Corpus;
use crate::metrics::{aggregate_with, AggregateOptions, ContractViolation, LabelCount};
use crate::report::{preview, read_corpus, ExportError};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Max, Median, Min, OrderStatistics};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HISTOGRAM_BINS: usize = 30;
pub const DEFAULT_LEADERBOARD_SIZE: usize = 5;
pub const LEADERBOARD_PREVIEW_CHARS: usize = 90;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error(transparent)]
    Read(#[from] ExportError),

    #[error(transparent)]
    Contract(#[from] ContractViolation),

    #[error("Failed to serialize chart data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One histogram bucket over `[lower, upper)`; the last bucket is closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceHistogram {
    pub bins: Vec<HistogramBin>,
    /// Mean marker
    pub mean: f64,
    /// Median marker
    pub median: f64,
}

/// Five-number summary plus mean for one predicted label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub label: String,
    pub confidence: f64,
    pub preview: String,
}

/// Everything the dashboard charts need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub source: String,
    pub total: usize,
    pub distribution: Vec<LabelCount>,
    pub histogram: ConfidenceHistogram,
    pub boxes: Vec<BoxStats>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl ChartData {
    /// Derive chart data from a results table on disk
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn from_results<P: AsRef<Path>>(path: P) -> Result<Self, ChartError> {
        let corpus = read_corpus(path)?;
        Self::from_corpus(&corpus, DEFAULT_HISTOGRAM_BINS)
    }

    /// Derive chart data from a classified corpus
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::Contract`] if any record is unclassified.
    pub fn from_corpus(corpus: &Corpus, bins: usize) -> Result<Self, ChartError> {
        let stats = aggregate_with(
            corpus,
            AggregateOptions {
                top_k: DEFAULT_LEADERBOARD_SIZE,
                examples_per_label: 0,
            },
        )?;

        let confidences: Vec<f64> = corpus.iter().filter_map(|r| r.confidence()).collect();

        let boxes = stats
            .distribution
            .iter()
            .map(|d| {
                let values: Vec<f64> = corpus
                    .iter()
                    .filter_map(|r| r.prediction())
                    .filter(|p| p.label == d.label)
                    .map(|p| p.confidence)
                    .collect();
                box_stats(&d.label, values)
            })
            .collect();

        let leaderboard = stats
            .top_k
            .iter()
            .enumerate()
            .map(|(i, r)| LeaderboardEntry {
                rank: i + 1,
                label: r.label.clone(),
                confidence: r.confidence,
                preview: preview(&r.text, LEADERBOARD_PREVIEW_CHARS),
            })
            .collect();

        Ok(Self {
            source: corpus.source.clone(),
            total: stats.total,
            distribution: stats.distribution,
            histogram: ConfidenceHistogram {
                bins: histogram(&confidences, bins),
                mean: stats.confidence.mean,
                median: stats.confidence.median,
            },
            boxes,
            leaderboard,
        })
    }

    /// Write as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ChartError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ChartError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Equal-width histogram over [0, 1]
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let bins = bins.max(1);
    let width = 1.0 / bins as f64;
    let mut counts = vec![0usize; bins];

    for &value in values {
        let slot = ((value.clamp(0.0, 1.0) / width) as usize).min(bins - 1);
        counts[slot] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count,
        })
        .collect()
}

fn box_stats(label: &str, values: Vec<f64>) -> BoxStats {
    let count = values.len();
    let mean = crate::metrics::compute_mean(&values);
    if values.is_empty() {
        return BoxStats {
            label: label.to_string(),
            count,
            min: 0.0,
            q1: 0.0,
            median: 0.0,
            q3: 0.0,
            max: 0.0,
            mean,
        };
    }

    let mut data = Data::new(values);
    BoxStats {
        label: label.to_string(),
        count,
        min: data.min(),
        q1: data.lower_quartile(),
        median: Median::median(&data),
        q3: data.upper_quartile(),
        max: data.max(),
        mean,
    }
}
