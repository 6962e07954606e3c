//! Aggregation of per-record predictions into summary statistics.
//!
//! [`aggregate`] is a pure function of a fully classified [`Corpus`]:
//! - label distribution (count and percentage of N)
//! - confidence mean, median, min, max
//! - case-insensitive agreement with the ground-truth labels
//! - top-K records by confidence (stable on ties)
//! - a few example texts per predicted label

use crate::corpus::Corpus;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use std::collections::HashMap;
use thiserror::Error;

/// Default number of top-confidence records kept
pub const DEFAULT_TOP_K: usize = 3;

/// Default number of example texts kept per predicted label
pub const DEFAULT_EXAMPLES_PER_LABEL: usize = 2;

/// Aggregation was requested over a corpus that has not finished inference
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("Record {index} has no prediction; aggregation requires a fully classified corpus")]
    UnclassifiedRecord { index: usize },
}

/// Aggregation options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Records kept in the top-confidence list
    pub top_k: usize,
    /// Example texts kept per predicted label
    pub examples_per_label: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            examples_per_label: DEFAULT_EXAMPLES_PER_LABEL,
        }
    }
}

/// One row of the label distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
    /// `count / N * 100`
    pub percentage: f64,
}

/// Confidence summary over all records
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// Agreement between predicted and ground-truth labels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Agreement {
    /// Records whose labels match (case-insensitive)
    pub matches: usize,
    pub total: usize,
    /// `matches / total * 100`
    pub percentage: f64,
}

impl Agreement {
    #[must_use]
    pub const fn mismatches(&self) -> usize {
        self.total - self.matches
    }

    #[must_use]
    pub fn mismatch_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 - self.percentage
        }
    }
}

/// A record selected by confidence or as a label example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
    /// Zero-based corpus index
    pub index: usize,
    pub label: String,
    pub confidence: f64,
    pub text: String,
}

/// Example records for one predicted label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelExamples {
    pub label: String,
    pub records: Vec<RecordRef>,
}

/// Read-only statistics over a fully classified corpus
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateStatistics {
    /// Corpus size N
    pub total: usize,
    /// Count descending, ties by first appearance in the corpus
    pub distribution: Vec<LabelCount>,
    pub confidence: ConfidenceStats,
    pub agreement: Agreement,
    /// Descending confidence, ties in corpus order
    pub top_k: Vec<RecordRef>,
    /// Label order follows `distribution`
    pub examples: Vec<LabelExamples>,
}

impl AggregateStatistics {
    /// Count for a label (case-insensitive), zero if absent
    #[must_use]
    pub fn count_for(&self, label: &str) -> usize {
        self.distribution
            .iter()
            .filter(|d| d.label.eq_ignore_ascii_case(label))
            .map(|d| d.count)
            .sum()
    }

    /// Percentage for a label (case-insensitive), zero if absent
    #[must_use]
    pub fn percentage_for(&self, label: &str) -> f64 {
        percentage(self.count_for(label), self.total)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Aggregate with default options
///
/// # Errors
///
/// Returns [`ContractViolation`] if any record has not completed inference.
pub fn aggregate(corpus: &Corpus) -> Result<AggregateStatistics, ContractViolation> {
    aggregate_with(corpus, AggregateOptions::default())
}

/// Aggregate a fully classified corpus
///
/// An empty corpus yields zeroed statistics.
///
/// # Errors
///
/// Returns [`ContractViolation`] if any record has not completed inference.
pub fn aggregate_with(
    corpus: &Corpus,
    options: AggregateOptions,
) -> Result<AggregateStatistics, ContractViolation> {
    if let Some(index) = corpus.first_unclassified() {
        return Err(ContractViolation::UnclassifiedRecord { index });
    }

    let total = corpus.len();
    if total == 0 {
        return Ok(AggregateStatistics::default());
    }

    let refs: Vec<RecordRef> = corpus
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            record.prediction().map(|p| RecordRef {
                index,
                label: p.label.clone(),
                confidence: p.confidence,
                text: record.text.clone(),
            })
        })
        .collect();

    let distribution = label_distribution(&refs, total);
    let confidences: Vec<f64> = refs.iter().map(|r| r.confidence).collect();
    let matches = corpus.iter().filter(|r| r.agrees()).count();

    let examples = distribution
        .iter()
        .map(|d| LabelExamples {
            label: d.label.clone(),
            records: refs
                .iter()
                .filter(|r| r.label == d.label)
                .take(options.examples_per_label)
                .cloned()
                .collect(),
        })
        .collect();

    Ok(AggregateStatistics {
        total,
        distribution,
        confidence: confidence_stats(&confidences),
        agreement: Agreement {
            matches,
            total,
            percentage: percentage(matches, total),
        },
        top_k: top_k(&refs, options.top_k),
        examples,
    })
}

/// Label counts ordered by count descending, ties by first appearance
fn label_distribution(refs: &[RecordRef], total: usize) -> Vec<LabelCount> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, usize)> = Vec::new();

    for r in refs {
        match first_seen.get(r.label.as_str()) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                first_seen.insert(r.label.as_str(), counts.len());
                counts.push((r.label.as_str(), 1));
            }
        }
    }

    // Stable sort keeps first-appearance order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

/// Highest-confidence records, stable on ties
#[must_use]
pub fn top_k(refs: &[RecordRef], k: usize) -> Vec<RecordRef> {
    let mut sorted: Vec<&RecordRef> = refs.iter().collect();
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    sorted.into_iter().take(k).cloned().collect()
}

fn confidence_stats(values: &[f64]) -> ConfidenceStats {
    if values.is_empty() {
        return ConfidenceStats::default();
    }

    ConfidenceStats {
        mean: compute_mean(values),
        median: Data::new(values.to_vec()).median(),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Compute mean of samples
#[allow(clippy::cast_precision_loss)]
pub(crate) fn compute_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}
