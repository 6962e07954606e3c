//! Corpus ingestion for financial-news sentiment evaluation.
//!
//! Loads a two-column `label,text` file (no header, Latin-1 encoded) into an
//! ordered [`Corpus`] of [`Record`]s. Predictions are attached later by the
//! inference engine.

#![allow(clippy::missing_const_for_fn)]

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during corpus ingestion
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus file not found: {0}")]
    NotFound(String),

    #[error("Malformed row {row}: expected 2 columns (label, text), found {found}")]
    WrongColumnCount { row: usize, found: usize },

    #[error("Malformed row {row}: empty sentiment label")]
    EmptyLabel { row: usize },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Label and confidence produced for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted sentiment label as returned by the classifier
    pub label: String,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
}

impl Prediction {
    /// Create a prediction
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// A single corpus entry
///
/// The predicted label and confidence live together in one `Option`, so a
/// record is either unclassified or fully classified.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Ground-truth annotation shipped with the data
    pub ground_truth: String,
    /// Raw news text, never modified after ingestion
    pub text: String,
    prediction: Option<Prediction>,
}

impl Record {
    /// Create an unclassified record
    #[must_use]
    pub fn new(ground_truth: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ground_truth: ground_truth.into(),
            text: text.into(),
            prediction: None,
        }
    }

    /// Create a record that already carries a prediction
    #[must_use]
    pub fn with_prediction(
        ground_truth: impl Into<String>,
        text: impl Into<String>,
        prediction: Prediction,
    ) -> Self {
        Self {
            ground_truth: ground_truth.into(),
            text: text.into(),
            prediction: Some(prediction),
        }
    }

    /// Attach (or overwrite) the prediction
    pub fn set_prediction(&mut self, prediction: Prediction) {
        self.prediction = Some(prediction);
    }

    /// Full prediction, if inference has completed
    #[must_use]
    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    #[must_use]
    pub fn predicted_label(&self) -> Option<&str> {
        self.prediction.as_ref().map(|p| p.label.as_str())
    }

    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.prediction.as_ref().map(|p| p.confidence)
    }

    /// Whether inference has completed for this record
    #[must_use]
    pub fn is_classified(&self) -> bool {
        self.prediction.is_some()
    }

    /// Case-insensitive agreement between ground truth and prediction
    #[must_use]
    pub fn agrees(&self) -> bool {
        self.predicted_label()
            .is_some_and(|p| p.to_lowercase() == self.ground_truth.to_lowercase())
    }
}

/// Ordered collection of records under analysis
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    /// Source identifier (usually the input path)
    pub source: String,
    records: Vec<Record>,
}

impl Corpus {
    /// Build a corpus from records already in memory
    #[must_use]
    pub fn from_records(source: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }

    /// Load a corpus from a headerless `label,text` file in Latin-1
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, or if any row
    /// does not have exactly two columns. Malformed rows are fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CorpusError::NotFound(path.display().to_string()));
        }

        let bytes = std::fs::read(path)?;
        let mut corpus = Self::parse(&decode_latin1(&bytes))?;
        corpus.source = path.display().to_string();

        tracing::info!(
            path = %path.display(),
            records = corpus.len(),
            "Loaded corpus"
        );

        Ok(corpus)
    }

    /// Parse already-decoded corpus content
    ///
    /// # Errors
    ///
    /// Returns an error if any row does not have exactly two columns or the
    /// CSV structure is broken.
    pub fn parse(content: &str) -> Result<Self, CorpusError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut records = Vec::new();

        for (idx, row) in reader.records().enumerate() {
            let row = row?;
            let row_number = idx + 1;

            if row.len() != 2 {
                return Err(CorpusError::WrongColumnCount {
                    row: row_number,
                    found: row.len(),
                });
            }

            let label = row[0].trim();
            if label.is_empty() {
                return Err(CorpusError::EmptyLabel { row: row_number });
            }

            records.push(Record::new(label, &row[1]));
        }

        Ok(Self {
            source: String::new(),
            records,
        })
    }

    /// Keep `n` records chosen with a seeded RNG
    ///
    /// Selected records keep their relative ingestion order. Asking for more
    /// records than exist keeps the whole corpus.
    #[must_use]
    pub fn sample(self, n: usize, seed: u64) -> Self {
        if n >= self.records.len() {
            return self;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, self.records.len(), n).into_vec();
        picked.sort_unstable();

        let mut keep = vec![false; self.records.len()];
        for idx in picked {
            keep[idx] = true;
        }

        let records = self
            .records
            .into_iter()
            .zip(keep)
            .filter_map(|(record, kept)| kept.then_some(record))
            .collect();

        Self {
            source: self.source,
            records,
        }
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if corpus is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in corpus order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Records as a slice
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Mutable access for the inference engine
    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Index of the first unclassified record, if any
    #[must_use]
    pub fn first_unclassified(&self) -> Option<usize> {
        self.records.iter().position(|r| !r.is_classified())
    }

    /// Whether every record has completed inference
    #[must_use]
    pub fn is_fully_classified(&self) -> bool {
        self.first_unclassified().is_none()
    }
}

/// Default location of the corpus relative to the working directory
#[must_use]
pub fn default_data_path() -> PathBuf {
    PathBuf::from("data").join("all-data.csv")
}

/// Decode Latin-1 (ISO-8859-1) bytes; every byte maps to the same code point.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_corpus(content: &[u8]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all-data.csv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_corpus_load() {
        let (_dir, path) = write_corpus(
            b"positive,Stock market reaches all-time high\n\
              negative,\"Company reports massive losses, shares fall\"\n",
        );
        let corpus = Corpus::load(&path).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.records()[0].ground_truth, "positive");
        assert_eq!(
            corpus.records()[1].text,
            "Company reports massive losses, shares fall"
        );
        assert!(corpus.source.ends_with("all-data.csv"));
    }

    #[test]
    fn test_corpus_load_latin1() {
        // 0xE9 is 'é' in Latin-1 and invalid as standalone UTF-8
        let (_dir, path) = write_corpus(b"neutral,Soci\xE9t\xE9 G\xE9n\xE9rale results\n");
        let corpus = Corpus::load(&path).unwrap();

        assert_eq!(corpus.records()[0].text, "Société Générale results");
    }

    #[test]
    fn test_corpus_not_found() {
        let result = Corpus::load("/nonexistent/all-data.csv");
        assert!(matches!(result, Err(CorpusError::NotFound(_))));
    }

    #[test]
    fn test_corpus_wrong_column_count() {
        let result = Corpus::parse("positive,ok\nnegative,too,many\n");
        assert!(matches!(
            result,
            Err(CorpusError::WrongColumnCount { row: 2, found: 3 })
        ));

        let result = Corpus::parse("lonely\n");
        assert!(matches!(
            result,
            Err(CorpusError::WrongColumnCount { row: 1, found: 1 })
        ));
    }

    #[test]
    fn test_corpus_empty_label() {
        let result = Corpus::parse(" ,text without label\n");
        assert!(matches!(result, Err(CorpusError::EmptyLabel { row: 1 })));
    }

    #[test]
    fn test_corpus_empty_file() {
        let corpus = Corpus::parse("").unwrap();
        assert!(corpus.is_empty());
        assert!(corpus.is_fully_classified());
    }

    #[test]
    fn test_record_prediction_lifecycle() {
        let mut record = Record::new("Positive", "Profits surge");
        assert!(!record.is_classified());
        assert!(record.predicted_label().is_none());
        assert!(record.confidence().is_none());
        assert!(!record.agrees());

        record.set_prediction(Prediction::new("POSITIVE", 0.9));
        assert!(record.is_classified());
        assert_eq!(record.predicted_label(), Some("POSITIVE"));
        assert_eq!(record.confidence(), Some(0.9));
        assert!(record.agrees());
    }

    #[test]
    fn test_corpus_sample_keeps_order() {
        let records = (0..20)
            .map(|i| Record::new("neutral", format!("news {i:02}")))
            .collect();
        let corpus = Corpus::from_records("mem", records);

        let sample = corpus.clone().sample(5, 42);
        assert_eq!(sample.len(), 5);

        let texts: Vec<&str> = sample.iter().map(|r| r.text.as_str()).collect();
        let mut sorted = texts.clone();
        sorted.sort_unstable();
        assert_eq!(texts, sorted);

        let again = corpus.sample(5, 42);
        let texts_again: Vec<&str> = again.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, texts_again);
    }

    #[test]
    fn test_corpus_sample_larger_than_corpus() {
        let corpus = Corpus::from_records(
            "mem",
            vec![Record::new("positive", "a"), Record::new("negative", "b")],
        );
        assert_eq!(corpus.sample(10, 42).len(), 2);
    }

    #[test]
    fn test_first_unclassified() {
        let corpus = Corpus::from_records(
            "mem",
            vec![
                Record::with_prediction("positive", "a", Prediction::new("POSITIVE", 0.8)),
                Record::new("negative", "b"),
            ],
        );
        assert_eq!(corpus.first_unclassified(), Some(1));
        assert!(!corpus.is_fully_classified());
    }
}
