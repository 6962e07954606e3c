//! Report export for classified corpora.
//!
//! Writes every representation from the same corpus and statistics:
//! - `sentiment_results.csv`: one row per record (read back by chart tooling)
//! - `sentiment_results.xlsx`: Results, Statistics and Distribution sheets
//! - `analysis_summary.txt`: human-readable summary
//! - `analysis_summary.json`: structured summary
//!
//! Each file is written to a temporary file in the output directory and
//! renamed into place, so a failed export never leaves a truncated file
//! under the final name.

use crate::classifier::truncate_chars;
use crate::corpus::{Corpus, Prediction, Record};
use crate::metrics::AggregateStatistics;
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const RESULTS_CSV: &str = "sentiment_results.csv";
pub const RESULTS_WORKBOOK: &str = "sentiment_results.xlsx";
pub const SUMMARY_TEXT: &str = "analysis_summary.txt";
pub const SUMMARY_JSON: &str = "analysis_summary.json";

/// Longest string an xlsx cell accepts
pub const WORKBOOK_CELL_MAX_CHARS: usize = 32_767;

const RULE_WIDTH: usize = 70;

/// Errors that can occur while writing or reading reports
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error for {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Workbook error for {path}: {source}")]
    Workbook { path: PathBuf, source: XlsxError },

    #[error("JSON error for {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Record {index} has no prediction and cannot be exported")]
    UnclassifiedRecord { index: usize },

    #[error("Too many rows for a worksheet: {0}")]
    TooManyRows(usize),
}

/// Run metadata that is not derivable from the corpus itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportContext {
    /// Corpus identifier (usually the input path)
    pub source: String,
    /// Classifier backend name
    pub classifier: String,
    /// Records that received the fallback prediction
    pub fallback_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl ExportContext {
    #[must_use]
    pub fn new(source: impl Into<String>, classifier: impl Into<String>, fallback_count: usize) -> Self {
        Self {
            source: source.into(),
            classifier: classifier.into(),
            fallback_count,
            generated_at: Utc::now(),
        }
    }
}

/// Paths of the files produced by one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub results_csv: PathBuf,
    pub workbook: PathBuf,
    pub summary_text: PathBuf,
    pub summary_json: PathBuf,
}

/// Canonical per-record columns, as read back from the results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub ground_truth_label: String,
    pub text: String,
    pub predicted_label: String,
    pub confidence: f64,
}

impl ResultRow {
    /// Rebuild a classified record
    #[must_use]
    pub fn into_record(self) -> Record {
        Record::with_prediction(
            self.ground_truth_label,
            self.text,
            Prediction::new(self.predicted_label, self.confidence),
        )
    }
}

/// Row as written, with lower-cased comparison helpers
#[derive(Serialize)]
struct ExportRow<'a> {
    ground_truth_label: &'a str,
    text: &'a str,
    predicted_label: &'a str,
    confidence: f64,
    ground_truth_lower: String,
    predicted_lower: String,
}

/// Structured summary document
#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    context: &'a ExportContext,
    statistics: &'a AggregateStatistics,
}

/// Writes all report representations into one directory
pub struct ReportExporter {
    output_dir: PathBuf,
}

impl ReportExporter {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every representation
    ///
    /// # Errors
    ///
    /// Returns an error naming the failing file if the directory cannot be
    /// created or any representation cannot be rendered or written. Files
    /// from a previous export are only replaced once all four are staged.
    pub fn export(
        &self,
        corpus: &Corpus,
        stats: &AggregateStatistics,
        context: &ExportContext,
    ) -> Result<ExportedFiles, ExportError> {
        if let Some(index) = corpus.first_unclassified() {
            return Err(ExportError::UnclassifiedRecord { index });
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let files = ExportedFiles {
            results_csv: self.output_dir.join(RESULTS_CSV),
            workbook: self.output_dir.join(RESULTS_WORKBOOK),
            summary_text: self.output_dir.join(SUMMARY_TEXT),
            summary_json: self.output_dir.join(SUMMARY_JSON),
        };

        // Render and stage all four before renaming any into place
        let csv_bytes = results_csv(corpus, &files.results_csv)?;
        let workbook_bytes = workbook(corpus, stats, context, &files.workbook)?;
        let text = summary_text(stats, context);
        let json = serde_json::to_vec_pretty(&SummaryDocument {
            context,
            statistics: stats,
        })
        .map_err(|source| ExportError::Json {
            path: files.summary_json.clone(),
            source,
        })?;

        let staged = [
            (self.stage(&files.results_csv, &csv_bytes)?, &files.results_csv),
            (self.stage(&files.workbook, &workbook_bytes)?, &files.workbook),
            (self.stage(&files.summary_text, text.as_bytes())?, &files.summary_text),
            (self.stage(&files.summary_json, &json)?, &files.summary_json),
        ];

        for (tmp, path) in staged {
            tmp.persist(path).map_err(|e| ExportError::Io {
                path: path.clone(),
                source: e.error,
            })?;
            tracing::info!(path = %path.display(), "Saved report file");
        }
        tracing::info!(
            dir = %self.output_dir.display(),
            rows = corpus.len(),
            "Export complete"
        );

        Ok(files)
    }

    /// Write bytes to a temp file next to `path`, ready to be renamed over it
    fn stage(&self, path: &Path, bytes: &[u8]) -> Result<NamedTempFile, ExportError> {
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.output_dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        Ok(tmp)
    }
}

/// Serialise the per-record table
fn results_csv(corpus: &Corpus, path: &Path) -> Result<Vec<u8>, ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    for (index, record) in corpus.iter().enumerate() {
        let prediction = record
            .prediction()
            .ok_or(ExportError::UnclassifiedRecord { index })?;
        writer
            .serialize(ExportRow {
                ground_truth_label: &record.ground_truth,
                text: &record.text,
                predicted_label: &prediction.label,
                confidence: prediction.confidence,
                ground_truth_lower: record.ground_truth.to_lowercase(),
                predicted_lower: prediction.label.to_lowercase(),
            })
            .map_err(csv_err)?;
    }

    // An empty corpus still gets a header row
    if corpus.is_empty() {
        writer
            .write_record([
                "ground_truth_label",
                "text",
                "predicted_label",
                "confidence",
                "ground_truth_lower",
                "predicted_lower",
            ])
            .map_err(csv_err)?;
    }

    writer.into_inner().map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(e.error().kind(), e.error().to_string()),
    })
}

/// Read the canonical columns back from an exported results table
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a row is malformed.
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<ResultRow>, ExportError> {
    let path = path.as_ref();
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<ResultRow>, _>>()
        .map_err(csv_err)
}

/// Rebuild a corpus from an exported results table
///
/// # Errors
///
/// See [`read_results`].
pub fn read_corpus<P: AsRef<Path>>(path: P) -> Result<Corpus, ExportError> {
    let path = path.as_ref();
    let records = read_results(path)?
        .into_iter()
        .map(ResultRow::into_record)
        .collect();
    Ok(Corpus::from_records(path.display().to_string(), records))
}

/// Cut text to the workbook cell limit; the CSV keeps the full text
fn cell_text(text: &str) -> &str {
    truncate_chars(text, WORKBOOK_CELL_MAX_CHARS)
}

fn row_index(row: usize) -> Result<u32, ExportError> {
    u32::try_from(row).map_err(|_| ExportError::TooManyRows(row))
}

fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Build the three-sheet workbook
fn workbook(
    corpus: &Corpus,
    stats: &AggregateStatistics,
    context: &ExportContext,
    path: &Path,
) -> Result<Vec<u8>, ExportError> {
    let xlsx_err = |source| ExportError::Workbook {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    write_results_sheet(sheet, corpus, &header).map_err(|e| match e {
        SheetError::Xlsx(source) => xlsx_err(source),
        SheetError::Export(e) => e,
    })?;

    let sheet = workbook.add_worksheet();
    write_statistics_sheet(sheet, stats, context, &header).map_err(xlsx_err)?;

    let sheet = workbook.add_worksheet();
    write_distribution_sheet(sheet, stats, &header).map_err(|e| match e {
        SheetError::Xlsx(source) => xlsx_err(source),
        SheetError::Export(e) => e,
    })?;

    workbook.save_to_buffer().map_err(xlsx_err)
}

enum SheetError {
    Xlsx(XlsxError),
    Export(ExportError),
}

impl From<XlsxError> for SheetError {
    fn from(e: XlsxError) -> Self {
        Self::Xlsx(e)
    }
}

impl From<ExportError> for SheetError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

fn write_results_sheet(
    sheet: &mut Worksheet,
    corpus: &Corpus,
    header: &Format,
) -> Result<(), SheetError> {
    sheet.set_name("Results")?;
    for (col, title) in ["ground_truth_label", "text", "predicted_label", "confidence"]
        .into_iter()
        .enumerate()
    {
        sheet.write_string_with_format(0, col as u16, title, header)?;
    }

    for (index, record) in corpus.iter().enumerate() {
        let row = row_index(index + 1)?;
        let prediction = record
            .prediction()
            .ok_or(ExportError::UnclassifiedRecord { index })?;
        sheet.write_string(row, 0, cell_text(&record.ground_truth))?;
        sheet.write_string(row, 1, cell_text(&record.text))?;
        sheet.write_string(row, 2, cell_text(&prediction.label))?;
        sheet.write_number(row, 3, prediction.confidence)?;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn write_statistics_sheet(
    sheet: &mut Worksheet,
    stats: &AggregateStatistics,
    context: &ExportContext,
    header: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name("Statistics")?;
    sheet.write_string_with_format(0, 0, "Metric", header)?;
    sheet.write_string_with_format(0, 1, "Value", header)?;

    let counts = [
        ("Total News", stats.total),
        ("Positive", stats.count_for("POSITIVE")),
        ("Negative", stats.count_for("NEGATIVE")),
        ("Neutral", stats.count_for("NEUTRAL")),
    ];
    let mut row = 1;
    for (metric, value) in counts {
        sheet.write_string(row, 0, metric)?;
        sheet.write_number(row, 1, value as f64)?;
        row += 1;
    }

    let texts = [
        ("Avg Confidence", format_percent(stats.confidence.mean)),
        ("Min Confidence", format_percent(stats.confidence.min)),
        ("Max Confidence", format_percent(stats.confidence.max)),
        ("Median Confidence", format_percent(stats.confidence.median)),
    ];
    for (metric, value) in texts {
        sheet.write_string(row, 0, metric)?;
        sheet.write_string(row, 1, value.as_str())?;
        row += 1;
    }

    sheet.write_string(row, 0, "Agreement")?;
    sheet.write_number(row, 1, stats.agreement.matches as f64)?;
    row += 1;
    sheet.write_string(row, 0, "Agreement %")?;
    sheet.write_string(row, 1, format!("{:.1}%", stats.agreement.percentage).as_str())?;
    row += 1;
    sheet.write_string(row, 0, "Fallback Classified")?;
    sheet.write_number(row, 1, context.fallback_count as f64)?;

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn write_distribution_sheet(
    sheet: &mut Worksheet,
    stats: &AggregateStatistics,
    header: &Format,
) -> Result<(), SheetError> {
    sheet.set_name("Distribution")?;
    for (col, title) in ["Sentiment", "Count", "Percentage"].into_iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, title, header)?;
    }

    for (i, entry) in stats.distribution.iter().enumerate() {
        let row = row_index(i + 1)?;
        sheet.write_string(row, 0, cell_text(&entry.label))?;
        sheet.write_number(row, 1, entry.count as f64)?;
        sheet.write_number(row, 2, round_to(entry.percentage, 1))?;
    }
    Ok(())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Human-readable summary file content
#[must_use]
pub fn summary_text(stats: &AggregateStatistics, context: &ExportContext) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let thin = "-".repeat(RULE_WIDTH);
    let mut output = String::new();

    writeln!(output, "{rule}").ok();
    writeln!(output, "FINANCIAL NEWS SENTIMENT ANALYSIS - SUMMARY REPORT").ok();
    writeln!(output, "{rule}").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "Date: {}",
        context.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
    .ok();
    writeln!(output, "Dataset: {}", context.source).ok();
    writeln!(output, "Classifier: {}", context.classifier).ok();
    writeln!(output, "Total News Analyzed: {}", stats.total).ok();
    writeln!(output).ok();

    writeln!(output, "SENTIMENT DISTRIBUTION:").ok();
    writeln!(output, "{thin}").ok();
    for entry in &stats.distribution {
        writeln!(
            output,
            "{:10} {:6} ({:5.1}%)",
            entry.label, entry.count, entry.percentage
        )
        .ok();
    }
    writeln!(output).ok();

    writeln!(
        output,
        "AVERAGE CONFIDENCE: {}",
        format_percent(stats.confidence.mean)
    )
    .ok();
    writeln!(
        output,
        "ACCURACY vs ORIGINAL: {:.1}% ({}/{})",
        stats.agreement.percentage, stats.agreement.matches, stats.agreement.total
    )
    .ok();
    writeln!(output, "FALLBACK-CLASSIFIED RECORDS: {}", context.fallback_count).ok();

    output
}

/// Distribution row for console tables
#[derive(Tabled)]
struct DistributionRow {
    #[tabled(rename = "Sentiment")]
    label: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Share")]
    share: String,
    #[tabled(rename = "")]
    bar: String,
}

/// Top prediction row for console tables
#[derive(Tabled)]
struct TopRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Sentiment")]
    label: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Text")]
    preview: String,
}

/// Shorten text for display, marking the cut with an ellipsis
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Console statistics report
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::too_many_lines
)]
pub fn render_statistics(stats: &AggregateStatistics) -> String {
    let thin = "-".repeat(RULE_WIDTH);
    let mut output = String::new();

    writeln!(output, "1. PREDICTED SENTIMENT DISTRIBUTION").ok();
    writeln!(output, "{thin}").ok();
    let rows: Vec<DistributionRow> = stats
        .distribution
        .iter()
        .map(|d| DistributionRow {
            label: d.label.clone(),
            count: d.count,
            share: format!("{:5.1}%", d.percentage),
            bar: "█".repeat((d.percentage / 2.0) as usize),
        })
        .collect();
    writeln!(output, "{}", Table::new(rows)).ok();
    writeln!(output).ok();

    writeln!(output, "2. CONFIDENCE SCORES").ok();
    writeln!(output, "{thin}").ok();
    writeln!(output, "   Mean:     {}", format_percent(stats.confidence.mean)).ok();
    writeln!(output, "   Median:   {}", format_percent(stats.confidence.median)).ok();
    writeln!(output, "   Min:      {}", format_percent(stats.confidence.min)).ok();
    writeln!(output, "   Max:      {}", format_percent(stats.confidence.max)).ok();
    writeln!(output).ok();

    writeln!(output, "3. AGREEMENT WITH GROUND TRUTH").ok();
    writeln!(output, "{thin}").ok();
    writeln!(
        output,
        "   Match:      {}/{} ({:.1}%)",
        stats.agreement.matches, stats.agreement.total, stats.agreement.percentage
    )
    .ok();
    writeln!(
        output,
        "   Mismatch:   {} ({:.1}%)",
        stats.agreement.mismatches(),
        stats.agreement.mismatch_percentage()
    )
    .ok();
    writeln!(output).ok();

    writeln!(output, "4. TOP {} MOST CONFIDENT PREDICTIONS", stats.top_k.len()).ok();
    writeln!(output, "{thin}").ok();
    let rows: Vec<TopRow> = stats
        .top_k
        .iter()
        .enumerate()
        .map(|(i, r)| TopRow {
            rank: i + 1,
            label: r.label.clone(),
            confidence: format_percent(r.confidence),
            preview: preview(&r.text, 80),
        })
        .collect();
    writeln!(output, "{}", Table::new(rows)).ok();
    writeln!(output).ok();

    writeln!(output, "5. EXAMPLES PER SENTIMENT").ok();
    writeln!(output, "{thin}").ok();
    for group in &stats.examples {
        writeln!(output, "   {}:", group.label).ok();
        for r in &group.records {
            writeln!(output, "      - {}", preview(&r.text, 100)).ok();
            writeln!(output, "        Confidence: {}", format_percent(r.confidence)).ok();
        }
    }

    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metrics::aggregate;
    use tempfile::TempDir;

    fn sample_corpus() -> Corpus {
        Corpus::from_records(
            "data/all-data.csv",
            vec![
                Record::with_prediction(
                    "positive",
                    "Stock market reaches all-time high",
                    Prediction::new("POSITIVE", 0.95),
                ),
                Record::with_prediction(
                    "negative",
                    "Company reports massive losses, \"worst\" quarter",
                    Prediction::new("NEGATIVE", 0.99),
                ),
                Record::with_prediction("neutral", "Rates unchanged", Prediction::new("NEUTRAL", 0.5)),
            ],
        )
    }

    fn context() -> ExportContext {
        ExportContext::new("data/all-data.csv", "scripted", 1)
    }

    #[test]
    fn test_export_writes_all_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("results");
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();

        let files = ReportExporter::new(&out)
            .export(&corpus, &stats, &context())
            .unwrap();

        assert!(files.results_csv.exists());
        assert!(files.workbook.exists());
        assert!(files.summary_text.exists());
        assert!(files.summary_json.exists());
        assert!(std::fs::metadata(&files.workbook).unwrap().len() > 0);

        // No stray temp files left behind
        let entries = std::fs::read_dir(&out).unwrap().count();
        assert_eq!(entries, 4);
    }

    #[test]
    fn test_results_roundtrip() {
        let dir = TempDir::new().unwrap();
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();

        let files = ReportExporter::new(dir.path())
            .export(&corpus, &stats, &context())
            .unwrap();
        let rows = read_results(&files.results_csv).unwrap();

        assert_eq!(rows.len(), corpus.len());
        for (row, record) in rows.iter().zip(corpus.iter()) {
            assert_eq!(row.ground_truth_label, record.ground_truth);
            assert_eq!(row.text, record.text);
            assert_eq!(Some(row.predicted_label.as_str()), record.predicted_label());
            assert_eq!(Some(row.confidence), record.confidence());
        }
    }

    #[test]
    fn test_export_long_text_keeps_full_csv() {
        let dir = TempDir::new().unwrap();
        let long_text = "a".repeat(40_000);
        let corpus = Corpus::from_records(
            "long",
            vec![Record::with_prediction(
                "neutral",
                long_text.as_str(),
                Prediction::new("NEUTRAL", 0.5),
            )],
        );
        let stats = aggregate(&corpus).unwrap();

        let files = ReportExporter::new(dir.path())
            .export(&corpus, &stats, &context())
            .unwrap();

        assert!(files.workbook.exists());
        let rows = read_results(&files.results_csv).unwrap();
        assert_eq!(rows[0].text.chars().count(), 40_000);
        assert_eq!(cell_text(&long_text).chars().count(), WORKBOOK_CELL_MAX_CHARS);
    }

    #[test]
    fn test_failed_rename_cleans_up_staged_files() {
        let dir = TempDir::new().unwrap();
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();
        let exporter = ReportExporter::new(dir.path());
        let files = exporter.export(&corpus, &stats, &context()).unwrap();

        // A directory squatting on the JSON path makes the last rename fail
        std::fs::remove_file(&files.summary_json).unwrap();
        std::fs::create_dir(&files.summary_json).unwrap();
        std::fs::write(files.summary_json.join("keep"), "x").unwrap();

        let changed = Corpus::from_records(
            "changed",
            vec![Record::with_prediction("positive", "Only one", Prediction::new("POSITIVE", 0.6))],
        );
        let changed_stats = aggregate(&changed).unwrap();
        let result = exporter.export(&changed, &changed_stats, &context());

        match result {
            Err(ExportError::Io { path, .. }) => assert_eq!(path, files.summary_json),
            other => panic!("expected rename failure, got {other:?}"),
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 4, "temp files left behind: {entries:?}");
        assert!(files.summary_json.join("keep").exists());
        assert!(!std::fs::read_to_string(&files.results_csv).unwrap().is_empty());
    }

    #[test]
    fn test_results_csv_header() {
        let dir = TempDir::new().unwrap();
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();

        let files = ReportExporter::new(dir.path())
            .export(&corpus, &stats, &context())
            .unwrap();
        let content = std::fs::read_to_string(&files.results_csv).unwrap();
        let header = content.lines().next().unwrap();

        assert!(header.starts_with("ground_truth_label,text,predicted_label,confidence"));
        assert!(content.contains("positive,Stock market reaches all-time high,POSITIVE,0.95,positive,positive"));
    }

    #[test]
    fn test_empty_corpus_exports_header_only() {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::from_records("empty.csv", Vec::new());
        let stats = aggregate(&corpus).unwrap();

        let files = ReportExporter::new(dir.path())
            .export(&corpus, &stats, &ExportContext::new("empty.csv", "lexicon", 0))
            .unwrap();

        assert!(read_results(&files.results_csv).unwrap().is_empty());
        let summary = std::fs::read_to_string(&files.summary_text).unwrap();
        assert!(summary.contains("Total News Analyzed: 0"));
    }

    #[test]
    fn test_export_rejects_unclassified() {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::from_records("x", vec![Record::new("positive", "pending")]);

        let err = ReportExporter::new(dir.path())
            .export(&corpus, &AggregateStatistics::default(), &context())
            .unwrap_err();

        assert!(matches!(err, ExportError::UnclassifiedRecord { index: 0 }));
        assert!(!dir.path().join(RESULTS_CSV).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_export_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();

        let err = ReportExporter::new(blocker.join("results"))
            .export(&corpus, &stats, &context())
            .unwrap_err();

        assert!(matches!(err, ExportError::CreateDir { .. }));
        assert!(err.to_string().contains("not-a-dir"));
    }

    #[test]
    fn test_summary_text_content() {
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();
        let text = summary_text(&stats, &context());

        assert!(text.contains("FINANCIAL NEWS SENTIMENT ANALYSIS - SUMMARY REPORT"));
        assert!(text.contains("Dataset: data/all-data.csv"));
        assert!(text.contains("Total News Analyzed: 3"));
        assert!(text.contains("POSITIVE        1 ( 33.3%)"));
        assert!(text.contains("ACCURACY vs ORIGINAL: 100.0% (3/3)"));
        assert!(text.contains("FALLBACK-CLASSIFIED RECORDS: 1"));
    }

    #[test]
    fn test_summary_json_matches_statistics() {
        let dir = TempDir::new().unwrap();
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();

        let files = ReportExporter::new(dir.path())
            .export(&corpus, &stats, &context())
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.summary_json).unwrap()).unwrap();

        assert_eq!(json["fallback_count"], 1);
        assert_eq!(json["source"], "data/all-data.csv");
        let parsed: AggregateStatistics =
            serde_json::from_value(json["statistics"].clone()).unwrap();
        assert_eq!(parsed.total, stats.total);
        assert_eq!(parsed.agreement.matches, stats.agreement.matches);
        assert_eq!(parsed.top_k.len(), stats.top_k.len());
    }

    #[test]
    fn test_read_corpus_rebuilds_records() {
        let dir = TempDir::new().unwrap();
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();
        let files = ReportExporter::new(dir.path())
            .export(&corpus, &stats, &context())
            .unwrap();

        let rebuilt = read_corpus(&files.results_csv).unwrap();
        assert!(rebuilt.is_fully_classified());
        assert_eq!(aggregate(&rebuilt).unwrap().distribution, stats.distribution);
    }

    #[test]
    fn test_read_results_missing_file() {
        let err = read_results("/nonexistent/sentiment_results.csv").unwrap_err();
        assert!(matches!(err, ExportError::Csv { .. }));
    }

    #[test]
    fn test_render_statistics() {
        let corpus = sample_corpus();
        let stats = aggregate(&corpus).unwrap();
        let text = render_statistics(&stats);

        assert!(text.contains("PREDICTED SENTIMENT DISTRIBUTION"));
        assert!(text.contains("POSITIVE"));
        assert!(text.contains("Mean:     81.33%"));
        assert!(text.contains("Match:      3/3 (100.0%)"));
        assert!(text.contains("TOP 3 MOST CONFIDENT PREDICTIONS"));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_round_to() {
        assert!((round_to(33.333, 1) - 33.3).abs() < 1e-9);
        assert!((round_to(66.666, 1) - 66.7).abs() < 1e-9);
    }
}
