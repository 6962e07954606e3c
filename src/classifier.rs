//! Classifier adapter and backends.
//!
//! Any text-classification backend implements [`Classifier`]. The
//! [`ClassifierAdapter`] sits in front of it and enforces the input-length
//! limit, validates the returned confidence, and turns every backend failure
//! (including panics) into a [`ClassifierError`].
//!
//! Two backends ship with the crate:
//! - [`LexiconClassifier`]: deterministic finance word-list scorer (offline)
//! - [`CommandClassifier`]: shells out to an external model per text

use serde::Deserialize;
use std::any::Any;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::corpus::Prediction;

/// Input limit of the wrapped model, in characters
pub const DEFAULT_MAX_INPUT_CHARS: usize = 512;

/// Errors surfaced by the classifier adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("Classifier backend failed: {0}")]
    Backend(String),

    #[error("Classifier command not found: {0}")]
    ToolNotFound(String),

    #[error("Classifier timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),

    #[error("Classifier panicked: {0}")]
    Panicked(String),

    #[error("Classifier returned confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),
}

impl ClassifierError {
    /// Whether this error indicates a broken backend rather than a bad input.
    ///
    /// Defects abort the batch; everything else is recovered per record.
    #[must_use]
    pub const fn is_defect(&self) -> bool {
        matches!(self, Self::InvalidConfidence(_))
    }
}

/// Unvalidated output of a backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPrediction {
    pub label: String,
    #[serde(alias = "confidence")]
    pub score: f64,
}

/// A text-classification capability: `classify(text) -> (label, confidence)`
pub trait Classifier: Send + Sync {
    /// Backend name for logs and reports
    fn name(&self) -> &str;

    /// Classify one (already truncated) text
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce a prediction.
    fn predict(&self, text: &str) -> Result<RawPrediction, ClassifierError>;
}

/// Uniform front for any [`Classifier`] with truncation and validation
pub struct ClassifierAdapter {
    inner: Box<dyn Classifier>,
    max_input_chars: usize,
}

impl ClassifierAdapter {
    /// Wrap a backend with the default 512-character input limit
    #[must_use]
    pub fn new(inner: Box<dyn Classifier>) -> Self {
        Self {
            inner,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Override the input limit
    #[must_use]
    pub const fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Backend name
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    #[must_use]
    pub const fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Classify a text
    ///
    /// Text longer than the input limit is silently cut before inference.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError`] if the backend fails or panics, or
    /// [`ClassifierError::InvalidConfidence`] if it reports a confidence
    /// outside [0, 1].
    pub fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let input = truncate_chars(text, self.max_input_chars);

        let raw = panic::catch_unwind(AssertUnwindSafe(|| self.inner.predict(input)))
            .map_err(|payload| ClassifierError::Panicked(panic_message(payload.as_ref())))??;

        if !(0.0..=1.0).contains(&raw.score) {
            return Err(ClassifierError::InvalidConfidence(raw.score));
        }

        Ok(Prediction::new(raw.label, raw.score))
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Lexicon backend
// ============================================================================

const POSITIVE_TERMS: &[&str] = &[
    "gain", "gains", "growth", "grew", "grow", "increase", "increased", "rise", "rose",
    "surge", "surged", "record", "profit", "profits", "profitable", "strong", "stronger",
    "improve", "improved", "improvement", "high", "higher", "expansion", "expand",
    "success", "successful", "beat", "upgrade", "celebrate", "win", "won", "boost",
    "positive", "rally", "up", "exceed", "exceeded", "innovative", "unprecedented",
];

const NEGATIVE_TERMS: &[&str] = &[
    "loss", "losses", "decline", "declined", "decrease", "decreased", "fall", "fell",
    "drop", "dropped", "plummet", "plummeted", "crash", "weak", "weaker", "bankruptcy",
    "recession", "fear", "fears", "fail", "failed", "failure", "cut", "cuts", "down",
    "lower", "layoffs", "unemployment", "negative", "risk", "warning", "debt", "lawsuit",
    "downgrade", "wipes", "massive", "slump", "miss", "missed",
];

/// Deterministic binary sentiment scorer over financial word lists
///
/// Returns only `POSITIVE` or `NEGATIVE`, never a neutral class.
pub struct LexiconClassifier {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    /// Logistic slope applied to the net term count
    steepness: f64,
}

impl LexiconClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            positive: POSITIVE_TERMS.iter().copied().collect(),
            negative: NEGATIVE_TERMS.iter().copied().collect(),
            steepness: 1.2,
        }
    }

    fn net_score(&self, text: &str) -> i64 {
        text.split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .fold(0, |acc, word| {
                if self.positive.contains(word.as_str()) {
                    acc + 1
                } else if self.negative.contains(word.as_str()) {
                    acc - 1
                } else {
                    acc
                }
            })
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for LexiconClassifier {
    fn name(&self) -> &str {
        "lexicon"
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict(&self, text: &str) -> Result<RawPrediction, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::Backend("empty input text".to_string()));
        }

        let net = self.net_score(text);
        let label = if net >= 0 { "POSITIVE" } else { "NEGATIVE" };
        let magnitude = net.unsigned_abs() as f64;
        let score = 1.0 / (1.0 + (-self.steepness * magnitude).exp());

        Ok(RawPrediction {
            label: label.to_string(),
            score,
        })
    }
}

// ============================================================================
// External command backend
// ============================================================================

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs an external command once per text
///
/// The text is written to the command's stdin. A command still running at
/// the timeout is killed. Stdout must be either
/// `LABEL SCORE` or JSON (`{"label": .., "score": ..}` or a one-element list
/// of such objects, as emitted by common inference pipelines).
pub struct CommandClassifier {
    name: String,
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        let command = command.into();
        Self {
            name: format!("command:{command}"),
            command,
            args,
            timeout,
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Classifier for CommandClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, text: &str) -> Result<RawPrediction, ClassifierError> {
        let start = Instant::now();

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ClassifierError::ToolNotFound(self.command.clone()),
                _ => ClassifierError::Backend(e.to_string()),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| ClassifierError::Backend(e.to_string()))?;
        }

        // Pipes are drained off-thread while the child is polled
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let status = loop {
            match child
                .try_wait()
                .map_err(|e| ClassifierError::Backend(e.to_string()))?
            {
                Some(status) => break status,
                None if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(
                        command = %self.command,
                        timeout = ?self.timeout,
                        "Killed classifier command"
                    );
                    return Err(ClassifierError::Timeout(self.timeout));
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let output = Output {
            status,
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr: stderr_reader.join().unwrap_or_default(),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassifierError::Backend(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        parse_response(&String::from_utf8_lossy(&output.stdout))
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

/// Parse a backend response line
///
/// # Errors
///
/// Returns [`ClassifierError::InvalidResponse`] if the output matches none of
/// the accepted shapes.
pub fn parse_response(stdout: &str) -> Result<RawPrediction, ClassifierError> {
    let trimmed = stdout.trim();

    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()));
    }

    if trimmed.starts_with('[') {
        let mut list: Vec<RawPrediction> = serde_json::from_str(trimmed)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        if list.is_empty() {
            return Err(ClassifierError::InvalidResponse("empty prediction list".to_string()));
        }
        return Ok(list.swap_remove(0));
    }

    let mut fields = trimmed.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(label), Some(score), None) => {
            let score = score
                .parse::<f64>()
                .map_err(|e| ClassifierError::InvalidResponse(format!("score '{score}': {e}")))?;
            Ok(RawPrediction {
                label: label.to_string(),
                score,
            })
        }
        _ => Err(ClassifierError::InvalidResponse(format!(
            "expected 'LABEL SCORE', got '{trimmed}'"
        ))),
    }
}
