//! FinSent Eval CLI
//!
//! Financial-news sentiment classification and evaluation

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use finsent_eval::{
    render_statistics, ChartData, ClassifierConfig, Pipeline, PipelineConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const SANITY_TEXTS: [&str; 3] = [
    "Stock market reaches all-time high",
    "Company reports massive losses",
    "Economy shows signs of recovery",
];

#[derive(Parser)]
#[command(name = "finsent-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a corpus and export results and statistics
    Analyze {
        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Corpus file (label,text per line, no header)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output directory for exported files
        #[arg(long)]
        output: Option<PathBuf>,

        /// Classify a seeded random sample of this many records
        #[arg(long)]
        sample_size: Option<usize>,

        /// Number of most confident predictions to report
        #[arg(long)]
        top_k: Option<usize>,

        /// Inference worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// External classifier command (text on stdin, label and score on stdout)
        #[arg(long)]
        classifier_cmd: Option<String>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Derive chart data from an exported results table
    ChartData {
        /// Results table written by `analyze`
        #[arg(long, default_value = "results/sentiment_results.csv")]
        input: PathBuf,

        /// Output JSON file
        #[arg(long, default_value = "results/chart_data.json")]
        output: PathBuf,

        /// Confidence histogram bins
        #[arg(long, default_value = "30")]
        bins: usize,
    },

    /// Classify individual texts through the configured classifier
    Classify {
        /// Texts to classify (a built-in sanity set when omitted)
        texts: Vec<String>,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// External classifier command
        #[arg(long)]
        classifier_cmd: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Analyze {
            config,
            data,
            output,
            sample_size,
            top_k,
            workers,
            classifier_cmd,
            no_progress,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(data) = data {
                config.data_path = data;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if sample_size.is_some() {
                config.sample_size = sample_size;
            }
            if let Some(top_k) = top_k {
                config.top_k = top_k;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(line) = classifier_cmd {
                config.classifier = ClassifierConfig::from_command_line(&line)
                    .map_err(|e| anyhow!("configuration error: {e}"))?;
            }
            analyze(config, !no_progress)
        }
        Commands::ChartData {
            input,
            output,
            bins,
        } => {
            tracing::info!(input = %input.display(), "Deriving chart data");
            let corpus = finsent_eval::read_corpus(&input)?;
            let chart = ChartData::from_corpus(&corpus, bins)?;
            chart.save(&output)?;
            println!(
                "Chart data for {} records written to {}",
                chart.total,
                output.display()
            );
            Ok(())
        }
        Commands::Classify {
            texts,
            config,
            classifier_cmd,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(line) = classifier_cmd {
                config.classifier = ClassifierConfig::from_command_line(&line)
                    .map_err(|e| anyhow!("configuration error: {e}"))?;
            }
            config
                .validate()
                .map_err(|e| anyhow!("configuration error: {e}"))?;
            let adapter = config.adapter();

            let texts: Vec<String> = if texts.is_empty() {
                SANITY_TEXTS.iter().map(ToString::to_string).collect()
            } else {
                texts
            };

            println!("Classifier: {}", adapter.name());
            for text in &texts {
                let prediction = adapter
                    .classify(text)
                    .map_err(|e| anyhow!("classification failed for {text:?}: {e}"))?;
                println!("\nText: {text}");
                println!(
                    "Sentiment: {} (confidence: {:.2}%)",
                    prediction.label,
                    prediction.confidence * 100.0
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .map_err(|e| anyhow!("configuration error: {}: {e}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn analyze(config: PipelineConfig, show_progress: bool) -> Result<()> {
    tracing::info!(
        data = %config.data_path.display(),
        output = %config.output_dir.display(),
        sample_size = ?config.sample_size,
        workers = config.workers,
        "Starting analysis"
    );

    let pipeline = Pipeline::new(config)?;

    let bar = if show_progress {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Classifying");
        bar
    } else {
        ProgressBar::hidden()
    };

    let outcome = pipeline.run_with_progress(|snapshot| {
        bar.set_length(snapshot.total as u64);
        bar.set_position(snapshot.processed as u64);
    });
    bar.finish_and_clear();
    let outcome = outcome?;

    println!("{}", "=".repeat(70));
    println!("SENTIMENT ANALYSIS STATISTICS");
    println!("{}", "=".repeat(70));
    println!();
    print!("{}", render_statistics(&outcome.statistics));
    println!();
    println!(
        "Classified {} records in {:.1}s ({} fallback)",
        outcome.summary.processed,
        outcome.summary.elapsed.as_secs_f64(),
        outcome.summary.fallback_count()
    );
    println!("Files written:");
    for path in [
        &outcome.files.results_csv,
        &outcome.files.workbook,
        &outcome.files.summary_text,
        &outcome.files.summary_json,
    ] {
        println!("  - {}", path.display());
    }

    Ok(())
}
