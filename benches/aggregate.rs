//! Benchmarks for aggregation and batch inference

#![allow(clippy::cast_precision_loss)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use finsent_eval::metrics::{aggregate, top_k, RecordRef};
use finsent_eval::{
    ClassifierAdapter, Corpus, InferenceEngine, LexiconClassifier, Prediction, Record,
    RunnerConfig,
};

const LABELS: [&str; 3] = ["positive", "negative", "neutral"];

fn create_corpus(n: usize) -> Corpus {
    Corpus::from_records(
        "benchmark",
        (0..n)
            .map(|i| {
                let truth = LABELS[i % 3];
                let predicted = LABELS[(i * 7) % 3].to_uppercase();
                let confidence = 0.5 + ((i * 37) % 50) as f64 / 100.0;
                Record::with_prediction(
                    truth,
                    format!("Operating profit rose {i} percent while costs fell"),
                    Prediction::new(predicted, confidence),
                )
            })
            .collect(),
    )
}

fn benchmark_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for size in &[100, 1_000, 5_000] {
        let corpus = create_corpus(*size);

        group.bench_function(format!("aggregate_{size}_records"), |b| {
            b.iter(|| aggregate(black_box(&corpus)));
        });
    }

    let refs: Vec<RecordRef> = create_corpus(5_000)
        .iter()
        .enumerate()
        .filter_map(|(index, r)| {
            r.prediction().map(|p| RecordRef {
                index,
                label: p.label.clone(),
                confidence: p.confidence,
                text: r.text.clone(),
            })
        })
        .collect();
    group.bench_function("top_k_5000_records", |b| {
        b.iter(|| top_k(black_box(&refs), 3));
    });

    group.finish();
}

fn benchmark_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("inference");
    let adapter = ClassifierAdapter::new(Box::new(LexiconClassifier::new()));
    let corpus = create_corpus(1_000);

    for workers in [1, 4] {
        let engine = InferenceEngine::with_config(RunnerConfig {
            workers,
            ..RunnerConfig::default()
        });
        group.bench_function(format!("lexicon_1000_records_{workers}_workers"), |b| {
            b.iter(|| {
                let mut corpus = corpus.clone();
                engine.run(&mut corpus, &adapter)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_aggregate, benchmark_inference);
criterion_main!(benches);
