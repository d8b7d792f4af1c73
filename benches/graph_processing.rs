use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graphrag::config::{InferenceSettings, StandardizationSettings};
use graphrag::graphrag::inferencer::Adjacency;
use graphrag::graphrag::{parser, EntityNormalizer, RelationshipInferencer, Triple};

fn parser_benchmark(c: &mut Criterion) {
    let items: Vec<String> = (0..200)
        .map(|i| {
            format!(
                "{{subject: \"Entity {}\", predicate: \"relates to\", object: \"Entity {}\"}}",
                i,
                i + 1
            )
        })
        .collect();
    // Bare keys plus a truncated tail force the repair path.
    let truncated = format!("```json\n[{},\n{{\"subject\": \"cut", items.join(",\n"));

    c.bench_function("parser_truncated_relaxed_array", |b| {
        b.iter(|| {
            let value = parser::parse(black_box(&truncated));
            black_box(value.map(|v| v.as_array().map(Vec::len)));
        });
    });
}

fn sample_triples(n: usize) -> Vec<Triple> {
    (0..n)
        .map(|i| {
            let subject = if i % 3 == 0 {
                format!("the node {}", i % 97)
            } else {
                format!("Node {}", i % 97)
            };
            Triple::new(subject, "links", format!("Node {}", (i * 7) % 101))
        })
        .collect()
}

fn normalizer_benchmark(c: &mut Criterion) {
    let normalizer = EntityNormalizer::new(&StandardizationSettings {
        enabled: true,
        use_llm_for_entities: false,
        fuzzy_merge: false,
    });
    let triples = sample_triples(2_000);

    c.bench_function("normalizer_2k_triples", |b| {
        b.iter(|| {
            let out = normalizer.normalize(black_box(triples.clone()));
            black_box(out.len());
        });
    });
}

fn inferencer_benchmark(c: &mut Criterion) {
    let triples = sample_triples(1_000);

    c.bench_function("adjacency_components_1k_triples", |b| {
        b.iter(|| {
            let graph = Adjacency::build(black_box(&triples));
            black_box(graph.components().len());
        });
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime");
    let inferencer = RelationshipInferencer::new(InferenceSettings {
        enabled: true,
        use_llm_for_inference: false,
        apply_transitive: true,
        apply_lexical_similarity: true,
        concurrency: 1,
    });

    c.bench_function("inferencer_offline_1k_triples", |b| {
        b.iter(|| {
            let out = runtime.block_on(inferencer.infer(black_box(triples.clone())));
            black_box(out.len());
        });
    });
}

criterion_group!(
    benches,
    parser_benchmark,
    normalizer_benchmark,
    inferencer_benchmark
);
criterion_main!(benches);
