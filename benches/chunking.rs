use criterion::{Criterion, criterion_group, criterion_main};
use flame_docs_mcp::embeddings::{
    ChunkingConfig, Cl100kTokenizer, WhitespaceTokenizer, chunk_document,
};
use std::fmt::Write as _;
use std::hint::black_box;

/// A long Markdown page shaped like a Flame reference document
fn sample_document() -> String {
    let mut doc = String::from("# Components\n\nComponents are the building blocks of a game.\n\n");
    for section in 0..40 {
        let _ = write!(doc, "## Component {}\n\n", section);
        for sentence in 0..25 {
            let _ = write!(
                doc,
                "Sentence {} of section {} explains how the component reacts to onLoad, update and render calls. ",
                sentence, section
            );
        }
        doc.push_str("\n\n```dart\nclass MyComponent extends PositionComponent {}\n```\n\n");
    }
    doc
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let content = sample_document();
    let config = ChunkingConfig::default();

    let whitespace = WhitespaceTokenizer;
    c.bench_function("chunking_whitespace", |b| {
        b.iter(|| chunk_document(black_box(&content), black_box(&config), &whitespace))
    });

    let cl100k = Cl100kTokenizer::new().expect("cl100k encoding loads");
    c.bench_function("chunking_cl100k", |b| {
        b.iter(|| chunk_document(black_box(&content), black_box(&config), &cl100k))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
