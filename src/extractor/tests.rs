use super::*;
use crate::embeddings::tokenizer::WhitespaceTokenizer;
use std::path::PathBuf;

fn root() -> PathBuf {
    PathBuf::from("_build/markdown")
}

fn metadata_for(relative: &str) -> PathMetadata {
    extract_path_metadata(&root().join(relative), &root(), "1.29.0")
        .expect("path is under the root")
}

#[test]
fn tutorial_path_metadata() {
    let metadata = metadata_for("tutorials/platformer/step_1.md");
    assert_eq!(metadata.section, "tutorials");
    assert_eq!(metadata.content_type, ContentType::Tutorial);
    assert_eq!(metadata.file_path, "tutorials/platformer/step_1.md");
    assert_eq!(metadata.version, "1.29.0");
}

#[test]
fn content_type_priority() {
    assert_eq!(
        metadata_for("flame/game_widget.md").content_type,
        ContentType::Reference
    );
    assert_eq!(
        metadata_for("api/components.md").content_type,
        ContentType::Api
    );
    assert_eq!(
        metadata_for("examples/simple_game.md").content_type,
        ContentType::Example
    );
    assert_eq!(
        metadata_for("reference/camera.md").content_type,
        ContentType::Api
    );
    // "tutorial" outranks "example"
    assert_eq!(
        metadata_for("Tutorials/Examples/intro.md").content_type,
        ContentType::Tutorial
    );
    assert_eq!(
        metadata_for("bridge_packages/flame_audio/audio.md").content_type,
        ContentType::Reference
    );
}

#[test]
fn nested_and_root_level_sections() {
    let nested = metadata_for("other_modules/jenny/language/commands/character.md");
    assert_eq!(nested.section, "other_modules");
    assert_eq!(
        nested.file_path,
        "other_modules/jenny/language/commands/character.md"
    );

    let top = metadata_for("index.md");
    assert_eq!(top.section, "unknown");
    assert_eq!(top.file_path, "index.md");
}

#[test]
fn path_outside_root_is_rejected() {
    let result = extract_path_metadata(Path::new("/etc/passwd"), &root(), "1.29.0");
    assert!(matches!(result, Err(DocsError::Validation(_))));
}

#[test]
fn headings_are_flat_and_ordered() {
    assert_eq!(extract_headings("# A\n## B\n### C\n"), vec!["A", "B", "C"]);
    assert!(extract_headings("Just plain text with no headings.").is_empty());

    let headings = extract_headings("# Valid Header\n##Missing space\n   ### Indented\n#\n");
    assert_eq!(headings, vec!["Valid Header", "Missing space", "Indented"]);

    let special = extract_headings("# Main Title with `code`\n## Section with **bold** text");
    assert_eq!(
        special,
        vec!["Main Title with `code`", "Section with **bold** text"]
    );
}

#[test]
fn detect_code_on_prose_and_code() {
    assert!(!detect_code(""));
    assert!(!detect_code(
        "Flame is a modular game engine built on top of Flutter. It provides a game loop."
    ));

    let fenced = "Example:\n```dart\nclass MyGame extends FlameGame {\n  @override\n  Future<void> onLoad() async {}\n}\n```";
    assert!(detect_code(fenced));

    // Small inline span inside long prose stays below both thresholds
    let prose = format!("{} Use `add` to attach.", "word ".repeat(100));
    assert!(!detect_code(&prose));

    // Short text that is mostly inline code
    assert!(detect_code("Call `game.pauseEngine()` now."));
}

#[test]
fn detect_code_counts_long_fences_in_long_documents() {
    let code = format!("```\n{}\n```", "x".repeat(120));
    let content = format!("{}\n{}", "prose ".repeat(200), code);
    assert!(detect_code(&content));
}

#[test]
fn title_falls_back_to_file_stem() {
    let headings = vec!["Game Widget".to_string()];
    assert_eq!(
        derive_title(&headings, Path::new("flame/game_widget.md")),
        "Game Widget"
    );
    assert_eq!(
        derive_title(&[], Path::new("flame/game_widget.md")),
        "Game Widget"
    );
    assert_eq!(
        derive_title(&[], Path::new("tutorials/step_1.md")),
        "Step 1"
    );
}

#[test]
fn doc_url_swaps_extension() {
    assert_eq!(
        doc_url("flame/game_widget.md"),
        "/flame/game_widget.html"
    );
    assert_eq!(doc_url("README"), "/README");
}

#[test]
fn chunk_ids_are_stable_and_distinct() {
    let a = chunk_id("flame/a.md", 0, "content");
    assert_eq!(a, chunk_id("flame/a.md", 0, "content"));
    assert_ne!(a, chunk_id("flame/a.md", 1, "content"));
    assert_ne!(a, chunk_id("flame/b.md", 0, "content"));

    // Only the first 100 characters take part
    let long_a = format!("{}tail one", "z".repeat(100));
    let long_b = format!("{}tail two", "z".repeat(100));
    assert_eq!(
        chunk_id("flame/a.md", 0, &long_a),
        chunk_id("flame/a.md", 0, &long_b)
    );
}

#[test]
fn build_chunks_attaches_metadata() {
    let content = "# Camera\nThe camera follows the player.\n## Viewport\nSet `viewport.size` to scale.";
    let config = ChunkingConfig {
        target_size: 100,
        overlap: 10,
        min_size: 1,
    };

    let chunks = build_chunks(
        &root().join("flame/camera.md"),
        &root(),
        "1.29.0",
        content,
        &config,
        &WhitespaceTokenizer,
    )
    .expect("builds chunks");

    assert_eq!(chunks.len(), 2);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.metadata.chunk_index, i);
        assert_eq!(chunk.metadata.title, "Camera");
        assert_eq!(chunk.metadata.heading_path, vec!["Camera", "Viewport"]);
        assert_eq!(chunk.metadata.section, "flame");
        assert_eq!(chunk.metadata.doc_url, "/flame/camera.html");
        assert_eq!(chunk.id, chunk_id("flame/camera.md", i, &chunk.content));
    }
    assert!(!chunks[0].metadata.has_code);
    assert!(chunks[1].metadata.has_code);

    let payload = chunks[1].payload().expect("payload");
    assert_eq!(payload["content_type"], "reference");
    assert_eq!(payload["content"], chunks[1].content.as_str());
    assert_eq!(payload["chunk_index"], 1);
}
