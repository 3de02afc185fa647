use super::*;
use crate::DocsError;
use crate::database::{CollectionInfo, MemoryStore, Point, ScoredPoint, SearchParams};
use crate::embeddings::{EmbedError, WhitespaceTokenizer};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[derive(Default)]
struct CountingEmbedder {
    calls: AtomicUsize,
}

impl Embedder for CountingEmbedder {
    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|text| text.contains("EMBED_FAILURE")) {
            return Err(EmbedError::Fatal("HTTP 400: rejected input".to_string()));
        }
        Ok(texts
            .iter()
            .map(|text| vec![1.0, (text.len() % 7) as f32 + 1.0])
            .collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Returns one vector fewer than requested
struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    upserts: AtomicUsize,
    creates: AtomicUsize,
}

impl VectorStore for CountingStore {
    fn try_get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.inner.try_get_collection(name)
    }

    fn create_collection(&self, name: &str, params: &CollectionParams) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(name, params)
    }

    fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(name, points)
    }

    fn search(&self, name: &str, params: &SearchParams) -> Result<Vec<ScoredPoint>> {
        self.inner.search(name, params)
    }
}

struct Fixture {
    temp_dir: TempDir,
    embedder: Arc<CountingEmbedder>,
    store: Arc<CountingStore>,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::create_dir_all(temp_dir.path().join("docs/flame")).expect("mkdir");
        fs::create_dir_all(temp_dir.path().join("docs/tutorials/platformer")).expect("mkdir");
        Self {
            temp_dir,
            embedder: Arc::new(CountingEmbedder::default()),
            store: Arc::new(CountingStore::default()),
        }
    }

    fn source_dir(&self) -> PathBuf {
        self.temp_dir.path().join("docs")
    }

    fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.source_dir().join(relative);
        fs::write(&path, content).expect("write doc");
        path
    }

    fn config(&self) -> IndexerConfig {
        IndexerConfig {
            source_dir: self.source_dir(),
            version: "1.29.0".to_string(),
            collection: "flame_docs".to_string(),
            chunking: ChunkingConfig {
                target_size: 50,
                overlap: 5,
                min_size: 3,
            },
            state_file: self.temp_dir.path().join("processing_state.json"),
            error_file: self.temp_dir.path().join("processing_errors.json"),
            save_interval: 10,
            dimension: 2,
            show_progress: false,
        }
    }

    fn indexer(&self) -> Indexer {
        Indexer::new(
            Arc::clone(&self.embedder) as Arc<dyn Embedder>,
            Arc::clone(&self.store) as Arc<dyn VectorStore>,
            Arc::new(WhitespaceTokenizer),
            self.config(),
        )
    }

    fn write_sample_docs(&self) {
        self.write(
            "flame/game.md",
            "# Game\nThe FlameGame class is the root of a game.\n## Lifecycle\nonLoad runs once.",
        );
        self.write(
            "tutorials/platformer/step_1.md",
            "# Step 1\nCreate the project and add the flame dependency.",
        );
        self.write("index.md", "# Flame\nWelcome to the documentation.");
    }
}

#[test]
fn ensure_collection_creates_once() {
    let fixture = Fixture::new();
    let indexer = fixture.indexer();

    assert!(indexer.ensure_collection().expect("first call"));
    assert!(!indexer.ensure_collection().expect("second call"));
    assert_eq!(fixture.store.creates.load(Ordering::SeqCst), 1);
    assert_eq!(
        fixture
            .store
            .try_get_collection("flame_docs")
            .expect("lookup")
            .and_then(|info| info.vector_size),
        Some(2)
    );
}

#[test]
fn discovers_markdown_recursively_in_order() {
    let fixture = Fixture::new();
    fixture.write_sample_docs();
    fixture.write("flame/notes.txt", "not markdown");
    fixture.write("flame/UPPER.MD", "# Upper");

    let files = fixture.indexer().discover_files().expect("walks");
    let keys: Vec<String> = files
        .iter()
        .map(|path| fixture.indexer().document_key(path))
        .collect();
    assert_eq!(
        keys,
        vec![
            "flame/UPPER.MD",
            "flame/game.md",
            "index.md",
            "tutorials/platformer/step_1.md",
        ]
    );
}

#[test]
fn run_processes_and_records_every_file() {
    let fixture = Fixture::new();
    fixture.write_sample_docs();
    let indexer = fixture.indexer();

    let mut state = ProcessingState::default();
    let report = indexer.run(&mut state).expect("run");

    assert_eq!(report.files_found, 3);
    assert_eq!(report.files_pending, 3);
    assert_eq!(report.successful, 3);
    assert_eq!(report.failed, 0);
    assert!(report.errors.is_empty());

    assert!(state.is_processed("flame/game.md"));
    assert!(state.is_processed("tutorials/platformer/step_1.md"));
    assert!(state.is_processed("index.md"));
    assert_eq!(state.chunks_created, report.chunks_created as u64);
    assert_eq!(
        fixture.store.inner.point_count("flame_docs"),
        Some(report.chunks_created)
    );

    // One embed call and one upsert per file
    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(fixture.store.upserts.load(Ordering::SeqCst), 3);

    let saved = ProcessingState::load(&fixture.config().state_file).expect("saved state");
    assert_eq!(saved, state);
    assert!(!fixture.config().error_file.exists());
}

/// Records how many files the saved state holds each time it is called
struct StateSnapshotEmbedder {
    state_file: PathBuf,
    snapshots: std::sync::Mutex<Vec<usize>>,
}

impl Embedder for StateSnapshotEmbedder {
    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        let saved = ProcessingState::load(&self.state_file)
            .map(|state| state.processed_files.len())
            .unwrap_or_default();
        self.snapshots
            .lock()
            .map_err(|_| EmbedError::Fatal("poisoned".to_string()))?
            .push(saved);
        Ok(texts.iter().map(|_| vec![1.0, 0.5]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

#[test]
fn state_is_saved_every_interval_during_the_run() {
    let fixture = Fixture::new();
    for name in ["a", "b", "c", "d", "e"] {
        fixture.write(&format!("flame/{}.md", name), "# Page
Some documentation text.");
    }
    let config = IndexerConfig {
        save_interval: 2,
        ..fixture.config()
    };
    let embedder = Arc::new(StateSnapshotEmbedder {
        state_file: config.state_file.clone(),
        snapshots: std::sync::Mutex::new(Vec::new()),
    });
    let indexer = Indexer::new(
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        Arc::clone(&fixture.store) as Arc<dyn VectorStore>,
        Arc::new(WhitespaceTokenizer),
        config.clone(),
    );

    let mut state = ProcessingState::default();
    let report = indexer.run(&mut state).expect("run");
    assert_eq!(report.successful, 5);

    // Before each file, only completed multiples of the interval are on disk
    let snapshots = embedder.snapshots.lock().expect("lock").clone();
    assert_eq!(snapshots, vec![0, 0, 2, 2, 4]);

    let saved = ProcessingState::load(&config.state_file).expect("saved state");
    assert_eq!(saved.processed_files.len(), 5);
}

#[test]
fn second_run_does_no_work() {
    let fixture = Fixture::new();
    fixture.write_sample_docs();
    let indexer = fixture.indexer();

    let mut state = ProcessingState::default();
    indexer.run(&mut state).expect("first run");
    let embeds = fixture.embedder.calls.load(Ordering::SeqCst);
    let upserts = fixture.store.upserts.load(Ordering::SeqCst);

    let mut reloaded = ProcessingState::load(&fixture.config().state_file).expect("load");
    let before = reloaded.clone();
    let report = indexer.run(&mut reloaded).expect("second run");

    assert_eq!(report.files_found, 3);
    assert_eq!(report.files_pending, 0);
    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), embeds);
    assert_eq!(fixture.store.upserts.load(Ordering::SeqCst), upserts);
    assert_eq!(reloaded, before);
}

#[test]
fn failing_file_is_isolated() {
    let fixture = Fixture::new();
    fixture.write_sample_docs();
    fixture.write("flame/broken.md", "# Broken\nEMBED_FAILURE in this file.");
    let indexer = fixture.indexer();

    let mut state = ProcessingState::default();
    let report = indexer.run(&mut state).expect("run continues past failures");

    assert_eq!(report.successful, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].file.ends_with("broken.md"));
    assert!(report.errors[0].error.contains("rejected input"));
    assert!(!state.is_processed("flame/broken.md"));

    let written = state::load_errors(&fixture.config().error_file).expect("error file");
    assert_eq!(written, report.errors);

    // The failed file is retried on the next run
    let report = indexer.run(&mut state).expect("rerun");
    assert_eq!(report.files_pending, 1);
    assert_eq!(report.failed, 1);
}

#[test]
fn count_mismatch_is_a_validation_error() {
    let fixture = Fixture::new();
    let path = fixture.write("flame/game.md", "# Game\nSome text about games.");
    let store = Arc::new(MemoryStore::new());
    let indexer = Indexer::new(
        Arc::new(ShortEmbedder),
        Arc::clone(&store) as Arc<dyn VectorStore>,
        Arc::new(WhitespaceTokenizer),
        fixture.config(),
    );
    indexer.ensure_collection().expect("collection");

    let result = indexer.process_file(&path, &ProcessingState::default());
    assert!(matches!(result, Err(DocsError::Validation(_))));
    assert_eq!(store.point_count("flame_docs"), Some(0));
}

#[test]
fn blank_and_processed_files_are_not_embedded() {
    let fixture = Fixture::new();
    let blank = fixture.write("flame/blank.md", "   \n\n ");
    let done = fixture.write("flame/done.md", "# Done\nAlready indexed.");
    let indexer = fixture.indexer();

    let mut state = ProcessingState::default();
    state.record_processed("flame/done.md", 1);

    assert_eq!(
        indexer.process_file(&blank, &state).expect("blank"),
        FileOutcome::Empty
    );
    assert_eq!(
        indexer.process_file(&done, &state).expect("done"),
        FileOutcome::Skipped
    );
    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_source_directory_is_an_empty_run() {
    let fixture = Fixture::new();
    let mut state = ProcessingState::default();
    let report = fixture.indexer().run(&mut state).expect("run");

    assert_eq!(report, RunReport::default());
    assert!(state.processed_files.is_empty());
}

#[test]
fn chunks_carry_version_and_relative_metadata() {
    let fixture = Fixture::new();
    fixture.write_sample_docs();
    let indexer = fixture.indexer();
    indexer.run(&mut ProcessingState::default()).expect("run");

    let hits = fixture
        .store
        .search(
            "flame_docs",
            &SearchParams {
                vector: vec![1.0, 1.0],
                filter: Some(crate::database::Filter::version("1.29.0")),
                limit: 100,
                score_threshold: None,
            },
        )
        .expect("search");
    assert!(!hits.is_empty());
    assert!(hits.iter().any(|hit| {
        hit.payload["file_path"] == "tutorials/platformer/step_1.md"
            && hit.payload["content_type"] == "tutorial"
            && hit.payload["section"] == "tutorials"
    }));
    assert!(
        hits.iter()
            .any(|hit| hit.payload["file_path"] == "index.md" && hit.payload["section"] == "unknown")
    );
}
