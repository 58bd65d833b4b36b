use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use morphscope_core::cache::{JsonDirStore, MemoryStore};
use morphscope_core::dataset::{MorphTechnique, PROBE_DIR, REFERENCE_DIR};
use morphscope_core::frs::default_frs;
use morphscope_core::{
    rates, ConfigError, Dataset, Embedding, EmbeddingCache, EmbeddingExtractor, ExtractionError,
    FrsConfig, Pipeline, PipelineError, PipelineOptions, PipelineStep,
};

/// Deterministic stand-in for the embedding service: the vector depends on
/// the leading numeric subject of the filename and the filename length.
struct FakeExtractor {
    calls: Rc<Cell<usize>>,
}

impl EmbeddingExtractor for FakeExtractor {
    fn extract(&mut self, image: &Path, _frs: &FrsConfig) -> Result<Embedding, ExtractionError> {
        self.calls.set(self.calls.get() + 1);
        let stem = image.file_stem().unwrap().to_string_lossy().into_owned();
        let subject: f64 = stem
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0.0);
        Ok(Embedding::new(vec![1.0, subject, stem.len() as f64 * 0.1]))
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "morphscope-it-{tag}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn touch(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    for name in names {
        fs::write(dir.join(name), b"img").unwrap();
    }
}

/// FERET-style tree: subjects 001 and 002 have three probes each, 003 only two.
fn build_feret(root: &Path) {
    let ds = root.join("FERET");
    touch(
        &ds.join(PROBE_DIR),
        &[
            "001_a.png", "001_b.png", "001_c.png", "002_a.png", "002_b.png", "002_c.png",
            "003_a.png", "003_b.png",
        ],
    );
    touch(&ds.join(REFERENCE_DIR), &["001_r.png", "002_r.png", "003_r.png"]);
    touch(
        &ds.join(MorphTechnique::FaceFusion.dir_name()),
        &["001_vs_002d03_fusion.png", "001_vs_003_x.png", "bogus.png"],
    );
    touch(&ds.join(MorphTechnique::FaceMorpher.dir_name()), &["002_vs_001.png"]);
    touch(&ds.join(MorphTechnique::OpenCv.dir_name()), &[]);
    touch(&ds.join(MorphTechnique::Ubo.dir_name()), &[]);
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn fields(line: &str) -> Vec<&str> {
    line.split('\t').collect()
}

#[test]
fn full_run_writes_all_score_files() {
    let root = scratch_dir("full");
    build_feret(&root.join("in"));
    let out = root.join("out");

    let calls = Rc::new(Cell::new(0));
    let cache = EmbeddingCache::new(
        MemoryStore::default(),
        FakeExtractor {
            calls: calls.clone(),
        },
    );
    let mut pipeline =
        Pipeline::new(PipelineOptions::new(root.join("in"), &out), default_frs(), cache).unwrap();
    let outcomes = pipeline.run().unwrap();

    assert_eq!(outcomes.len(), 1);
    let (dataset, outcome) = &outcomes[0];
    assert_eq!(*dataset, Dataset::Feret);
    let report = outcome.as_ref().unwrap();
    assert!(!report.gated);
    assert_eq!(report.analysis.total_identifiers, 3);
    assert_eq!(report.analysis.filtered_identifiers, 2);
    assert_eq!(report.analysis.filtered_out_percentage, 0.33);
    assert_eq!(report.passes.len(), 3);

    for frs in default_frs() {
        let morph = read_lines(&out.join(format!("FERET_{}_dissimilarity_scores.txt", frs.name)));
        assert_eq!(morph.len(), 4, "{morph:?}");
        let first = fields(&morph[0]);
        assert_eq!(&first[..2], &["M0001", "S1"]);
        assert_eq!(first.len(), 2 + 3);
        assert!(first[2].split('.').nth(1).unwrap().len() == 6);
        assert_eq!(&fields(&morph[1])[..2], &["M0001", "S2"]);
        assert_eq!(&fields(&morph[2])[..2], &["M0002", "S1"]);
        assert_eq!(&fields(&morph[3])[..2], &["M0002", "S2"]);

        let mated = read_lines(&out.join(format!("FERET_{}_mated_scores.txt", frs.name)));
        assert_eq!(mated.len(), 6);
        assert!(mated
            .iter()
            .all(|l| matches!(fields(l)[0], "001" | "002") && fields(l).len() == 2));

        let non_mated = read_lines(&out.join(format!("FERET_{}_non_mated_scores.txt", frs.name)));
        assert_eq!(non_mated.len(), 6);
        for line in &non_mated {
            let f = fields(line);
            assert_eq!(f.len(), 3);
            assert_ne!(f[0], f[1]);
            assert!(f[0] != "003" && f[1] != "003");
        }
    }

    // 6 valid probes + 2 valid references + 2 retained morphs, per FRS.
    assert_eq!(calls.get(), 20);
    assert_eq!(pipeline.cache().stats().extractions, 20);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn persisted_cache_avoids_recomputation() {
    let root = scratch_dir("persist");
    build_feret(&root.join("in"));
    let out = root.join("out");
    let frs = vec![FrsConfig::new("ArcFace+yunet", "ArcFace", "yunet")];

    let calls = Rc::new(Cell::new(0));
    for _ in 0..2 {
        let cache = EmbeddingCache::new(
            JsonDirStore::new(root.join("cache")),
            FakeExtractor {
                calls: calls.clone(),
            },
        );
        let mut pipeline =
            Pipeline::new(PipelineOptions::new(root.join("in"), &out), frs.clone(), cache).unwrap();
        for (_, outcome) in pipeline.run().unwrap() {
            outcome.unwrap();
        }
    }

    assert_eq!(calls.get(), 10);
    assert!(root
        .join("cache")
        .join("001_a_ArcFace_yunet_embeddings.json")
        .exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn generated_scores_feed_match_rates() {
    let root = scratch_dir("rates");
    build_feret(&root.join("in"));
    let out = root.join("out");
    let frs = vec![FrsConfig::new("ArcFace+yunet", "ArcFace", "yunet")];

    let cache = EmbeddingCache::new(
        MemoryStore::default(),
        FakeExtractor {
            calls: Rc::new(Cell::new(0)),
        },
    );
    let mut options = PipelineOptions::new(root.join("in"), &out);
    options.steps = vec![PipelineStep::NonMatedScores, PipelineStep::MatedScores];
    let mut pipeline = Pipeline::new(options, frs, cache).unwrap();
    let report = pipeline.run_dataset(Dataset::Feret).unwrap();
    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.passes[0].0, PipelineStep::MatedScores);
    assert!(!out.join("FERET_ArcFace+yunet_dissimilarity_scores.txt").exists());

    let result = rates::compute(
        &out.join("FERET_ArcFace+yunet_mated_scores.txt"),
        &out.join("FERET_ArcFace+yunet_non_mated_scores.txt"),
        2.0,
    )
    .unwrap();
    // Cosine distances never exceed 2.
    assert_eq!(result.mmpmr, 1.0);
    assert_eq!(result.fnmr, 0.0);
    assert_eq!(result.rmmr, 1.0);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn valid_subject_without_reference_is_integrity_error() {
    let root = scratch_dir("integrity");
    build_feret(&root.join("in"));
    fs::remove_file(root.join("in/FERET").join(REFERENCE_DIR).join("002_r.png")).unwrap();

    let cache = EmbeddingCache::new(
        MemoryStore::default(),
        FakeExtractor {
            calls: Rc::new(Cell::new(0)),
        },
    );
    let mut options = PipelineOptions::new(root.join("in"), root.join("out"));
    options.steps = vec![PipelineStep::MatedScores];
    let mut pipeline = Pipeline::new(options, default_frs(), cache).unwrap();

    let err = pipeline.run_dataset(Dataset::Feret).unwrap_err();
    match err {
        PipelineError::DataIntegrity { subject, .. } => assert_eq!(subject, "002"),
        other => panic!("unexpected error: {other}"),
    }

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn gate_skips_scoring_when_too_many_filtered() {
    let root = scratch_dir("gate");
    let ds = root.join("in/FRGC");
    // Five subjects, only one with three probes: 80% filtered out.
    touch(
        &ds.join(PROBE_DIR),
        &[
            "04200d1.jpg", "04200d2.jpg", "04200d3.jpg", "04201d1.jpg", "04202d1.jpg",
            "04203d1.jpg", "04204d1.jpg",
        ],
    );
    touch(&ds.join(REFERENCE_DIR), &["04200d9.jpg"]);
    for t in MorphTechnique::ALL {
        touch(&ds.join(t.dir_name()), &[]);
    }

    let cache = EmbeddingCache::new(
        MemoryStore::default(),
        FakeExtractor {
            calls: Rc::new(Cell::new(0)),
        },
    );
    let out = root.join("out");
    let mut pipeline =
        Pipeline::new(PipelineOptions::new(root.join("in"), &out), default_frs(), cache).unwrap();
    let report = pipeline.run_dataset(Dataset::Frgc).unwrap();

    assert!(report.gated);
    assert_eq!(report.analysis.filtered_out_percentage, 0.8);
    assert!(report.passes.is_empty());
    assert_eq!(fs::read_dir(&out).unwrap().count(), 0);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_subdirectory_aborts_dataset() {
    let root = scratch_dir("layout");
    build_feret(&root.join("in"));
    fs::remove_dir_all(root.join("in/FERET").join(MorphTechnique::Ubo.dir_name())).unwrap();

    let cache = EmbeddingCache::new(
        MemoryStore::default(),
        FakeExtractor {
            calls: Rc::new(Cell::new(0)),
        },
    );
    let mut pipeline = Pipeline::new(
        PipelineOptions::new(root.join("in"), root.join("out")),
        default_frs(),
        cache,
    )
    .unwrap();

    let outcomes = pipeline.run().unwrap();
    assert!(matches!(
        outcomes[0].1,
        Err(PipelineError::Configuration(ConfigError::MissingSubdirectory { .. }))
    ));

    let _ = fs::remove_dir_all(&root);
}

/// Delegates to [`FakeExtractor`] until the `fail_on`-th call, which fails.
struct FailingExtractor {
    inner: FakeExtractor,
    fail_on: usize,
}

impl EmbeddingExtractor for FailingExtractor {
    fn extract(&mut self, image: &Path, frs: &FrsConfig) -> Result<Embedding, ExtractionError> {
        if self.inner.calls.get() + 1 == self.fail_on {
            self.inner.calls.set(self.fail_on);
            return Err(ExtractionError::Other(format!(
                "no face detected in {}",
                image.display()
            )));
        }
        self.inner.extract(image, frs)
    }
}

#[test]
fn extraction_failure_keeps_completed_records() {
    let root = scratch_dir("failure");
    build_feret(&root.join("in"));
    let out = root.join("out");
    let frs = vec![FrsConfig::new("ArcFace+yunet", "ArcFace", "yunet")];

    // Mated order: 001_r, 001_a..c (3 records), 002_r, 002_a (1 record), then 002_b fails.
    let cache = EmbeddingCache::new(
        MemoryStore::default(),
        FailingExtractor {
            inner: FakeExtractor {
                calls: Rc::new(Cell::new(0)),
            },
            fail_on: 7,
        },
    );
    let mut options = PipelineOptions::new(root.join("in"), &out);
    options.steps = vec![PipelineStep::MatedScores];
    let mut pipeline = Pipeline::new(options, frs, cache).unwrap();

    let err = pipeline.run_dataset(Dataset::Feret).unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(ExtractionError::Other(_))), "{err}");

    let path = out.join("FERET_ArcFace+yunet_mated_scores.txt");
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.ends_with('\n'));
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 4);
    for line in &lines {
        let f = fields(line);
        assert_eq!(f.len(), 2, "{line}");
        assert!(f[1].parse::<f64>().unwrap().is_finite());
    }
    assert_eq!(rates::read_scores(&path).unwrap().len(), 4);

    let _ = fs::remove_dir_all(&root);
}
