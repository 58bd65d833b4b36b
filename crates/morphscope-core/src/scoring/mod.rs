//! Pairing and scoring engine.
//!
//! Produces, per dataset and FRS configuration, three tab-separated score
//! files: morph-vs-probe dissimilarities, mated (genuine) scores and
//! non-mated (impostor) scores. Every record references only subjects in the
//! valid set computed when the engine is built.

mod record;

pub use record::{morph_id, ScoreCategory, ScoreRecord, ScoreWriters, SubjectSlot};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::cache::{Embedding, EmbeddingCache, EmbeddingStore, LookupError};
use crate::dataset::{list_files, DatasetLayout};
use crate::error::PipelineError;
use crate::extractor::EmbeddingExtractor;
use crate::frs::FrsConfig;
use crate::similarity::cosine_dissimilarity;
use crate::subject::{count_subjects, filter_valid, parse_morph_name, NamingConvention, SubjectId};

impl From<LookupError> for PipelineError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::Cache(e) => PipelineError::Cache(e),
            LookupError::Extraction(e) => PipelineError::Extraction(e),
        }
    }
}

/// Outcome of one scoring pass.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub records: usize,
    pub skipped: usize,
    pub outputs: Vec<PathBuf>,
}

/// Bona fide images of one dataset grouped by subject, plus the valid set.
#[derive(Debug, Clone)]
pub struct SubjectImages {
    pub valid: BTreeSet<SubjectId>,
    probe_dir: PathBuf,
    probe_files: Vec<String>,
    probes: BTreeMap<SubjectId, Vec<PathBuf>>,
    references: BTreeMap<SubjectId, Vec<PathBuf>>,
}

impl SubjectImages {
    pub fn load(layout: &DatasetLayout, min_count: usize) -> Result<Self, PipelineError> {
        let convention = layout.dataset.naming_convention();
        let probe_files = layout.probe_files()?;
        let reference_files = layout.reference_files()?;

        let valid = filter_valid(&count_subjects(&probe_files, convention), min_count);

        let probes = group_by_subject(&probe_files, &layout.probe_dir, convention, &valid);
        let references =
            group_by_subject(&reference_files, &layout.reference_dir, convention, &valid);

        tracing::info!(
            dataset = %layout.dataset,
            valid_subjects = valid.len(),
            probes = probe_files.len(),
            references = reference_files.len(),
            "subjects resolved"
        );

        Ok(Self {
            valid,
            probe_dir: layout.probe_dir.clone(),
            probe_files,
            probes,
            references,
        })
    }

    /// Every probe whose filename starts with the subject identifier.
    pub fn probes_with_prefix(&self, subject: &SubjectId) -> Vec<PathBuf> {
        self.probe_files
            .iter()
            .filter(|name| name.starts_with(subject.as_str()))
            .map(|name| self.probe_dir.join(name))
            .collect()
    }

    pub fn probes_of(&self, subject: &SubjectId) -> Result<&[PathBuf], PipelineError> {
        images_of(&self.probes, subject, "probe")
    }

    pub fn references_of(&self, subject: &SubjectId) -> Result<&[PathBuf], PipelineError> {
        images_of(&self.references, subject, "reference")
    }

    /// Fail if any valid subject lacks probe or reference images.
    pub fn check_integrity(&self) -> Result<(), PipelineError> {
        for subject in &self.valid {
            self.probes_of(subject)?;
            self.references_of(subject)?;
        }
        Ok(())
    }
}

fn group_by_subject(
    files: &[String],
    dir: &Path,
    convention: NamingConvention,
    valid: &BTreeSet<SubjectId>,
) -> BTreeMap<SubjectId, Vec<PathBuf>> {
    let mut map: BTreeMap<SubjectId, Vec<PathBuf>> = BTreeMap::new();
    for name in files {
        let subject = convention.resolve(name);
        if valid.contains(&subject) {
            map.entry(subject).or_default().push(dir.join(name));
        }
    }
    map
}

fn images_of<'a>(
    map: &'a BTreeMap<SubjectId, Vec<PathBuf>>,
    subject: &SubjectId,
    role: &str,
) -> Result<&'a [PathBuf], PipelineError> {
    match map.get(subject) {
        Some(images) if !images.is_empty() => Ok(images),
        _ => Err(PipelineError::DataIntegrity {
            subject: subject.to_string(),
            detail: format!("valid subject has no bona fide {role} images"),
        }),
    }
}

/// Ordered (probe subject, reference subject) pairs of distinct subjects.
pub fn non_mated_pairs(
    valid: &BTreeSet<SubjectId>,
) -> impl Iterator<Item = (&SubjectId, &SubjectId)> {
    valid
        .iter()
        .flat_map(move |p| valid.iter().map(move |r| (p, r)))
        .filter(|(p, r)| p != r)
}

pub struct ScoringEngine<'a, S, E> {
    layout: &'a DatasetLayout,
    frs: &'a [FrsConfig],
    output_dir: &'a Path,
    cache: &'a mut EmbeddingCache<S, E>,
    subjects: SubjectImages,
}

impl<'a, S: EmbeddingStore, E: EmbeddingExtractor> ScoringEngine<'a, S, E> {
    /// Resolve subjects for the dataset. Validity is recomputed on every call.
    pub fn new(
        layout: &'a DatasetLayout,
        frs: &'a [FrsConfig],
        output_dir: &'a Path,
        cache: &'a mut EmbeddingCache<S, E>,
        min_count: usize,
    ) -> Result<Self, PipelineError> {
        let subjects = SubjectImages::load(layout, min_count)?;
        Ok(Self {
            layout,
            frs,
            output_dir,
            cache,
            subjects,
        })
    }

    pub fn subjects(&self) -> &SubjectImages {
        &self.subjects
    }

    /// Score every retained morph against all probes of both constituent
    /// subjects. Morphs are enumerated technique by technique in sorted
    /// filename order; identifiers are assigned in that order.
    pub fn score_morphs(&mut self) -> Result<PassSummary, PipelineError> {
        let layout = self.layout;
        let dataset = layout.dataset;
        let frs = self.frs;
        let mut writers =
            ScoreWriters::create(self.output_dir, dataset, frs, ScoreCategory::Dissimilarity)?;
        let mut next_id = 1;
        let mut skipped = 0;

        for (technique, dir) in &layout.morph_dirs {
            let morph_files = list_files(dir)?;
            tracing::info!(
                dataset = %dataset,
                technique = technique.dir_name(),
                morphs = morph_files.len(),
                "scoring morphs"
            );

            for morph_file in morph_files {
                let Some(pair) = parse_morph_name(&morph_file) else {
                    tracing::warn!(morph = %morph_file, "skipping morph: no subject pair in filename");
                    skipped += 1;
                    continue;
                };
                if let Some(missing) = [&pair.first, &pair.second]
                    .into_iter()
                    .find(|s| !self.subjects.valid.contains(*s))
                {
                    tracing::warn!(
                        morph = %morph_file,
                        subject = %missing,
                        "skipping morph: insufficient probe images for subject"
                    );
                    skipped += 1;
                    continue;
                }

                let id = morph_id(next_id);
                next_id += 1;
                let morph_path = dir.join(&morph_file);
                tracing::debug!(morph = %morph_file, morph_id = %id, s1 = %pair.first, s2 = %pair.second, "processing morph");

                for (slot, subject) in [(SubjectSlot::S1, &pair.first), (SubjectSlot::S2, &pair.second)] {
                    let probes = self.subjects.probes_with_prefix(subject);
                    if probes.is_empty() {
                        return Err(PipelineError::DataIntegrity {
                            subject: subject.to_string(),
                            detail: format!("no probe images found for morph {morph_file}"),
                        });
                    }

                    for (i, config) in frs.iter().enumerate() {
                        let morph_emb = self.embedding(&morph_path, config)?;
                        let mut scores = Vec::with_capacity(probes.len());
                        for probe in &probes {
                            let probe_emb = self.embedding(probe, config)?;
                            scores.push(cosine_dissimilarity(&probe_emb, &morph_emb)?);
                        }
                        writers.append(
                            i,
                            &ScoreRecord::Morph {
                                morph_id: id.clone(),
                                slot,
                                scores,
                            },
                        )?;
                    }
                }
            }
        }

        self.finish("dissimilarity", writers, skipped)
    }

    /// Every reference of each valid subject against every probe of the
    /// same subject.
    pub fn score_mated(&mut self) -> Result<PassSummary, PipelineError> {
        self.subjects.check_integrity()?;
        let frs = self.frs;
        let mut writers =
            ScoreWriters::create(self.output_dir, self.layout.dataset, frs, ScoreCategory::Mated)?;

        let subjects = &self.subjects;
        let cache = &mut *self.cache;
        for subject in &subjects.valid {
            let references = subjects.references_of(subject)?;
            let probes = subjects.probes_of(subject)?;
            for (i, config) in frs.iter().enumerate() {
                for reference in references {
                    let ref_emb = lookup(cache, reference, config)?;
                    for probe in probes {
                        let probe_emb = lookup(cache, probe, config)?;
                        let score = cosine_dissimilarity(&ref_emb, &probe_emb)?;
                        writers.append(
                            i,
                            &ScoreRecord::Mated {
                                subject: subject.clone(),
                                score,
                            },
                        )?;
                    }
                }
            }
        }

        self.finish("mated", writers, 0)
    }

    /// Every reference of one subject against every probe of each other
    /// subject. Same-subject pairs are never scored here.
    pub fn score_non_mated(&mut self) -> Result<PassSummary, PipelineError> {
        self.subjects.check_integrity()?;
        let frs = self.frs;
        let mut writers = ScoreWriters::create(
            self.output_dir,
            self.layout.dataset,
            frs,
            ScoreCategory::NonMated,
        )?;

        let subjects = &self.subjects;
        let cache = &mut *self.cache;
        for (probe_subject, reference_subject) in non_mated_pairs(&subjects.valid) {
            let references = subjects.references_of(reference_subject)?;
            let probes = subjects.probes_of(probe_subject)?;
            for (i, config) in frs.iter().enumerate() {
                for reference in references {
                    let ref_emb = lookup(cache, reference, config)?;
                    for probe in probes {
                        let probe_emb = lookup(cache, probe, config)?;
                        let score = cosine_dissimilarity(&ref_emb, &probe_emb)?;
                        writers.append(
                            i,
                            &ScoreRecord::NonMated {
                                probe_subject: probe_subject.clone(),
                                reference_subject: reference_subject.clone(),
                                score,
                            },
                        )?;
                    }
                }
            }
        }

        self.finish("non-mated", writers, 0)
    }

    fn embedding(&mut self, image: &Path, frs: &FrsConfig) -> Result<Embedding, PipelineError> {
        lookup(self.cache, image, frs)
    }

    fn finish(
        &self,
        pass: &'static str,
        writers: ScoreWriters,
        skipped: usize,
    ) -> Result<PassSummary, PipelineError> {
        let stats = self.cache.stats();
        let summary = PassSummary {
            records: writers.records_written(),
            skipped,
            outputs: writers.paths(),
        };
        tracing::info!(
            dataset = %self.layout.dataset,
            pass,
            records = summary.records,
            skipped,
            extractions = stats.extractions,
            store_hits = stats.store_hits,
            memo_hits = stats.memo_hits,
            "scoring pass complete"
        );
        Ok(summary)
    }
}

fn lookup<S: EmbeddingStore, E: EmbeddingExtractor>(
    cache: &mut EmbeddingCache<S, E>,
    image: &Path,
    frs: &FrsConfig,
) -> Result<Embedding, PipelineError> {
    cache.embedding(image, frs).map_err(PipelineError::from)
}
