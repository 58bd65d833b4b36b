use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{ConfigError, PipelineError};
use crate::subject::NamingConvention;

pub const PROBE_DIR: &str = "bonafide_probe";
pub const REFERENCE_DIR: &str = "bonafide_reference";

/// Supported datasets. The directory name under the input root must match
/// [`Dataset::name`] exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dataset {
    Frgc,
    Feret,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Frgc, Dataset::Feret];

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Frgc => "FRGC",
            Dataset::Feret => "FERET",
        }
    }

    pub fn naming_convention(&self) -> NamingConvention {
        match self {
            Dataset::Frgc => NamingConvention::FixedPrefix {
                len: 5,
                separator: '.',
            },
            Dataset::Feret => NamingConvention::DelimiterSplit { separator: '_' },
        }
    }

    /// Datasets that have a top-level directory under `input_root`.
    pub fn discover(input_root: &Path) -> Result<Vec<Dataset>, ConfigError> {
        if !input_root.is_dir() {
            return Err(ConfigError::MissingInput(input_root.to_path_buf()));
        }
        let found: Vec<Dataset> = Self::ALL
            .into_iter()
            .filter(|d| input_root.join(d.name()).is_dir())
            .collect();
        if found.is_empty() {
            return Err(ConfigError::NoDataset(input_root.to_path_buf()));
        }
        Ok(found)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Dataset {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| ConfigError::UnknownDataset(s.to_string()))
    }
}

/// Morphing tools whose output lives in a `morphs_*` subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphTechnique {
    FaceFusion,
    FaceMorpher,
    OpenCv,
    Ubo,
}

impl MorphTechnique {
    /// Enumeration order; morph identifiers are assigned in this order.
    pub const ALL: [MorphTechnique; 4] = [
        MorphTechnique::FaceFusion,
        MorphTechnique::FaceMorpher,
        MorphTechnique::OpenCv,
        MorphTechnique::Ubo,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            MorphTechnique::FaceFusion => "morphs_facefusion",
            MorphTechnique::FaceMorpher => "morphs_facemorpher",
            MorphTechnique::OpenCv => "morphs_opencv",
            MorphTechnique::Ubo => "morphs_ubo",
        }
    }
}

/// Validated directory structure of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub dataset: Dataset,
    pub root: PathBuf,
    pub probe_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub morph_dirs: Vec<(MorphTechnique, PathBuf)>,
}

impl DatasetLayout {
    /// Check that every required subdirectory exists under
    /// `<input_root>/<DATASET>/`.
    pub fn open(input_root: &Path, dataset: Dataset) -> Result<Self, ConfigError> {
        let root = input_root.join(dataset.name());
        let probe_dir = require_subdir(&root, PROBE_DIR)?;
        let reference_dir = require_subdir(&root, REFERENCE_DIR)?;
        let morph_dirs = MorphTechnique::ALL
            .into_iter()
            .map(|t| require_subdir(&root, t.dir_name()).map(|p| (t, p)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dataset,
            root,
            probe_dir,
            reference_dir,
            morph_dirs,
        })
    }

    pub fn probe_files(&self) -> Result<Vec<String>, PipelineError> {
        list_files(&self.probe_dir)
    }

    pub fn reference_files(&self) -> Result<Vec<String>, PipelineError> {
        list_files(&self.reference_dir)
    }
}

fn require_subdir(root: &Path, subdir: &'static str) -> Result<PathBuf, ConfigError> {
    let path = root.join(subdir);
    if !path.is_dir() {
        return Err(ConfigError::MissingSubdirectory { path, subdir });
    }
    Ok(path)
}

/// Regular files directly inside `dir`, sorted lexicographically by name.
pub fn list_files(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            PipelineError::io(dir, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "morphscope-dataset-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn make_layout(root: &Path, dataset: &str, skip: Option<&str>) {
        let mut dirs = vec![PROBE_DIR, REFERENCE_DIR];
        dirs.extend(MorphTechnique::ALL.iter().map(|t| t.dir_name()));
        for d in dirs {
            if Some(d) == skip {
                continue;
            }
            fs::create_dir_all(root.join(dataset).join(d)).unwrap();
        }
    }

    #[test]
    fn parses_dataset_names_exactly() {
        assert_eq!("FRGC".parse::<Dataset>().unwrap(), Dataset::Frgc);
        assert_eq!("FERET".parse::<Dataset>().unwrap(), Dataset::Feret);
        let err = "frgc".parse::<Dataset>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDataset(_)));
    }

    #[test]
    fn open_accepts_complete_layout() {
        let root = scratch_dir("complete");
        make_layout(&root, "FERET", None);

        let layout = DatasetLayout::open(&root, Dataset::Feret).unwrap();
        assert_eq!(layout.morph_dirs.len(), 4);
        assert!(layout.probe_dir.ends_with("FERET/bonafide_probe"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn open_reports_missing_subdirectory() {
        let root = scratch_dir("missing");
        make_layout(&root, "FRGC", Some("morphs_ubo"));

        let err = DatasetLayout::open(&root, Dataset::Frgc).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingSubdirectory {
                subdir: "morphs_ubo",
                ..
            }
        ));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn discover_requires_a_dataset() {
        let root = scratch_dir("discover");
        fs::create_dir_all(root.join("OTHER")).unwrap();
        assert!(matches!(
            Dataset::discover(&root).unwrap_err(),
            ConfigError::NoDataset(_)
        ));

        fs::create_dir_all(root.join("FERET")).unwrap();
        assert_eq!(Dataset::discover(&root).unwrap(), vec![Dataset::Feret]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn list_files_is_sorted_and_skips_dirs() {
        let dir = scratch_dir("list");
        fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["b.png", "c.png", "a.png"] {
            fs::write(dir.join(name), b"x").unwrap();
        }

        let names = list_files(&dir).unwrap();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);

        let _ = fs::remove_dir_all(&dir);
    }
}
