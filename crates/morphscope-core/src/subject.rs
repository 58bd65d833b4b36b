//! Subject identifiers and the filename conventions that produce them.
//!
//! A convention is a pure `filename -> SubjectId` mapping selected per
//! dataset. Validity is always `count >= min_count`; every call site in the
//! crate goes through [`is_valid_count`] so the comparison cannot drift.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Default minimum number of probe images for a subject to be scored.
pub const DEFAULT_MIN_PROBES: usize = 3;

/// Marker joining the two subject identifiers in a morph filename.
pub const MORPH_SEPARATOR: &str = "_vs_";

/// Identity of one enrolled person, as encoded in filenames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for SubjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// How a dataset encodes the subject in a bona fide image filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingConvention {
    /// First `len` characters of the token before `separator`
    /// (FRGC: `04200d123.jpg` -> `04200`).
    FixedPrefix { len: usize, separator: char },
    /// Whole token before `separator` (FERET: `00012_930831_fa.png` -> `00012`).
    DelimiterSplit { separator: char },
}

impl NamingConvention {
    /// Resolve the subject of a filename. Never fails: a filename without the
    /// separator is treated as a single token.
    pub fn resolve(&self, filename: &str) -> SubjectId {
        match *self {
            NamingConvention::FixedPrefix { len, separator } => {
                let token = leading_token(filename, separator);
                SubjectId(token.chars().take(len).collect())
            }
            NamingConvention::DelimiterSplit { separator } => {
                SubjectId(leading_token(filename, separator).to_string())
            }
        }
    }
}

fn leading_token(s: &str, separator: char) -> &str {
    s.split(separator).next().unwrap_or(s)
}

/// The single threshold comparison used for subject validity.
pub fn is_valid_count(count: usize, min_count: usize) -> bool {
    count >= min_count
}

/// Group filenames by resolved subject and count them.
pub fn count_subjects<I, S>(filenames: I, convention: NamingConvention) -> BTreeMap<SubjectId, usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = BTreeMap::new();
    for name in filenames {
        *counts.entry(convention.resolve(name.as_ref())).or_insert(0) += 1;
    }
    counts
}

/// Subjects whose filename count satisfies [`is_valid_count`].
pub fn valid_subjects<I, S>(
    filenames: I,
    convention: NamingConvention,
    min_count: usize,
) -> BTreeSet<SubjectId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    filter_valid(&count_subjects(filenames, convention), min_count)
}

pub fn filter_valid(counts: &BTreeMap<SubjectId, usize>, min_count: usize) -> BTreeSet<SubjectId> {
    counts
        .iter()
        .filter(|&(_, &count)| is_valid_count(count, min_count))
        .map(|(id, _)| id.clone())
        .collect()
}

/// The two identities blended into a morph image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphSubjects {
    pub first: SubjectId,
    pub second: SubjectId,
}

/// Parse `<id1>[d<variant>][_...]_vs_<id2>[d<variant>][_...]`.
///
/// The extension is dropped first. Returns `None` when the marker is absent
/// or either side is empty.
pub fn parse_morph_name(filename: &str) -> Option<MorphSubjects> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let (left, right) = stem.split_once(MORPH_SEPARATOR)?;
    let first = morph_side(left);
    let second = morph_side(right);
    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some(MorphSubjects {
        first: SubjectId::new(first),
        second: SubjectId::new(second),
    })
}

fn morph_side(side: &str) -> &str {
    leading_token(leading_token(side, '_'), 'd')
}
