//! Local illustration lookup
//!
//! Indexes an image directory once and maps exercise keys to files by slug.
//! When no stem matches exactly, the closest stem above a similarity cutoff
//! is used, so `vsquat.jpg` still serves `v_squat` and `seatedrow.png`
//! serves "Seated Row".

use gymvision_common::labels::slugify;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recognized illustration extensions, most preferred first
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Minimum normalized Levenshtein similarity for a fuzzy stem match
pub const FUZZY_MATCH_CUTOFF: f64 = 0.87;

/// URL prefix under which the enclosing service serves the directory
pub const URL_PREFIX: &str = "/images/";

/// Lowercase file stem → file name
#[derive(Debug, Clone, Default)]
pub struct IllustrationIndex {
    files: BTreeMap<String, String>,
}

impl IllustrationIndex {
    /// Scan `dir` (non-recursive) for illustration files
    ///
    /// A missing or unreadable directory yields an empty index.
    pub fn scan(dir: &Path) -> Self {
        let mut index = Self::default();

        if !dir.is_dir() {
            warn!("Illustration directory {} not found", dir.display());
            return index;
        }

        for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let (Some(stem), Some(ext), Some(file_name)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
                path.file_name().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            index.insert(stem, ext, file_name);
        }

        debug!("Indexed {} illustrations in {}", index.len(), dir.display());
        index
    }

    /// Build an index from file names (used by tests and callers that list
    /// files themselves)
    pub fn from_file_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for name in names {
            let path = Path::new(name);
            if let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) {
                index.insert(stem, ext, name);
            }
        }
        index
    }

    fn insert(&mut self, stem: &str, ext: &str, file_name: &str) {
        let ext = ext.to_lowercase();
        let Some(rank) = IMAGE_EXTENSIONS.iter().position(|e| *e == ext) else {
            return;
        };

        let stem = stem.to_lowercase();
        let replace = match self.files.get(&stem) {
            Some(existing) => extension_rank(existing).map_or(true, |current| rank < current),
            None => true,
        };
        if replace {
            self.files.insert(stem, file_name.to_string());
        }
    }

    /// Resolve an exercise to an illustration URL
    ///
    /// Candidate slugs are tried in order: display name, key with spaces, key.
    /// Exact stem matches win; otherwise the best fuzzy match for the first
    /// candidate is used if it clears [`FUZZY_MATCH_CUTOFF`].
    pub fn resolve(&self, key: &str, display: Option<&str>) -> Option<String> {
        if key.is_empty() || self.files.is_empty() {
            return None;
        }

        let mut candidates: Vec<String> = Vec::new();
        let sources = [
            display.map(str::to_string),
            Some(key.replace('_', " ")),
            Some(key.to_string()),
        ];
        for source in sources.into_iter().flatten() {
            let slug = slugify(&source);
            if !slug.is_empty() && !candidates.contains(&slug) {
                candidates.push(slug);
            }
        }

        for candidate in &candidates {
            if let Some(file) = self.files.get(candidate) {
                return Some(format!("{}{}", URL_PREFIX, file));
            }
        }

        let target = candidates.first()?;
        self.files
            .iter()
            .map(|(stem, file)| (strsim::normalized_levenshtein(target, stem), file))
            .filter(|(score, _)| *score >= FUZZY_MATCH_CUTOFF)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, file)| format!("{}{}", URL_PREFIX, file))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn extension_rank(file_name: &str) -> Option<usize> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())?
        .to_lowercase();
    IMAGE_EXTENSIONS.iter().position(|e| *e == ext)
}
