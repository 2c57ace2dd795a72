use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::entities::BidsName;
use super::fieldmap::{Fieldmap, PRIMARY_SUFFIXES};
use super::metadata::Metadata;
use crate::error::{HcpError, Result};

/// Top-level directories that never hold raw data.
const SKIPPED_DIRS: &[&str] = &["derivatives", "sourcedata", "code"];

pub const IMAGE_EXTENSIONS: &[&str] = &["nii.gz", "nii"];

#[derive(Debug, Clone, PartialEq)]
pub struct BidsFile {
    pub path: PathBuf,
    pub name: BidsName,
    /// Enclosing folder such as `anat`, `func`, `dwi` or `fmap`.
    pub datatype: Option<String>,
}

impl BidsFile {
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

/// File query. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct Query<'a> {
    pub subject: Option<&'a str>,
    pub suffix: Option<&'a str>,
    pub datatype: Option<&'a str>,
    pub extensions: &'a [&'a str],
    /// Empty means every session (and session-less files).
    pub sessions: &'a [String],
}

impl<'a> Query<'a> {
    pub fn images(subject: &'a str, suffix: &'a str, sessions: &'a [String]) -> Self {
        Self {
            subject: Some(subject),
            suffix: Some(suffix),
            datatype: None,
            extensions: IMAGE_EXTENSIONS,
            sessions,
        }
    }

    fn matches(&self, file: &BidsFile) -> bool {
        if let Some(subject) = self.subject {
            if file.name.subject() != Some(subject) {
                return false;
            }
        }
        if let Some(suffix) = self.suffix {
            if file.name.suffix != suffix {
                return false;
            }
        }
        if let Some(datatype) = self.datatype {
            if file.datatype.as_deref() != Some(datatype) {
                return false;
            }
        }
        if !self.extensions.is_empty() && !self.extensions.contains(&file.name.extension.as_str()) {
            return false;
        }
        if !self.sessions.is_empty() {
            match file.name.session() {
                Some(ses) if self.sessions.iter().any(|s| s == ses) => {}
                _ => return false,
            }
        }
        true
    }
}

/// In-memory index of a BIDS dataset.
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: PathBuf,
    files: Vec<BidsFile>,
}

impl BidsLayout {
    /// Walk `root` and index every file with a parseable BIDS name.
    pub fn index(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(HcpError::DatasetNotFound(root.to_path_buf()));
        }
        let root = root.canonicalize()?;

        let mut files = Vec::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped(e.path(), &root));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(name) = BidsName::parse(file_name) else {
                continue;
            };
            let datatype = entry
                .path()
                .parent()
                .filter(|p| *p != root.as_path())
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .filter(|n| !n.starts_with("sub-") && !n.starts_with("ses-"))
                .map(str::to_string);
            files.push(BidsFile {
                path: entry.path().to_path_buf(),
                name,
                datatype,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(root = %root.display(), files = files.len(), "indexed BIDS dataset");

        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[BidsFile] {
        &self.files
    }

    /// Labels of every `sub-*` directory at the dataset root, sorted.
    pub fn subjects(&self) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(label) = name.to_str().and_then(|n| n.strip_prefix("sub-")) {
                if !label.is_empty() {
                    labels.push(label.to_string());
                }
            }
        }
        labels.sort();
        Ok(labels)
    }

    pub fn query(&self, query: &Query<'_>) -> Vec<&BidsFile> {
        self.files.iter().filter(|f| query.matches(f)).collect()
    }

    /// Image paths for `subject` with `suffix`, sorted.
    pub fn images(&self, subject: &str, suffix: &str, sessions: &[String]) -> Vec<PathBuf> {
        self.query(&Query::images(subject, suffix, sessions))
            .into_iter()
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn file(&self, path: &Path) -> Option<&BidsFile> {
        self.files.iter().find(|f| f.path == path)
    }

    fn require(&self, path: &Path) -> Result<&BidsFile> {
        self.file(path)
            .ok_or_else(|| HcpError::NotIndexed(path.to_path_buf()))
    }

    /// Sidecar fields for `path` under the inheritance principle: every JSON
    /// file with the same suffix whose entities are a subset of the image's,
    /// located in the image's directory or above it, merged from the least to
    /// the most specific.
    pub fn metadata(&self, path: &Path) -> Result<Metadata> {
        let target = self.require(path)?;
        let target_dir = target.dir();

        let mut sidecars: Vec<&BidsFile> = self
            .files
            .iter()
            .filter(|f| f.name.extension == "json")
            .filter(|f| f.name.suffix == target.name.suffix)
            .filter(|f| target_dir.starts_with(f.dir()))
            .filter(|f| f.name.entities_subset_of(&target.name))
            .collect();
        sidecars.sort_by_key(|f| (f.dir().components().count(), f.name.entities.len()));

        let mut metadata = Metadata::new(path, serde_json::Map::new());
        for sidecar in sidecars {
            let data = std::fs::read_to_string(&sidecar.path)?;
            match serde_json::from_str::<Value>(&data)? {
                Value::Object(map) => metadata.merge(map),
                _ => {
                    tracing::warn!(path = %sidecar.path.display(), "sidecar is not a JSON object; ignored")
                }
            }
        }
        Ok(metadata)
    }

    /// The JSON file sitting right next to `path` with the same name, if any.
    pub fn sidecar(&self, path: &Path) -> Option<PathBuf> {
        let target = self.file(path)?;
        self.files
            .iter()
            .find(|f| {
                f.name.extension == "json"
                    && f.dir() == target.dir()
                    && f.name.suffix == target.name.suffix
                    && f.name.entities == target.name.entities
            })
            .map(|f| f.path.clone())
    }

    /// Fieldmaps whose `IntendedFor` names `path`, sorted by path.
    pub fn fieldmaps(&self, path: &Path) -> Result<Vec<Fieldmap>> {
        let target = self.require(path)?;
        let Some(subject) = target.name.subject() else {
            return Ok(Vec::new());
        };
        let subject_dir = self.root.join(format!("sub-{subject}"));

        let fmap_images = Query {
            subject: Some(subject),
            datatype: Some("fmap"),
            extensions: IMAGE_EXTENSIONS,
            ..Query::default()
        };
        let mut found = Vec::new();
        for candidate in self
            .query(&fmap_images)
            .into_iter()
            .filter(|f| PRIMARY_SUFFIXES.contains(&f.name.suffix.as_str()))
        {
            let metadata = self.metadata(&candidate.path)?;
            let intended = metadata
                .intended_for()
                .iter()
                .any(|entry| self.resolve_intended(entry, &subject_dir) == target.path);
            if intended {
                found.push(self.group_fieldmap(candidate, path)?);
            }
        }
        found.sort_by(|a, b| a.primary().cmp(b.primary()));
        Ok(found)
    }

    fn resolve_intended(&self, entry: &str, subject_dir: &Path) -> PathBuf {
        match entry.strip_prefix("bids::") {
            Some(rest) => self.root.join(rest),
            None => subject_dir.join(entry.trim_start_matches("./")),
        }
    }

    fn companion(&self, primary: &BidsFile, suffix: &str) -> Option<PathBuf> {
        self.files
            .iter()
            .find(|f| f.dir() == primary.dir() && f.name.is_image() && f.name.is_companion_of(&primary.name, suffix))
            .map(|f| f.path.clone())
    }

    fn group_fieldmap(&self, primary: &BidsFile, target: &Path) -> Result<Fieldmap> {
        let fieldmap = match primary.name.suffix.as_str() {
            "phasediff" => {
                let magnitude1 = self.companion(primary, "magnitude1").ok_or_else(|| {
                    HcpError::IncompleteFieldmap {
                        target: target.to_path_buf(),
                        reason: format!("no magnitude1 image next to {}", primary.path.display()),
                    }
                })?;
                Fieldmap::PhaseDiff {
                    phasediff: primary.path.clone(),
                    magnitude1,
                    magnitude2: self.companion(primary, "magnitude2"),
                }
            }
            "phase1" => Fieldmap::TwoPhase {
                phase1: primary.path.clone(),
                phase2: self.companion(primary, "phase2"),
            },
            "fieldmap" => Fieldmap::Direct {
                fieldmap: primary.path.clone(),
                magnitude: self.companion(primary, "magnitude"),
            },
            _ => Fieldmap::Epi {
                epi: primary.path.clone(),
            },
        };
        Ok(fieldmap)
    }
}

fn is_skipped(path: &Path, root: &Path) -> bool {
    if path == root {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    if name.starts_with('.') {
        return true;
    }
    path.parent() == Some(root) && SKIPPED_DIRS.contains(&name)
}
