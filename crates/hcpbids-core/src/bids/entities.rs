use std::collections::BTreeMap;

/// A BIDS file name split into `key-value` entities, suffix and extension.
///
/// `sub-01_ses-pre_task-rest_run-1_bold.nii.gz` parses to entities
/// `{sub: 01, ses: pre, task: rest, run: 1}`, suffix `bold` and extension
/// `nii.gz`. Top-level sidecars such as `task-rest_bold.json` parse too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsName {
    pub entities: BTreeMap<String, String>,
    pub suffix: String,
    pub extension: String,
}

impl BidsName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, extension) = match file_name.split_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (file_name, ""),
        };
        let mut parts: Vec<&str> = stem.split('_').collect();
        let suffix = parts.pop()?;
        if !is_token(suffix) {
            return None;
        }

        let mut entities = BTreeMap::new();
        for part in parts {
            let (key, value) = part.split_once('-')?;
            if !is_token(key) || !is_token(value) {
                return None;
            }
            entities.insert(key.to_string(), value.to_string());
        }

        Some(Self {
            entities,
            suffix: suffix.to_string(),
            extension: extension.to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get("sub")
    }

    pub fn session(&self) -> Option<&str> {
        self.get("ses")
    }

    pub fn is_image(&self) -> bool {
        matches!(self.extension.as_str(), "nii" | "nii.gz")
    }

    /// True when every entity of `self` appears with the same value in `other`.
    pub fn entities_subset_of(&self, other: &BidsName) -> bool {
        self.entities
            .iter()
            .all(|(k, v)| other.entities.get(k) == Some(v))
    }

    /// Same entities, a different suffix: how magnitude images sit next to a
    /// phase-difference map.
    pub fn is_companion_of(&self, other: &BidsName, suffix: &str) -> bool {
        self.suffix == suffix && self.entities == other.entities
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}
