use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::{HcpError, Result};

/// Merged JSON sidecar fields for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(skip)]
    path: PathBuf,
    fields: Map<String, Value>,
}

impl Metadata {
    pub fn new(path: impl Into<PathBuf>, fields: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            fields,
        }
    }

    /// Later sidecars override earlier ones key by key.
    pub(crate) fn merge(&mut self, other: Map<String, Value>) {
        for (k, v) in other {
            self.fields.insert(k, v);
        }
    }

    pub fn f64(&self, key: &str) -> Result<f64> {
        self.opt_f64(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn opt_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, format!("expected a number, got {v}"))),
        }
    }

    pub fn str(&self, key: &str) -> Result<&str> {
        self.opt_str(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&str>> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(v) => Err(self.invalid(key, format!("expected a string, got {v}"))),
        }
    }

    pub fn f64_list(&self, key: &str) -> Result<Vec<f64>> {
        let value = self.fields.get(key).ok_or_else(|| self.missing(key))?;
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(key, "expected a list of numbers".to_string()))?;
        items
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| self.invalid(key, format!("non-numeric entry {v}")))
            })
            .collect()
    }

    /// `IntendedFor` as a list; a single string is accepted.
    pub fn intended_for(&self) -> Vec<String> {
        match self.fields.get("IntendedFor") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn missing(&self, key: &str) -> HcpError {
        HcpError::MissingMetadata {
            field: key.to_string(),
            path: self.path.clone(),
        }
    }

    fn invalid(&self, key: &str, reason: String) -> HcpError {
        HcpError::InvalidMetadata {
            field: key.to_string(),
            path: self.path.clone(),
            reason,
        }
    }
}
