use crate::error::{HcpError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

pub const ENV_HCPPIPEDIR: &str = "HCPPIPEDIR";
pub const ENV_TEMPLATES: &str = "HCPPIPEDIR_Templates";
pub const ENV_CONFIG: &str = "HCPPIPEDIR_Config";
pub const ENV_SUBJECTS_DIR: &str = "SUBJECTS_DIR";

/// Where the external pipelines and their support files live.
///
/// Values come from built-in defaults, then an optional YAML file, then the
/// environment variables the pipeline scripts themselves read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hcppipedir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjects_dir: Option<PathBuf>,
    #[serde(default = "default_validator")]
    pub validator: String,
    #[serde(default = "default_fslmerge")]
    pub fslmerge: String,
}

fn default_validator() -> String {
    "bids-validator".to_string()
}

fn default_fslmerge() -> String {
    "fslmerge".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hcppipedir: None,
            templates_dir: None,
            config_dir: None,
            subjects_dir: None,
            validator: default_validator(),
            fslmerge: default_fslmerge(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: PipelineConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Overlay process environment variables.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`; empty values are ignored.
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_HCPPIPEDIR) {
            self.hcppipedir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_TEMPLATES) {
            self.templates_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_CONFIG) {
            self.config_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_SUBJECTS_DIR) {
            self.subjects_dir = Some(PathBuf::from(v));
        }
        self
    }

    /// Resolve into concrete directories. `HCPPIPEDIR` is mandatory.
    pub fn resolve(&self) -> Result<PipelineEnv> {
        let root = self
            .hcppipedir
            .clone()
            .ok_or(HcpError::PipelineDirNotSet)?;
        let templates = self
            .templates_dir
            .clone()
            .unwrap_or_else(|| root.join("global").join("templates"));
        let config = self
            .config_dir
            .clone()
            .unwrap_or_else(|| root.join("global").join("config"));
        Ok(PipelineEnv {
            root,
            templates,
            config,
            subjects_dir: self.subjects_dir.clone(),
            validator: self.validator.clone(),
            fslmerge: self.fslmerge.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let Ok(env) = self.resolve() else {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("{ENV_HCPPIPEDIR} is not set"),
            });
            return warnings;
        };

        for (name, dir) in [
            (ENV_HCPPIPEDIR, &env.root),
            (ENV_TEMPLATES, &env.templates),
            (ENV_CONFIG, &env.config),
        ] {
            if !dir.is_dir() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{name} directory does not exist: {}", dir.display()),
                });
            }
        }

        match &env.subjects_dir {
            Some(dir) if !dir.is_dir() => warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "{ENV_SUBJECTS_DIR} directory does not exist: {}",
                    dir.display()
                ),
            }),
            None => warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("{ENV_SUBJECTS_DIR} is not set; the FreeSurfer stage will fail"),
            }),
            _ => {}
        }

        for program in [&env.validator, &env.fslmerge] {
            if which::which(program).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("'{program}' not found on PATH"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// PipelineEnv
// ---------------------------------------------------------------------------

/// Resolved pipeline locations used to build stage commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEnv {
    pub root: PathBuf,
    pub templates: PathBuf,
    pub config: PathBuf,
    pub subjects_dir: Option<PathBuf>,
    pub validator: String,
    pub fslmerge: String,
}

impl PipelineEnv {
    pub fn script(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn template(&self, name: &str) -> String {
        self.templates.join(name).display().to_string()
    }

    pub fn config_file(&self, name: &str) -> String {
        self.config.join(name).display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_directories_derive_from_root() {
        let cfg = PipelineConfig::default().with_env_from(lookup(&[("HCPPIPEDIR", "/opt/hcp")]));
        let env = cfg.resolve().unwrap();
        assert_eq!(env.templates, PathBuf::from("/opt/hcp/global/templates"));
        assert_eq!(env.config, PathBuf::from("/opt/hcp/global/config"));
        assert_eq!(env.validator, "bids-validator");
    }

    #[test]
    fn env_overrides_file_values() {
        let cfg = PipelineConfig {
            hcppipedir: Some(PathBuf::from("/from/file")),
            templates_dir: Some(PathBuf::from("/file/templates")),
            ..Default::default()
        }
        .with_env_from(lookup(&[
            ("HCPPIPEDIR", "/from/env"),
            ("HCPPIPEDIR_Config", "/env/config"),
        ]));
        let env = cfg.resolve().unwrap();
        assert_eq!(env.root, PathBuf::from("/from/env"));
        assert_eq!(env.templates, PathBuf::from("/file/templates"));
        assert_eq!(env.config, PathBuf::from("/env/config"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let cfg = PipelineConfig {
            hcppipedir: Some(PathBuf::from("/from/file")),
            ..Default::default()
        }
        .with_env_from(lookup(&[("HCPPIPEDIR", "  ")]));
        assert_eq!(cfg.hcppipedir, Some(PathBuf::from("/from/file")));
    }

    #[test]
    fn resolve_without_root_fails() {
        let err = PipelineConfig::default().resolve().unwrap_err();
        assert!(matches!(err, HcpError::PipelineDirNotSet));
    }

    #[test]
    fn load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hcp-bids.yaml");
        std::fs::write(
            &path,
            "hcppipedir: /opt/HCP-Pipelines\nfslmerge: /usr/local/fsl/bin/fslmerge\n",
        )
        .unwrap();
        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(
            loaded,
            PipelineConfig {
                hcppipedir: Some(PathBuf::from("/opt/HCP-Pipelines")),
                fslmerge: "/usr/local/fsl/bin/fslmerge".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn yaml_missing_fields_use_defaults() {
        let cfg: PipelineConfig = serde_yaml::from_str("hcppipedir: /opt/hcp\n").unwrap();
        assert_eq!(cfg.validator, "bids-validator");
        assert_eq!(cfg.fslmerge, "fslmerge");
        assert!(cfg.subjects_dir.is_none());
    }

    #[test]
    fn validate_reports_missing_root() {
        let warnings = PipelineConfig::default().validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }

    #[test]
    fn validate_reports_missing_directories() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            hcppipedir: Some(dir.path().to_path_buf()),
            subjects_dir: Some(dir.path().join("nope")),
            ..Default::default()
        };
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("HCPPIPEDIR_Templates")));
        assert!(warnings.iter().any(|w| w.message.contains("SUBJECTS_DIR")));
        assert!(!warnings
            .iter()
            .any(|w| w.message.starts_with("HCPPIPEDIR directory")));
    }
}
