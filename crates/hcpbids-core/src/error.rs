use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HcpError {
    #[error("HCPPIPEDIR is not set: export it or set hcppipedir in the config file")]
    PipelineDirNotSet,

    #[error("SUBJECTS_DIR is not set: the FreeSurfer stage needs fsaverage from it")]
    SubjectsDirNotSet,

    #[error("dataset root not found: {0}")]
    DatasetNotFound(PathBuf),

    #[error("{0} is not part of the indexed dataset")]
    NotIndexed(PathBuf),

    #[error("invalid participant label '{0}': must be alphanumeric")]
    InvalidLabel(String),

    #[error("invalid session label '{0}': must be alphanumeric")]
    InvalidSession(String),

    #[error("no T1w files found for subject {0}")]
    NoT1w(String),

    #[error(
        "no T2w files found for sub-{0}; consider --processing_mode [legacy | auto]"
    )]
    NoT2w(String),

    #[error(
        "no fieldmaps found for BOLD {0}; consider --processing_mode [legacy | auto]"
    )]
    NoBoldFieldmaps(PathBuf),

    #[error("missing metadata field '{field}' for {path}")]
    MissingMetadata { field: String, path: PathBuf },

    #[error("invalid metadata field '{field}' for {path}: {reason}")]
    InvalidMetadata {
        field: String,
        path: PathBuf,
        reason: String,
    },

    #[error("incomplete fieldmap for {target}: {reason}")]
    IncompleteFieldmap { target: PathBuf, reason: String },

    #[error("inconsistent diffusion data: {0}")]
    InconsistentDiffusion(String),

    #[error("cannot derive a run name from {0}")]
    InvalidRunName(PathBuf),

    #[error("invalid NIfTI header in {path}: {reason}")]
    InvalidNifti { path: PathBuf, reason: String },

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid value '{value}' for {kind}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("--anat_unwarpdir must be specified to use PreFreeSurfer distortion correction")]
    UnwarpDirRequired,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with non-zero return code: {code}")]
    NonZeroExit { program: String, code: i32 },

    #[error("'{0}' was terminated by a signal")]
    Terminated(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HcpError>;
