use serde::Serialize;
use std::path::PathBuf;

use crate::error::{HcpError, Result};
use crate::types::{ProcessingMode, RegName, Stage, UnwarpDir, NONE};

/// Knobs for the diffusion stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffusionOptions {
    /// Output base name (`--dwiname`).
    pub output_name: String,
    pub eddy_no_gpu: bool,
    /// Whitespace-separated extra arguments forwarded to eddy.
    pub eddy_args: String,
    /// Matrix used instead of registering the output to T1w.
    pub user_matrix: Option<String>,
    pub b0maxbval: u32,
    pub dof: u32,
    pub combine_data_flag: u32,
}

impl Default for DiffusionOptions {
    fn default() -> Self {
        Self {
            output_name: "Diffusion".to_string(),
            eddy_no_gpu: false,
            eddy_args: String::new(),
            user_matrix: None,
            b0maxbval: 50,
            dof: 6,
            combine_data_flag: 1,
        }
    }
}

/// Everything the participant-level run needs besides the dataset itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantOptions {
    pub output_dir: PathBuf,
    /// Bare session labels; empty means all sessions.
    pub sessions: Vec<String>,
    pub n_cpus: u32,
    pub stages: Vec<Stage>,
    pub coreg: RegName,
    /// Gradient distortion coefficients file, or `NONE`.
    pub gdcoeffs: String,
    pub anat_unwarpdir: UnwarpDir,
    pub processing_mode: ProcessingMode,
    pub doslicetime: bool,
    pub diffusion: DiffusionOptions,
}

impl ParticipantOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sessions: Vec::new(),
            n_cpus: 1,
            stages: Stage::defaults().to_vec(),
            coreg: RegName::default(),
            gdcoeffs: NONE.to_string(),
            anat_unwarpdir: UnwarpDir::default(),
            processing_mode: ProcessingMode::default(),
            doslicetime: false,
            diffusion: DiffusionOptions::default(),
        }
    }

    pub fn wants(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn wants_any(&self, stages: &[Stage]) -> bool {
        stages.iter().any(|s| self.wants(*s))
    }

    /// Option combinations the structural pipeline cannot honour.
    pub fn check(&self) -> Result<()> {
        if self.gdcoeffs != NONE
            && self.wants(Stage::PreFreeSurfer)
            && self.anat_unwarpdir == UnwarpDir::None
        {
            return Err(HcpError::UnwarpDirRequired);
        }
        Ok(())
    }
}
