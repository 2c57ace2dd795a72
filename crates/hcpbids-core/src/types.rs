use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::HcpError;

/// Greyordinate resolution in mm. 2mm is the only resolution with an atlas.
pub const GRAYORDINATES_RES: &str = "2";
pub const LOW_RES_MESH: u32 = 32;
pub const HIGH_RES_MESH: u32 = 164;
/// Functional output resolution. Subcortical processing only supports the
/// 2mm ROI volume, so the native BOLD resolution is not used.
pub const FMRI_RES: &str = "2";
pub const BRAIN_SIZE: u32 = 150;
/// MNI template resolutions shipped with the pipelines, in mm.
pub const TEMPLATE_RESOLUTIONS: &[&str] = &["0.7", "0.8", "1"];

/// Literal the pipelines accept for "not provided".
pub const NONE: &str = "NONE";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    PreFreeSurfer,
    FreeSurfer,
    PostFreeSurfer,
    #[serde(rename = "fMRIVolume")]
    FmriVolume,
    #[serde(rename = "fMRISurface")]
    FmriSurface,
    DiffusionPreprocessing,
    #[serde(rename = "DiffusionPreprocessing_PreEddy")]
    DiffusionPreEddy,
    #[serde(rename = "DiffusionPreprocessing_Eddy")]
    DiffusionEddy,
    #[serde(rename = "DiffusionPreprocessing_PostEddy")]
    DiffusionPostEddy,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::PreFreeSurfer,
            Stage::FreeSurfer,
            Stage::PostFreeSurfer,
            Stage::FmriVolume,
            Stage::FmriSurface,
            Stage::DiffusionPreprocessing,
            Stage::DiffusionPreEddy,
            Stage::DiffusionEddy,
            Stage::DiffusionPostEddy,
        ]
    }

    /// Stages run when the user does not pick any.
    pub fn defaults() -> &'static [Stage] {
        &[
            Stage::PreFreeSurfer,
            Stage::FreeSurfer,
            Stage::PostFreeSurfer,
            Stage::FmriVolume,
            Stage::FmriSurface,
        ]
    }

    pub fn structural() -> &'static [Stage] {
        &[Stage::PreFreeSurfer, Stage::FreeSurfer, Stage::PostFreeSurfer]
    }

    pub fn functional() -> &'static [Stage] {
        &[Stage::FmriVolume, Stage::FmriSurface]
    }

    pub fn is_diffusion(self) -> bool {
        matches!(
            self,
            Stage::DiffusionPreprocessing
                | Stage::DiffusionPreEddy
                | Stage::DiffusionEddy
                | Stage::DiffusionPostEddy
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::PreFreeSurfer => "PreFreeSurfer",
            Stage::FreeSurfer => "FreeSurfer",
            Stage::PostFreeSurfer => "PostFreeSurfer",
            Stage::FmriVolume => "fMRIVolume",
            Stage::FmriSurface => "fMRISurface",
            Stage::DiffusionPreprocessing => "DiffusionPreprocessing",
            Stage::DiffusionPreEddy => "DiffusionPreprocessing_PreEddy",
            Stage::DiffusionEddy => "DiffusionPreprocessing_Eddy",
            Stage::DiffusionPostEddy => "DiffusionPreprocessing_PostEddy",
        }
    }

    /// Script path relative to `HCPPIPEDIR`.
    pub fn script(self) -> &'static str {
        match self {
            Stage::PreFreeSurfer => "PreFreeSurfer/PreFreeSurferPipeline.sh",
            Stage::FreeSurfer => "FreeSurfer/FreeSurferPipeline.sh",
            Stage::PostFreeSurfer => "PostFreeSurfer/PostFreeSurferPipeline.sh",
            Stage::FmriVolume => "fMRIVolume/GenericfMRIVolumeProcessingPipeline.sh",
            Stage::FmriSurface => "fMRISurface/GenericfMRISurfaceProcessingPipeline.sh",
            Stage::DiffusionPreprocessing => "DiffusionPreprocessing/DiffPreprocPipeline.sh",
            Stage::DiffusionPreEddy => "DiffusionPreprocessing/DiffPreprocPipeline_PreEddy.sh",
            Stage::DiffusionEddy => "DiffusionPreprocessing/DiffPreprocPipeline_Eddy.sh",
            Stage::DiffusionPostEddy => "DiffusionPreprocessing/DiffPreprocPipeline_PostEddy.sh",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = HcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| HcpError::InvalidStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ProcessingMode
// ---------------------------------------------------------------------------

/// What the user asked for on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Require T2w and fieldmaps.
    #[default]
    Hcp,
    /// Always ignore T2w and fieldmaps.
    Legacy,
    /// Use T2w and fieldmaps when available.
    Auto,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Hcp => "hcp",
            ProcessingMode::Legacy => "legacy",
            ProcessingMode::Auto => "auto",
        }
    }

    pub fn allows_extras(self) -> bool {
        self != ProcessingMode::Legacy
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = HcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hcp" => Ok(ProcessingMode::Hcp),
            "legacy" => Ok(ProcessingMode::Legacy),
            "auto" => Ok(ProcessingMode::Auto),
            _ => Err(HcpError::InvalidValue {
                kind: "processing mode",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// StyleData
// ---------------------------------------------------------------------------

/// Mode handed to the pipeline scripts via `--processing-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StyleData {
    #[serde(rename = "HCPStyleData")]
    Hcp,
    #[serde(rename = "LegacyStyleData")]
    Legacy,
}

impl StyleData {
    pub fn as_str(self) -> &'static str {
        match self {
            StyleData::Hcp => "HCPStyleData",
            StyleData::Legacy => "LegacyStyleData",
        }
    }
}

impl fmt::Display for StyleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RegName
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegName {
    #[default]
    #[serde(rename = "MSMSulc")]
    MsmSulc,
    #[serde(rename = "FS")]
    FreeSurfer,
}

impl RegName {
    pub fn as_str(self) -> &'static str {
        match self {
            RegName::MsmSulc => "MSMSulc",
            RegName::FreeSurfer => "FS",
        }
    }
}

impl fmt::Display for RegName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegName {
    type Err = HcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MSMSulc" => Ok(RegName::MsmSulc),
            "FS" => Ok(RegName::FreeSurfer),
            _ => Err(HcpError::InvalidValue {
                kind: "coregistration method",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// UnwarpDir
// ---------------------------------------------------------------------------

/// Readout direction for 3D structural distortion correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnwarpDir {
    #[serde(rename = "x")]
    X,
    #[serde(rename = "y")]
    Y,
    #[default]
    #[serde(rename = "z")]
    Z,
    #[serde(rename = "x-")]
    XNeg,
    #[serde(rename = "y-")]
    YNeg,
    #[serde(rename = "z-")]
    ZNeg,
    #[serde(rename = "NONE")]
    None,
}

impl UnwarpDir {
    pub fn as_str(self) -> &'static str {
        match self {
            UnwarpDir::X => "x",
            UnwarpDir::Y => "y",
            UnwarpDir::Z => "z",
            UnwarpDir::XNeg => "x-",
            UnwarpDir::YNeg => "y-",
            UnwarpDir::ZNeg => "z-",
            UnwarpDir::None => NONE,
        }
    }
}

impl fmt::Display for UnwarpDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnwarpDir {
    type Err = HcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(UnwarpDir::X),
            "y" => Ok(UnwarpDir::Y),
            "z" => Ok(UnwarpDir::Z),
            "x-" => Ok(UnwarpDir::XNeg),
            "y-" => Ok(UnwarpDir::YNeg),
            "z-" => Ok(UnwarpDir::ZNeg),
            "NONE" => Ok(UnwarpDir::None),
            _ => Err(HcpError::InvalidValue {
                kind: "unwarp direction",
                value: s.to_string(),
            }),
        }
    }
}
