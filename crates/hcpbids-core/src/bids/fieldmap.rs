use serde::Serialize;
use std::path::{Path, PathBuf};

/// A fieldmap acquisition intended for some image, grouped with its
/// companion files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fieldmap {
    /// Phase-difference map with one or two magnitude images.
    PhaseDiff {
        phasediff: PathBuf,
        magnitude1: PathBuf,
        magnitude2: Option<PathBuf>,
    },
    /// Two phase images. Recognised, not used by the pipelines.
    TwoPhase {
        phase1: PathBuf,
        phase2: Option<PathBuf>,
    },
    /// Directly measured field. Recognised, not used by the pipelines.
    Direct {
        fieldmap: PathBuf,
        magnitude: Option<PathBuf>,
    },
    /// One spin-echo EPI with a given phase-encoding polarity.
    Epi { epi: PathBuf },
}

impl Fieldmap {
    pub fn suffix(&self) -> &'static str {
        match self {
            Fieldmap::PhaseDiff { .. } => "phasediff",
            Fieldmap::TwoPhase { .. } => "phase1",
            Fieldmap::Direct { .. } => "fieldmap",
            Fieldmap::Epi { .. } => "epi",
        }
    }

    /// The file whose sidecar carries `IntendedFor`.
    pub fn primary(&self) -> &Path {
        match self {
            Fieldmap::PhaseDiff { phasediff, .. } => phasediff,
            Fieldmap::TwoPhase { phase1, .. } => phase1,
            Fieldmap::Direct { fieldmap, .. } => fieldmap,
            Fieldmap::Epi { epi } => epi,
        }
    }

    pub fn is_epi(&self) -> bool {
        matches!(self, Fieldmap::Epi { .. })
    }
}

/// Suffixes that anchor a fieldmap group.
pub(crate) const PRIMARY_SUFFIXES: &[&str] = &["phasediff", "phase1", "fieldmap", "epi"];
