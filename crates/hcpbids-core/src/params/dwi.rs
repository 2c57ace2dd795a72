use serde::Serialize;
use std::path::PathBuf;

use super::{format_float, is_negative_direction, join_paths};
use crate::bids::BidsLayout;
use crate::error::{HcpError, Result};
use crate::options::ParticipantOptions;

/// Inputs shared by the diffusion stages for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffusionParams {
    pub dwis: Vec<PathBuf>,
    /// Positive-polarity runs joined with `@`.
    pub pos_data: String,
    pub neg_data: String,
    /// 1 for left-right (`i`), 2 for anterior-posterior.
    pub pe_dir: u8,
    /// Milliseconds.
    pub echospacing: String,
    /// Exact-match sidecar of the last run that has one; handed to eddy.
    pub sidecar: Option<PathBuf>,
}

/// `None` when the subject has no diffusion runs in the selected sessions.
pub fn derive_diffusion(
    layout: &BidsLayout,
    subject: &str,
    opts: &ParticipantOptions,
) -> Result<Option<DiffusionParams>> {
    let dwis = layout.images(subject, "dwi", &opts.sessions);
    if dwis.is_empty() {
        return Ok(None);
    }

    let mut pos = Vec::new();
    let mut neg = Vec::new();
    let mut pe_dir = None;
    let mut echospacing = None;
    let mut sidecar = None;

    for dwi in &dwis {
        let meta = layout.metadata(dwi)?;
        if let Some(json) = layout.sidecar(dwi) {
            sidecar = Some(json);
        }

        let direction = meta.str("PhaseEncodingDirection")?;
        let acq = if direction.contains('i') { 1 } else { 2 };
        match pe_dir {
            None => pe_dir = Some(acq),
            Some(first) if first != acq => {
                return Err(HcpError::InconsistentDiffusion(
                    "not all dwi images have the same phase-encoding axis (both LR and AP)".to_string(),
                ))
            }
            Some(_) => {}
        }
        if is_negative_direction(direction) {
            neg.push(dwi.clone());
        } else {
            pos.push(dwi.clone());
        }

        let spacing = meta.f64("EffectiveEchoSpacing")? * 1000.0;
        match echospacing {
            None => echospacing = Some(spacing),
            Some(first) if first != spacing => {
                return Err(HcpError::InconsistentDiffusion(format!(
                    "not all dwi images have the same echo spacing ({first} vs {spacing} ms)"
                )))
            }
            Some(_) => {}
        }
    }

    Ok(Some(DiffusionParams {
        pos_data: join_paths(&pos),
        neg_data: join_paths(&neg),
        pe_dir: pe_dir.unwrap_or(2),
        echospacing: echospacing.map(format_float).unwrap_or_default(),
        sidecar,
        dwis,
    }))
}
