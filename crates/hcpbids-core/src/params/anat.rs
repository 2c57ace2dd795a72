use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{
    axis_letters, images_with_session_fallback, split_epi_polarity, template_res_for,
};
use crate::bids::{BidsLayout, Fieldmap};
use crate::error::{HcpError, Result};
use crate::nifti::NiftiHeader;
use crate::options::ParticipantOptions;
use crate::paths;
use crate::types::{ProcessingMode, StyleData, NONE};

/// Distortion-correction arguments for PreFreeSurfer. Every field is `NONE`
/// unless a usable fieldmap is linked to the first T1w image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralFieldmap {
    pub fmapmag: String,
    pub fmapphase: String,
    pub echodiff: String,
    pub t1samplespacing: String,
    pub t2samplespacing: String,
    pub unwarpdir: String,
    pub avgrdcmethod: String,
    pub se_phase_neg: String,
    pub se_phase_pos: String,
    pub echospacing: String,
    pub seunwarpdir: String,
}

impl Default for StructuralFieldmap {
    fn default() -> Self {
        let none = || NONE.to_string();
        Self {
            fmapmag: none(),
            fmapphase: none(),
            echodiff: none(),
            t1samplespacing: none(),
            t2samplespacing: none(),
            unwarpdir: none(),
            avgrdcmethod: none(),
            se_phase_neg: none(),
            se_phase_pos: none(),
            echospacing: none(),
            seunwarpdir: none(),
        }
    }
}

/// Magnitude images to concatenate with `fslmerge -t` before PreFreeSurfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MagnitudeMerge {
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralParams {
    pub t1ws: Vec<PathBuf>,
    /// Empty when T2w images are absent or ignored.
    pub t2ws: Vec<PathBuf>,
    pub t1_template_res: &'static str,
    /// Equals the T1 resolution when no T2w is used.
    pub t2_template_res: &'static str,
    pub style: StyleData,
    pub fieldmap: StructuralFieldmap,
    pub magnitude_merge: Option<MagnitudeMerge>,
}

pub fn derive_structural(
    layout: &BidsLayout,
    subject: &str,
    opts: &ParticipantOptions,
) -> Result<StructuralParams> {
    let t1ws = images_with_session_fallback(layout, subject, "T1w", &opts.sessions);
    let Some(first_t1) = t1ws.first() else {
        return Err(HcpError::NoT1w(subject.to_string()));
    };
    let t1_template_res = template_res_for(first_t1)?;

    let t2_candidates = images_with_session_fallback(layout, subject, "T2w", &opts.sessions);
    let (t2ws, t2_template_res, style) =
        if !t2_candidates.is_empty() && opts.processing_mode.allows_extras() {
            let res = template_res_for(&t2_candidates[0])?;
            (t2_candidates, res, StyleData::Hcp)
        } else {
            if opts.processing_mode == ProcessingMode::Hcp {
                return Err(HcpError::NoT2w(subject.to_string()));
            }
            (Vec::new(), t1_template_res, StyleData::Legacy)
        };

    let mut fieldmap = StructuralFieldmap::default();
    let mut magnitude_merge = None;

    let fieldmaps = if opts.processing_mode.allows_extras() {
        layout.fieldmaps(first_t1)?
    } else {
        Vec::new()
    };

    if let Some(first) = fieldmaps.first() {
        match first {
            Fieldmap::PhaseDiff {
                phasediff,
                magnitude1,
                magnitude2,
            } => {
                set_sample_spacings(&mut fieldmap, layout, first_t1, t2ws.first(), opts)?;
                let merged = paths::magnitude_merge_path(&opts.output_dir, subject);
                let mut inputs = vec![magnitude1.clone()];
                inputs.extend(magnitude2.iter().cloned());

                let meta = layout.metadata(phasediff)?;
                // seconds to milliseconds
                let te_diff = (meta.f64("EchoTime2")? - meta.f64("EchoTime1")?) * 1000.0;

                fieldmap.fmapmag = merged.display().to_string();
                fieldmap.fmapphase = phasediff.display().to_string();
                fieldmap.echodiff = format!("{te_diff:.6}");
                fieldmap.avgrdcmethod = "SiemensFieldMap".to_string();
                magnitude_merge = Some(MagnitudeMerge {
                    output: merged,
                    inputs,
                });
            }
            Fieldmap::Epi { .. } => {
                set_sample_spacings(&mut fieldmap, layout, first_t1, t2ws.first(), opts)?;
                let epis: Vec<&Path> = fieldmaps
                    .iter()
                    .filter(|f| f.is_epi())
                    .map(|f| f.primary())
                    .collect();
                let (neg, pos) = split_epi_polarity(layout, &epis, first_t1)?;

                let first_epi = first.primary();
                let meta = layout.metadata(first_epi)?;
                let seunwarpdir = axis_letters(&meta.str("PhaseEncodingDirection")?.replace('-', ""));
                let echospacing = match meta.opt_f64("EffectiveEchoSpacing")? {
                    Some(v) => v,
                    None => echo_spacing_from_readout(first_epi, &seunwarpdir, meta.opt_f64("TotalReadoutTime")?)?,
                };

                fieldmap.se_phase_neg = neg.display().to_string();
                fieldmap.se_phase_pos = pos.display().to_string();
                fieldmap.echospacing = format!("{echospacing:.6}");
                fieldmap.seunwarpdir = seunwarpdir;
                fieldmap.avgrdcmethod = "TOPUP".to_string();
            }
            other => {
                tracing::warn!(
                    subject,
                    kind = other.suffix(),
                    "fieldmap type is not supported for structural distortion correction; skipping"
                );
            }
        }
    }

    Ok(StructuralParams {
        t1ws,
        t2ws,
        t1_template_res,
        t2_template_res,
        style,
        fieldmap,
        magnitude_merge,
    })
}

fn set_sample_spacings(
    fieldmap: &mut StructuralFieldmap,
    layout: &BidsLayout,
    t1: &Path,
    t2: Option<&PathBuf>,
    opts: &ParticipantOptions,
) -> Result<()> {
    let t1_spacing = layout.metadata(t1)?.f64("DwellTime")?;
    fieldmap.t1samplespacing = format!("{t1_spacing:.8}");
    if let Some(t2) = t2 {
        let t2_spacing = layout.metadata(t2)?.f64("DwellTime")?;
        fieldmap.t2samplespacing = format!("{t2_spacing:.8}");
    }
    // The readout direction of the 3D scans, distinct from the SE direction.
    fieldmap.unwarpdir = opts.anat_unwarpdir.as_str().to_string();
    Ok(())
}

/// The pipelines take an echo spacing, not a total readout time, so invert
/// `TotalReadoutTime = EffectiveEchoSpacing * (N - 1)` with `N` the number of
/// voxels along the phase-encoding axis.
fn echo_spacing_from_readout(
    epi: &Path,
    seunwarpdir: &str,
    total_readout_time: Option<f64>,
) -> Result<f64> {
    let Some(total) = total_readout_time else {
        return Err(HcpError::MissingMetadata {
            field: "EffectiveEchoSpacing or TotalReadoutTime".to_string(),
            path: epi.to_path_buf(),
        });
    };
    tracing::info!(
        path = %epi.display(),
        "EffectiveEchoSpacing not found; deriving it from TotalReadoutTime"
    );
    let axis = match seunwarpdir {
        "x" => 0,
        "y" => 1,
        other => {
            return Err(HcpError::InvalidMetadata {
                field: "PhaseEncodingDirection".to_string(),
                path: epi.to_path_buf(),
                reason: format!("cannot derive echo spacing along axis '{other}'"),
            })
        }
    };
    let header = NiftiHeader::read(epi)?;
    let phase_len = header.dim(axis).unwrap_or(0);
    if phase_len < 2 {
        return Err(HcpError::InvalidNifti {
            path: epi.to_path_buf(),
            reason: format!("phase-encoding dimension is {phase_len}"),
        });
    }
    Ok(total / (phase_len - 1) as f64)
}
