//! Metadata-driven parameter derivation for each pipeline family.
//!
//! Every derivation reads the dataset (sidecars, image headers, fieldmap
//! links) and produces plain values ready to be formatted into stage
//! arguments. Nothing here touches the output directory.

pub mod anat;
pub mod dwi;
pub mod func;
pub mod slice_timing;

pub use anat::{derive_structural, MagnitudeMerge, StructuralFieldmap, StructuralParams};
pub use dwi::{derive_diffusion, DiffusionParams};
pub use func::{derive_functional, fmri_name, FunctionalRun, SliceTimingFile};

use std::path::{Path, PathBuf};

use crate::bids::BidsLayout;
use crate::error::{HcpError, Result};
use crate::nifti::NiftiHeader;
use crate::types::TEMPLATE_RESOLUTIONS;

/// Template resolution closest to `zoom`. Ties go to the finer template.
pub fn nearest_template_res(zoom: f64) -> &'static str {
    let mut best = TEMPLATE_RESOLUTIONS[0];
    let mut best_dist = f64::INFINITY;
    for res in TEMPLATE_RESOLUTIONS {
        let value: f64 = res.parse().unwrap_or(f64::INFINITY);
        let dist = (value - zoom).abs();
        if dist < best_dist {
            best = res;
            best_dist = dist;
        }
    }
    best
}

/// Template resolution for the first image of a modality.
pub(crate) fn template_res_for(image: &Path) -> Result<&'static str> {
    let header = NiftiHeader::read(image)?;
    Ok(nearest_template_res(header.min_spatial_zoom()))
}

/// Images in the selected sessions, or in every session when the selection
/// holds none.
pub(crate) fn images_with_session_fallback(
    layout: &BidsLayout,
    subject: &str,
    suffix: &str,
    sessions: &[String],
) -> Vec<PathBuf> {
    let images = layout.images(subject, suffix, sessions);
    if images.is_empty() && !sessions.is_empty() {
        tracing::debug!(subject, suffix, "no images in selected sessions; using all sessions");
        return layout.images(subject, suffix, &[]);
    }
    images
}

/// Shortest round-trip float text, with a trailing `.0` for whole numbers.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// `i/j/k` phase-encoding axes to the `x/y/z` names the pipelines use.
pub fn axis_letters(direction: &str) -> String {
    direction
        .chars()
        .map(|c| match c {
            'i' => 'x',
            'j' => 'y',
            'k' => 'z',
            other => other,
        })
        .collect()
}

/// Negative if the phase-encoding direction carries a `-`.
pub fn is_negative_direction(direction: &str) -> bool {
    direction.contains('-')
}

pub(crate) fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("@")
}

/// Split spin-echo EPI fieldmaps into (negative, positive) by polarity.
pub(crate) fn split_epi_polarity(
    layout: &BidsLayout,
    epis: &[&Path],
    target: &Path,
) -> Result<(PathBuf, PathBuf)> {
    let mut neg = None;
    let mut pos = None;
    for epi in epis {
        let direction = layout.metadata(epi)?.str("PhaseEncodingDirection")?.to_string();
        if is_negative_direction(&direction) {
            neg = Some(epi.to_path_buf());
        } else {
            pos = Some(epi.to_path_buf());
        }
    }
    match (neg, pos) {
        (Some(neg), Some(pos)) => Ok((neg, pos)),
        (None, _) => Err(HcpError::IncompleteFieldmap {
            target: target.to_path_buf(),
            reason: "no spin-echo fieldmap with negative phase encoding".to_string(),
        }),
        (_, None) => Err(HcpError::IncompleteFieldmap {
            target: target.to_path_buf(),
            reason: "no spin-echo fieldmap with positive phase encoding".to_string(),
        }),
    }
}
