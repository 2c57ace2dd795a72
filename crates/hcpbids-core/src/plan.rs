//! Per-participant execution plans.
//!
//! All metadata is read and every parameter derived before anything runs,
//! so a dataset problem surfaces before the first (hours-long) stage starts.
//! A plan is plain data: it can be printed, serialised or executed.

use serde::Serialize;
use std::path::PathBuf;

use crate::bids::BidsLayout;
use crate::config::PipelineEnv;
use crate::error::{HcpError, Result};
use crate::options::ParticipantOptions;
use crate::params::{derive_diffusion, derive_functional, derive_structural};
use crate::paths;
use crate::stages::{self, Invocation, StageContext};
use crate::types::Stage;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    CreateDir { path: PathBuf },
    WriteFile { path: PathBuf, contents: String },
    /// Recursive copy, skipped when `to` already exists.
    CopyTree { from: PathBuf, to: PathBuf },
    Command(Invocation),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    /// Bare participant label.
    pub subject: String,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn commands(&self) -> impl Iterator<Item = &Invocation> {
        self.steps.iter().filter_map(|s| match s {
            Step::Command(inv) => Some(inv),
            _ => None,
        })
    }

    /// Labels of the commands in run order.
    pub fn labels(&self) -> Vec<&str> {
        self.commands().map(|c| c.label.as_str()).collect()
    }
}

/// Build the plan for one participant.
pub fn plan_participant(
    layout: &BidsLayout,
    env: &PipelineEnv,
    opts: &ParticipantOptions,
    label: &str,
) -> Result<Plan> {
    let ctx = StageContext::new(env, opts, label);
    let mut steps = Vec::new();

    if opts.wants_any(Stage::structural()) {
        let anat = derive_structural(layout, label, opts)?;
        tracing::info!(subject = label, mode = %anat.style, "structural processing");

        if opts.wants(Stage::PreFreeSurfer) {
            if let Some(merge) = &anat.magnitude_merge {
                steps.push(Step::CreateDir {
                    path: paths::tmp_dir(&opts.output_dir, label),
                });
                steps.push(Step::Command(stages::magnitude_merge(env, merge, &opts.output_dir)));
            }
            steps.push(Step::Command(stages::pre_freesurfer(&ctx, &anat)));
        }
        if opts.wants(Stage::FreeSurfer) {
            let subjects_dir = env.subjects_dir.as_ref().ok_or(HcpError::SubjectsDirNotSet)?;
            let target = paths::t1w_dir(&opts.output_dir, label);
            for name in paths::FREESURFER_SUPPORT_SUBJECTS {
                steps.push(Step::CopyTree {
                    from: subjects_dir.join(name),
                    to: target.join(name),
                });
            }
            steps.push(Step::Command(stages::freesurfer(&ctx, anat.style)));
        }
        if opts.wants(Stage::PostFreeSurfer) {
            steps.push(Step::Command(stages::post_freesurfer(&ctx, anat.style)));
        }
    }

    if opts.wants_any(Stage::functional()) {
        for run in derive_functional(layout, label, opts)? {
            tracing::info!(
                subject = label,
                bold = %run.bold.display(),
                mode = %run.style,
                "functional processing"
            );
            if opts.wants(Stage::FmriVolume) {
                if let Some(file) = &run.slice_timing {
                    steps.push(Step::WriteFile {
                        path: file.path.clone(),
                        contents: file.contents.clone(),
                    });
                }
                steps.push(Step::Command(stages::fmri_volume(&ctx, &run)));
            }
            if opts.wants(Stage::FmriSurface) {
                steps.push(Step::Command(stages::fmri_surface(&ctx, &run)));
            }
        }
    }

    if opts.stages.iter().any(|s| s.is_diffusion()) {
        match derive_diffusion(layout, label, opts)? {
            None => tracing::warn!(subject = label, "no dwi images found; skipping diffusion stages"),
            Some(dwi) => {
                tracing::info!(subject = label, runs = dwi.dwis.len(), "diffusion processing");
                if opts.wants(Stage::DiffusionPreprocessing) {
                    steps.push(Step::Command(stages::diffusion(&ctx, &dwi)));
                }
                if opts.wants(Stage::DiffusionPreEddy) {
                    steps.push(Step::Command(stages::diffusion_pre_eddy(&ctx, &dwi)));
                }
                if opts.wants(Stage::DiffusionEddy) {
                    steps.push(Step::Command(stages::diffusion_eddy(&ctx, &dwi)));
                }
                if opts.wants(Stage::DiffusionPostEddy) {
                    steps.push(Step::Command(stages::diffusion_post_eddy(&ctx)));
                }
            }
        }
    }

    Ok(Plan {
        subject: label.to_string(),
        steps,
    })
}
