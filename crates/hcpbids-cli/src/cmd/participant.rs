use crate::output::{plan_rows, print_json, print_table};
use crate::Cli;
use anyhow::{bail, Context};
use hcpbids_core::config::{PipelineConfig, WarnLevel};
use hcpbids_core::options::{DiffusionOptions, ParticipantOptions};
use hcpbids_core::paths;
use hcpbids_core::runner::ProcessRunner;
use hcpbids_core::workflow::{run_participant_level, AnalysisRequest};
use std::path::Path;

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.license_key.trim().is_empty() {
        bail!("--license_key must not be empty");
    }

    let config = load_config(cli.config.as_deref())?;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => {}
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
        }
    }
    let env = config.resolve().context("cannot locate the HCP pipelines")?;

    let opts = participant_options(cli)?;
    let request = AnalysisRequest {
        bids_dir: cli.bids_dir.clone(),
        participant_labels: cli.participant_label.clone(),
        skip_validation: cli.skip_bids_validation,
        dry_run: cli.dry_run,
    };

    let plans = run_participant_level(&request, &env, &opts, &ProcessRunner)?;

    if cli.json {
        print_json(&plans)?;
    } else if cli.dry_run {
        print_table(&["SUBJECT", "STEP", "DETAIL"], plan_rows(&plans));
    } else {
        tracing::info!(participants = plans.len(), "participant level analysis finished");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env())
}

fn participant_options(cli: &Cli) -> anyhow::Result<ParticipantOptions> {
    let sessions = cli
        .session_label
        .iter()
        .map(|s| paths::normalize_session(s))
        .collect::<Result<Vec<_>, _>>()?;

    // Stages run with the output directory as cwd and also receive it as
    // --path, so it must not be relative.
    let output_dir = if cli.output_dir.is_absolute() {
        cli.output_dir.clone()
    } else {
        std::env::current_dir()?.join(&cli.output_dir)
    };

    let mut opts = ParticipantOptions::new(output_dir);
    opts.sessions = sessions;
    opts.n_cpus = cli.n_cpus.max(1);
    opts.stages = cli.stages.clone();
    opts.coreg = cli.coreg;
    opts.gdcoeffs = cli.gdcoeffs.clone();
    opts.anat_unwarpdir = cli.anat_unwarpdir;
    opts.processing_mode = cli.processing_mode;
    opts.doslicetime = cli.doslicetime;
    opts.diffusion = DiffusionOptions {
        output_name: cli.diffusion_output_name.clone(),
        eddy_no_gpu: cli.diffusion_eddy_no_gpu,
        eddy_args: cli.diffusion_eddy_args.clone(),
        user_matrix: cli.diffusion_usermatrix.clone().filter(|m| !m.is_empty()),
        b0maxbval: cli.diffusion_b0maxbval,
        dof: cli.diffusion_dof,
        combine_data_flag: cli.diffusion_combine_data_flag,
    };
    Ok(opts)
}
