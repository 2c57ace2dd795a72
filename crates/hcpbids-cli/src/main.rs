mod cmd;
mod output;

use clap::Parser;
use hcpbids_core::types::{ProcessingMode, RegName, Stage, UnwarpDir};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hcp-bids",
    about = "HCP Pipelines BIDS App (T1w, T2w, fMRI, DWI)",
    version,
    disable_version_flag = true
)]
pub struct Cli {
    /// The directory with the input dataset formatted according to the BIDS standard
    pub bids_dir: PathBuf,

    /// The directory where the output files should be stored
    pub output_dir: PathBuf,

    /// Level of the analysis that will be performed. Multiple participant
    /// level analyses can be run independently (in parallel) using the same
    /// output_dir
    #[arg(value_parser = ["participant"])]
    pub analysis_level: String,

    /// Participant labels to analyse (without "sub-"); all subjects if omitted
    #[arg(long = "participant_label", visible_alias = "participant-label", num_args = 1..)]
    pub participant_label: Vec<String>,

    /// Session labels to analyse (without "ses-"); all sessions if omitted
    #[arg(long = "session_label", visible_alias = "session-label", num_args = 1..)]
    pub session_label: Vec<String>,

    /// Number of CPUs/cores available to use
    #[arg(long = "n_cpus", visible_alias = "n-cpus", default_value_t = 1)]
    pub n_cpus: u32,

    /// Which stages to run. Space separated list
    #[arg(long, num_args = 1.., default_values_t = Stage::defaults().to_vec())]
    pub stages: Vec<Stage>,

    /// Coregistration method to use (MSMSulc or FS)
    #[arg(long, default_value_t = RegName::MsmSulc)]
    pub coreg: RegName,

    /// Path to gradients coefficients file
    #[arg(long, default_value = "NONE")]
    pub gdcoeffs: String,

    /// FreeSurfer license key
    #[arg(long = "license_key", visible_alias = "license-key", env = "FS_LICENSE_KEY")]
    pub license_key: String,

    /// Unwarp direction for 3D volumes (x, y, z, x-, y-, z- or NONE)
    #[arg(long = "anat_unwarpdir", visible_alias = "anat-unwarpdir", default_value_t = UnwarpDir::Z, allow_hyphen_values = true)]
    pub anat_unwarpdir: UnwarpDir,

    /// Skip BIDS validation
    #[arg(long = "skip_bids_validation", visible_alias = "skip-bids-validation")]
    pub skip_bids_validation: bool,

    /// hcp: require T2w and fieldmaps; legacy: ignore them; auto: use them when available
    #[arg(long = "processing_mode", visible_alias = "processing-mode", default_value_t = ProcessingMode::Hcp)]
    pub processing_mode: ProcessingMode,

    /// Apply slice timing correction as part of fMRIVolume
    #[arg(long)]
    pub doslicetime: bool,

    /// Output base name for DiffusionPreprocessing
    #[arg(long = "diffusion_output_name", visible_alias = "diffusion-output-name", default_value = "Diffusion")]
    pub diffusion_output_name: String,

    /// Do NOT use the GPU version of eddy during DiffusionPreprocessing
    #[arg(long = "diffusion_eddy_no_gpu", visible_alias = "diffusion-eddy-no-gpu")]
    pub diffusion_eddy_no_gpu: bool,

    /// String of extra arguments for eddy during DiffusionPreprocessing
    #[arg(long = "diffusion_eddy_args", visible_alias = "diffusion-eddy-args", default_value = "", allow_hyphen_values = true)]
    pub diffusion_eddy_args: String,

    /// Matrix file to use instead of registering the diffusion output to T1w
    #[arg(long = "diffusion_usermatrix", visible_alias = "diffusion-usermatrix")]
    pub diffusion_usermatrix: Option<String>,

    /// Volumes with a bvalue at or below this are treated as b0s
    #[arg(long = "diffusion_b0maxbval", visible_alias = "diffusion-b0maxbval", default_value_t = 50)]
    pub diffusion_b0maxbval: u32,

    /// Degrees of freedom for the diffusion-to-T1w registration
    #[arg(long = "diffusion_dof", visible_alias = "diffusion-dof", default_value_t = 6)]
    pub diffusion_dof: u32,

    /// 1: average pairs of opposite-polarity volumes; 2: keep all volumes
    #[arg(long = "diffusion_combine_data_flag", visible_alias = "diffusion-combine-data-flag", default_value_t = 1)]
    pub diffusion_combine_data_flag: u32,

    /// YAML file with pipeline locations (HCPPIPEDIR and friends override it)
    #[arg(long, env = "HCP_BIDS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Derive and print the plan for each participant without running anything
    #[arg(long = "dry-run", visible_alias = "dry_run")]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long, short = 'j')]
    pub json: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries pipeline output and --json plans.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cmd::participant::run(&cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
