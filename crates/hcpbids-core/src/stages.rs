//! Command lines for the HCP pipeline scripts.
//!
//! Each builder turns derived parameters into an [`Invocation`] whose
//! argument names and constant values match what the pipeline scripts
//! parse. Arguments are passed as separate argv entries, never through a
//! shell, so values are not quoted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::PipelineEnv;
use crate::options::ParticipantOptions;
use crate::params::{join_paths, DiffusionParams, FunctionalRun, MagnitudeMerge, StructuralParams};
use crate::paths;
use crate::types::{
    Stage, StyleData, BRAIN_SIZE, GRAYORDINATES_RES, HIGH_RES_MESH, LOW_RES_MESH, NONE,
};

/// One external program run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    /// Stage name, or the tool name for helper commands.
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    /// Set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(label: impl Into<String>, program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
        }
    }

    /// Append `--name=value`.
    pub fn opt(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.args.push(format!("--{name}={value}"));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.insert(key.to_string(), value.into());
        self
    }

    /// Value of `--name=...`, if present.
    pub fn opt_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{name}=");
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Inputs common to every stage of one participant.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub env: &'a PipelineEnv,
    pub opts: &'a ParticipantOptions,
    /// Bare participant label.
    pub label: &'a str,
}

impl<'a> StageContext<'a> {
    pub fn new(env: &'a PipelineEnv, opts: &'a ParticipantOptions, label: &'a str) -> Self {
        Self { env, opts, label }
    }

    fn subject(&self) -> String {
        paths::subject_id(self.label)
    }

    fn output(&self) -> String {
        self.opts.output_dir.display().to_string()
    }

    fn invocation(&self, stage: Stage) -> Invocation {
        Invocation::new(
            stage.as_str(),
            self.env.script(stage.script()).display().to_string(),
            &self.opts.output_dir,
        )
        .env("OMP_NUM_THREADS", self.opts.n_cpus.to_string())
    }

    /// Subject output file, e.g. `<out>/sub-01/T1w/T1w_acpc_dc_restore.nii.gz`.
    fn t1w_file(&self, name: &str) -> String {
        paths::t1w_dir(&self.opts.output_dir, self.label)
            .join(name)
            .display()
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Structural
// ---------------------------------------------------------------------------

pub fn pre_freesurfer(ctx: &StageContext<'_>, p: &StructuralParams) -> Invocation {
    let env = ctx.env;
    let t1res = p.t1_template_res;
    let t2res = p.t2_template_res;
    let t2 = if p.t2ws.is_empty() {
        NONE.to_string()
    } else {
        join_paths(&p.t2ws)
    };
    let fm = &p.fieldmap;

    ctx.invocation(Stage::PreFreeSurfer)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("t1", join_paths(&p.t1ws))
        .opt("t2", t2)
        .opt("t1template", env.template(&format!("MNI152_T1_{t1res}mm.nii.gz")))
        .opt("t1templatebrain", env.template(&format!("MNI152_T1_{t1res}mm_brain.nii.gz")))
        .opt("t1template2mm", env.template("MNI152_T1_2mm.nii.gz"))
        .opt("t2template", env.template(&format!("MNI152_T2_{t2res}mm.nii.gz")))
        .opt("t2templatebrain", env.template(&format!("MNI152_T2_{t2res}mm_brain.nii.gz")))
        .opt("t2template2mm", env.template("MNI152_T2_2mm.nii.gz"))
        .opt("t2samplespacing", &fm.t2samplespacing)
        .opt("templatemask", env.template(&format!("MNI152_T1_{t1res}mm_brain_mask.nii.gz")))
        .opt("template2mmmask", env.template("MNI152_T1_2mm_brain_mask_dil.nii.gz"))
        .opt("brainsize", BRAIN_SIZE)
        .opt("fnirtconfig", env.config_file("T1_2_MNI152_2mm.cnf"))
        .opt("fmapmag", &fm.fmapmag)
        .opt("fmapphase", &fm.fmapphase)
        .opt("fmapgeneralelectric", NONE)
        .opt("echodiff", &fm.echodiff)
        .opt("SEPhaseNeg", &fm.se_phase_neg)
        .opt("SEPhasePos", &fm.se_phase_pos)
        .opt("seechospacing", &fm.echospacing)
        .opt("seunwarpdir", &fm.seunwarpdir)
        .opt("t1samplespacing", &fm.t1samplespacing)
        .opt("unwarpdir", &fm.unwarpdir)
        .opt("gdcoeffs", &ctx.opts.gdcoeffs)
        .opt("avgrdcmethod", &fm.avgrdcmethod)
        .opt("topupconfig", env.config_file("b02b0.cnf"))
        .opt("processing-mode", p.style)
        .opt("printcom", "")
}

pub fn freesurfer(ctx: &StageContext<'_>, style: StyleData) -> Invocation {
    let subject_dir = paths::t1w_dir(&ctx.opts.output_dir, ctx.label);
    let inv = ctx
        .invocation(Stage::FreeSurfer)
        .env("NSLOTS", ctx.opts.n_cpus.to_string())
        .opt("subject", ctx.subject())
        .opt("subjectDIR", subject_dir.display())
        .opt("t1", ctx.t1w_file("T1w_acpc_dc_restore.nii.gz"))
        .opt("t1brain", ctx.t1w_file("T1w_acpc_dc_restore_brain.nii.gz"))
        .opt("processing-mode", style);
    match style {
        StyleData::Hcp => inv.opt("t2", ctx.t1w_file("T2w_acpc_dc_restore.nii.gz")),
        StyleData::Legacy => inv,
    }
}

pub fn post_freesurfer(ctx: &StageContext<'_>, style: StyleData) -> Invocation {
    let env = ctx.env;
    ctx.invocation(Stage::PostFreeSurfer)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("surfatlasdir", env.template("standard_mesh_atlases"))
        .opt("grayordinatesdir", env.template("91282_Greyordinates"))
        .opt("grayordinatesres", GRAYORDINATES_RES)
        .opt("hiresmesh", HIGH_RES_MESH)
        .opt("lowresmesh", LOW_RES_MESH)
        .opt("subcortgraylabels", env.config_file("FreeSurferSubcorticalLabelTableLut.txt"))
        .opt("freesurferlabels", env.config_file("FreeSurferAllLut.txt"))
        .opt(
            "refmyelinmaps",
            env.template("standard_mesh_atlases/Conte69.MyelinMap_BC.164k_fs_LR.dscalar.nii"),
        )
        .opt("regname", ctx.opts.coreg)
        .opt("processing-mode", style)
}

// ---------------------------------------------------------------------------
// Functional
// ---------------------------------------------------------------------------

pub fn fmri_volume(ctx: &StageContext<'_>, run: &FunctionalRun) -> Invocation {
    ctx.invocation(Stage::FmriVolume)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("fmriname", &run.fmriname)
        .opt("fmritcs", run.bold.display())
        .opt("fmriscout", &run.scout)
        .opt("SEPhaseNeg", &run.se_phase_neg)
        .opt("SEPhasePos", &run.se_phase_pos)
        .opt("fmapmag", NONE)
        .opt("fmapphase", NONE)
        .opt("fmapgeneralelectric", NONE)
        .opt("echospacing", &run.echospacing)
        .opt("echodiff", NONE)
        .opt("unwarpdir", &run.unwarpdir)
        .opt("fmrires", run.fmrires)
        .opt("dcmethod", &run.dcmethod)
        .opt("gdcoeffs", &ctx.opts.gdcoeffs)
        .opt("topupconfig", ctx.env.config_file("b02b0.cnf"))
        .opt("printcom", "")
        .opt("biascorrection", &run.biascorrection)
        .opt("mctype", "MCFLIRT")
        .opt("processing-mode", run.style)
        .opt("doslicetime", if run.doslicetime { "TRUE" } else { "FALSE" })
        .opt("slicetimerparams", &run.slicetimerparams)
}

pub fn fmri_surface(ctx: &StageContext<'_>, run: &FunctionalRun) -> Invocation {
    ctx.invocation(Stage::FmriSurface)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("fmriname", &run.fmriname)
        .opt("lowresmesh", LOW_RES_MESH)
        .opt("fmrires", run.fmrires)
        .opt("smoothingFWHM", run.fmrires)
        .opt("grayordinatesres", GRAYORDINATES_RES)
        .opt("regname", ctx.opts.coreg)
}

// ---------------------------------------------------------------------------
// Diffusion
// ---------------------------------------------------------------------------

/// Extra eddy arguments for one subject: the user's tokens, then the DWI
/// sidecar so eddy can read slice timing from it.
pub fn eddy_extra_args(opts: &ParticipantOptions, dwi: &DiffusionParams) -> Vec<String> {
    let mut tokens: Vec<String> = opts
        .diffusion
        .eddy_args
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if let Some(sidecar) = &dwi.sidecar {
        tokens.push(format!("--json={}", sidecar.display()));
    }
    tokens
}

fn with_eddy_flags(mut inv: Invocation, opts: &ParticipantOptions, dwi: &DiffusionParams) -> Invocation {
    if opts.diffusion.eddy_no_gpu {
        inv = inv.arg("--no-gpu");
    }
    for token in eddy_extra_args(opts, dwi) {
        inv = inv.opt("extra-eddy-arg", token);
    }
    inv
}

pub fn diffusion(ctx: &StageContext<'_>, dwi: &DiffusionParams) -> Invocation {
    let inv = ctx
        .invocation(Stage::DiffusionPreprocessing)
        .opt("posData", &dwi.pos_data)
        .opt("negData", &dwi.neg_data)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("echospacing", &dwi.echospacing)
        .opt("PEdir", dwi.pe_dir)
        .opt("gdcoeffs", &ctx.opts.gdcoeffs)
        .opt("dwiname", &ctx.opts.diffusion.output_name)
        .opt("printcom", "");
    with_eddy_flags(inv, ctx.opts, dwi)
}

pub fn diffusion_pre_eddy(ctx: &StageContext<'_>, dwi: &DiffusionParams) -> Invocation {
    ctx.invocation(Stage::DiffusionPreEddy)
        .opt("posData", &dwi.pos_data)
        .opt("negData", &dwi.neg_data)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("echospacing", &dwi.echospacing)
        .opt("PEdir", dwi.pe_dir)
        .opt("dwiname", &ctx.opts.diffusion.output_name)
        .opt("b0maxbval", ctx.opts.diffusion.b0maxbval)
        .opt("printcom", "")
}

pub fn diffusion_eddy(ctx: &StageContext<'_>, dwi: &DiffusionParams) -> Invocation {
    let inv = ctx
        .invocation(Stage::DiffusionEddy)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("dwiname", &ctx.opts.diffusion.output_name)
        .opt("printcom", "");
    with_eddy_flags(inv, ctx.opts, dwi)
}

pub fn diffusion_post_eddy(ctx: &StageContext<'_>) -> Invocation {
    let d = &ctx.opts.diffusion;
    let inv = ctx
        .invocation(Stage::DiffusionPostEddy)
        .opt("path", ctx.output())
        .opt("subject", ctx.subject())
        .opt("dwiname", &d.output_name)
        .opt("gdcoeffs", &ctx.opts.gdcoeffs)
        .opt("dof", d.dof)
        .opt("combine-data-flag", d.combine_data_flag)
        .opt("printcom", "");
    match &d.user_matrix {
        Some(matrix) => inv.opt("user-defined-matrix", matrix),
        None => inv,
    }
}

// ---------------------------------------------------------------------------
// Helper tools
// ---------------------------------------------------------------------------

/// `fslmerge -t <merged> <mag1> [<mag2>]`.
pub fn magnitude_merge(env: &PipelineEnv, merge: &MagnitudeMerge, cwd: &Path) -> Invocation {
    let mut inv = Invocation::new("fslmerge", &env.fslmerge, cwd)
        .arg("-t")
        .arg(merge.output.display().to_string());
    for input in &merge.inputs {
        inv = inv.arg(input.display().to_string());
    }
    inv
}

/// Runs from our own working directory; the dataset is only read.
pub fn bids_validator(env: &PipelineEnv, bids_dir: &Path) -> Invocation {
    Invocation::new("bids-validator", &env.validator, ".")
        .arg(bids_dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::StructuralFieldmap;
    use crate::types::{ProcessingMode, RegName};

    fn env() -> PipelineEnv {
        PipelineEnv {
            root: PathBuf::from("/opt/HCP"),
            templates: PathBuf::from("/opt/HCP/global/templates"),
            config: PathBuf::from("/opt/HCP/global/config"),
            subjects_dir: Some(PathBuf::from("/opt/freesurfer/subjects")),
            validator: "bids-validator".to_string(),
            fslmerge: "fslmerge".to_string(),
        }
    }

    fn opts() -> ParticipantOptions {
        let mut o = ParticipantOptions::new("/out");
        o.n_cpus = 4;
        o.processing_mode = ProcessingMode::Auto;
        o
    }

    fn dwi(sidecar: Option<&str>) -> DiffusionParams {
        DiffusionParams {
            dwis: vec![PathBuf::from("/ds/sub-01/dwi/sub-01_dir-AP_dwi.nii.gz")],
            pos_data: "/ds/sub-01/dwi/sub-01_dir-PA_dwi.nii.gz".to_string(),
            neg_data: "/ds/sub-01/dwi/sub-01_dir-AP_dwi.nii.gz".to_string(),
            pe_dir: 2,
            echospacing: "0.69".to_string(),
            sidecar: sidecar.map(PathBuf::from),
        }
    }

    #[test]
    fn pre_freesurfer_legacy_without_t2() {
        let env = env();
        let opts = opts();
        let ctx = StageContext::new(&env, &opts, "01");
        let params = StructuralParams {
            t1ws: vec![PathBuf::from("/ds/a_T1w.nii.gz"), PathBuf::from("/ds/b_T1w.nii.gz")],
            t2ws: Vec::new(),
            t1_template_res: "0.8",
            t2_template_res: "0.8",
            style: StyleData::Legacy,
            fieldmap: StructuralFieldmap::default(),
            magnitude_merge: None,
        };
        let inv = pre_freesurfer(&ctx, &params);

        assert_eq!(inv.label, "PreFreeSurfer");
        assert_eq!(inv.program, "/opt/HCP/PreFreeSurfer/PreFreeSurferPipeline.sh");
        assert_eq!(inv.cwd, PathBuf::from("/out"));
        assert_eq!(inv.env.get("OMP_NUM_THREADS").map(String::as_str), Some("4"));
        assert_eq!(inv.opt_value("subject"), Some("sub-01"));
        assert_eq!(inv.opt_value("t1"), Some("/ds/a_T1w.nii.gz@/ds/b_T1w.nii.gz"));
        assert_eq!(inv.opt_value("t2"), Some("NONE"));
        assert_eq!(
            inv.opt_value("t2template"),
            Some("/opt/HCP/global/templates/MNI152_T2_0.8mm.nii.gz")
        );
        assert_eq!(
            inv.opt_value("templatemask"),
            Some("/opt/HCP/global/templates/MNI152_T1_0.8mm_brain_mask.nii.gz")
        );
        assert_eq!(inv.opt_value("brainsize"), Some("150"));
        assert_eq!(inv.opt_value("fnirtconfig"), Some("/opt/HCP/global/config/T1_2_MNI152_2mm.cnf"));
        assert_eq!(inv.opt_value("processing-mode"), Some("LegacyStyleData"));
        assert_eq!(inv.opt_value("avgrdcmethod"), Some("NONE"));
        assert_eq!(inv.args.last().map(String::as_str), Some("--printcom="));
        assert_eq!(inv.args.len(), 30);
    }

    #[test]
    fn freesurfer_passes_t2_only_for_hcp_style() {
        let env = env();
        let opts = opts();
        let ctx = StageContext::new(&env, &opts, "01");

        let hcp = freesurfer(&ctx, StyleData::Hcp);
        assert_eq!(hcp.env.get("NSLOTS").map(String::as_str), Some("4"));
        assert_eq!(hcp.opt_value("subjectDIR"), Some("/out/sub-01/T1w"));
        assert_eq!(hcp.opt_value("t2"), Some("/out/sub-01/T1w/T2w_acpc_dc_restore.nii.gz"));

        let legacy = freesurfer(&ctx, StyleData::Legacy);
        assert_eq!(legacy.opt_value("t2"), None);
        assert_eq!(legacy.opt_value("processing-mode"), Some("LegacyStyleData"));
    }

    #[test]
    fn post_freesurfer_constants() {
        let env = env();
        let mut opts = opts();
        opts.coreg = RegName::FreeSurfer;
        let ctx = StageContext::new(&env, &opts, "01");
        let inv = post_freesurfer(&ctx, StyleData::Hcp);
        assert_eq!(inv.opt_value("grayordinatesres"), Some("2"));
        assert_eq!(inv.opt_value("hiresmesh"), Some("164"));
        assert_eq!(inv.opt_value("lowresmesh"), Some("32"));
        assert_eq!(inv.opt_value("regname"), Some("FS"));
        assert_eq!(
            inv.opt_value("refmyelinmaps"),
            Some("/opt/HCP/global/templates/standard_mesh_atlases/Conte69.MyelinMap_BC.164k_fs_LR.dscalar.nii")
        );
    }

    #[test]
    fn fmri_stages() {
        let env = env();
        let opts = opts();
        let ctx = StageContext::new(&env, &opts, "01");
        let run = FunctionalRun {
            bold: PathBuf::from("/ds/sub-01/func/sub-01_task-rest_bold.nii.gz"),
            fmriname: "task-rest_bold".to_string(),
            scout: NONE.to_string(),
            se_phase_neg: NONE.to_string(),
            se_phase_pos: NONE.to_string(),
            echospacing: NONE.to_string(),
            unwarpdir: NONE.to_string(),
            dcmethod: NONE.to_string(),
            biascorrection: NONE.to_string(),
            style: StyleData::Legacy,
            fmrires: "2",
            doslicetime: false,
            slicetimerparams: String::new(),
            slice_timing: None,
        };

        let vol = fmri_volume(&ctx, &run);
        assert_eq!(vol.opt_value("fmritcs"), Some("/ds/sub-01/func/sub-01_task-rest_bold.nii.gz"));
        assert_eq!(vol.opt_value("mctype"), Some("MCFLIRT"));
        assert_eq!(vol.opt_value("doslicetime"), Some("FALSE"));
        assert_eq!(vol.opt_value("slicetimerparams"), Some(""));
        assert_eq!(vol.opt_value("topupconfig"), Some("/opt/HCP/global/config/b02b0.cnf"));

        let surf = fmri_surface(&ctx, &run);
        assert_eq!(surf.opt_value("smoothingFWHM"), Some("2"));
        assert_eq!(surf.opt_value("regname"), Some("MSMSulc"));
        assert_eq!(surf.args.len(), 8);
    }

    #[test]
    fn eddy_flags_follow_base_arguments() {
        let env = env();
        let mut opts = opts();
        opts.diffusion.eddy_no_gpu = true;
        opts.diffusion.eddy_args = "--repol  --mporder=6".to_string();
        let ctx = StageContext::new(&env, &opts, "01");
        let inv = diffusion_eddy(&ctx, &dwi(Some("/ds/sub-01/dwi/sub-01_dir-AP_dwi.json")));

        let tail: Vec<&str> = inv.args[4..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--no-gpu",
                "--extra-eddy-arg=--repol",
                "--extra-eddy-arg=--mporder=6",
                "--extra-eddy-arg=--json=/ds/sub-01/dwi/sub-01_dir-AP_dwi.json",
            ]
        );
    }

    #[test]
    fn eddy_args_do_not_accumulate_across_subjects() {
        let opts = opts();
        let first = eddy_extra_args(&opts, &dwi(Some("/ds/a.json")));
        let second = eddy_extra_args(&opts, &dwi(Some("/ds/b.json")));
        assert_eq!(first, vec!["--json=/ds/a.json"]);
        assert_eq!(second, vec!["--json=/ds/b.json"]);
    }

    #[test]
    fn diffusion_substages() {
        let env = env();
        let mut opts = opts();
        opts.diffusion.user_matrix = Some("/mats/identity.mat".to_string());
        let ctx = StageContext::new(&env, &opts, "01");

        let pre = diffusion_pre_eddy(&ctx, &dwi(None));
        assert_eq!(pre.opt_value("b0maxbval"), Some("50"));
        assert_eq!(pre.opt_value("PEdir"), Some("2"));
        assert_eq!(pre.opt_value("echospacing"), Some("0.69"));

        let post = diffusion_post_eddy(&ctx);
        assert_eq!(post.opt_value("dof"), Some("6"));
        assert_eq!(post.opt_value("combine-data-flag"), Some("1"));
        assert_eq!(post.opt_value("user-defined-matrix"), Some("/mats/identity.mat"));

        let full = diffusion(&ctx, &dwi(None));
        assert_eq!(full.opt_value("dwiname"), Some("Diffusion"));
        assert!(!full.args.iter().any(|a| a == "--no-gpu"));
    }

    #[test]
    fn fslmerge_and_validator() {
        let env = env();
        let merge = MagnitudeMerge {
            output: PathBuf::from("/out/tmp/01/magfile.nii.gz"),
            inputs: vec![PathBuf::from("/ds/m1.nii.gz")],
        };
        let inv = magnitude_merge(&env, &merge, Path::new("/out"));
        assert_eq!(inv.to_string(), "fslmerge -t /out/tmp/01/magfile.nii.gz /ds/m1.nii.gz");
        assert!(inv.env.is_empty());

        let v = bids_validator(&env, Path::new("/ds"));
        assert_eq!(v.args, vec!["/ds"]);
        assert_eq!(v.cwd, PathBuf::from("."));
    }
}
