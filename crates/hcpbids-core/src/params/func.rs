use serde::Serialize;
use std::path::{Path, PathBuf};

use super::slice_timing::{format_offsets, slice_timing_offsets};
use super::{axis_letters, format_float, is_negative_direction, split_epi_polarity};
use crate::bids::BidsLayout;
use crate::error::{HcpError, Result};
use crate::options::ParticipantOptions;
use crate::paths;
use crate::types::{ProcessingMode, StyleData, FMRI_RES, NONE};

/// A slice-timing file to write before fMRIVolume runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceTimingFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Everything fMRIVolume and fMRISurface need for one BOLD run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionalRun {
    pub bold: PathBuf,
    pub fmriname: String,
    pub scout: String,
    pub se_phase_neg: String,
    pub se_phase_pos: String,
    pub echospacing: String,
    pub unwarpdir: String,
    pub dcmethod: String,
    pub biascorrection: String,
    pub style: StyleData,
    pub fmrires: &'static str,
    pub doslicetime: bool,
    /// Empty unless slice timing correction is on.
    pub slicetimerparams: String,
    pub slice_timing: Option<SliceTimingFile>,
}

/// Run name for a BOLD file: everything after the subject entity, without
/// extensions. `sub-01_task-rest_run-1_bold.nii.gz` gives `task-rest_run-1_bold`.
pub fn fmri_name(bold: &Path) -> Result<String> {
    let invalid = || HcpError::InvalidRunName(bold.to_path_buf());
    let file_name = bold.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let (_, rest) = file_name.split_once('_').ok_or_else(invalid)?;
    let name = rest.split('.').next().unwrap_or_default();
    if name.is_empty() {
        return Err(invalid());
    }
    Ok(name.to_string())
}

pub fn derive_functional(
    layout: &BidsLayout,
    subject: &str,
    opts: &ParticipantOptions,
) -> Result<Vec<FunctionalRun>> {
    layout
        .images(subject, "bold", &opts.sessions)
        .into_iter()
        .map(|bold| derive_run(layout, subject, opts, bold))
        .collect()
}

fn derive_run(
    layout: &BidsLayout,
    subject: &str,
    opts: &ParticipantOptions,
    bold: PathBuf,
) -> Result<FunctionalRun> {
    let fmriname = fmri_name(&bold)?;
    let scout = scout_for(&bold);
    let meta = layout.metadata(&bold)?;

    let fieldmaps = layout.fieldmaps(&bold)?;
    let topup = opts.processing_mode.allows_extras()
        && fieldmaps.len() == 2
        && fieldmaps.iter().all(|f| f.is_epi());

    let mut run = FunctionalRun {
        fmriname,
        scout,
        se_phase_neg: NONE.to_string(),
        se_phase_pos: NONE.to_string(),
        echospacing: NONE.to_string(),
        unwarpdir: NONE.to_string(),
        dcmethod: NONE.to_string(),
        biascorrection: NONE.to_string(),
        style: StyleData::Legacy,
        fmrires: FMRI_RES,
        doslicetime: false,
        slicetimerparams: String::new(),
        slice_timing: None,
        bold,
    };

    if topup {
        let epis: Vec<&Path> = fieldmaps.iter().map(|f| f.primary()).collect();
        let (neg, pos) = split_epi_polarity(layout, &epis, &run.bold)?;
        run.se_phase_neg = neg.display().to_string();
        run.se_phase_pos = pos.display().to_string();
        run.echospacing = format_float(meta.f64("EffectiveEchoSpacing")?);
        run.unwarpdir = bold_unwarpdir(meta.str("PhaseEncodingDirection")?);
        run.dcmethod = "TOPUP".to_string();
        run.biascorrection = "SEBASED".to_string();
        run.style = StyleData::Hcp;
    } else if opts.processing_mode == ProcessingMode::Hcp {
        return Err(HcpError::NoBoldFieldmaps(run.bold));
    }

    if opts.doslicetime {
        run.doslicetime = true;
        run.style = StyleData::Legacy;

        let timing = meta.f64_list("SliceTiming")?;
        let tr = meta.f64("RepetitionTime")?;
        let reverse = meta
            .opt_str("SliceEncodingDirection")?
            .is_some_and(is_negative_direction);
        let offsets = slice_timing_offsets(&timing, reverse).ok_or_else(|| {
            HcpError::InvalidMetadata {
                field: "SliceTiming".to_string(),
                path: run.bold.clone(),
                reason: "needs at least two distinct slice times".to_string(),
            }
        })?;

        let path = paths::slice_timing_path(&opts.output_dir, subject, &run.fmriname);
        run.slicetimerparams = format!("--repeat={}@--tcustom={}", format_float(tr), path.display());
        run.slice_timing = Some(SliceTimingFile {
            path,
            contents: format_offsets(&offsets),
        });
    }

    Ok(run)
}

fn scout_for(bold: &Path) -> String {
    let candidate = PathBuf::from(bold.display().to_string().replace("_bold", "_sbref"));
    if candidate.exists() {
        candidate.display().to_string()
    } else {
        NONE.to_string()
    }
}

/// `j-` becomes `-y`; the fMRI pipeline puts the sign first.
fn bold_unwarpdir(direction: &str) -> String {
    let axes = axis_letters(direction);
    let mut chars = axes.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(axis), Some(_), None) => format!("-{axis}"),
        _ => axes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Dataset;
    use serde_json::json;

    fn opts(ds: &Dataset, mode: ProcessingMode) -> ParticipantOptions {
        let mut o = ParticipantOptions::new(ds.out());
        o.processing_mode = mode;
        o
    }

    fn bold_with_topup(ds: &Dataset) -> PathBuf {
        let bold = ds.image(
            "sub-01/func/sub-01_task-rest_bold.nii.gz",
            &[104, 90, 72, 10],
            &[2.0, 2.0, 2.0, 0.72],
        );
        ds.json(
            "sub-01/func/sub-01_task-rest_bold.json",
            json!({"EffectiveEchoSpacing": 0.00058, "PhaseEncodingDirection": "j-",
                   "RepetitionTime": 0.72, "SliceTiming": [0.0, 0.36, 0.18, 0.54]}),
        );
        for (dir, pe) in [("AP", "j-"), ("PA", "j")] {
            ds.anat(&format!("sub-01/fmap/sub-01_dir-{dir}_epi.nii.gz"), 2.0);
            ds.json(
                &format!("sub-01/fmap/sub-01_dir-{dir}_epi.json"),
                json!({"IntendedFor": "func/sub-01_task-rest_bold.nii.gz",
                       "PhaseEncodingDirection": pe}),
            );
        }
        bold
    }

    #[test]
    fn run_names() {
        assert_eq!(
            fmri_name(Path::new("/ds/sub-01/func/sub-01_task-rest_run-1_bold.nii.gz")).unwrap(),
            "task-rest_run-1_bold"
        );
        assert_eq!(
            fmri_name(Path::new("/ds/sub-01/ses-2/func/sub-01_ses-2_task-motor_bold.nii")).unwrap(),
            "ses-2_task-motor_bold"
        );
        assert!(fmri_name(Path::new("/ds/bold.nii.gz")).is_err());
        assert!(fmri_name(Path::new("/ds/sub-01_.nii.gz")).is_err());
    }

    #[test]
    fn unwarp_direction_puts_sign_first() {
        assert_eq!(bold_unwarpdir("j-"), "-y");
        assert_eq!(bold_unwarpdir("i"), "x");
        assert_eq!(bold_unwarpdir("k-"), "-z");
    }

    #[test]
    fn spin_echo_pair_enables_topup() {
        let ds = Dataset::new();
        let bold = bold_with_topup(&ds);
        let runs = derive_functional(&ds.layout(), "01", &opts(&ds, ProcessingMode::Hcp)).unwrap();

        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.bold, bold);
        assert_eq!(run.fmriname, "task-rest_bold");
        assert_eq!(run.scout, "NONE");
        assert_eq!(run.se_phase_neg, ds.path("sub-01/fmap/sub-01_dir-AP_epi.nii.gz").display().to_string());
        assert_eq!(run.se_phase_pos, ds.path("sub-01/fmap/sub-01_dir-PA_epi.nii.gz").display().to_string());
        assert_eq!(run.echospacing, "0.00058");
        assert_eq!(run.unwarpdir, "-y");
        assert_eq!(run.dcmethod, "TOPUP");
        assert_eq!(run.biascorrection, "SEBASED");
        assert_eq!(run.style, StyleData::Hcp);
        assert_eq!(run.fmrires, "2");
        assert!(!run.doslicetime);
        assert!(run.slicetimerparams.is_empty());
    }

    #[test]
    fn scout_is_used_when_present() {
        let ds = Dataset::new();
        bold_with_topup(&ds);
        let sbref = ds.image(
            "sub-01/func/sub-01_task-rest_sbref.nii.gz",
            &[104, 90, 72],
            &[2.0, 2.0, 2.0],
        );
        let runs = derive_functional(&ds.layout(), "01", &opts(&ds, ProcessingMode::Hcp)).unwrap();
        assert_eq!(runs[0].scout, sbref.display().to_string());
    }

    #[test]
    fn hcp_mode_requires_fieldmaps() {
        let ds = Dataset::new();
        ds.image("sub-01/func/sub-01_task-rest_bold.nii.gz", &[64, 64, 30, 5], &[3.0, 3.0, 3.0, 2.0]);
        let err = derive_functional(&ds.layout(), "01", &opts(&ds, ProcessingMode::Hcp)).unwrap_err();
        assert!(matches!(err, HcpError::NoBoldFieldmaps(_)));
        assert!(err.to_string().contains("--processing_mode"));
    }

    #[test]
    fn auto_mode_without_fieldmaps_is_legacy() {
        let ds = Dataset::new();
        ds.image("sub-01/func/sub-01_task-rest_bold.nii.gz", &[64, 64, 30, 5], &[3.0, 3.0, 3.0, 2.0]);
        let runs = derive_functional(&ds.layout(), "01", &opts(&ds, ProcessingMode::Auto)).unwrap();
        let run = &runs[0];
        assert_eq!(run.style, StyleData::Legacy);
        assert_eq!(run.dcmethod, "NONE");
        assert_eq!(run.echospacing, "NONE");
        assert_eq!(run.se_phase_neg, "NONE");
    }

    #[test]
    fn legacy_mode_ignores_spin_echo_pair() {
        let ds = Dataset::new();
        bold_with_topup(&ds);
        let runs = derive_functional(&ds.layout(), "01", &opts(&ds, ProcessingMode::Legacy)).unwrap();
        assert_eq!(runs[0].dcmethod, "NONE");
        assert_eq!(runs[0].style, StyleData::Legacy);
    }

    #[test]
    fn slice_timing_writes_custom_file() {
        let ds = Dataset::new();
        bold_with_topup(&ds);
        let mut o = opts(&ds, ProcessingMode::Hcp);
        o.doslicetime = true;
        let runs = derive_functional(&ds.layout(), "01", &o).unwrap();
        let run = &runs[0];

        let expected = ds.out().join("tmp/01/task-rest_bold_st.txt");
        assert!(run.doslicetime);
        assert_eq!(run.style, StyleData::Legacy);
        assert_eq!(run.dcmethod, "TOPUP");
        assert_eq!(
            run.slicetimerparams,
            format!("--repeat=0.72@--tcustom={}", expected.display())
        );
        let file = run.slice_timing.as_ref().unwrap();
        assert_eq!(file.path, expected);
        assert_eq!(file.contents, "0.375000\n-0.125000\n0.125000\n-0.375000\n");
    }

    #[test]
    fn negative_slice_direction_reverses_timing() {
        let ds = Dataset::new();
        bold_with_topup(&ds);
        ds.json(
            "sub-01/func/sub-01_task-rest_bold.json",
            json!({"EffectiveEchoSpacing": 0.00058, "PhaseEncodingDirection": "j-",
                   "RepetitionTime": 0.72, "SliceTiming": [0.0, 0.36, 0.18, 0.54],
                   "SliceEncodingDirection": "k-"}),
        );
        let mut o = opts(&ds, ProcessingMode::Hcp);
        o.doslicetime = true;
        let runs = derive_functional(&ds.layout(), "01", &o).unwrap();

        let file = runs[0].slice_timing.as_ref().unwrap();
        assert_eq!(file.contents, "-0.375000\n0.125000\n-0.125000\n0.375000\n");
    }

    #[test]
    fn slice_timing_requires_metadata() {
        let ds = Dataset::new();
        ds.image("sub-01/func/sub-01_task-rest_bold.nii.gz", &[64, 64, 30, 5], &[3.0, 3.0, 3.0, 2.0]);
        ds.json("sub-01/func/sub-01_task-rest_bold.json", json!({"RepetitionTime": 2.0}));
        let mut o = opts(&ds, ProcessingMode::Legacy);
        o.doslicetime = true;
        let err = derive_functional(&ds.layout(), "01", &o).unwrap_err();
        assert!(matches!(err, HcpError::MissingMetadata { ref field, .. } if field == "SliceTiming"));
    }

    #[test]
    fn bold_runs_follow_session_filter_without_fallback() {
        let ds = Dataset::new();
        ds.image("sub-01/ses-a/func/sub-01_ses-a_task-rest_bold.nii.gz", &[64, 64, 30, 5], &[3.0, 3.0, 3.0, 2.0]);
        let mut o = opts(&ds, ProcessingMode::Legacy);
        o.sessions = vec!["b".to_string()];
        assert!(derive_functional(&ds.layout(), "01", &o).unwrap().is_empty());
        o.sessions = vec!["a".to_string()];
        assert_eq!(derive_functional(&ds.layout(), "01", &o).unwrap().len(), 1);
    }
}
