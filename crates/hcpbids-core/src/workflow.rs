//! Participant-level analysis: validate, select subjects, plan and run.

use serde::Serialize;
use std::path::PathBuf;

use crate::bids::BidsLayout;
use crate::config::PipelineEnv;
use crate::error::{HcpError, Result};
use crate::options::ParticipantOptions;
use crate::paths;
use crate::plan::{plan_participant, Plan};
use crate::runner::{CommandRunner, Executor};
use crate::stages;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub bids_dir: PathBuf,
    /// Labels as given on the command line; empty means every subject.
    pub participant_labels: Vec<String>,
    pub skip_validation: bool,
    /// Build plans without running anything.
    pub dry_run: bool,
}

/// Subjects to analyse: the requested labels (deduplicated, `sub-` prefix
/// tolerated) or every `sub-*` directory in the dataset.
pub fn select_subjects(layout: &BidsLayout, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return layout.subjects();
    }
    let mut labels: Vec<String> = Vec::new();
    for raw in requested {
        let label = paths::normalize_label(raw)?;
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    Ok(labels)
}

/// Run the BIDS validator on the dataset; a failing validation is an error.
pub fn validate_dataset(
    env: &PipelineEnv,
    request: &AnalysisRequest,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let invocation = stages::bids_validator(env, &request.bids_dir);
    tracing::info!("{invocation}");
    runner.run(&invocation)
}

/// Plans for every subject, without executing anything.
pub fn plan_participants(
    layout: &BidsLayout,
    env: &PipelineEnv,
    opts: &ParticipantOptions,
    subjects: &[String],
) -> Result<Vec<Plan>> {
    subjects
        .iter()
        .map(|label| plan_participant(layout, env, opts, label))
        .collect()
}

/// The whole participant-level analysis. Each subject is planned and then
/// executed before the next one is looked at. Returns the plans, executed
/// or not.
pub fn run_participant_level(
    request: &AnalysisRequest,
    env: &PipelineEnv,
    opts: &ParticipantOptions,
    runner: &dyn CommandRunner,
) -> Result<Vec<Plan>> {
    opts.check()?;
    if !request.bids_dir.is_dir() {
        return Err(HcpError::DatasetNotFound(request.bids_dir.clone()));
    }

    if request.skip_validation {
        tracing::debug!("skipping BIDS validation");
    } else if !request.dry_run {
        validate_dataset(env, request, runner)?;
    }

    let layout = BidsLayout::index(&request.bids_dir)?;
    let subjects = select_subjects(&layout, &request.participant_labels)?;
    tracing::info!(count = subjects.len(), "participants selected");

    if request.dry_run {
        return plan_participants(&layout, env, opts, &subjects);
    }

    let executor = Executor::new(runner);
    let mut plans = Vec::with_capacity(subjects.len());
    for label in &subjects {
        let plan = plan_participant(&layout, env, opts, label)?;
        tracing::info!(subject = %label, commands = plan.commands().count(), "running participant");
        executor.execute(&plan)?;
        plans.push(plan);
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Dataset;
    use crate::runner::RecordingRunner;
    use crate::types::{ProcessingMode, Stage, UnwarpDir};

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

    fn dataset() -> Dataset {
        let ds = Dataset::new();
        for sub in ["01", "02"] {
            ds.anat(&format!("sub-{sub}/anat/sub-{sub}_T1w.nii.gz"), 1.0);
        }
        ds
    }

    fn request(ds: &Dataset) -> AnalysisRequest {
        AnalysisRequest {
            bids_dir: ds.root(),
            participant_labels: Vec::new(),
            skip_validation: false,
            dry_run: false,
        }
    }

    fn legacy(ds: &Dataset) -> ParticipantOptions {
        let mut o = ParticipantOptions::new(ds.out());
        o.processing_mode = ProcessingMode::Legacy;
        o.stages = vec![Stage::PreFreeSurfer, Stage::PostFreeSurfer];
        o
    }

    #[test]
    fn subjects_from_labels_or_directories() {
        let ds = dataset();
        let layout = ds.layout();
        assert_eq!(select_subjects(&layout, &[]).unwrap(), vec!["01", "02"]);
        let requested = vec!["sub-02".to_string(), "02".to_string(), "01".to_string()];
        assert_eq!(select_subjects(&layout, &requested).unwrap(), vec!["02", "01"]);
        assert!(matches!(
            select_subjects(&layout, &["a/b".to_string()]),
            Err(HcpError::InvalidLabel(_))
        ));
    }

    #[test]
    fn validates_then_runs_each_subject() {
        let ds = dataset();
        let runner = RecordingRunner::new();
        let plans = run_participant_level(&request(&ds), &env(), &legacy(&ds), &runner).unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(
            runner.labels(),
            vec!["bids-validator", "PreFreeSurfer", "PostFreeSurfer", "PreFreeSurfer", "PostFreeSurfer"]
        );
        assert_eq!(runner.calls()[0].args, vec![ds.root().display().to_string()]);
    }

    #[test]
    fn skip_validation_and_label_filter() {
        let ds = dataset();
        let mut req = request(&ds);
        req.skip_validation = true;
        req.participant_labels = vec!["02".to_string()];
        let runner = RecordingRunner::new();
        run_participant_level(&req, &env(), &legacy(&ds), &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].opt_value("subject"), Some("sub-02"));
    }

    #[test]
    fn failed_validation_stops_the_run() {
        let ds = dataset();
        let runner = RecordingRunner::failing_on("bids-validator");
        let err = run_participant_level(&request(&ds), &env(), &legacy(&ds), &runner).unwrap_err();
        assert!(matches!(err, HcpError::NonZeroExit { .. }));
        assert_eq!(runner.labels(), vec!["bids-validator"]);
    }

    #[test]
    fn option_check_runs_before_anything() {
        let ds = dataset();
        let mut opts = legacy(&ds);
        opts.gdcoeffs = "/coeffs.grad".to_string();
        opts.anat_unwarpdir = UnwarpDir::None;
        let runner = RecordingRunner::new();
        let err = run_participant_level(&request(&ds), &env(), &opts, &runner).unwrap_err();
        assert!(matches!(err, HcpError::UnwarpDirRequired));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_dataset_is_reported_not_created() {
        let ds = dataset();
        let mut req = request(&ds);
        req.bids_dir = ds.path("bids-typo");
        let runner = RecordingRunner::new();
        let err = run_participant_level(&req, &env(), &legacy(&ds), &runner).unwrap_err();
        assert!(matches!(err, HcpError::DatasetNotFound(ref p) if p == &req.bids_dir));
        assert!(!req.bids_dir.exists());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn dry_run_executes_nothing() {
        let ds = dataset();
        let mut req = request(&ds);
        req.dry_run = true;
        let runner = RecordingRunner::new();
        let plans = run_participant_level(&req, &env(), &legacy(&ds), &runner).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].labels(), vec!["PreFreeSurfer", "PostFreeSurfer"]);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn earlier_subjects_run_before_a_later_one_fails() {
        let ds = dataset();
        // sub-03 has no T1w.
        ds.touch("sub-03/anat/notes.txt");
        let mut req = request(&ds);
        req.skip_validation = true;
        let runner = RecordingRunner::new();
        let err = run_participant_level(&req, &env(), &legacy(&ds), &runner).unwrap_err();
        assert!(matches!(err, HcpError::NoT1w(ref s) if s == "03"));
        assert_eq!(runner.calls().len(), 4);
    }
}
