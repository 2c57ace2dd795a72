use crate::error::{HcpError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Output layout
// ---------------------------------------------------------------------------

pub const TMP_DIR: &str = "tmp";
pub const T1W_DIR: &str = "T1w";
pub const MAGNITUDE_MERGE_FILE: &str = "magfile.nii.gz";

/// FreeSurfer subjects the surface pipeline expects next to each subject.
pub const FREESURFER_SUPPORT_SUBJECTS: &[&str] = &["fsaverage", "lh.EC_average", "rh.EC_average"];

pub fn subject_id(label: &str) -> String {
    format!("sub-{label}")
}

/// Scratch space for a participant: `<out>/tmp/<label>`.
pub fn tmp_dir(output: &Path, label: &str) -> PathBuf {
    output.join(TMP_DIR).join(label)
}

pub fn magnitude_merge_path(output: &Path, label: &str) -> PathBuf {
    tmp_dir(output, label).join(MAGNITUDE_MERGE_FILE)
}

pub fn slice_timing_path(output: &Path, label: &str, fmriname: &str) -> PathBuf {
    tmp_dir(output, label).join(format!("{fmriname}_st.txt"))
}

/// `<out>/sub-<label>/T1w`, the FreeSurfer subjects directory.
pub fn t1w_dir(output: &Path, label: &str) -> PathBuf {
    output.join(subject_id(label)).join(T1W_DIR)
}

// ---------------------------------------------------------------------------
// Label validation
// ---------------------------------------------------------------------------

static LABEL_RE: OnceLock<Regex> = OnceLock::new();

fn label_re() -> &'static Regex {
    LABEL_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap())
}

/// Accept `01` or `sub-01` and return the bare label.
pub fn normalize_label(raw: &str) -> Result<String> {
    let label = raw.strip_prefix("sub-").unwrap_or(raw);
    if !label_re().is_match(label) {
        return Err(HcpError::InvalidLabel(raw.to_string()));
    }
    Ok(label.to_string())
}

/// Session labels follow the same alphabet; a `ses-` prefix is tolerated.
pub fn normalize_session(raw: &str) -> Result<String> {
    let label = raw.strip_prefix("ses-").unwrap_or(raw);
    if !label_re().is_match(label) {
        return Err(HcpError::InvalidSession(raw.to_string()));
    }
    Ok(label.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
