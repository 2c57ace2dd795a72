//! Synthetic BIDS datasets for unit tests.

use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::bids::BidsLayout;
use crate::nifti::tests::write_nifti;

pub(crate) struct Dataset {
    dir: TempDir,
}

impl Dataset {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("dataset_description.json"),
            r#"{"Name": "test", "BIDSVersion": "1.8.0"}"#,
        )
        .unwrap();
        Self { dir }
    }

    /// Canonical dataset root, matching the paths the layout reports.
    pub(crate) fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    pub(crate) fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// 3D image with the given voxel size.
    pub(crate) fn anat(&self, rel: &str, zoom: f32) -> PathBuf {
        self.image(rel, &[176, 256, 256], &[zoom, zoom, zoom])
    }

    pub(crate) fn image(&self, rel: &str, shape: &[i16], zooms: &[f32]) -> PathBuf {
        let path = self.path(rel);
        write_nifti(&path, shape, zooms);
        path
    }

    pub(crate) fn json(&self, rel: &str, value: Value) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
        path
    }

    pub(crate) fn touch(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    pub(crate) fn layout(&self) -> BidsLayout {
        BidsLayout::index(self.dir.path()).unwrap()
    }

    pub(crate) fn out(&self) -> PathBuf {
        let out = self.root().join("derivatives").join("hcp");
        std::fs::create_dir_all(&out).unwrap();
        out
    }
}
