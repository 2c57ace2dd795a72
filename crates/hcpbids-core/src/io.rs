use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively copy `src` to `dst` unless `dst` already exists.
/// Returns true if anything was copied.
pub fn copy_tree_if_missing(src: &Path, dst: &Path) -> Result<bool> {
    if dst.exists() {
        return Ok(false);
    }
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tmp/01/rest_st.txt");
        atomic_write(&path, b"0.5\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.5\n");
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("fsaverage");
        std::fs::create_dir_all(src.join("surf")).unwrap();
        std::fs::write(src.join("surf/lh.white"), b"mesh").unwrap();
        let dst = dir.path().join("out/fsaverage");

        assert!(copy_tree_if_missing(&src, &dst).unwrap());
        assert_eq!(std::fs::read(dst.join("surf/lh.white")).unwrap(), b"mesh");
    }

    #[test]
    fn copy_tree_skips_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("lh.EC_average");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("label"), b"new").unwrap();
        let dst = dir.path().join("existing");
        std::fs::create_dir_all(&dst).unwrap();

        assert!(!copy_tree_if_missing(&src, &dst).unwrap());
        assert!(!dst.join("label").exists());
    }
}
