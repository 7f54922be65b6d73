use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Replace the orchestrator config file at `path` with `contents`.
///
/// The YAML is staged in a hidden sibling file, flushed to disk and renamed
/// over `path`, so a reader sees either the previous config or the new one.
/// Missing parent directories are created. On failure the staged file is
/// removed and any existing config is left untouched.
pub fn write_config_file(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => {
            std::fs::create_dir_all(p)?;
            p
        }
        _ => Path::new("."),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".workloadctl-")
        .suffix(".yaml.tmp")
        .tempfile_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}
