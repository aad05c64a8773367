//! Temp-file-then-rename atomic write, shared by issue/session/state writers.

use std::path::Path;

use agenttree_core::{Error, Result};

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| Error::Fatal(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    use std::io::Write;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| Error::Fatal(e.to_string()))?;
    Ok(())
}
