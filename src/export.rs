use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::languages::Language;

/// A solution ready to be saved: `Solution.<ext>` with the code as bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub fn export_solution(language: Language, code: &str) -> ExportedFile {
    ExportedFile {
        file_name: format!("Solution.{}", language.extension()),
        bytes: code.as_bytes().to_vec(),
    }
}

/// Write the exported file into `dir`, returning its path
pub fn write_solution(dir: &Path, file: &ExportedFile) -> Result<PathBuf> {
    let path = dir.join(&file.file_name);
    std::fs::write(&path, &file.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
