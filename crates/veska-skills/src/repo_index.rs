use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use veska_core::error::{Result, VeskaError};

const SKIP_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "go", "java", "c", "cc", "cpp", "h", "rb", "sh", "md", "toml",
    "yaml", "yml", "json",
];

const MAX_FILES: usize = 2_000;

#[derive(Debug, Clone, Serialize)]
pub struct RepoFile {
    pub rel_path: String,
    pub size_bytes: u64,
}

/// Walk a repository and collect its source files, vendored and generated
/// trees excluded.
pub fn index_repo(root: &Path) -> Result<Vec<RepoFile>> {
    if !root.is_dir() {
        return Err(VeskaError::NotFound(format!(
            "repository root {}",
            root.display()
        )));
    }
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files.truncate(MAX_FILES);
    Ok(files)
}

fn walk(root: &Path, dir: &Path, files: &mut Vec<RepoFile>) -> Result<()> {
    if files.len() >= MAX_FILES {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if SKIP_DIRS.contains(&name.as_str()) || name.starts_with('.') {
                continue;
            }
            walk(root, &path, files)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
        {
            let rel_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(RepoFile {
                rel_path,
                size_bytes,
            });
            if files.len() >= MAX_FILES {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Compact structural overview: file counts per top-level directory and per
/// extension.
pub fn summarize_structure(files: &[RepoFile]) -> String {
    let mut by_dir: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_ext: BTreeMap<String, usize> = BTreeMap::new();

    for file in files {
        let top = PathBuf::from(&file.rel_path)
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .unwrap_or_default();
        *by_dir.entry(top).or_default() += 1;
        if let Some(ext) = PathBuf::from(&file.rel_path)
            .extension()
            .map(|e| e.to_string_lossy().to_string())
        {
            *by_ext.entry(ext).or_default() += 1;
        }
    }

    let dirs: Vec<String> = by_dir
        .iter()
        .map(|(dir, count)| format!("{} ({} files)", dir, count))
        .collect();
    let exts: Vec<String> = by_ext
        .iter()
        .map(|(ext, count)| format!(".{}: {}", ext, count))
        .collect();

    format!(
        "{} files\nTop-level: {}\nLanguages: {}",
        files.len(),
        dirs.join(", "),
        exts.join(", ")
    )
}
