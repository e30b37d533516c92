use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedFile {
    pub name: String,
    pub bytes: u64,
    pub destination: PathBuf,
}

#[derive(Debug, Default)]
pub struct PlacementReport {
    pub source_missing: bool,
    pub copied: Vec<PlacedFile>,
    pub failed: Vec<(String, String)>,
}

impl PlacementReport {
    pub fn is_empty(&self) -> bool {
        self.copied.is_empty() && self.failed.is_empty()
    }
}

/// Copies every `*.{suffix}` file from `source` into `destination`.
///
/// Per-file failures are collected in the report; files copied before a failure stay in
/// place. Only failing to create `destination` or list `source` is an error.
pub fn place_assets(source: &Path, destination: &Path, suffix: &str) -> Result<PlacementReport> {
    fs::create_dir_all(destination)
        .with_context(|| format!("create asset directory {}", destination.display()))?;

    let mut report = PlacementReport::default();
    if !source.is_dir() {
        report.source_missing = true;
        return Ok(report);
    }

    for path in matching_files(source, &[suffix])? {
        let name = file_name(&path);
        let target = destination.join(&name);
        tracing::debug!("copying {} -> {}", path.display(), target.display());
        match copy_preserving(&path, &target) {
            Ok(bytes) => report.copied.push(PlacedFile {
                name,
                bytes,
                destination: target,
            }),
            Err(error) => {
                tracing::warn!("failed to copy {}: {error:#}", path.display());
                report.failed.push((name, format!("{error:#}")));
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub files: Vec<(String, u64)>,
}

pub fn scan_directory(dir: &Path, suffixes: &[&str]) -> Result<DirectoryStatus> {
    if !dir.is_dir() {
        return Ok(DirectoryStatus {
            path: dir.to_path_buf(),
            exists: false,
            files: Vec::new(),
        });
    }
    let mut files = Vec::new();
    for path in matching_files(dir, suffixes)? {
        let bytes = fs::metadata(&path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        files.push((file_name(&path), bytes));
    }
    Ok(DirectoryStatus {
        path: dir.to_path_buf(),
        exists: true,
        files,
    })
}

fn matching_files(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry.context("read directory entry")?.path();
        if !path.is_file() {
            continue;
        }
        let extension = path.extension().and_then(|ext| ext.to_str());
        if extension.is_some_and(|ext| suffixes.iter().any(|suffix| ext == *suffix)) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

fn copy_preserving(source: &Path, target: &Path) -> Result<u64> {
    let bytes = fs::copy(source, target).context("copy file")?;
    let modified = fs::metadata(source)
        .and_then(|meta| meta.modified())
        .context("read source modification time")?;
    File::options()
        .write(true)
        .open(target)
        .and_then(|file| file.set_times(FileTimes::new().set_modified(modified)))
        .context("preserve modification time")?;
    Ok(bytes)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
