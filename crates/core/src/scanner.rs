//! Finds property photos under an input path.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    pub exclude: Vec<String>,
}

/// Image files under `root`, sorted by path. A file root is returned as-is when it is an image.
pub fn scan_images(root: &Path, opts: &ScanOptions) -> anyhow::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(if is_image_path(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }
    if !root.is_dir() {
        anyhow::bail!("input path does not exist: {}", root.display());
    }

    let exclude_set = build_globset(&opts.exclude)?;
    let max_depth = if opts.recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| should_descend(e, &exclude_set))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if entry.file_type().is_file() && is_image_path(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    Ok(builder.build()?)
}

fn should_descend(entry: &DirEntry, excludes: &GlobSet) -> bool {
    // the root itself is always walked, even from a dot-directory
    if entry.depth() == 0 {
        return true;
    }
    !is_hidden(entry.path()) && !is_excluded(entry.path(), excludes)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_excluded(path: &Path, excludes: &GlobSet) -> bool {
    excludes.is_match(path)
        || path
            .file_name()
            .map(|name| excludes.is_match(name))
            .unwrap_or(false)
}
