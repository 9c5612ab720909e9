//! Recursive directory listing for post-run reports.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Sorted, flattened listing of `root` relative to itself.
///
/// Directories carry a trailing `/`. Directories whose name appears in
/// `ignore` are skipped entirely. Symlinks are listed but not followed.
pub fn list_tree(root: &Path, ignore: &[String]) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    walk(root, "", ignore, &mut entries)?;
    entries.sort();
    Ok(entries)
}

fn walk(dir: &Path, prefix: &str, ignore: &[String], out: &mut Vec<String>) -> Result<()> {
    let reader = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    for entry in reader {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        let rel = format!("{prefix}{name}");
        if file_type.is_dir() {
            if ignore.iter().any(|skip| skip == &name) {
                continue;
            }
            out.push(format!("{rel}/"));
            walk(&entry.path(), &format!("{rel}/"), ignore, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}
