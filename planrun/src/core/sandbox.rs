//! Lexical path sandbox.
//!
//! [`resolve`] joins a relative path onto a root, folds `.` and `..`
//! components without touching the filesystem, and rejects results that do
//! not stay under the root. Symbolic links are not followed: a link inside the
//! root that points elsewhere is accepted. The guarantee is purely
//! lexical/prefix-based.

use std::path::{Component, Path, PathBuf};

use super::errors::PlanError;

/// Resolve `relative` under `root`, failing with [`PlanError::PathEscape`]
/// if the lexical result leaves `root`.
///
/// `root` is made absolute against the current directory first. An absolute
/// `relative` is accepted only if it already lies inside `root`.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, PlanError> {
    let base = normalize(&absolute(root));
    let candidate = normalize(&base.join(relative));
    if !candidate.starts_with(&base) {
        return Err(PlanError::PathEscape {
            path: relative.to_string(),
            root: base,
        });
    }
    Ok(candidate)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Fold `.`/`..` lexically. `..` at the filesystem root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_relative_paths() {
        let root = Path::new("/work/app");
        assert_eq!(
            resolve(root, "src/main.rs").expect("resolve"),
            PathBuf::from("/work/app/src/main.rs")
        );
        assert_eq!(
            resolve(root, "./src/../lib.rs").expect("resolve"),
            PathBuf::from("/work/app/lib.rs")
        );
        assert_eq!(resolve(root, ".").expect("resolve"), PathBuf::from("/work/app"));
    }

    #[test]
    fn rejects_parent_traversal_out_of_root() {
        let err = resolve(Path::new("/work/app"), "../secrets.txt").unwrap_err();
        assert!(matches!(err, PlanError::PathEscape { .. }));

        let err = resolve(Path::new("/work/app"), "src/../../../etc/passwd").unwrap_err();
        assert!(matches!(err, PlanError::PathEscape { .. }));
    }

    #[test]
    fn rejects_sibling_with_shared_prefix() {
        // `/work/app-evil` shares a string prefix but is not under `/work/app`.
        let err = resolve(Path::new("/work/app"), "../app-evil/x").unwrap_err();
        assert!(matches!(err, PlanError::PathEscape { .. }));
    }

    #[test]
    fn absolute_paths_must_stay_inside_root() {
        assert!(resolve(Path::new("/work/app"), "/etc/passwd").is_err());
        assert_eq!(
            resolve(Path::new("/work/app"), "/work/app/readme.md").expect("resolve"),
            PathBuf::from("/work/app/readme.md")
        );
    }

    #[test]
    fn root_is_normalized_before_comparison() {
        assert_eq!(
            resolve(Path::new("/work/./app/../app"), "a").expect("resolve"),
            PathBuf::from("/work/app/a")
        );
    }
}
