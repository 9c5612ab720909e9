//! Pre-execution snapshots and revert.
//!
//! Before a plan runs, the prior bytes (or absence) of every file touched by
//! its `write`/`append`/`edit` steps are captured into a [`RevertRecord`],
//! keyed by the plan's canonical hash. Records live in a process-lifetime
//! [`RevertStore`]; the last capture for a given hash wins. Reverting reads the
//! record without consuming it, so repeated reverts converge on the same state.
//!
//! `mkdir`, `shell` and `install` effects are never captured or undone.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::hash::plan_hash;
use crate::core::plan::Plan;
use crate::core::sandbox::resolve;

/// Appended to every revert message.
pub const NOT_REVERTED_NOTE: &str =
    "directory creation, shell and install side effects are not undone";

/// State of one file before the plan ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prior {
    Content(Vec<u8>),
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertRecord {
    pub workspace_folder: PathBuf,
    /// Plan root, relative to `workspace_folder`.
    pub root: String,
    /// Keyed by path relative to the resolved plan root.
    pub before: BTreeMap<String, Prior>,
    pub created_at: DateTime<Utc>,
}

/// In-memory map from plan hash to its latest snapshot.
#[derive(Debug, Default)]
pub struct RevertStore {
    records: HashMap<String, RevertRecord>,
}

impl RevertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: String, record: RevertRecord) {
        self.records.insert(hash, record);
    }

    pub fn get(&self, hash: &str) -> Option<&RevertRecord> {
        self.records.get(hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Summary of a completed revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertOutcome {
    pub plan_hash: String,
    pub restored: usize,
    pub deleted: usize,
}

impl RevertOutcome {
    pub fn files_touched(&self) -> usize {
        self.restored + self.deleted
    }

    pub fn message(&self) -> String {
        format!(
            "reverted {} file(s) ({} restored, {} deleted); {}",
            self.files_touched(),
            self.restored,
            self.deleted,
            NOT_REVERTED_NOTE
        )
    }
}

/// Capture prior state for every revertible path in `plan`.
///
/// Returns `None` when nothing could be captured. Paths that escape the
/// sandbox or cannot be read (directories, permission errors) are skipped;
/// the executor reports them.
pub fn capture(workspace: &Path, plan: &Plan) -> Result<Option<RevertRecord>> {
    let root_dir = resolve(workspace, &plan.root)?;
    let mut before = BTreeMap::new();
    for path in plan.steps.iter().filter_map(|step| step.snapshot_path()) {
        if path.trim().is_empty() {
            continue;
        }
        let Ok(target) = resolve(&root_dir, path) else {
            debug!(path, "skipping escaping path in snapshot");
            continue;
        };
        let Some(key) = relative_key(&root_dir, &target) else {
            continue;
        };
        if before.contains_key(&key) {
            continue;
        }
        let prior = match fs::read(&target) {
            Ok(bytes) => Prior::Content(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Prior::Absent,
            Err(err) => {
                warn!(path, err = %err, "skipping unreadable path in snapshot");
                continue;
            }
        };
        before.insert(key, prior);
    }
    if before.is_empty() {
        return Ok(None);
    }
    Ok(Some(RevertRecord {
        workspace_folder: workspace.to_path_buf(),
        root: plan.root.clone(),
        before,
        created_at: Utc::now(),
    }))
}

/// Capture and store a snapshot for `plan`. Failures are logged, never fatal.
///
/// Returns the number of files captured.
#[instrument(skip_all, fields(hash = %hash))]
pub fn record_snapshot(
    store: &mut RevertStore,
    workspace: &Path,
    plan: &Plan,
    hash: &str,
) -> usize {
    match capture(workspace, plan) {
        Ok(Some(record)) => {
            let files = record.before.len();
            store.insert(hash.to_string(), record);
            debug!(files, "snapshot recorded");
            files
        }
        Ok(None) => 0,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "snapshot failed; continuing without revert data");
            0
        }
    }
}

/// Restore the files captured for `plan`.
///
/// Files that existed are rewritten with their original bytes; files that did
/// not exist are deleted.
#[instrument(skip_all)]
pub fn revert(store: &RevertStore, plan: &Plan) -> Result<RevertOutcome> {
    let hash = plan_hash(plan);
    let record = store
        .get(&hash)
        .ok_or_else(|| anyhow!("no snapshot recorded for this plan ({hash})"))?;
    let root_dir = resolve(&record.workspace_folder, &record.root)?;

    let mut restored = 0;
    let mut deleted = 0;
    for (rel, prior) in &record.before {
        let target = root_dir.join(rel);
        match prior {
            Prior::Content(bytes) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create directory {}", parent.display()))?;
                }
                fs::write(&target, bytes)
                    .with_context(|| format!("restore {}", target.display()))?;
                restored += 1;
            }
            Prior::Absent => {
                match fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => {
                        return Err(err).with_context(|| format!("remove {}", target.display()));
                    }
                }
                deleted += 1;
            }
        }
    }
    info!(restored, deleted, "revert complete");
    Ok(RevertOutcome {
        plan_hash: hash,
        restored,
        deleted,
    })
}

fn relative_key(root: &Path, target: &Path) -> Option<String> {
    let rel = target.strip_prefix(root).ok()?;
    let key = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    (!key.is_empty()).then_some(key)
}
