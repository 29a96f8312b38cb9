//! The completion marker that makes initialization run at most once.

use anyhow::{Context, Result};
use cap_std_ext::cap_std::fs::Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use fn_error_context::context;
use serde::Serialize;

/// Path of the marker, relative to the filesystem root.
pub(crate) const SENTINEL_PATH: &str = "root/init_run";

/// Whether initialization has already completed on this root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub(crate) enum InitState {
    /// No marker; the next run will provision.
    NotInitialized,
    /// A marker exists and holds this completion time.
    Initialized { completed_at: String },
}

/// Only existence matters for the guard; the content is informational.
#[context("Checking for {SENTINEL_PATH}")]
pub(crate) fn is_present(root: &Dir) -> Result<bool> {
    Ok(root.try_exists(SENTINEL_PATH)?)
}

#[context("Reading {SENTINEL_PATH}")]
pub(crate) fn state(root: &Dir) -> Result<InitState> {
    if !is_present(root)? {
        return Ok(InitState::NotInitialized);
    }
    let contents = root.read_to_string(SENTINEL_PATH)?;
    let completed_at = contents.trim().to_owned();
    // Still initialized even if the content is garbage
    if let Err(e) = firstboot_utils::parse_marker_timestamp(&completed_at) {
        tracing::warn!("Invalid completion time in {SENTINEL_PATH}: {e:#}");
    }
    Ok(InitState::Initialized { completed_at })
}

/// Record completion. Must be the last step of a successful run.
#[context("Writing {SENTINEL_PATH}")]
pub(crate) fn write(root: &Dir, completed_at: &str) -> Result<()> {
    if let Some(parent) = std::path::Path::new(SENTINEL_PATH).parent() {
        root.create_dir_all(parent)
            .with_context(|| format!("Creating {}", parent.display()))?;
    }
    root.atomic_write(SENTINEL_PATH, completed_at)?;
    Ok(())
}
