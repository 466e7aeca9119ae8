use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use super::constants::{AGENT_CONFIG_CANDIDATES, CONFIG_PATH_ENV};
use super::util::env_non_empty;

/// An explicitly configured path must exist; the well-known locations are
/// only checked when none is set.
pub(super) fn resolve_config_path() -> Result<Option<PathBuf>> {
    if let Some(raw) = env_non_empty(CONFIG_PATH_ENV) {
        let configured = PathBuf::from(raw.trim());
        if !configured.is_file() {
            bail!(
                "{CONFIG_PATH_ENV} points at a missing config file: {}",
                configured.display()
            );
        }
        return Ok(Some(configured));
    }

    Ok(AGENT_CONFIG_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|candidate| candidate.is_file())
        .map(Path::to_path_buf))
}
