//! Config Locator - find the extraction config when `--config` is not given
//!
//! Looks in the working directory first, then the user's config directory
//! (e.g. ~/.config/marksheet-extract/config.yaml on Linux).

use std::path::{Path, PathBuf};

/// File name checked in the working directory
pub const LOCAL_CONFIG_NAME: &str = "marksheet.yaml";

const APP_DIR: &str = "marksheet-extract";
const USER_CONFIG_NAME: &str = "config.yaml";

/// Candidate config paths, most specific first
pub fn candidate_paths(working_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![working_dir.join(LOCAL_CONFIG_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join(APP_DIR).join(USER_CONFIG_NAME));
    }
    candidates
}

/// Resolve the config path: explicit argument, else the first existing candidate
pub fn locate_config(explicit: Option<&str>, working_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    candidate_paths(working_dir)
        .into_iter()
        .find(|candidate| candidate.is_file())
}
