use crate::core::error::{Error, Result};
use crate::core::normalize::NormalizeOptions;
use crate::core::render::{OutputFormat, RenderOptions};
use crate::utils::default_config_path;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// User configuration, every field optional in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Spaces per nesting level in nft output; absent means one tab
    #[serde(default)]
    pub indent_width: Option<usize>,
    #[serde(default = "default_true")]
    pub blank_line_between_blocks: bool,
    /// Fill in `xt target "DNAT"` destinations from `ip6 daddr` accept rules
    #[serde(default = "default_true")]
    pub infer_dnat_targets: bool,
    /// Program used instead of `nft` for live captures
    #[serde(default)]
    pub nft_command: Option<String>,
    #[serde(default)]
    pub default_format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indent_width: None,
            blank_line_between_blocks: true,
            infer_dnat_targets: true,
            nft_command: None,
            default_format: OutputFormat::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            indent_width: self.indent_width,
            blank_line_between_blocks: self.blank_line_between_blocks,
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            infer_dnat_targets: self.infer_dnat_targets,
        }
    }
}

/// Loads the configuration.
///
/// An explicit path must exist and parse. Without one, the XDG config file
/// is used when present; if it is malformed a warning is logged and the
/// defaults apply.
///
/// # Errors
///
/// Returns [`Error::Config`] for an explicit path that is unreadable or malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        let json = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = serde_json::from_str(&json).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Loaded config from {}", path.display());
        return Ok(config);
    }

    let Some(path) = default_config_path() else {
        return Ok(Config::default());
    };
    let Ok(json) = std::fs::read_to_string(&path) else {
        return Ok(Config::default());
    };

    match serde_json::from_str(&json) {
        Ok(config) => {
            debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            warn!("Ignoring malformed config {}: {e}", path.display());
            Ok(Config::default())
        }
    }
}
