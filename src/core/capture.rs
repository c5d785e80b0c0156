//! Ruleset captures
//!
//! A [`Capture`] is the text of one ruleset listing plus the name it is
//! reported under (file path, `<stdin>` or `nft list ruleset`). Live captures
//! come from running `nft list ruleset` through [`crate::elevation`].

use crate::core::error::{Error, Result};
use crate::core::normalize::NormalizeOptions;
use crate::core::ruleset::RulesetDocument;
use std::process::Stdio;
use tracing::{info, warn};

/// Name used for captures read from the live kernel ruleset
pub const LIVE_CAPTURE_NAME: &str = "nft list ruleset";

/// Text of a ruleset listing and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub text: String,
}

impl Capture {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Parses the capture, tagging errors with its name.
    pub fn parse(&self, options: &NormalizeOptions) -> Result<RulesetDocument> {
        RulesetDocument::parse_with(&self.text, options).map_err(|e| Error::parse(&self.name, e))
    }
}

/// Captures the live ruleset with `nft list ruleset`.
///
/// # Errors
///
/// - [`Error::Elevation`] when no way to elevate `nft` is available
/// - [`Error::Nftables`] when `nft` cannot be started or exits non-zero
pub fn capture_live_ruleset(nft_command: Option<&str>) -> Result<Capture> {
    info!("Capturing live ruleset via nft list ruleset");

    let output = crate::elevation::create_elevated_nft_command(nft_command, &["list", "ruleset"])?
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::Nftables {
            message: format!("Failed to run nft: {e}"),
            stderr: None,
            exit_code: None,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!("nft list ruleset failed: {}", stderr.trim());
        let message = parse_nft_errors(&stderr)
            .into_iter()
            .next()
            .unwrap_or_else(|| "nft list ruleset failed".to_string());
        return Err(Error::Nftables {
            message,
            stderr: Some(stderr),
            exit_code: output.status.code(),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    info!("Captured {} bytes of ruleset text", text.len());
    Ok(Capture::new(LIVE_CAPTURE_NAME, text))
}

/// Extracts error messages from nft's stderr.
///
/// Handles both the `--json` error object and plain `Error: ...` lines.
pub fn parse_nft_errors(stderr: &str) -> Vec<String> {
    if let Ok(json_err) = serde_json::from_str::<serde_json::Value>(stderr)
        && let Some(errors) = json_err.get("errors").and_then(|e| e.as_array())
    {
        return errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .map(String::from)
            .collect();
    }

    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.trim_start_matches("Error: ")
                .trim_start_matches("nft: ")
                .to_string()
        })
        .collect()
}
