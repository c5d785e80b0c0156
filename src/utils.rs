//! Utility functions for directories, inputs and output files
//!
//! # Directory Structure
//!
//! - Config: `~/.config/nftdelta/config.json` (XDG Base Directory layout)
//!
//! # Example
//!
//! ```
//! use nftdelta::utils::get_config_dir;
//!
//! if let Some(dir) = get_config_dir() {
//!     println!("config lives in {}", dir.display());
//! }
//! ```

use crate::core::capture::Capture;
use crate::core::error::{Error, Result};
use directories::ProjectDirs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Path argument that selects standard input
pub const STDIN_ARG: &str = "-";

pub const CONFIG_FILE_NAME: &str = "config.json";

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "nftdelta", "nftdelta").map(|pd| pd.config_dir().to_path_buf())
}

pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Reads one capture from a file, or from stdin for `-`.
///
/// # Errors
///
/// Returns [`Error::Usage`] when the input cannot be read: a missing or
/// unreadable file is an invocation problem, not a ruleset problem.
pub fn read_input(arg: &str) -> Result<Capture> {
    if arg == STDIN_ARG {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| Error::Usage(format!("cannot read standard input: {e}")))?;
        debug!("Read {} bytes from stdin", text.len());
        return Ok(Capture::new("<stdin>", text));
    }

    let text = std::fs::read_to_string(arg)
        .map_err(|e| Error::Usage(format!("cannot read input file '{arg}': {e}")))?;
    debug!("Read {} bytes from {arg}", text.len());
    Ok(Capture::new(arg, text))
}

/// Writes `contents` to `path` atomically.
///
/// The data goes to a temporary file in the destination directory first,
/// which is synced and then renamed over `path`, so readers never observe a
/// partially written ruleset. On Unix the result has mode 0o644.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                format!("Disk full: cannot write {}", path.display()),
            )
        } else {
            e.error
        }
    })?;

    info!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}
