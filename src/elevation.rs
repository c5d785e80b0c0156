//! Privilege elevation for `nft list ruleset`
//!
//! Listing the kernel ruleset needs `CAP_NET_ADMIN`. nftdelta runs as an
//! unprivileged user and elevates only the `nft` binary, only to read.
//!
//! # Elevation Strategy
//!
//! - **Root**: runs `nft` directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: `sudo`
//! - **Non-interactive fallback**: `pkexec`
//!
//! # Environment Variables
//!
//! - `NFTDELTA_NFT_COMMAND`: program to run instead of `nft` (tests point it
//!   at `tests/mock_nft.sh`).
//! - `NFTDELTA_ELEVATION_METHOD`: force `sudo`, `run0`, `pkexec` or `none`.
//!   Useful with sudoers NOPASSWD rules in deployment scripts.
//! - `NFTDELTA_NO_ELEVATION`: bypass elevation entirely.
//!
//! # Security
//!
//! - Only `nft` (or its configured replacement) is ever elevated
//! - Arguments are passed without shell interpolation
//!
//! # Example
//!
//! ```no_run
//! use nftdelta::elevation::create_elevated_nft_command;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let output = create_elevated_nft_command(None, &["list", "ruleset"])?.output()?;
//! # Ok(())
//! # }
//! ```

use std::process::Command;

pub const NFT_COMMAND_ENV: &str = "NFTDELTA_NFT_COMMAND";
pub const ELEVATION_METHOD_ENV: &str = "NFTDELTA_ELEVATION_METHOD";
pub const NO_ELEVATION_ENV: &str = "NFTDELTA_NO_ELEVATION";

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit or run from a terminal")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `NFTDELTA_ELEVATION_METHOD`
    #[error("Invalid NFTDELTA_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec, none")]
    InvalidMethod(String),
}

/// Program used to list the ruleset.
///
/// `NFTDELTA_NFT_COMMAND` wins over the configured command, which wins over
/// plain `nft`.
pub fn nft_program(configured: Option<&str>) -> String {
    std::env::var(NFT_COMMAND_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .or_else(|| configured.filter(|p| !p.is_empty()).map(String::from))
        .unwrap_or_else(|| "nft".to_string())
}

fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                full_path.is_file().then_some(full_path)
            })
        })
        .is_some()
}

fn wrapped(wrapper: &str, program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(wrapper);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

fn build_elevated_command(program: &str, args: &[&str]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    // 1. Explicit opt-out
    if std::env::var_os(NO_ELEVATION_ENV).is_some() {
        return Ok(direct(program, args));
    }

    // 2. Already root
    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    // 3. Forced method
    if let Ok(method) = std::env::var(ELEVATION_METHOD_ENV) {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "none" => Ok(direct(program, args)),
                "sudo" | "run0" | "pkexec" => {
                    if !binary_exists(&method) {
                        return Err(ElevationError::MethodNotAvailable(method));
                    }
                    Ok(wrapped(&method, program, args))
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    // 4. Automatic detection
    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrapped("pkexec", program, args))
    }
}

/// Creates an `nft` command with the given arguments, elevated if needed.
///
/// `configured` is the `nft_command` from the config file, if any; see
/// [`nft_program`] for precedence.
///
/// # Errors
///
/// Returns [`ElevationError`] when the forced method is unknown or missing,
/// or when no elevation helper is available.
pub fn create_elevated_nft_command(
    configured: Option<&str>,
    args: &[&str],
) -> Result<Command, ElevationError> {
    build_elevated_command(&nft_program(configured), args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::ENV_VAR_MUTEX;

    fn program_and_args(cmd: &Command) -> (String, Vec<String>) {
        (
            cmd.get_program().to_string_lossy().into_owned(),
            cmd.get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        )
    }

    #[test]
    fn test_binary_exists() {
        assert!(binary_exists("sh"));
        assert!(!binary_exists("nftdelta_nonexistent_binary_xyz"));
    }

    #[test]
    fn test_no_elevation_runs_program_directly() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::set_var(NO_ELEVATION_ENV, "1");
            std::env::remove_var(NFT_COMMAND_ENV);
        }

        let cmd = create_elevated_nft_command(Some("/usr/local/sbin/nft"), &["list", "ruleset"])
            .unwrap();
        assert_eq!(
            program_and_args(&cmd),
            (
                "/usr/local/sbin/nft".to_string(),
                vec!["list".to_string(), "ruleset".to_string()]
            )
        );

        unsafe {
            std::env::remove_var(NO_ELEVATION_ENV);
        }
    }

    #[test]
    fn test_nft_program_precedence() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::remove_var(NFT_COMMAND_ENV);
        }
        assert_eq!(nft_program(None), "nft");
        assert_eq!(nft_program(Some("")), "nft");
        assert_eq!(nft_program(Some("/opt/nft")), "/opt/nft");

        unsafe {
            std::env::set_var(NFT_COMMAND_ENV, "/tmp/mock_nft.sh");
        }
        assert_eq!(nft_program(Some("/opt/nft")), "/tmp/mock_nft.sh");
        unsafe {
            std::env::remove_var(NFT_COMMAND_ENV);
        }
    }

    #[test]
    fn test_invalid_elevation_method() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        if nix::unistd::getuid().is_root() {
            // Root never consults the method
            return;
        }
        unsafe {
            std::env::remove_var(NO_ELEVATION_ENV);
            std::env::set_var(ELEVATION_METHOD_ENV, "invalid_method");
        }

        let result = create_elevated_nft_command(None, &["list", "ruleset"]);

        unsafe {
            std::env::remove_var(ELEVATION_METHOD_ENV);
        }
        assert!(matches!(result, Err(ElevationError::InvalidMethod(_))));
    }

    #[test]
    fn test_elevation_method_case_insensitive() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::remove_var(NO_ELEVATION_ENV);
            std::env::set_var(ELEVATION_METHOD_ENV, "SUDO");
        }

        let result = create_elevated_nft_command(None, &["list", "ruleset"]);

        unsafe {
            std::env::remove_var(ELEVATION_METHOD_ENV);
        }
        // Either sudo is there or it is reported missing, but the name is accepted
        assert!(!matches!(result, Err(ElevationError::InvalidMethod(_))));
    }

    #[test]
    fn test_forced_none_skips_wrapper() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::remove_var(NO_ELEVATION_ENV);
            std::env::remove_var(NFT_COMMAND_ENV);
            std::env::set_var(ELEVATION_METHOD_ENV, "none");
        }

        let cmd = create_elevated_nft_command(None, &["list", "ruleset"]).unwrap();

        unsafe {
            std::env::remove_var(ELEVATION_METHOD_ENV);
        }
        assert_eq!(program_and_args(&cmd).0, "nft");
    }
}
