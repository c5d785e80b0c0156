use std::path::PathBuf;
use thiserror::Error;

/// Exit code for successful runs
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for malformed captures, capture failures and output errors
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for invalid invocations (argument count, unreadable input, bad config)
pub const EXIT_USAGE: u8 = 2;

/// Core error types for nftdelta
#[derive(Debug, Error)]
pub enum Error {
    /// Incorrect invocation, reported before any parsing is attempted
    #[error("Usage error: {0}")]
    Usage(String),

    /// A ruleset capture could not be parsed
    #[error("Parse error in {source_name}: {error}")]
    Parse {
        source_name: String,
        error: ParseError,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// nftables command execution failed
    #[error("nftables error: {message}")]
    Nftables {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Privilege escalation for `nft` could not be set up
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// Configuration file is unreadable or malformed
    #[error("Config error in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

impl Error {
    /// Wraps a [`ParseError`] with the name of the capture it came from.
    pub fn parse(source_name: impl Into<String>, error: ParseError) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            error,
        }
    }

    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Usage(_) | Error::Config { .. } => EXIT_USAGE,
            Error::Parse { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Nftables { .. }
            | Error::Elevation(_) => EXIT_FAILURE,
        }
    }
}

/// Structural problems in a ruleset capture
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: unrecognized input (unterminated string?)")]
    Lex { line: usize },

    #[error("line {line}: '}}' without a matching block opening")]
    UnexpectedClose { line: usize },

    #[error("line {line}: block '{block}' is never closed")]
    UnclosedBlock { block: String, line: usize },

    #[error("line {line}: inline set '{{' is never closed")]
    UnclosedSet { line: usize },
}

impl ParseError {
    /// Source line the error points at (1-based).
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex { line }
            | ParseError::UnexpectedClose { line }
            | ParseError::UnclosedBlock { line, .. }
            | ParseError::UnclosedSet { line } => *line,
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Known `nft list ruleset` failure patterns and their translations
pub struct NftablesErrorPattern;

impl NftablesErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to list the firewall ruleset")
                .with_suggestion("Run nftdelta as root, or allow sudo/run0 for nft")
                .with_suggestion("Force a method with NFTDELTA_ELEVATION_METHOD=sudo|run0|pkexec")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Quick_reference-nftables_in_10_minutes");
        }

        if lower.contains("cache initialization failed") {
            return ErrorTranslation::new(
                "Failed to initialize nftables cache - insufficient privileges",
            )
            .with_suggestion("Listing the ruleset requires elevated privileges")
            .with_suggestion("Capture the ruleset manually: sudo nft list ruleset > complete.nft");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("nftables is not installed or not found in PATH")
                .with_suggestion("Install nftables: sudo apt install nftables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install nftables  (Fedora/RHEL)")
                .with_suggestion("Or set NFTDELTA_NFT_COMMAND to the nft binary")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Main_Page");
        }

        if lower.contains("netlink") {
            return ErrorTranslation::new("Communication error with kernel netlink interface")
                .with_suggestion("Check kernel modules: lsmod | grep nf_tables")
                .with_suggestion("Load nf_tables module: sudo modprobe nf_tables")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting");
        }

        if lower.contains("resource busy") || lower.contains("device or resource busy") {
            return ErrorTranslation::new("Firewall resource is busy")
                .with_suggestion("Another process may be modifying nftables")
                .with_suggestion("Wait for the container engine to settle and try again");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Verify nftables is working: sudo nft list ruleset")
            .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
