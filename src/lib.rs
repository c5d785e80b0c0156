//! nftdelta - nftables ruleset subtraction
//!
//! Isolates the firewall rules an application stack adds to a host: capture
//! the ruleset before the stack starts (baseline) and after (complete), and
//! nftdelta prints only the rules that are new, in nft syntax, ready to be
//! persisted.
//!
//! # Architecture
//!
//! - [`core`] - Parsing, normalization, diffing and rendering of captures
//! - [`elevation`] - Privilege escalation for `nft list ruleset`
//! - [`config`] - Configuration file loading
//! - [`utils`] - XDG directories, input reading, atomic output
//!
//! # Comparison
//!
//! Two rule lines are the same rule iff their normalized text matches and
//! they sit under the same block path (`table ip nat > chain DOCKER`).
//! Normalization drops counter values and `# handle` annotations and maps
//! iptables-nft `xt target` NAT statements to their native form.
//!
//! # Example
//!
//! ```
//! use nftdelta::core::diff::RulesetDiffer;
//! use nftdelta::core::render::{RenderOptions, render_nft};
//!
//! let outcome = RulesetDiffer::default()
//!     .diff_texts(
//!         "table ip t { chain c { counter packets 5 bytes 300 } }",
//!         "table ip t { chain c { counter packets 5 bytes 300 } chain c2 { ip daddr 10.0.0.1 accept } }",
//!     )
//!     .unwrap();
//! assert_eq!(
//!     render_nft(&outcome.document, &RenderOptions::default()),
//!     "table ip t {\n\tchain c2 {\n\t\tip daddr 10.0.0.1 accept\n\t}\n}\n"
//! );
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;

// Re-export commonly used types
pub use core::diff::{DiffOutcome, DiffSummary, RulesetDiffer};
pub use core::error::{Error, ParseError, Result};
pub use core::ruleset::RulesetDocument;
