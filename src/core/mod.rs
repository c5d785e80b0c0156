//! Ruleset capture parsing and subtraction
//!
//! - [`lexer`]: Tokenizer for `nft list ruleset` text
//! - [`parser`]: Block structure and statement boundaries
//! - [`ruleset`]: Document model (blocks, rule lines, block paths)
//! - [`normalize`]: Canonical statement text and DNAT target inference
//! - [`diff`]: `complete − baseline` subtraction
//! - [`render`]: nft, unified diff and JSON output
//! - [`capture`]: Capture inputs and live `nft list ruleset`
//! - [`error`]: Error types and nft error translation

pub mod capture;
pub mod diff;
pub mod error;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod render;
pub mod ruleset;

#[cfg(test)]
pub mod test_helpers;
