//! Output formats
//!
//! - [`OutputFormat::Nft`]: declarative nft text, loadable with `nft -f`
//! - [`OutputFormat::Unified`]: unified diff of the two normalized captures
//! - [`OutputFormat::Json`]: machine-readable report of the new rules
//!
//! # Example
//!
//! ```
//! use nftdelta::core::render::{RenderOptions, render_nft};
//! use nftdelta::core::ruleset::RulesetDocument;
//!
//! let doc = RulesetDocument::parse("table ip t { chain c { accept } }").unwrap();
//! assert_eq!(
//!     render_nft(&doc, &RenderOptions::default()),
//!     "table ip t {\n\tchain c {\n\t\taccept\n\t}\n}\n"
//! );
//! ```

use crate::core::diff::{DiffOutcome, DiffSummary};
use crate::core::error::Result;
use crate::core::ruleset::{Item, RulesetDocument};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Lines of context around changes in unified output
pub const UNIFIED_CONTEXT_LINES: usize = 3;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Nft,
    Unified,
    Json,
}

/// Layout of rendered nft text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Spaces per nesting level; `None` indents with one tab
    pub indent_width: Option<usize>,
    pub blank_line_between_blocks: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent_width: None,
            blank_line_between_blocks: true,
        }
    }
}

impl RenderOptions {
    fn indent(&self, depth: usize) -> String {
        match self.indent_width {
            Some(width) => " ".repeat(width * depth),
            None => "\t".repeat(depth),
        }
    }
}

/// Renders a document as nft declarative text.
///
/// Rule lines are printed in normalized form, with the trailing `;` kept
/// where the capture had one. An empty document renders as `""`.
pub fn render_nft(document: &RulesetDocument, options: &RenderOptions) -> String {
    let mut out = String::new();
    write_items(&mut out, &document.items, 0, options);
    out
}

fn write_items(out: &mut String, items: &[Item], depth: usize, options: &RenderOptions) {
    let indent = options.indent(depth);
    let mut previous_was_block = false;

    for item in items {
        match item {
            Item::Rule(rule) => {
                let _ = writeln!(out, "{indent}{}", rule.display_text());
                previous_was_block = false;
            }
            Item::Block(block) => {
                if options.blank_line_between_blocks && previous_was_block {
                    out.push('\n');
                }
                let _ = writeln!(out, "{indent}{} {{", block.header_text());
                write_items(out, &block.items, depth + 1, options);
                let _ = writeln!(out, "{indent}}}");
                previous_was_block = true;
            }
        }
    }
}

/// Unified diff between the normalized renderings of both captures.
///
/// Unlike the nft output this also shows rules that disappeared.
pub fn render_unified(
    baseline: &RulesetDocument,
    complete: &RulesetDocument,
    names: (&str, &str),
    options: &RenderOptions,
) -> String {
    let old_text = render_nft(baseline, options);
    let new_text = render_nft(complete, options);

    similar::TextDiff::from_lines(&old_text, &new_text)
        .unified_diff()
        .context_radius(UNIFIED_CONTEXT_LINES)
        .header(names.0, names.1)
        .to_string()
}

/// JSON report listing every new rule line
#[derive(Debug, Serialize)]
pub struct DiffReport<'a> {
    pub summary: DiffSummary,
    pub rules: Vec<ReportedRule<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ReportedRule<'a> {
    pub path: &'a [String],
    pub rule: String,
    pub line: usize,
}

impl<'a> DiffReport<'a> {
    pub fn new(outcome: &'a DiffOutcome) -> Self {
        let rules = outcome
            .document
            .rules()
            .map(|rule| ReportedRule {
                path: rule.path.segments(),
                rule: rule.display_text(),
                line: rule.line,
            })
            .collect();
        Self {
            summary: outcome.summary,
            rules,
        }
    }
}

/// Renders the JSON report, pretty-printed with a trailing newline.
pub fn render_json(outcome: &DiffOutcome) -> Result<String> {
    let mut json = serde_json::to_string_pretty(&DiffReport::new(outcome))?;
    json.push('\n');
    Ok(json)
}
