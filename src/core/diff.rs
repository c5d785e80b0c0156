//! Ruleset subtraction: `complete − baseline`
//!
//! Keeps every rule line of the complete capture whose normalized text does
//! not occur under the same block path anywhere in the baseline. The block
//! structure and line order of the complete capture are preserved.
//!
//! # Empty blocks
//!
//! A block is emitted iff it contributes something: its path does not exist
//! in the baseline (the block itself is new and is emitted in full, even when
//! it has no statements), or it still holds at least one new line or emitted
//! sub-block. Blocks known to the baseline that end up empty are omitted.
//!
//! # Example
//!
//! ```
//! use nftdelta::core::diff::RulesetDiffer;
//!
//! let outcome = RulesetDiffer::default()
//!     .diff_texts(
//!         "table ip t { chain c { counter packets 5 bytes 300 } }",
//!         "table ip t { chain c { counter packets 9 bytes 540 } chain c2 { ip daddr 10.0.0.1 accept } }",
//!     )
//!     .unwrap();
//! assert_eq!(outcome.summary.new_rules, 1);
//! assert_eq!(outcome.summary.unchanged_rules, 1);
//! ```

use crate::core::capture::Capture;
use crate::core::error::{Error, Result};
use crate::core::normalize::NormalizeOptions;
use crate::core::ruleset::{BlockPath, Item, RuleLine, RulesetDocument};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Counts describing one diff run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub baseline_rules: usize,
    pub complete_rules: usize,
    /// Rule lines of the complete capture missing from the baseline
    pub new_rules: usize,
    /// Rule lines of the complete capture already present in the baseline
    pub unchanged_rules: usize,
    /// Blocks whose path does not exist in the baseline
    pub new_blocks: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.new_rules == 0 && self.new_blocks == 0
    }
}

/// Result of a diff: the filtered document plus statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub document: RulesetDocument,
    pub summary: DiffSummary,
}

/// Computes the rules an application added on top of a baseline ruleset
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesetDiffer {
    options: NormalizeOptions,
}

impl RulesetDiffer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Diffs exactly two captures, baseline first.
    ///
    /// # Errors
    ///
    /// - [`Error::Usage`] unless exactly two captures are given
    /// - [`Error::Parse`] when either capture is malformed
    pub fn diff_captures(&self, captures: &[Capture]) -> Result<DiffOutcome> {
        let [baseline, complete] = captures else {
            return Err(Error::Usage(format!(
                "expected a baseline and a complete ruleset capture, got {} input(s)",
                captures.len()
            )));
        };

        let baseline_doc = baseline.parse(&self.options)?;
        let complete_doc = complete.parse(&self.options)?;
        Ok(self.diff(&baseline_doc, &complete_doc))
    }

    /// Parses both texts and diffs them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when either text is malformed.
    pub fn diff_texts(&self, baseline: &str, complete: &str) -> Result<DiffOutcome> {
        let baseline = RulesetDocument::parse_with(baseline, &self.options)
            .map_err(|e| Error::parse("baseline", e))?;
        let complete = RulesetDocument::parse_with(complete, &self.options)
            .map_err(|e| Error::parse("complete", e))?;
        Ok(self.diff(&baseline, &complete))
    }

    /// Subtracts `baseline` from `complete`.
    pub fn diff(&self, baseline: &RulesetDocument, complete: &RulesetDocument) -> DiffOutcome {
        let index = BaselineIndex::build(baseline);
        let mut summary = DiffSummary {
            baseline_rules: baseline.rules().count(),
            complete_rules: complete.rules().count(),
            ..DiffSummary::default()
        };

        let items = filter_items(&complete.items, &index, &mut summary);

        debug!(
            "Diff: {} new rule(s), {} unchanged, {} new block(s)",
            summary.new_rules, summary.unchanged_rules, summary.new_blocks
        );

        DiffOutcome {
            document: RulesetDocument { items },
            summary,
        }
    }
}

/// Lookup tables over the baseline capture
struct BaselineIndex<'a> {
    rules: HashSet<(&'a BlockPath, &'a str)>,
    blocks: HashSet<&'a BlockPath>,
}

impl<'a> BaselineIndex<'a> {
    fn build(baseline: &'a RulesetDocument) -> Self {
        let rules = baseline
            .rules()
            .map(|rule| (&rule.path, rule.normalized.as_str()))
            .collect();
        let blocks = baseline.blocks().map(|block| &block.path).collect();
        Self { rules, blocks }
    }

    fn contains_rule(&self, rule: &RuleLine) -> bool {
        self.rules.contains(&(&rule.path, rule.normalized.as_str()))
    }

    fn contains_block(&self, path: &BlockPath) -> bool {
        self.blocks.contains(path)
    }
}

fn filter_items(items: &[Item], index: &BaselineIndex<'_>, summary: &mut DiffSummary) -> Vec<Item> {
    let mut kept = Vec::new();

    for item in items {
        match item {
            Item::Rule(rule) => {
                if index.contains_rule(rule) {
                    summary.unchanged_rules += 1;
                } else {
                    summary.new_rules += 1;
                    kept.push(Item::Rule(rule.clone()));
                }
            }
            Item::Block(block) => {
                let children = filter_items(&block.items, index, summary);
                let is_new = !index.contains_block(&block.path);
                if is_new {
                    summary.new_blocks += 1;
                }
                if is_new || !children.is_empty() {
                    kept.push(Item::Block(block.with_items(children)));
                }
            }
        }
    }

    kept
}
