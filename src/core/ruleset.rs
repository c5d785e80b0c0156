//! Ruleset document model
//!
//! A capture is parsed into a [`RulesetDocument`]: an ordered tree of
//! [`Block`]s (tables, chains, sets, ...) and [`RuleLine`]s that mirrors the
//! source nesting exactly. Rule identity for comparison is the pair
//! (block path, normalized text).
//!
//! # Example
//!
//! ```
//! use nftdelta::core::ruleset::RulesetDocument;
//!
//! let doc = RulesetDocument::parse("table ip t { chain c { counter packets 5 bytes 300 } }")
//!     .unwrap();
//! let rules: Vec<_> = doc.rules().collect();
//! assert_eq!(rules.len(), 1);
//! assert_eq!(rules[0].normalized, "counter");
//! assert_eq!(rules[0].path.to_string(), "table ip t > chain c");
//! ```

use crate::core::error::ParseError;
use crate::core::normalize::{self, NormalizeOptions};
use serde::Serialize;
use std::fmt;

/// Kind of a named block declaration
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    #[strum(serialize = "table")]
    Table,
    #[strum(serialize = "chain")]
    Chain,
    #[strum(serialize = "set")]
    Set,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "flowtable")]
    Flowtable,
    #[strum(serialize = "counter")]
    Counter,
    #[strum(serialize = "quota")]
    Quota,
    #[strum(serialize = "limit")]
    Limit,
    #[strum(serialize = "secmark")]
    Secmark,
    #[strum(serialize = "synproxy")]
    Synproxy,
    #[strum(serialize = "ct helper")]
    CtHelper,
    #[strum(serialize = "ct timeout")]
    CtTimeout,
    #[strum(serialize = "ct expectation")]
    CtExpectation,
}

impl BlockKind {
    /// Family nft assumes for `table <name>` declarations without one.
    pub const DEFAULT_TABLE_FAMILY: &'static str = "ip";

    /// Classifies the tokens preceding a `{` as a block header.
    ///
    /// Returns `None` when the brace opens an inline set instead, e.g.
    /// `ct state { established, related }` or `elements = { ... }`.
    pub fn from_header(tokens: &[&str]) -> Option<Self> {
        match tokens {
            ["table", _] | ["table", _, _] => Some(BlockKind::Table),
            ["chain", _] => Some(BlockKind::Chain),
            ["set", _] => Some(BlockKind::Set),
            ["map", _] => Some(BlockKind::Map),
            ["flowtable", _] => Some(BlockKind::Flowtable),
            ["counter", _] => Some(BlockKind::Counter),
            ["quota", _] => Some(BlockKind::Quota),
            ["limit", _] => Some(BlockKind::Limit),
            ["secmark", _] => Some(BlockKind::Secmark),
            ["synproxy", _] => Some(BlockKind::Synproxy),
            ["ct", "helper", _] => Some(BlockKind::CtHelper),
            ["ct", "timeout", _] => Some(BlockKind::CtTimeout),
            ["ct", "expectation", _] => Some(BlockKind::CtExpectation),
            _ => None,
        }
    }
}

/// Ordered sequence of block keys from the document root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockPath(Vec<String>);

impl BlockPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a new path with `key` appended.
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.0.join(" > "))
    }
}

impl<S: Into<String>> FromIterator<S> for BlockPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A single statement inside a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleLine {
    /// Path of the block that owns this statement
    pub path: BlockPath,
    /// Statement as captured, comments removed and inner newlines folded
    pub raw: String,
    /// Comparison form: volatile fields rewritten, single-spaced, no trailing `;`
    pub normalized: String,
    /// Whether the captured statement ended with `;`
    pub terminated: bool,
    /// 1-based source line of the first token
    pub line: usize,
}

impl RuleLine {
    pub fn new(path: BlockPath, raw: impl Into<String>, line: usize) -> Self {
        let raw = raw.into();
        let normalized = normalize::normalize(&raw);
        let terminated = raw.trim_end().ends_with(';');
        Self {
            path,
            raw,
            normalized,
            terminated,
            line,
        }
    }

    /// Text used when printing the statement back out as nft syntax.
    pub fn display_text(&self) -> String {
        if self.terminated && !self.normalized.is_empty() {
            format!("{};", self.normalized)
        } else {
            self.normalized.clone()
        }
    }
}

/// A named block and its ordered contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Header tokens as written, e.g. `["table", "ip", "nat"]`
    pub header: Vec<String>,
    /// Structural identity used in paths, e.g. `table ip nat`
    pub key: String,
    /// Full path of this block, its own key included
    pub path: BlockPath,
    pub line: usize,
    pub items: Vec<Item>,
}

impl Block {
    pub fn new(kind: BlockKind, header: Vec<String>, parent: &BlockPath, line: usize) -> Self {
        let key = block_key(kind, &header);
        let path = parent.child(&key);
        Self {
            kind,
            header,
            key,
            path,
            line,
            items: Vec::new(),
        }
    }

    /// Header as printed before the opening brace.
    pub fn header_text(&self) -> String {
        self.header.join(" ")
    }

    /// Copy of this block with `items` replacing its contents.
    pub fn with_items(&self, items: Vec<Item>) -> Self {
        Self {
            kind: self.kind,
            header: self.header.clone(),
            key: self.key.clone(),
            path: self.path.clone(),
            line: self.line,
            items,
        }
    }
}

/// Structural key of a block. `table <name>` gets nft's default family so
/// that it compares equal to the `table ip <name>` that `nft list` prints.
fn block_key(kind: BlockKind, header: &[String]) -> String {
    if kind == BlockKind::Table && header.len() == 2 {
        return format!("table {} {}", BlockKind::DEFAULT_TABLE_FAMILY, header[1]);
    }
    header.join(" ")
}

/// Content of a block: a statement or a nested block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Rule(RuleLine),
    Block(Block),
}

/// Parsed ruleset capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RulesetDocument {
    pub items: Vec<Item>,
}

impl RulesetDocument {
    /// Parses and normalizes a capture with default options.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when braces are unbalanced or the text cannot be tokenized.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Self::parse_with(source, &NormalizeOptions::default())
    }

    /// Parses and normalizes a capture, then runs document-level inference.
    pub fn parse_with(source: &str, options: &NormalizeOptions) -> Result<Self, ParseError> {
        let mut document = crate::core::parser::parse(source)?;
        if options.infer_dnat_targets {
            normalize::infer_dnat_targets(&mut document);
        }
        Ok(document)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All rule lines in document order, depth first.
    pub fn rules(&self) -> impl Iterator<Item = &RuleLine> {
        let mut out = Vec::new();
        collect_rules(&self.items, &mut out);
        out.into_iter()
    }

    /// Mutable access to every rule line, depth first.
    pub fn rules_mut(&mut self) -> Vec<&mut RuleLine> {
        let mut out = Vec::new();
        collect_rules_mut(&mut self.items, &mut out);
        out
    }

    /// All blocks in document order, depth first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        let mut out = Vec::new();
        collect_blocks(&self.items, &mut out);
        out.into_iter()
    }
}

fn collect_rules<'a>(items: &'a [Item], out: &mut Vec<&'a RuleLine>) {
    for item in items {
        match item {
            Item::Rule(rule) => out.push(rule),
            Item::Block(block) => collect_rules(&block.items, out),
        }
    }
}

fn collect_rules_mut<'a>(items: &'a mut [Item], out: &mut Vec<&'a mut RuleLine>) {
    for item in items {
        match item {
            Item::Rule(rule) => out.push(rule),
            Item::Block(block) => collect_rules_mut(&mut block.items, out),
        }
    }
}

fn collect_blocks<'a>(items: &'a [Item], out: &mut Vec<&'a Block>) {
    for item in items {
        if let Item::Block(block) = item {
            out.push(block);
            collect_blocks(&block.items, out);
        }
    }
}
