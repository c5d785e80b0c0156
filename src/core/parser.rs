//! Structural parser for nftables rule listings
//!
//! Turns the token stream into a [`RulesetDocument`]. A statement ends at a
//! newline, a block brace or a `;`, so `chain c { accept; drop; }` holds two
//! rules. Hook lines are the exception: `type filter hook input priority 0;
//! policy accept;` stays one statement the way `nft list ruleset` prints it.
//!
//! A `{` opens a block only after a block header (`table ip nat`,
//! `chain input`, `ct helper ftp`, ...). Any other `{` starts an inline set
//! such as `tcp dport { 80, 443 }` that belongs to the statement and may
//! continue over several lines until its matching `}`. A header may also
//! leave its `{` for the next line.

use crate::core::error::ParseError;
use crate::core::lexer::{self, Lexeme, Token};
use crate::core::ruleset::{Block, BlockKind, BlockPath, Item, RuleLine, RulesetDocument};
use tracing::debug;

/// Parses a capture into a document. Rule lines are normalized on the way.
///
/// # Errors
///
/// - [`ParseError::Lex`] for input the lexer rejects
/// - [`ParseError::UnexpectedClose`] for a `}` with no open block
/// - [`ParseError::UnclosedBlock`] when input ends inside a block
/// - [`ParseError::UnclosedSet`] when input ends inside an inline set
pub fn parse(source: &str) -> Result<RulesetDocument, ParseError> {
    let lexemes = lexer::lex(source)?;
    let mut parser = Parser::new(source);

    for lexeme in lexemes {
        parser.feed(lexeme)?;
    }

    let document = parser.finish()?;
    debug!(
        "Parsed capture: {} blocks, {} rule lines",
        document.blocks().count(),
        document.rules().count()
    );
    Ok(document)
}

struct Parser<'a> {
    source: &'a str,
    root: Vec<Item>,
    /// Currently open blocks, innermost last
    open: Vec<Block>,
    /// Tokens of the statement being collected
    pending: Vec<Lexeme<'a>>,
    inline_depth: usize,
    inline_opened_at: usize,
    /// A block header ran into a line break before its `{`
    header_held: bool,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            root: Vec::new(),
            open: Vec::new(),
            pending: Vec::new(),
            inline_depth: 0,
            inline_opened_at: 0,
            header_held: false,
        }
    }

    fn feed(&mut self, lexeme: Lexeme<'a>) -> Result<(), ParseError> {
        match lexeme.token {
            Token::Newline => {
                if self.inline_depth == 0 {
                    if self.pending_block_kind().is_some() {
                        self.header_held = true;
                    } else {
                        self.flush_statement();
                    }
                }
            }
            Token::Semicolon => {
                self.end_finished_statement(&lexeme);
                self.pending.push(lexeme);
                if self.inline_depth == 0 && !self.pending_is_hook_line() {
                    self.flush_statement();
                }
            }
            Token::Word | Token::Quoted | Token::UnterminatedString => {
                self.end_finished_statement(&lexeme);
                self.pending.push(lexeme);
            }
            Token::OpenBrace => {
                self.end_finished_statement(&lexeme);
                if self.inline_depth == 0
                    && let Some(kind) = self.pending_block_kind()
                {
                    self.open_block(kind);
                } else {
                    if self.inline_depth == 0 {
                        self.inline_opened_at = lexeme.line;
                    }
                    self.inline_depth += 1;
                    self.pending.push(lexeme);
                }
            }
            Token::CloseBrace => {
                if self.inline_depth > 0 {
                    self.inline_depth -= 1;
                    self.pending.push(lexeme);
                } else {
                    self.flush_statement();
                    self.close_block(lexeme.line)?;
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<RulesetDocument, ParseError> {
        if self.inline_depth > 0 {
            return Err(ParseError::UnclosedSet {
                line: self.inline_opened_at,
            });
        }
        self.flush_statement();

        if let Some(block) = self.open.last() {
            return Err(ParseError::UnclosedBlock {
                block: block.header_text(),
                line: block.line,
            });
        }

        Ok(RulesetDocument { items: self.root })
    }

    /// Flushes the pending statement when `next` cannot continue it: after a
    /// held header that is not followed by `{`, or after the `;` of a hook
    /// line that is not followed by its `policy` or `devices` part.
    fn end_finished_statement(&mut self, next: &Lexeme<'a>) {
        if self.inline_depth > 0 {
            return;
        }

        let after_held_header = self.header_held && next.token != Token::OpenBrace;
        let after_hook_line = self
            .pending
            .last()
            .is_some_and(|l| l.token == Token::Semicolon)
            && !matches!(next.text, "policy" | "devices");

        if after_held_header || after_hook_line {
            self.flush_statement();
        }
    }

    /// `type filter hook input priority 0` or `hook ingress priority 0`
    fn pending_is_hook_line(&self) -> bool {
        matches!(self.pending.first().map(|l| l.text), Some("type" | "hook"))
            && self.pending.iter().any(|l| l.text == "hook")
    }

    fn pending_block_kind(&self) -> Option<BlockKind> {
        let texts: Vec<&str> = self.pending.iter().map(|l| l.text).collect();
        BlockKind::from_header(&texts)
    }

    fn current_path(&self) -> BlockPath {
        self.open
            .last()
            .map(|block| block.path.clone())
            .unwrap_or_default()
    }

    fn current_items(&mut self) -> &mut Vec<Item> {
        match self.open.last_mut() {
            Some(block) => &mut block.items,
            None => &mut self.root,
        }
    }

    fn open_block(&mut self, kind: BlockKind) {
        self.header_held = false;
        let line = self.pending.first().map_or(0, |l| l.line);
        let header = self.pending.drain(..).map(|l| l.text.to_string()).collect();
        let parent = self.current_path();
        self.open.push(Block::new(kind, header, &parent, line));
    }

    fn close_block(&mut self, line: usize) -> Result<(), ParseError> {
        let block = self
            .open
            .pop()
            .ok_or(ParseError::UnexpectedClose { line })?;
        self.current_items().push(Item::Block(block));
        Ok(())
    }

    fn flush_statement(&mut self) {
        self.header_held = false;
        if self.pending.is_empty() {
            return;
        }

        let raw = self.statement_text();
        let line = self.pending[0].line;
        self.pending.clear();

        let rule = RuleLine::new(self.current_path(), raw, line);
        // A lone `;` carries nothing
        if rule.normalized.is_empty() {
            return;
        }
        self.current_items().push(Item::Rule(rule));
    }

    /// Source text of the pending statement. Gaps that cross a line break
    /// (and therefore may hold a comment) fold to a single space.
    fn statement_text(&self) -> String {
        let mut text = String::new();
        let mut previous_end = None;

        for lexeme in &self.pending {
            if let Some(end) = previous_end {
                let gap = &self.source[end..lexeme.span.start];
                if gap.contains('\n') {
                    text.push(' ');
                } else {
                    text.push_str(gap);
                }
            }
            text.push_str(lexeme.text);
            previous_end = Some(lexeme.span.end);
        }

        text
    }
}
