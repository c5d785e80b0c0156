//! Tokenizer for nftables rule listings
//!
//! Produces a flat token stream for the parser. Comments (`# ...`) are
//! dropped here, which also removes the `# handle N` annotations that
//! `nft -a list ruleset` appends to every object.

use crate::core::error::ParseError;
use logos::Logos;
use std::borrow::Cow;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip(r"#[^\n]*", allow_greedy = true))]
pub enum Token {
    #[token("{")]
    OpenBrace,

    #[token("}")]
    CloseBrace,

    #[token(";")]
    Semicolon,

    #[token("\n")]
    Newline,

    /// Double-quoted string, quotes included. nft strings never span lines.
    #[regex(r#""[^"\n]*""#)]
    Quoted,

    /// A `"` with no closing quote on its line. Rejected by [`lex`]; the
    /// statement tokenizer keeps it so normalization never has to give up.
    #[regex(r#""[^"\n]*"#)]
    UnterminatedString,

    #[regex(r##"[^ \t\r\f\n{};"#]+"##)]
    Word,
}

/// A token together with its source text and position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub token: Token,
    pub text: &'a str,
    pub span: Range<usize>,
    /// 1-based source line
    pub line: usize,
}

/// Tokenizes a whole capture.
///
/// # Errors
///
/// Returns [`ParseError::Lex`] on input the lexer cannot classify, which in
/// practice means an unterminated string.
pub fn lex(source: &str) -> Result<Vec<Lexeme<'_>>, ParseError> {
    let lexemes = scan(source)?;
    if let Some(bad) = lexemes
        .iter()
        .find(|l| l.token == Token::UnterminatedString)
    {
        return Err(ParseError::Lex { line: bad.line });
    }
    Ok(lexemes)
}

fn scan(source: &str) -> Result<Vec<Lexeme<'_>>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut lexemes = Vec::new();
    let mut line = 1;

    while let Some(result) = lexer.next() {
        let Ok(token) = result else {
            return Err(ParseError::Lex { line });
        };

        lexemes.push(Lexeme {
            token,
            text: lexer.slice(),
            span: lexer.span(),
            line,
        });

        if token == Token::Newline {
            line += 1;
        }
    }

    Ok(lexemes)
}

/// Splits a single statement into token texts, dropping newlines.
///
/// Used by the normalizer, which works on already-isolated statements. An
/// unterminated string has no line to end on once the statement is joined
/// back together, so from the first one onwards line breaks read as spaces.
/// Tokenizing the joined result again then gives the same split.
pub fn statement_tokens(statement: &str) -> Result<Vec<Cow<'_, str>>, ParseError> {
    let lexemes = scan(statement)?;
    let open_at = lexemes
        .iter()
        .position(|l| l.token == Token::UnterminatedString);

    let Some(open_at) = open_at else {
        return Ok(token_texts(lexemes).map(Cow::Borrowed).collect());
    };

    let tail_start = lexemes[open_at].span.start;
    let folded_tail = statement[tail_start..].replace('\n', " ");
    let mut tokens: Vec<Cow<'_, str>> = token_texts(lexemes.into_iter().take(open_at))
        .map(Cow::Borrowed)
        .collect();
    tokens.extend(token_texts(scan(&folded_tail)?).map(|t| Cow::Owned(t.to_string())));
    Ok(tokens)
}

fn token_texts<'a>(
    lexemes: impl IntoIterator<Item = Lexeme<'a>>,
) -> impl Iterator<Item = &'a str> {
    lexemes
        .into_iter()
        .filter(|l| l.token != Token::Newline)
        .map(|l| l.text)
}
