//! Canonical statement text for rule comparison
//!
//! The same logical rule is listed differently between two captures:
//! counters advance, and rules inserted by iptables-nft show up as
//! `xt target "MASQUERADE"` where native nft prints `masquerade`. Rewrites
//! work on lexer tokens, not on raw text, so quoted strings such as rule
//! comments are never touched.
//!
//! | Captured                          | Normalized         |
//! |-----------------------------------|--------------------|
//! | `counter packets 12 bytes 720`    | `counter`          |
//! | `xt target "MASQUERADE"`          | `masquerade`       |
//! | `xt target "DNAT" to:10.0.0.2:80` | `dnat to 10.0.0.2:80` |
//! | `xt target "SNAT" to: 10.0.0.1`   | `snat to 10.0.0.1` |
//!
//! Normalization is idempotent.

use crate::core::lexer;
use crate::core::ruleset::RulesetDocument;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Options for the document-level passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Fill in `xt target "DNAT"` destinations from matching `ip6 daddr` accept rules
    pub infer_dnat_targets: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            infer_dnat_targets: true,
        }
    }
}

/// Address-translation targets iptables-nft emits as `xt target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NatTarget {
    Dnat,
    Snat,
    Masquerade,
}

impl NatTarget {
    fn from_token(token: &str) -> Option<Self> {
        match unquote(token) {
            "DNAT" => Some(NatTarget::Dnat),
            "SNAT" => Some(NatTarget::Snat),
            "MASQUERADE" => Some(NatTarget::Masquerade),
            _ => None,
        }
    }
}

/// Normalizes a single statement.
///
/// Comments are dropped, whitespace collapsed, trailing `;` removed and
/// volatile or low-level constructs rewritten (see module docs).
pub fn normalize(statement: &str) -> String {
    let Ok(tokens) = lexer::statement_tokens(statement) else {
        return collapse_fallback(statement);
    };
    let tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();

    // Rewrites only ever shorten the token list, so this terminates
    let mut out = rewrite_tokens(&tokens);
    loop {
        let refs: Vec<&str> = out.iter().map(String::as_str).collect();
        let next = rewrite_tokens(&refs);
        if next == out {
            break;
        }
        out = next;
    }

    while out.last().is_some_and(|t| t == ";") {
        out.pop();
    }
    join_tokens(&out)
}

fn rewrite_tokens(tokens: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let rest = &tokens[i..];

        if let Some(consumed) = match_counter_values(rest) {
            out.push("counter".to_string());
            i += consumed;
            continue;
        }

        if let Some((replacement, consumed)) = match_xt_nat_target(rest) {
            out.extend(replacement);
            i += consumed;
            continue;
        }

        out.push(tokens[i].to_string());
        i += 1;
    }

    out
}

/// `counter packets N bytes N` → number of tokens to collapse
fn match_counter_values(tokens: &[&str]) -> Option<usize> {
    match tokens {
        ["counter", "packets", packets, "bytes", bytes, ..]
            if is_number(packets) && is_number(bytes) =>
        {
            Some(5)
        }
        _ => None,
    }
}

/// `xt target <NAT> [to:DEST]` → replacement tokens and number of tokens consumed
fn match_xt_nat_target(tokens: &[&str]) -> Option<(Vec<String>, usize)> {
    let ["xt", "target", target, rest @ ..] = tokens else {
        return None;
    };
    let target = NatTarget::from_token(target)?;
    let destination = nat_destination(rest);

    match (target, destination) {
        (NatTarget::Masquerade, dest) => {
            let consumed = 3 + dest.map_or(0, |(_, n)| n);
            Some((vec!["masquerade".to_string()], consumed))
        }
        (NatTarget::Dnat, Some((dest, n))) => Some((
            vec!["dnat".to_string(), "to".to_string(), dest.to_string()],
            3 + n,
        )),
        (NatTarget::Snat, Some((dest, n))) => Some((
            vec!["snat".to_string(), "to".to_string(), dest.to_string()],
            3 + n,
        )),
        // Without a destination there is no high-level equivalent
        (NatTarget::Dnat | NatTarget::Snat, None) => None,
    }
}

/// Parses `to:X`, `to :X`, `to: X` and `to : X`.
fn nat_destination<'a>(tokens: &[&'a str]) -> Option<(&'a str, usize)> {
    let after_to = tokens.first()?.strip_prefix("to")?;

    if after_to.is_empty() {
        let value = tokens.get(1)?.strip_prefix(':')?;
        if value.is_empty() {
            let value = tokens.get(2).copied().filter(|t| is_plain_word(t))?;
            return Some((value, 3));
        }
        return Some((value, 2));
    }

    let value = after_to.strip_prefix(':')?;
    if value.is_empty() {
        let value = tokens.get(1).copied().filter(|t| is_plain_word(t))?;
        return Some((value, 2));
    }
    Some((value, 1))
}

/// Joins tokens with single spaces; `;` attaches to the preceding token.
fn join_tokens(tokens: &[String]) -> String {
    let mut out = String::new();
    for token in tokens {
        if !out.is_empty() && token != ";" {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

fn collapse_fallback(statement: &str) -> String {
    let mut collapsed = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    while collapsed.ends_with(';') {
        collapsed.pop();
        collapsed.truncate(collapsed.trim_end().len());
    }
    collapsed
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_plain_word(token: &str) -> bool {
    !matches!(token, "{" | "}" | ";") && !token.starts_with('"')
}

/// Fills in missing `xt target "DNAT"` destinations.
///
/// Docker's IPv6 port publishing through iptables-nft lists the NAT rule
/// without its destination, while the matching filter rule names it:
///
/// ```text
/// ip6 daddr fd00::2 iifname != "docker0" oifname "docker0" tcp dport 80 counter accept
/// iifname != "docker0" tcp dport 80 counter xt target "DNAT"
/// ```
///
/// When exactly one `ip6 daddr` is known for a `(protocol, port)` pair, the
/// NAT rule becomes `dnat to [fd00::2]:80`. Ambiguous pairs are left alone.
pub fn infer_dnat_targets(document: &mut RulesetDocument) {
    let mut known: HashMap<(String, String), BTreeSet<String>> = HashMap::new();

    for rule in document.rules() {
        let Ok(tokens) = lexer::statement_tokens(&rule.normalized) else {
            continue;
        };
        let tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
        if let Some((proto, port, addr)) = match_ip6_accept(&tokens) {
            known.entry((proto, port)).or_default().insert(addr);
        }
    }

    if known.is_empty() {
        return;
    }

    for rule in document.rules_mut() {
        let Ok(tokens) = lexer::statement_tokens(&rule.normalized) else {
            continue;
        };
        let tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
        let Some(xt_at) = find_bare_xt_dnat(&tokens) else {
            continue;
        };
        let Some((proto, port)) = find_dport(&tokens) else {
            continue;
        };

        let Some(addrs) = known.get(&(proto.to_string(), port.to_string())) else {
            continue;
        };
        if addrs.len() != 1 {
            warn!(
                "Cannot infer DNAT target for line {}: {} candidate addresses for {proto} dport {port}",
                rule.line,
                addrs.len()
            );
            continue;
        }
        let Some(addr) = addrs.iter().next() else {
            continue;
        };

        let destination = format!("{}:{port}", bracket_ipv6(addr));
        let mut rewritten: Vec<String> = tokens[..xt_at].iter().map(ToString::to_string).collect();
        rewritten.extend(["dnat".to_string(), "to".to_string(), destination]);
        rewritten.extend(tokens[xt_at + 3..].iter().map(ToString::to_string));
        let normalized = join_tokens(&rewritten);
        debug!(
            "Inferred DNAT target on line {}: '{}' -> '{}'",
            rule.line, rule.normalized, normalized
        );
        rule.normalized = normalized;
    }
}

/// `ip6 daddr ADDR ... (tcp|udp) dport PORT ... accept`
fn match_ip6_accept(tokens: &[&str]) -> Option<(String, String, String)> {
    let daddr_at = tokens.windows(3).position(|w| {
        w[0] == "ip6" && w[1] == "daddr" && is_plain_word(w[2]) && w[2] != "!="
    })?;
    let addr = tokens[daddr_at + 2];
    let after_addr = &tokens[daddr_at + 3..];

    let dport_at = after_addr.windows(3).position(|w| {
        matches!(w[0], "tcp" | "udp") && w[1] == "dport" && is_number(w[2])
    })?;
    let proto = after_addr[dport_at];
    let port = after_addr[dport_at + 2];

    after_addr[dport_at + 3..]
        .contains(&"accept")
        .then(|| (proto.to_string(), port.to_string(), addr.to_string()))
}

/// Position of an `xt target DNAT` that has no destination
fn find_bare_xt_dnat(tokens: &[&str]) -> Option<usize> {
    let at = tokens.windows(3).position(|w| {
        w[0] == "xt" && w[1] == "target" && NatTarget::from_token(w[2]) == Some(NatTarget::Dnat)
    })?;
    nat_destination(&tokens[at + 3..]).is_none().then_some(at)
}

fn find_dport<'a>(tokens: &[&'a str]) -> Option<(&'a str, &'a str)> {
    tokens
        .windows(3)
        .find(|w| matches!(w[0], "tcp" | "udp") && w[1] == "dport" && is_number(w[2]))
        .map(|w| (w[0], w[2]))
}

fn bracket_ipv6(addr: &str) -> String {
    if addr.contains(':') && !(addr.starts_with('[') && addr.ends_with(']')) {
        format!("[{addr}]")
    } else {
        addr.to_string()
    }
}
