// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Canonical quoting of dotted identifier references for stores with
//! case-sensitive names.
//!
//! `Sales.SalesOrderHeader` in table position becomes
//! `"Sales"."SalesOrderHeader"`, and `soh.TotalDue` becomes `soh."TotalDue"`
//! when `soh` is an alias declared in the query. Qualifiers that are not
//! aliases are quoted as well. String literals, comments, dollar-quoted
//! bodies, bare identifiers and function calls are left alone. The rewrite is
//! idempotent.

use std::collections::HashSet;

const TABLE_KEYWORDS: &[&str] = &["JOIN", "UPDATE", "INTO"];
/// Functions whose argument syntax uses `FROM` without naming a relation.
const FROM_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "OVERLAY", "POSITION"];
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT", "ON",
    "USING", "WINDOW", "RETURNING", "SET", "VALUES", "SELECT", "FETCH", "FOR",
];
const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BY", "CASE", "CROSS", "DESC", "DISTINCT", "ELSE", "END", "EXCEPT",
    "FETCH", "FOR", "FROM", "FULL", "GROUP", "HAVING", "IN", "INNER", "INTERSECT", "IS", "JOIN",
    "LATERAL", "LEFT", "LIMIT", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER",
    "OUTER", "RIGHT", "SELECT", "SET", "THEN", "UNION", "USING", "WHEN", "WHERE", "WINDOW",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Space,
    Comment,
    Literal,
    Quoted,
    Word,
    Number,
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}
impl Token<'_> {
    fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Quoted)
    }
    fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Space | TokenKind::Comment)
    }
    fn upper(&self) -> Option<String> {
        (self.kind == TokenKind::Word).then(|| self.text.to_ascii_uppercase())
    }
}

fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map_or(sql.len(), |(b, _)| *b);
    let char_at = |i: usize| chars.get(i).map(|(_, c)| *c);
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i].1;
        let start = i;
        let kind = if c.is_whitespace() {
            while char_at(i).is_some_and(char::is_whitespace) {
                i += 1;
            }
            TokenKind::Space
        } else if c == '-' && char_at(i + 1) == Some('-') {
            while char_at(i).is_some_and(|c| c != '\n') {
                i += 1;
            }
            TokenKind::Comment
        } else if c == '/' && char_at(i + 1) == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i].1 == '*' && char_at(i + 1) == Some('/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            TokenKind::Comment
        } else if c == '\'' || c == '"' {
            i += 1;
            loop {
                match char_at(i) {
                    None => break,
                    Some(q) if q == c && char_at(i + 1) == Some(c) => i += 2,
                    Some(q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            if c == '"' {
                TokenKind::Quoted
            } else {
                TokenKind::Literal
            }
        } else if let Some(tag_len) = dollar_tag_len(&chars, i) {
            let tag: String = chars[i..i + tag_len].iter().map(|(_, c)| *c).collect();
            i += tag_len;
            loop {
                if i >= chars.len() {
                    break;
                }
                if chars[i].1 == '$' && sql[byte_at(i)..].starts_with(tag.as_str()) {
                    i += tag_len;
                    break;
                }
                i += 1;
            }
            TokenKind::Literal
        } else if c.is_alphabetic() || c == '_' {
            while char_at(i).is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                i += 1;
            }
            TokenKind::Word
        } else if c.is_ascii_digit() {
            while char_at(i).is_some_and(|c| c.is_ascii_digit() || c == '.') {
                i += 1;
            }
            TokenKind::Number
        } else {
            i += 1;
            TokenKind::Punct(c)
        };
        tokens.push(Token {
            kind,
            text: &sql[byte_at(start)..byte_at(i)],
        });
    }
    tokens
}

/// Length in chars of a `$tag$` opener starting at `i`.
fn dollar_tag_len(chars: &[(usize, char)], i: usize) -> Option<usize> {
    if chars[i].1 != '$' {
        return None;
    }
    let mut j = i + 1;
    while let Some((_, c)) = chars.get(j) {
        match c {
            '$' => return Some(j - i + 1),
            c if c.is_alphabetic() || *c == '_' || (j > i + 1 && c.is_ascii_digit()) => j += 1,
            _ => return None,
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Prev {
    Start,
    Keyword(String),
    Comma,
    Open,
    Close,
    Other,
}

struct Frame {
    opener: Option<String>,
    from_list: bool,
}

#[derive(Debug)]
struct Chain {
    /// Token indices of the name parts.
    parts: Vec<usize>,
    star: bool,
    table_position: bool,
}

fn alias_key(token: &Token) -> String {
    match token.kind {
        TokenKind::Quoted => unquote(token.text),
        _ => token.text.to_lowercase(),
    }
}

fn unquote(text: &str) -> String {
    let inner = text.strip_prefix('"').unwrap_or(text);
    let inner = inner.strip_suffix('"').unwrap_or(inner);
    inner.replace("\"\"", "\"")
}

fn is_reserved(upper: &str) -> bool {
    RESERVED.contains(&upper)
}

struct Analysis {
    chains: Vec<Chain>,
    aliases: HashSet<String>,
}

fn analyse(tokens: &[Token]) -> Analysis {
    let mut chains = Vec::new();
    let mut aliases = HashSet::new();
    let mut frames = vec![Frame {
        opener: None,
        from_list: false,
    }];
    let mut prev = Prev::Start;
    let mut expect_alias = false;
    let next_significant = |from: usize| tokens[from..].iter().position(|t| !t.is_trivia()).map(|p| p + from);
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if token.is_trivia() {
            i += 1;
            continue;
        }
        let frame = frames.last().map(|f| (f.opener.clone(), f.from_list));
        let (opener, from_list) = frame.unwrap_or((None, false));
        let table_position = match &prev {
            Prev::Keyword(k) if TABLE_KEYWORDS.contains(&k.as_str()) => true,
            Prev::Keyword(k) if k == "FROM" => {
                !opener.as_deref().is_some_and(|o| FROM_FUNCTIONS.contains(&o))
            }
            Prev::Comma => from_list,
            _ => false,
        };
        if token.is_name() {
            if let Some(end) = chain_end(tokens, i) {
                let parts: Vec<usize> = (i..end).step_by(2).filter(|&j| tokens[j].is_name()).collect();
                let star = tokens[end - 1].kind == TokenKind::Punct('*');
                let adjacent_before = i > 0 && matches!(tokens[i - 1].kind, TokenKind::Quoted | TokenKind::Word);
                let adjacent_after = tokens.get(end).is_some_and(|t| t.is_name());
                let call = !star
                    && next_significant(end).is_some_and(|n| tokens[n].kind == TokenKind::Punct('('));
                if !(adjacent_before || adjacent_after || call) {
                    chains.push(Chain {
                        parts,
                        star,
                        table_position,
                    });
                }
                expect_alias = table_position;
                prev = Prev::Other;
                i = end;
                continue;
            }
        }
        match token.kind {
            TokenKind::Word => {
                let upper = token.text.to_ascii_uppercase();
                let reserved = is_reserved(&upper);
                if !reserved && (expect_alias || prev == Prev::Keyword("AS".into())) {
                    aliases.insert(alias_key(&token));
                }
                if !reserved && is_cte_name(tokens, i, &next_significant) {
                    aliases.insert(alias_key(&token));
                }
                expect_alias = if upper == "AS" {
                    expect_alias
                } else {
                    !reserved && table_position
                };
                if let Some(top) = frames.last_mut() {
                    if upper == "FROM" && !opener.as_deref().is_some_and(|o| FROM_FUNCTIONS.contains(&o)) {
                        top.from_list = true;
                    } else if upper == "JOIN" {
                        top.from_list = true;
                    } else if CLAUSE_KEYWORDS.contains(&upper.as_str()) {
                        top.from_list = false;
                    }
                }
                prev = if reserved || TABLE_KEYWORDS.contains(&upper.as_str()) {
                    Prev::Keyword(upper)
                } else {
                    Prev::Other
                };
            }
            TokenKind::Quoted => {
                if expect_alias || prev == Prev::Keyword("AS".into()) {
                    aliases.insert(alias_key(&token));
                }
                if is_cte_name(tokens, i, &next_significant) {
                    aliases.insert(alias_key(&token));
                }
                expect_alias = table_position;
                prev = Prev::Other;
            }
            TokenKind::Punct('(') => {
                let opener = match i.checked_sub(1).and_then(|p| tokens[..=p].iter().rposition(|t| !t.is_trivia())) {
                    Some(p) => tokens[p].upper(),
                    None => None,
                };
                frames.push(Frame {
                    opener,
                    from_list: false,
                });
                expect_alias = false;
                prev = Prev::Open;
            }
            TokenKind::Punct(')') => {
                if frames.len() > 1 {
                    frames.pop();
                }
                expect_alias = frames.last().is_some_and(|f| f.from_list);
                prev = Prev::Close;
            }
            TokenKind::Punct(',') => {
                expect_alias = false;
                prev = Prev::Comma;
            }
            _ => {
                expect_alias = false;
                prev = Prev::Other;
            }
        }
        i += 1;
    }
    Analysis { chains, aliases }
}

/// Exclusive end of a dotted chain starting at `start`, if there is one.
fn chain_end(tokens: &[Token], start: usize) -> Option<usize> {
    let mut end = start + 1;
    loop {
        let dot = tokens.get(end).map(|t| t.kind);
        let next = tokens.get(end + 1);
        match (dot, next) {
            (Some(TokenKind::Punct('.')), Some(n)) if n.is_name() => end += 2,
            (Some(TokenKind::Punct('.')), Some(n)) if n.kind == TokenKind::Punct('*') => {
                end += 2;
                break;
            }
            _ => break,
        }
    }
    (end > start + 1).then_some(end)
}

fn is_cte_name(tokens: &[Token], i: usize, next: &impl Fn(usize) -> Option<usize>) -> bool {
    let Some(as_idx) = next(i + 1) else {
        return false;
    };
    if tokens[as_idx].upper().as_deref() != Some("AS") {
        return false;
    }
    next(as_idx + 1).is_some_and(|p| tokens[p].kind == TokenKind::Punct('('))
}

pub fn normalise_identifiers(sql: &str) -> String {
    let tokens = tokenize(sql);
    let Analysis { chains, aliases } = analyse(&tokens);
    let mut quote = vec![false; tokens.len()];
    for chain in &chains {
        let names = chain.parts.len();
        let full = chain.table_position || names >= 3 || (names == 2 && chain.star);
        for (pos, &idx) in chain.parts.iter().enumerate() {
            if tokens[idx].kind != TokenKind::Word {
                continue;
            }
            let is_qualifier = pos == 0 && (names == 2 || chain.star);
            quote[idx] = full || !is_qualifier || !aliases.contains(&alias_key(&tokens[idx]));
        }
    }
    let mut out = String::with_capacity(sql.len() + 16);
    for (token, quoted) in tokens.iter().zip(quote) {
        if quoted {
            out.push('"');
            out.push_str(token.text);
            out.push('"');
        } else {
            out.push_str(token.text);
        }
    }
    out
}
