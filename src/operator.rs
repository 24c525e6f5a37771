//! # Operator Parser
//!
//! Turns `namespace::operator(parameter)` tokens into typed [`QueryOperator`]
//! values. Parsing is total: a token with an unknown name, or a parameter that
//! does not convert to the operator's type, becomes [`QueryOperator::Unknown`]
//! carrying the raw token so the caller can report it.
//!
//! ## Text Syntax
//!
//! ```text
//! lib::directory.deep(workout);sort::duration(false);pipe::recommend(1);pipe::limit(5)
//! ```
//!
//! Segments are separated by `;`. Inside a parameter, `\(`, `\)`, `\;` and
//! `\\` escape the delimiters and the backslash itself.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One `(operator, parameter)` pair as it travels over the wire or is stored
/// in a saved mix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MixQueryToken {
    pub operator: String,
    pub parameter: String,
}

impl MixQueryToken {
    pub fn new(operator: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            parameter: parameter.into(),
        }
    }
}

impl From<(String, String)> for MixQueryToken {
    fn from((operator, parameter): (String, String)) -> Self {
        Self { operator, parameter }
    }
}

impl From<(&str, &str)> for MixQueryToken {
    fn from((operator, parameter): (&str, &str)) -> Self {
        Self::new(operator, parameter)
    }
}

impl fmt::Display for MixQueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operator, escape(&self.parameter))
    }
}

/// Typed form of a single mix operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOperator {
    Artist(i32),
    Album(i32),
    Playlist(i32),
    Track(i32),
    DirectoryDeep(String),
    DirectoryShallow(String),
    SortLastModified(bool),
    SortDuration(bool),
    SortPlayedThrough(bool),
    SortSkipped(bool),
    SortTrackNumber(bool),
    FilterLiked(bool),
    FilterWithCoverArt(bool),
    Limit(u64),
    Recommend(i32),
    /// Raw `operator(parameter)` text of a token that could not be parsed.
    Unknown(String),
}

impl QueryOperator {
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Canonical `namespace::operator` name, `None` for [`QueryOperator::Unknown`].
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            Self::Artist(_) => "lib::artist",
            Self::Album(_) => "lib::album",
            Self::Playlist(_) => "lib::playlist",
            Self::Track(_) => "lib::track",
            Self::DirectoryDeep(_) => "lib::directory.deep",
            Self::DirectoryShallow(_) => "lib::directory.shallow",
            Self::SortLastModified(_) => "sort::last_modified",
            Self::SortDuration(_) => "sort::duration",
            Self::SortPlayedThrough(_) => "sort::playedthrough",
            Self::SortSkipped(_) => "sort::skipped",
            Self::SortTrackNumber(_) => "sort::track_number",
            Self::FilterLiked(_) => "filter::liked",
            Self::FilterWithCoverArt(_) => "filter::with_cover_art",
            Self::Limit(_) => "pipe::limit",
            Self::Recommend(_) => "pipe::recommend",
            Self::Unknown(_) => return None,
        };
        Some(name)
    }
}

/// Parameter type expected by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Id,
    Path,
    Ascending,
    Flag,
    Count,
    Group,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Id => "integer id",
            Self::Path => "path string",
            Self::Ascending => "bool (asc)",
            Self::Flag => "bool",
            Self::Count => "unsigned integer",
            Self::Group => "integer group id",
        };
        f.write_str(text)
    }
}

/// Documentation row for one supported operator.
#[derive(Debug, Clone, Copy)]
pub struct OperatorInfo {
    pub name: &'static str,
    pub parameter: ParameterKind,
    pub effect: &'static str,
}

/// Every operator the parser understands, in display order.
pub const OPERATORS: &[OperatorInfo] = &[
    OperatorInfo { name: "lib::artist", parameter: ParameterKind::Id, effect: "OR-filter by artist" },
    OperatorInfo { name: "lib::album", parameter: ParameterKind::Id, effect: "OR-filter by album" },
    OperatorInfo { name: "lib::playlist", parameter: ParameterKind::Id, effect: "OR-filter by playlist" },
    OperatorInfo { name: "lib::track", parameter: ParameterKind::Id, effect: "OR-filter by track" },
    OperatorInfo { name: "lib::directory.deep", parameter: ParameterKind::Path, effect: "OR-filter, recursive" },
    OperatorInfo { name: "lib::directory.shallow", parameter: ParameterKind::Path, effect: "OR-filter, non-recursive" },
    OperatorInfo { name: "sort::track_number", parameter: ParameterKind::Ascending, effect: "sort key" },
    OperatorInfo { name: "sort::last_modified", parameter: ParameterKind::Ascending, effect: "sort key" },
    OperatorInfo { name: "sort::duration", parameter: ParameterKind::Ascending, effect: "sort key" },
    OperatorInfo { name: "sort::playedthrough", parameter: ParameterKind::Ascending, effect: "sort key, requires stats join" },
    OperatorInfo { name: "sort::skipped", parameter: ParameterKind::Ascending, effect: "sort key, requires stats join" },
    OperatorInfo { name: "filter::liked", parameter: ParameterKind::Flag, effect: "AND-filter, requires stats join" },
    OperatorInfo { name: "filter::with_cover_art", parameter: ParameterKind::Flag, effect: "AND-filter" },
    OperatorInfo { name: "pipe::limit", parameter: ParameterKind::Count, effect: "caps total rows" },
    OperatorInfo { name: "pipe::recommend", parameter: ParameterKind::Group, effect: "activates recommendation ordering" },
];

/// Parse one token. Never fails: see [`QueryOperator::Unknown`].
#[must_use]
pub fn parse(token: &MixQueryToken) -> QueryOperator {
    let parameter = token.parameter.as_str();
    let parsed = match token.operator.trim() {
        "lib::artist" => parse_number(token).map(QueryOperator::Artist),
        "lib::album" => parse_number(token).map(QueryOperator::Album),
        "lib::playlist" => parse_number(token).map(QueryOperator::Playlist),
        "lib::track" => parse_number(token).map(QueryOperator::Track),
        "lib::directory.deep" => parse_path(token).map(QueryOperator::DirectoryDeep),
        "lib::directory.shallow" => parse_path(token).map(QueryOperator::DirectoryShallow),
        "sort::track_number" => parse_bool(token).map(QueryOperator::SortTrackNumber),
        "sort::last_modified" => parse_bool(token).map(QueryOperator::SortLastModified),
        "sort::duration" => parse_bool(token).map(QueryOperator::SortDuration),
        "sort::playedthrough" => parse_bool(token).map(QueryOperator::SortPlayedThrough),
        "sort::skipped" => parse_bool(token).map(QueryOperator::SortSkipped),
        "filter::liked" => parse_bool(token).map(QueryOperator::FilterLiked),
        "filter::with_cover_art" => parse_bool(token).map(QueryOperator::FilterWithCoverArt),
        "pipe::limit" => parse_number(token).map(QueryOperator::Limit),
        "pipe::recommend" => parse_number(token).map(QueryOperator::Recommend),
        other => {
            warn!("Unknown operator: {other}({parameter})");
            None
        }
    };

    parsed.unwrap_or_else(|| QueryOperator::Unknown(token.to_string()))
}

/// Parse every token, preserving order.
#[must_use]
pub fn parse_all(tokens: &[MixQueryToken]) -> Vec<QueryOperator> {
    tokens.iter().map(parse).collect()
}

fn parse_number<T>(token: &MixQueryToken) -> Option<T>
where
    T: FromStr,
{
    match token.parameter.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                "Unable to parse the parameter of operator: {}({}), expected a number",
                token.operator, token.parameter
            );
            None
        }
    }
}

fn parse_bool(token: &MixQueryToken) -> Option<bool> {
    match token.parameter.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => {
            warn!(
                "Unable to parse the parameter of operator: {}({}), expected true or false",
                token.operator, token.parameter
            );
            None
        }
    }
}

fn parse_path(token: &MixQueryToken) -> Option<String> {
    if token.parameter.trim().is_empty() {
        warn!("Empty directory parameter for operator: {}", token.operator);
        return None;
    }
    Some(token.parameter.clone())
}

/// Split mix text into tokens.
///
/// A non-blank segment without a well-formed `(...)` still yields a token
/// (operator = whole segment, empty parameter) so it surfaces as a diagnostic
/// rather than vanishing.
#[must_use]
pub fn parse_mix_text(text: &str) -> Vec<MixQueryToken> {
    split_segments(text)
        .into_iter()
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }

            match delimiters(segment) {
                Some((open, close)) => {
                    let operator = unescape(segment[..open].trim());
                    let parameter = unescape(segment[open + 1..close].trim());
                    Some(MixQueryToken::new(operator, parameter))
                }
                None => Some(MixQueryToken::new(unescape(segment), "")),
            }
        })
        .collect()
}

/// Render tokens back into mix text. Inverse of [`parse_mix_text`] for
/// well-formed tokens.
#[must_use]
pub fn format_mix_text(tokens: &[MixQueryToken]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// Split on unescaped `;`. Escapes stay in place for [`unescape`].
fn split_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ';' => {
                segments.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);

    segments
}

/// Byte offsets of the first unescaped `(` and the last unescaped `)` after it.
fn delimiters(segment: &str) -> Option<(usize, usize)> {
    let mut open = None;
    let mut close = None;
    let mut escaped = false;

    for (index, c) in segment.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' if open.is_none() => open = Some(index),
            ')' if open.is_some() => close = Some(index),
            _ => {}
        }
    }

    Some((open?, close?))
}

const fn is_escapable(c: char) -> bool {
    matches!(c, '\\' | '(' | ')' | ';')
}

/// Resolve `\\`, `\(`, `\)` and `\;`. Any other backslash is literal, so
/// Windows-style paths such as `rock\live` pass through unchanged.
fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek().filter(|next| is_escapable(**next)) {
                unescaped.push(next);
                chars.next();
                continue;
            }
        }
        unescaped.push(c);
    }

    unescaped
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if is_escapable(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
