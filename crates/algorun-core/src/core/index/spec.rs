use super::IndexError;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How the integers of an [`IndexSpecification`] are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexKind {
    /// Raw 0-based position in the workspace.
    WorkspaceIndex,
    /// Dataset-defined spectrum label, looked up to a position.
    SpectrumNumber,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexKind::WorkspaceIndex => "WorkspaceIndex",
            IndexKind::SpectrumNumber => "SpectrumNumber",
        })
    }
}

impl FromStr for IndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "workspaceindex" => Ok(IndexKind::WorkspaceIndex),
            "spectrumnumber" => Ok(IndexKind::SpectrumNumber),
            _ => Err(IndexError::UnknownKind(s.to_string())),
        }
    }
}

/// One parsed element of the textual grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexToken {
    Single(u64),
    /// Inclusive on both ends, `lo <= hi`.
    Range(u64, u64),
}

impl IndexToken {
    pub fn values(self) -> impl Iterator<Item = u64> {
        let (lo, hi) = match self {
            IndexToken::Single(v) => (v, v),
            IndexToken::Range(lo, hi) => (lo, hi),
        };
        lo..=hi
    }

    pub fn max_value(self) -> u64 {
        match self {
            IndexToken::Single(v) => v,
            IndexToken::Range(_, hi) => hi,
        }
    }
}

/// A user-facing description of which spectra to operate on.
///
/// An empty text or an empty list selects every spectrum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IndexSpecification {
    Text(String),
    List(Vec<u64>),
}

impl Default for IndexSpecification {
    fn default() -> Self {
        Self::all()
    }
}

impl IndexSpecification {
    pub fn all() -> Self {
        IndexSpecification::Text(String::new())
    }

    pub fn is_all(&self) -> bool {
        match self {
            IndexSpecification::Text(text) => text.trim().is_empty(),
            IndexSpecification::List(values) => values.is_empty(),
        }
    }

    /// Parses the specification into tokens. `None` means "every spectrum".
    pub fn tokens(&self) -> Result<Option<Vec<IndexToken>>, IndexError> {
        if self.is_all() {
            return Ok(None);
        }
        match self {
            IndexSpecification::Text(text) => parse_tokens(text).map(Some),
            IndexSpecification::List(values) => {
                Ok(Some(values.iter().copied().map(IndexToken::Single).collect()))
            }
        }
    }
}

impl From<&str> for IndexSpecification {
    fn from(text: &str) -> Self {
        IndexSpecification::Text(text.to_string())
    }
}

impl From<String> for IndexSpecification {
    fn from(text: String) -> Self {
        IndexSpecification::Text(text)
    }
}

impl From<Vec<u64>> for IndexSpecification {
    fn from(values: Vec<u64>) -> Self {
        IndexSpecification::List(values)
    }
}

impl fmt::Display for IndexSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSpecification::Text(text) => f.write_str(text.trim()),
            IndexSpecification::List(values) => write!(f, "{}", values.iter().join(",")),
        }
    }
}

/// Parses the comma-separated grammar: bare non-negative integers or inclusive
/// `lo-hi` ranges, whitespace around tokens ignored.
pub fn parse_tokens(text: &str) -> Result<Vec<IndexToken>, IndexError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',').map(parse_token).collect()
}

fn parse_token(raw: &str) -> Result<IndexToken, IndexError> {
    let token = raw.trim();
    let invalid = |reason| IndexError::InvalidRangeSyntax {
        token: token.to_string(),
        reason,
    };

    if token.is_empty() {
        return Err(invalid("empty token"));
    }

    match token.split_once('-') {
        None => parse_value(token)
            .map(IndexToken::Single)
            .ok_or_else(|| invalid("expected a non-negative integer")),
        Some((lo, hi)) => {
            let lo = parse_value(lo.trim())
                .ok_or_else(|| invalid("range start is not a non-negative integer"))?;
            let hi = parse_value(hi.trim())
                .ok_or_else(|| invalid("range end is not a non-negative integer"))?;
            if lo > hi {
                return Err(invalid("range start is greater than range end"));
            }
            Ok(IndexToken::Range(lo, hi))
        }
    }
}

fn parse_value(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
