//! Nullability classes, observed null patterns, and column kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many nulls a declared column tolerates.
///
/// The classes form a ceiling, not a floor: `Some` permits anything from
/// zero nulls up to an entirely null column. `All` permits the same
/// patterns and additionally marks the column as one that may be
/// synthesized as all-null when it is absent from an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nullability {
    /// No value may be null.
    None,
    /// Any number of nulls, up to and including all of them.
    Some,
    /// Any number of nulls; the column may be materialized as all-null.
    All,
}

impl Nullability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Nullability::None => "none",
            Nullability::Some => "some",
            Nullability::All => "all",
        }
    }

    /// Nullability used when a declaration does not say.
    pub fn default_for(kind: ColumnKind, has_default: bool) -> Self {
        match kind {
            ColumnKind::Required => Nullability::Some,
            ColumnKind::Optional if has_default => Nullability::Some,
            ColumnKind::Optional => Nullability::All,
        }
    }

    /// Whether an observed null pattern satisfies this class.
    pub fn admits(&self, pattern: NullPattern) -> bool {
        match self {
            Nullability::None => pattern == NullPattern::NoNulls,
            Nullability::Some | Nullability::All => true,
        }
    }

    /// Whether an absent column of this class may be synthesized as all-null.
    pub fn is_synthesizable(&self) -> bool {
        *self == Nullability::All
    }
}

impl From<bool> for Nullability {
    /// `true` permits a fully null column, `false` forbids nulls.
    fn from(nullable: bool) -> Self {
        if nullable {
            Nullability::All
        } else {
            Nullability::None
        }
    }
}

impl fmt::Display for Nullability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Nullability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "false" => Ok(Nullability::None),
            "some" => Ok(Nullability::Some),
            "all" | "true" => Ok(Nullability::All),
            _ => Err(format!(
                "Invalid nullability: '{}'. Expected: none, some, all",
                s
            )),
        }
    }
}

/// Null pattern observed in a column of concrete data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPattern {
    NoNulls,
    SomeNulls,
    AllNulls,
}

impl NullPattern {
    /// Classify a column from its null count and length.
    ///
    /// An empty column has no nulls.
    pub fn from_counts(null_count: usize, len: usize) -> Self {
        if null_count == 0 || len == 0 {
            NullPattern::NoNulls
        } else if null_count >= len {
            NullPattern::AllNulls
        } else {
            NullPattern::SomeNulls
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NullPattern::NoNulls => "no nulls",
            NullPattern::SomeNulls => "some nulls",
            NullPattern::AllNulls => "all nulls",
        }
    }
}

impl fmt::Display for NullPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a declared column must be present in every input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Required,
    Optional,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Required => "required",
            ColumnKind::Optional => "optional",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
