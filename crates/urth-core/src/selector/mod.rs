// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Label selectors.
//!
//! A [`Selector`] is a conjunction of [`Requirement`]s over a label map.
//! Selectors come from two places: the textual form used in search queries
//! (see [`Selector::parse`]) and the structured [`LabelSelector`] stored in
//! scenario and runner requirements.
//!
//! The same selector is evaluated in memory with [`Selector::matches`] and
//! translated to SQL by [`sql::push_selector`]. Both evaluators must agree.
//!
//! # Grammar
//!
//! ```text
//! selector    := ε | requirement ("," requirement)*
//! requirement := "!" key
//!              | key
//!              | key ("=" | "==" | "!=") value
//!              | key (">" | "<") value
//!              | key ("in" | "notin") "(" value ("," value)* ")"
//! ```

mod parse;
pub mod sql;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::labels::Labels;

/// Selector parse and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SelectorError {
    /// The textual selector could not be parsed.
    #[error("invalid selector at position {position}: {message}")]
    Parse {
        /// Byte offset of the offending token.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// A label key is empty or contains characters outside `[A-Za-z0-9._/-]`.
    #[error("invalid label key '{0}'")]
    InvalidKey(String),

    /// The operator needs values but none were given.
    #[error("operator {operator} on key '{key}' requires values")]
    MissingValues {
        /// Requirement key.
        key: String,
        /// Requirement operator.
        operator: Operator,
    },

    /// The operator takes fewer values than given.
    #[error("operator {operator} on key '{key}' takes at most {expected} value(s)")]
    TooManyValues {
        /// Requirement key.
        key: String,
        /// Requirement operator.
        operator: Operator,
        /// Allowed number of values.
        expected: usize,
    },
}

/// Result type for selector operations.
pub type Result<T> = std::result::Result<T, SelectorError>;

/// Requirement operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Key present with a value in the set.
    In,
    /// Key absent, or present with a value outside the set.
    NotIn,
    /// Key present.
    Exists,
    /// Key absent.
    DoesNotExist,
    /// Key present with exactly this value.
    Equals,
    /// Key present with a different value.
    NotEquals,
    /// Key present with a numerically greater value.
    GreaterThan,
    /// Key present with a numerically smaller value.
    LessThan,
}

impl Operator {
    /// How many values the operator accepts: `(min, max)`.
    fn arity(self) -> (usize, usize) {
        match self {
            Self::Exists | Self::DoesNotExist => (0, 0),
            Self::Equals | Self::NotEquals | Self::GreaterThan | Self::LessThan => (1, 1),
            Self::In | Self::NotIn => (1, usize::MAX),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::In => "in",
            Self::NotIn => "notin",
            Self::Exists => "exists",
            Self::DoesNotExist => "!",
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
        };
        f.write_str(s)
    }
}

/// A structured requirement as carried in [`LabelSelector::match_selector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    /// Label key.
    pub key: String,
    /// Operator.
    pub operator: Operator,
    /// Operand values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Structured selector stored on scenarios and runners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact-match labels.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub match_labels: Labels,
    /// Set-based requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_selector: Vec<SelectorRequirement>,
}

impl LabelSelector {
    /// True if the selector has no requirements.
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_selector.is_empty()
    }

    /// Validate and convert into an evaluable [`Selector`].
    pub fn to_selector(&self) -> Result<Selector> {
        let mut requirements =
            Vec::with_capacity(self.match_labels.len() + self.match_selector.len());
        for (key, value) in &self.match_labels {
            requirements.push(Requirement::new(key, Operator::Equals, [value])?);
        }
        for req in &self.match_selector {
            requirements.push(Requirement::new(&req.key, req.operator, &req.values)?);
        }
        Ok(Selector { requirements })
    }
}

/// Renders the selector in its textual form, match labels first.
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| {
            if first {
                first = false;
                Ok(())
            } else {
                f.write_str(",")
            }
        };

        for (key, value) in &self.match_labels {
            sep(f)?;
            write!(f, "{key}={value}")?;
        }
        for req in &self.match_selector {
            sep(f)?;
            match req.operator {
                Operator::Exists => write!(f, "{}", req.key)?,
                Operator::DoesNotExist => write!(f, "!{}", req.key)?,
                Operator::In | Operator::NotIn => {
                    write!(f, "{} {} ({})", req.key, req.operator, req.values.join(", "))?
                }
                op => write!(f, "{}{}{}", req.key, op, req.values.join(","))?,
            }
        }
        Ok(())
    }
}

/// A single validated requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    /// Build a requirement, checking the key and the operator's arity.
    ///
    /// Set operands are sorted and deduplicated.
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = key.into();
        validate_key(&key)?;

        let mut values: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        let (min, max) = operator.arity();
        if values.len() < min {
            return Err(SelectorError::MissingValues { key, operator });
        }
        if values.len() > max {
            return Err(SelectorError::TooManyValues {
                key,
                operator,
                expected: max,
            });
        }
        if matches!(operator, Operator::In | Operator::NotIn) {
            values.sort_unstable();
            values.dedup();
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    /// Label key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Operand values.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The operand of a single-valued operator.
    pub(crate) fn single_value(&self) -> Result<&str> {
        match self.values.as_slice() {
            [value] => Ok(value),
            [] => Err(SelectorError::MissingValues {
                key: self.key.clone(),
                operator: self.operator,
            }),
            _ => Err(SelectorError::TooManyValues {
                key: self.key.clone(),
                operator: self.operator,
                expected: 1,
            }),
        }
    }

    /// Evaluate against a label map.
    pub fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            Operator::Equals => value.is_some_and(|v| self.values.first() == Some(v)),
            Operator::NotEquals => value.is_some_and(|v| self.values.first() != Some(v)),
            Operator::GreaterThan => self.compare(value) == Some(Ordering::Greater),
            Operator::LessThan => self.compare(value) == Some(Ordering::Less),
        }
    }

    fn compare(&self, value: Option<&String>) -> Option<Ordering> {
        let lhs = Number::parse(value?)?;
        let rhs = Number::parse(self.values.first()?)?;
        lhs.compare(rhs)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::In | Operator::NotIn => {
                write!(f, "{} {} ({})", self.key, self.operator, self.values.join(","))
            }
            op => write!(f, "{}{}{}", self.key, op, self.values.join(",")),
        }
    }
}

/// A numeric label value. Integers and floats never compare with each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Parsed as a signed 64-bit integer.
    Int(i64),
    /// Parsed as a finite float, and not as an integer.
    Float(f64),
}

impl Number {
    /// Parse a label value. Non-numeric and non-finite values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if let Ok(i) = value.parse::<i64>() {
            return Some(Self::Int(i));
        }
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Self::Float)
    }

    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

/// A conjunction of requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// The selector that matches every label map.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse the textual form.
    pub fn parse(input: &str) -> Result<Self> {
        parse::parse(input).map(|requirements| Self { requirements })
    }

    /// Add a requirement.
    pub fn with(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// True if there are no requirements.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// The requirements, in order.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// True iff every requirement is satisfied by `labels`.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|req| req.matches(labels))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{req}")?;
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'));
    if valid {
        Ok(())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}
