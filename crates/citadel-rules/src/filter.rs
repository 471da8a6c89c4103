//! Persisted filter trees.
//!
//! A filter is either a condition object or a single-key combinator object:
//!
//! ```json
//! {"and": [
//!   {"name": "corporation", "path": "affiliation", "field": "corporation_id",
//!    "operator": "=", "criteria": 98541700, "text": "Corp A"},
//!   {"or": [
//!     {"path": "skills", "field": "skill_id", "operator": "=", "criteria": 3300},
//!     {"path": "titles", "field": "name", "operator": "contains", "criteria": "FC"}
//!   ]}
//! ]}
//! ```
//!
//! `name` and `text` are display labels and play no part in evaluation.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DefinitionError;
use crate::resolver::Relation;

/// Nesting ceiling applied while reading a tree, independent of the compile-time limit.
pub const PARSE_DEPTH_LIMIT: usize = 128;

/// A node of a filter tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterNode {
    And { and: Vec<FilterNode> },
    Or { or: Vec<FilterNode> },
    Condition(Condition),
}

/// A leaf comparing one field reachable from a character against a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Relation path; empty for the character itself.
    #[serde(default)]
    pub path: String,
    pub field: String,
    pub operator: String,
    pub criteria: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Condition {
    pub fn new(
        path: impl Into<String>,
        field: impl Into<String>,
        operator: impl Into<String>,
        criteria: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            name: None,
            path: path.into(),
            field: field.into(),
            operator: operator.into(),
            criteria: criteria.into(),
            text: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl FilterNode {
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::And { and: children }
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Or { or: children }
    }

    pub fn condition(condition: Condition) -> Self {
        FilterNode::Condition(condition)
    }

    /// Parse a persisted filter document.
    pub fn parse(json: &str) -> Result<Self, DefinitionError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| DefinitionError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Read a filter tree from an already-decoded JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DefinitionError> {
        Self::from_value_at(value, 0)
    }

    fn from_value_at(value: &serde_json::Value, depth: usize) -> Result<Self, DefinitionError> {
        let serde_json::Value::Object(map) = value else {
            return Err(DefinitionError::Malformed(format!(
                "expected a condition or combinator object, got {value}"
            )));
        };

        for combinator in ["and", "or"] {
            let Some(children) = map.get(combinator) else {
                continue;
            };
            if map.len() != 1 {
                return Err(DefinitionError::Malformed(format!(
                    "combinator {combinator:?} must be the only key of its object"
                )));
            }
            let serde_json::Value::Array(children) = children else {
                return Err(DefinitionError::Malformed(format!(
                    "combinator {combinator:?} must hold an array"
                )));
            };
            if depth >= PARSE_DEPTH_LIMIT {
                return Err(DefinitionError::DepthExceeded {
                    max: PARSE_DEPTH_LIMIT,
                });
            }

            let children = children
                .iter()
                .map(|child| Self::from_value_at(child, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(if combinator == "and" {
                FilterNode::And { and: children }
            } else {
                FilterNode::Or { or: children }
            });
        }

        // A lone key holding an array can only be meant as a combinator
        if map.len() == 1 {
            if let Some((key, serde_json::Value::Array(_))) = map.iter().next() {
                return Err(DefinitionError::UnknownCombinator(key.clone()));
            }
        }

        serde_json::from_value::<Condition>(value.clone())
            .map(FilterNode::Condition)
            .map_err(|e| DefinitionError::Malformed(format!("invalid condition: {e}")))
    }

    /// Combinator nesting depth. A bare condition has depth 0.
    ///
    /// Walks the tree with an explicit stack, so trees built in code deeper than
    /// any compile limit are measured without exhausting the call stack.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0)];
        while let Some((node, level)) = stack.pop() {
            if let FilterNode::And { and: children } | FilterNode::Or { or: children } = node {
                deepest = deepest.max(level + 1);
                stack.extend(children.iter().map(|child| (child, level + 1)));
            }
        }
        deepest
    }

    /// Every condition in the tree, left to right.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                FilterNode::And { and: children } | FilterNode::Or { or: children } => {
                    stack.extend(children.iter().rev());
                }
                FilterNode::Condition(condition) => out.push(condition),
            }
        }
        out
    }

    /// Relations the tree reads from. Paths that do not name a relation are left
    /// out; compiling such a tree fails anyway.
    pub fn relations(&self) -> BTreeSet<Relation> {
        self.conditions()
            .into_iter()
            .filter_map(|c| Relation::parse(&c.path).ok())
            .collect()
    }
}

impl<'de> Deserialize<'de> for FilterNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        FilterNode::from_value(&value).map_err(serde::de::Error::custom)
    }
}
