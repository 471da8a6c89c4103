//! Filter compilation.
//!
//! Persisted filter trees are turned into specification trees in one pass. Every
//! path, field, operator and criteria literal is checked here, so a tree that
//! compiles can only ever evaluate to `true` or `false`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::condition::ConditionSpec;
use crate::context::{CharacterSnapshot, UserSnapshot};
use crate::error::DefinitionError;
use crate::filter::{Condition, FilterNode};
use crate::operators::OperatorRegistry;
use crate::resolver::Relation;
use crate::specification::{AllOf, AnyOf, BoxedSpec, Specification};

/// Default maximum combinator nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Engine limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Builds specification trees from persisted filters.
///
/// # Example
///
/// ```ignore
/// use citadel_rules::prelude::*;
///
/// let compiler = FilterCompiler::new();
/// let filter = FilterNode::parse(r#"{"path": "affiliation", "field": "corporation_id",
///                                    "operator": "=", "criteria": 98541700}"#)?;
/// let compiled = compiler.compile(&filter)?;
///
/// if compiled.matches_user(&user) {
///     // Add to squad
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    operators: OperatorRegistry,
    max_depth: usize,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCompiler {
    /// Create a compiler with the standard operators and default limits.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            operators: OperatorRegistry::standard(),
            max_depth: config.max_depth,
        }
    }

    /// Replace the operator registry.
    pub fn with_operators(mut self, operators: OperatorRegistry) -> Self {
        self.operators = operators;
        self
    }

    /// Compile a filter tree.
    pub fn compile(&self, node: &FilterNode) -> Result<CompiledFilter, DefinitionError> {
        self.check_depth(node)?;
        Ok(CompiledFilter {
            root: self.build(node)?,
            relations: node.relations(),
        })
    }

    /// Compile a single condition.
    pub fn compile_condition(&self, condition: &Condition) -> Result<ConditionSpec, DefinitionError> {
        let path = Relation::parse(&condition.path)?.field(&condition.field)?;
        let operator = self.operators.get(&condition.operator)?;
        let criteria = operator.criteria(&condition.criteria)?;
        Ok(ConditionSpec::new(path, operator, criteria))
    }

    /// Collect every definition error in a tree without stopping at the first.
    pub fn validate(&self, node: &FilterNode) -> Vec<DefinitionError> {
        let mut errors = Vec::new();
        if let Err(err) = self.check_depth(node) {
            errors.push(err);
        }
        for condition in node.conditions() {
            if let Err(err) = self.compile_condition(condition) {
                errors.push(err);
            }
        }
        errors
    }

    /// Compile and evaluate a tree against one character.
    pub fn evaluate(
        &self,
        character: &CharacterSnapshot,
        node: &FilterNode,
    ) -> Result<bool, DefinitionError> {
        Ok(self.compile(node)?.matches(character))
    }

    fn check_depth(&self, node: &FilterNode) -> Result<(), DefinitionError> {
        if node.depth() > self.max_depth {
            return Err(DefinitionError::DepthExceeded {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn build(&self, node: &FilterNode) -> Result<BoxedSpec<CharacterSnapshot>, DefinitionError> {
        match node {
            FilterNode::And { and: children } => {
                let specs = children
                    .iter()
                    .map(|child| self.build(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(AllOf::new(specs)))
            }
            FilterNode::Or { or: children } => {
                let specs = children
                    .iter()
                    .map(|child| self.build(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(AnyOf::new(specs)))
            }
            FilterNode::Condition(condition) => Ok(Arc::new(self.compile_condition(condition)?)),
        }
    }
}

/// A compiled filter, cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct CompiledFilter {
    root: BoxedSpec<CharacterSnapshot>,
    relations: BTreeSet<Relation>,
}

impl CompiledFilter {
    /// Whether the character satisfies the filter.
    pub fn matches(&self, character: &CharacterSnapshot) -> bool {
        self.root.is_satisfied_by(character)
    }

    /// Whether at least one of the user's characters satisfies the filter.
    pub fn matches_user(&self, user: &UserSnapshot) -> bool {
        user.characters.iter().any(|c| self.matches(c))
    }

    /// Relations the filter reads from.
    pub fn relations(&self) -> &BTreeSet<Relation> {
        &self.relations
    }

    pub fn reads(&self, relation: Relation) -> bool {
        self.relations.contains(&relation)
    }
}

impl fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}
