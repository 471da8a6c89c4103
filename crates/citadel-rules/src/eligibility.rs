//! Squad eligibility.
//!
//! A user is eligible for an auto squad when at least one of their linked
//! characters satisfies the squad's filter. Manual squads are never populated
//! automatically.

use citadel_common::{SquadId, SquadKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{CharacterSnapshot, UserSnapshot};
use crate::error::DefinitionError;
use crate::filter::FilterNode;
use crate::registry::{CompiledFilter, FilterCompiler};

/// A squad as persisted, with its filter kept as the raw JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: SquadKind,
    #[serde(default)]
    pub filters: Option<String>,
    /// Members of a classified squad cannot see each other.
    #[serde(default)]
    pub is_classified: bool,
}

impl Squad {
    pub fn new(id: SquadId, name: impl Into<String>, kind: SquadKind) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            kind,
            filters: None,
            is_classified: false,
        }
    }

    pub fn with_filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn classified(mut self) -> Self {
        self.is_classified = true;
        self
    }

    pub fn is_auto(&self) -> bool {
        self.kind == SquadKind::Auto
    }

    /// The parsed filter, if the squad has a non-blank one.
    pub fn filter(&self) -> Result<Option<FilterNode>, DefinitionError> {
        match self.filters.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(json) => FilterNode::parse(json).map(Some),
        }
    }
}

/// Decides squad eligibility for users.
#[derive(Debug, Clone, Default)]
pub struct EligibilityService {
    compiler: FilterCompiler,
}

impl EligibilityService {
    pub fn new(compiler: FilterCompiler) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &FilterCompiler {
        &self.compiler
    }

    /// Compile a tree used as a squad filter.
    ///
    /// A tree without conditions evaluates to the same verdict for everyone. When
    /// that verdict is `true` (`{"and": []}`, `{"or": [{"and": []}]}`) the squad
    /// would enroll every user, so it is rejected as an empty filter. One that is
    /// always `false`, such as `{"or": []}`, is accepted.
    pub fn compile_squad_filter(&self, node: &FilterNode) -> Result<CompiledFilter, DefinitionError> {
        let compiled = self.compiler.compile(node)?;
        if node.conditions().is_empty() && compiled.matches(&CharacterSnapshot::default()) {
            return Err(DefinitionError::EmptyFilter);
        }
        Ok(compiled)
    }

    /// Compile a squad's filter. Manual squads have none to compile and yield
    /// `None`; an auto squad without a filter is a definition error.
    pub fn compile_squad(&self, squad: &Squad) -> Result<Option<CompiledFilter>, DefinitionError> {
        if !squad.is_auto() {
            return Ok(None);
        }
        let node = squad.filter()?.ok_or(DefinitionError::EmptyFilter)?;
        self.compile_squad_filter(&node).map(Some)
    }

    /// Whether the user satisfies the filter through at least one character.
    pub fn is_user_eligible(
        &self,
        user: &UserSnapshot,
        filter: &FilterNode,
    ) -> Result<bool, DefinitionError> {
        let compiled = self.compile_squad_filter(filter)?;
        let eligible = compiled.matches_user(user);
        debug!(
            user_id = user.user_id,
            characters = user.characters.len(),
            eligible,
            "evaluated squad filter"
        );
        Ok(eligible)
    }

    /// Same as [`is_user_eligible`](Self::is_user_eligible) for a persisted document.
    pub fn is_user_eligible_json(
        &self,
        user: &UserSnapshot,
        filter: &str,
    ) -> Result<bool, DefinitionError> {
        self.is_user_eligible(user, &FilterNode::parse(filter)?)
    }

    /// Whether the user belongs in the squad. Always `false` for manual squads.
    pub fn is_squad_eligible(
        &self,
        squad: &Squad,
        user: &UserSnapshot,
    ) -> Result<bool, DefinitionError> {
        let Some(compiled) = self.compile_squad(squad)? else {
            return Ok(false);
        };
        let eligible = compiled.matches_user(user);
        debug!(squad_id = squad.id, user_id = user.user_id, eligible, "evaluated squad");
        Ok(eligible)
    }
}
