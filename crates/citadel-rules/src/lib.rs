//! Squad eligibility rules and permission decisions for Citadel.
//!
//! Squad filters are persisted as JSON trees of `and` / `or` combinators over
//! conditions on a character's relations. They are compiled into specification
//! trees and evaluated against read-only snapshots of a user's characters.
//!
//! # Example
//!
//! ```ignore
//! use citadel_rules::prelude::*;
//!
//! let service = EligibilityService::default();
//! let filter = FilterNode::parse(r#"{"and": [
//!     {"path": "affiliation", "field": "corporation_id", "operator": "=", "criteria": 98541700}
//! ]}"#)?;
//!
//! if service.is_user_eligible(&user, &filter)? {
//!     // Add to squad
//! }
//!
//! let gate = Gate::from_catalog(catalog)?;
//! if gate.decide(&actor, "character.sheet", &PolicyTarget::Character(character))? {
//!     // Show the sheet
//! }
//! ```

pub mod ability;
pub mod condition;
pub mod context;
pub mod eligibility;
pub mod error;
pub mod filter;
pub mod gate;
pub mod grant;
pub mod operators;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod specification;
pub mod value;

pub use error::DefinitionError;
pub use registry::{EngineConfig, DEFAULT_MAX_DEPTH};

/// Prelude module - import everything you need with `use citadel_rules::prelude::*`
pub mod prelude {
    pub use crate::ability::{Ability, AbilityCatalog, PermissionDefinition, Scope};
    pub use crate::context::{
        Affiliation, Asset, CharacterSnapshot, CorporationRole, Skill, Title, UserSnapshot,
    };
    pub use crate::eligibility::{EligibilityService, Squad};
    pub use crate::error::DefinitionError;
    pub use crate::filter::{Condition, FilterNode};
    pub use crate::gate::{Gate, GateBuilder};
    pub use crate::grant::{PermissionGrant, Role};
    pub use crate::operators::{Operator, OperatorRegistry};
    pub use crate::policy::{
        Actor, AllianceTarget, CorporationTarget, PolicyTarget, SquadTarget,
    };
    pub use crate::registry::{CompiledFilter, EngineConfig, FilterCompiler};
    pub use crate::resolver::Relation;
    pub use crate::specification::{AllOf, AnyCharacter, AnyOf, BoxedSpec, Specification};
    pub use crate::value::Value;
}
