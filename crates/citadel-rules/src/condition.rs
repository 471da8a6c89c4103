//! Leaf specification evaluating a single compiled condition.

use crate::context::CharacterSnapshot;
use crate::operators::{Criteria, Operator};
use crate::resolver::FieldPath;
use crate::specification::Specification;

/// A condition with its path, operator and criteria already checked.
///
/// Satisfied when at least one value resolved through the path satisfies the
/// operator. A path that resolves to nothing is never satisfied, whatever the
/// operator, `!=` included.
#[derive(Debug, Clone)]
pub struct ConditionSpec {
    path: FieldPath,
    operator: Operator,
    criteria: Criteria,
}

impl ConditionSpec {
    pub fn new(path: FieldPath, operator: Operator, criteria: Criteria) -> Self {
        Self {
            path,
            operator,
            criteria,
        }
    }
}

impl Specification<CharacterSnapshot> for ConditionSpec {
    fn is_satisfied_by(&self, character: &CharacterSnapshot) -> bool {
        let values = self.path.resolve(character);
        let matched = values
            .iter()
            .any(|value| self.operator.apply(value, &self.criteria));

        tracing::trace!(
            character_id = character.character_id,
            path = ?self.path,
            operator = self.operator.name(),
            resolved = values.len(),
            matched,
            "condition evaluated"
        );
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Affiliation, Skill};
    use crate::operators::OperatorRegistry;
    use crate::resolver::Relation;
    use serde_json::json;

    fn spec(relation: Relation, field: &str, op: &str, criteria: serde_json::Value) -> ConditionSpec {
        let operator = OperatorRegistry::standard().get(op).unwrap();
        ConditionSpec::new(
            relation.field(field).unwrap(),
            operator,
            operator.criteria(&criteria).unwrap(),
        )
    }

    #[test]
    fn test_existential_over_records() {
        let character = CharacterSnapshot::new(1, "Pilot")
            .with_skill(Skill::trained(3300, 2))
            .with_skill(Skill::trained(3301, 5));

        assert!(spec(Relation::Skills, "trained_skill_level", ">=", json!(5)).is_satisfied_by(&character));
        assert!(!spec(Relation::Skills, "trained_skill_level", ">", json!(5)).is_satisfied_by(&character));
    }

    #[test]
    fn test_empty_relation_is_vacuously_false() {
        let character = CharacterSnapshot::new(1, "Fresh");

        assert!(!spec(Relation::Skills, "skill_id", "=", json!(3300)).is_satisfied_by(&character));
        assert!(!spec(Relation::Skills, "skill_id", "!=", json!(3300)).is_satisfied_by(&character));
        assert!(!spec(Relation::Affiliation, "corporation_id", "!=", json!(1)).is_satisfied_by(&character));
    }

    #[test]
    fn test_not_equal_null_means_has_value() {
        let character = CharacterSnapshot::new(1, "Pilot")
            .with_affiliation(Affiliation::new(98000001).with_alliance(99000001));

        assert!(spec(Relation::Affiliation, "alliance_id", "!=", json!(null)).is_satisfied_by(&character));
        assert!(!spec(Relation::Affiliation, "faction_id", "!=", json!(null)).is_satisfied_by(&character));
    }
}
