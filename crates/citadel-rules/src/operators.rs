//! Comparison operators available to filter conditions.
//!
//! Operators live in a registry keyed by their persisted name. Each entry is a pure
//! predicate over a resolved value and the condition's criteria, together with the
//! criteria shape it accepts, so a malformed condition is rejected when the filter
//! is compiled rather than quietly evaluating to `false`.
//!
//! | operator | meaning | coercion |
//! |---|---|---|
//! | `=` / `!=` | equality | numbers and numeric strings compare numerically, anything else must match exactly |
//! | `>` `>=` `<` `<=` | ordering | both sides coerced to numbers; a non-numeric side is `false` |
//! | `in` | membership | criteria is a list; `=` against any element |
//! | `contains` | substring | both sides rendered as text; case-sensitive |

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::DefinitionError;
use crate::value::Value;

/// The literal a condition compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Scalar(Value),
    List(Vec<Value>),
}

impl Criteria {
    /// Convert the persisted criteria literal.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, String> {
        match json {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    Value::from_json(item).ok_or_else(|| "list elements must be scalars".to_string())
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Criteria::List),
            serde_json::Value::Object(_) => Err("criteria must be a scalar or a list".to_string()),
            scalar => Value::from_json(scalar)
                .map(Criteria::Scalar)
                .ok_or_else(|| "criteria must be a scalar or a list".to_string()),
        }
    }

    pub fn shape(&self) -> CriteriaShape {
        match self {
            Criteria::Scalar(_) => CriteriaShape::Scalar,
            Criteria::List(_) => CriteriaShape::List,
        }
    }
}

/// The kind of criteria an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaShape {
    Scalar,
    List,
}

/// A pure comparison between a resolved value and the criteria.
pub type Predicate = fn(&Value, &Criteria) -> bool;

/// A registered comparison operator.
#[derive(Clone, Copy)]
pub struct Operator {
    name: &'static str,
    shape: CriteriaShape,
    predicate: Predicate,
}

impl Operator {
    pub const fn new(name: &'static str, shape: CriteriaShape, predicate: Predicate) -> Self {
        Self {
            name,
            shape,
            predicate,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> CriteriaShape {
        self.shape
    }

    /// Parse and check the persisted criteria for this operator.
    pub fn criteria(&self, json: &serde_json::Value) -> Result<Criteria, DefinitionError> {
        let invalid = |reason: String| DefinitionError::InvalidCriteria {
            operator: self.name.to_string(),
            reason,
        };

        let criteria = Criteria::from_json(json).map_err(invalid)?;
        match (self.shape, criteria.shape()) {
            (CriteriaShape::Scalar, CriteriaShape::List) => {
                Err(invalid("expected a single value, got a list".to_string()))
            }
            (CriteriaShape::List, CriteriaShape::Scalar) => {
                Err(invalid("expected a list of values".to_string()))
            }
            _ => Ok(criteria),
        }
    }

    pub fn apply(&self, value: &Value, criteria: &Criteria) -> bool {
        (self.predicate)(value, criteria)
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Equality with numeric awareness: `"5" = 5.0`, `"abc" = "abc"`, `true != 1`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        },
    }
}

fn compare(value: &Value, criteria: &Criteria) -> Option<Ordering> {
    let Criteria::Scalar(expected) = criteria else {
        return None;
    };
    value.as_number()?.partial_cmp(&expected.as_number()?)
}

fn eq(value: &Value, criteria: &Criteria) -> bool {
    matches!(criteria, Criteria::Scalar(expected) if loose_eq(value, expected))
}

fn ne(value: &Value, criteria: &Criteria) -> bool {
    matches!(criteria, Criteria::Scalar(expected) if !loose_eq(value, expected))
}

fn gt(value: &Value, criteria: &Criteria) -> bool {
    matches!(compare(value, criteria), Some(Ordering::Greater))
}

fn ge(value: &Value, criteria: &Criteria) -> bool {
    matches!(
        compare(value, criteria),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

fn lt(value: &Value, criteria: &Criteria) -> bool {
    matches!(compare(value, criteria), Some(Ordering::Less))
}

fn le(value: &Value, criteria: &Criteria) -> bool {
    matches!(compare(value, criteria), Some(Ordering::Less | Ordering::Equal))
}

fn is_in(value: &Value, criteria: &Criteria) -> bool {
    matches!(criteria, Criteria::List(items) if items.iter().any(|item| loose_eq(value, item)))
}

fn contains(value: &Value, criteria: &Criteria) -> bool {
    matches!(criteria, Criteria::Scalar(needle) if value.render().contains(&needle.render()))
}

const STANDARD_OPERATORS: [Operator; 8] = [
    Operator::new("=", CriteriaShape::Scalar, eq),
    Operator::new("!=", CriteriaShape::Scalar, ne),
    Operator::new(">", CriteriaShape::Scalar, gt),
    Operator::new(">=", CriteriaShape::Scalar, ge),
    Operator::new("<", CriteriaShape::Scalar, lt),
    Operator::new("<=", CriteriaShape::Scalar, le),
    Operator::new("in", CriteriaShape::List, is_in),
    Operator::new("contains", CriteriaShape::Scalar, contains),
];

/// Registry of operators by persisted name.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    operators: HashMap<&'static str, Operator>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl OperatorRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Create a registry holding the standard operator set.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for operator in STANDARD_OPERATORS {
            registry.register(operator);
        }
        registry
    }

    /// Register an operator, replacing any operator of the same name.
    pub fn register(&mut self, operator: Operator) {
        self.operators.insert(operator.name, operator);
    }

    /// Check if an operator is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// List all registered operator names.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.operators.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Result<Operator, DefinitionError> {
        self.operators
            .get(name)
            .copied()
            .ok_or_else(|| DefinitionError::UnknownOperator(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(op: &str, value: impl Into<Value>, criteria: serde_json::Value) -> bool {
        let operator = OperatorRegistry::standard().get(op).unwrap();
        let criteria = operator.criteria(&criteria).unwrap();
        operator.apply(&value.into(), &criteria)
    }

    #[test]
    fn test_equality_is_numeric_aware() {
        assert!(check("=", 98541700_i64, json!(98541700)));
        assert!(check("=", 98541700_i64, json!("98541700")));
        assert!(check("=", "5", json!(5.0)));
        assert!(check("=", "Director", json!("Director")));
        assert!(!check("=", "director", json!("Director")));
        assert!(!check("=", 12345_i64, json!(98541700)));
    }

    #[test]
    fn test_equality_does_not_mix_types() {
        assert!(!check("=", true, json!(1)));
        assert!(!check("=", "abc", json!(0)));
        assert!(check("=", true, json!(true)));
    }

    #[test]
    fn test_inequality() {
        assert!(check("!=", 12345_i64, json!(98541700)));
        assert!(!check("!=", 98541700_i64, json!("98541700")));
        assert!(check("!=", "abc", json!(1)));
    }

    #[test]
    fn test_ordering_coerces_to_numbers() {
        assert!(check(">", 5, json!(4)));
        assert!(!check(">", 4, json!(4)));
        assert!(check(">=", 4, json!("4")));
        assert!(check("<", -0.5, json!(0)));
        assert!(check("<=", "3", json!(3)));
        assert!(!check("<=", 4, json!(3)));
    }

    #[test]
    fn test_ordering_with_non_numeric_side_is_false() {
        assert!(!check(">", "abc", json!(1)));
        assert!(!check("<", "abc", json!(1)));
        assert!(!check(">=", 5, json!("five")));
        assert!(!check("<=", true, json!(1)));
    }

    #[test]
    fn test_in_membership() {
        assert!(check("in", 98541700_i64, json!([1, 98541700, 3])));
        assert!(check("in", "98541700", json!([98541700])));
        assert!(!check("in", 2, json!([1, 3])));
        assert!(!check("in", 2, json!([])));
    }

    #[test]
    fn test_contains_is_case_sensitive_substring() {
        assert!(check("contains", "Fleet Commander", json!("Commander")));
        assert!(!check("contains", "Fleet Commander", json!("commander")));
        assert!(check("contains", 98541700_i64, json!(4170)));
    }

    #[test]
    fn test_criteria_shape_is_enforced() {
        let registry = OperatorRegistry::standard();

        let err = registry.get("in").unwrap().criteria(&json!(5)).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidCriteria { ref operator, .. } if operator == "in"));

        let err = registry.get("=").unwrap().criteria(&json!([5])).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidCriteria { .. }));

        let err = registry.get("=").unwrap().criteria(&json!({"id": 5})).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidCriteria { .. }));

        let err = registry.get("in").unwrap().criteria(&json!([[1]])).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidCriteria { .. }));
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::standard();
        assert_eq!(
            registry.get("~=").unwrap_err(),
            DefinitionError::UnknownOperator("~=".to_string())
        );
    }

    #[test]
    fn test_list_operators() {
        let names = OperatorRegistry::standard().list();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"contains"));
        assert!(names.contains(&"in"));
        assert!(OperatorRegistry::empty().list().is_empty());
    }

    #[test]
    fn test_custom_operator_registration() {
        fn starts_with(value: &Value, criteria: &Criteria) -> bool {
            matches!(criteria, Criteria::Scalar(prefix) if value.render().starts_with(&prefix.render()))
        }

        let mut registry = OperatorRegistry::standard();
        registry.register(Operator::new("starts_with", CriteriaShape::Scalar, starts_with));

        let operator = registry.get("starts_with").unwrap();
        let criteria = operator.criteria(&json!("Fleet")).unwrap();
        assert!(operator.apply(&Value::from("Fleet Commander"), &criteria));
    }
}
