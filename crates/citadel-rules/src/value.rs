//! Typed scalar values read from entity snapshots and filter criteria.

use std::cmp::Ordering;

/// A scalar read from a snapshot field or a filter literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// A value coerced to a number for comparison.
///
/// Integers compare exactly against integers; any other pairing compares as `f64`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce to a number. Strings qualify when they hold a finite decimal literal;
    /// booleans and null never do.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Integer(i) => Some(Number::Integer(*i)),
            Value::Float(f) if f.is_finite() => Some(Number::Float(*f)),
            Value::String(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Render as text for substring matching.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }

    /// Convert a JSON scalar. Arrays and objects are not scalars and yield `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Integer(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

fn parse_numeric(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::Integer(i));
    }
    // f64's parser also accepts "inf" and "NaN", which are not numeric literals here
    let looks_decimal = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    match trimmed.parse::<f64>() {
        Ok(f) if looks_decimal && f.is_finite() => Some(Number::Float(f)),
        _ => None,
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_coerce() {
        assert_eq!(Value::from("42").as_number(), Some(Number::Integer(42)));
        assert_eq!(Value::from(" 1.5 ").as_number(), Some(Number::Float(1.5)));
        assert_eq!(Value::from("-3e2").as_number(), Some(Number::Float(-300.0)));
    }

    #[test]
    fn test_non_numeric_values_do_not_coerce() {
        assert!(Value::from("inf").as_number().is_none());
        assert!(Value::from("NaN").as_number().is_none());
        assert!(Value::from("12abc").as_number().is_none());
        assert!(Value::from("").as_number().is_none());
        assert!(Value::from(true).as_number().is_none());
        assert!(Value::Null.as_number().is_none());
        assert!(Value::Float(f64::NAN).as_number().is_none());
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let a = Number::Integer(9_007_199_254_740_993);
        let b = Number::Integer(9_007_199_254_740_992);
        assert!(a > b);
        assert_eq!(Number::Integer(2), Number::Float(2.0));
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::from(98541700_i64).render(), "98541700");
        assert_eq!(Value::from(false).render(), "false");
        assert_eq!(Value::Null.render(), "");
    }

    #[test]
    fn test_from_json_scalars_only() {
        assert_eq!(Value::from_json(&json!(7)), Some(Value::Integer(7)));
        assert_eq!(Value::from_json(&json!(0.5)), Some(Value::Float(0.5)));
        assert_eq!(Value::from_json(&json!("x")), Some(Value::from("x")));
        assert_eq!(Value::from_json(&json!(null)), Some(Value::Null));
        assert_eq!(Value::from_json(&json!([1])), None);
        assert_eq!(Value::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_optional_values() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(99000001_i64)), Value::Integer(99000001));
    }
}
