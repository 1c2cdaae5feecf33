//! Attribute predicates and the loose value coercions they rely on.
//!
//! Property values come from untyped GeoJSON, so comparisons follow the map
//! page's scripting semantics: equality compares string renderings exactly,
//! ordering coerces both sides to numbers (anything non-numeric becomes NaN
//! and never matches) and containment is a case-insensitive substring test.

use super::layer::Feature;
use geo_types::Rect;
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Comparison applied between a property and the user's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
}

impl Operator {
    /// Parses an operator. Unrecognized input means `Contains`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "=" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            "contains" => Self::Contains,
            other => {
                log::debug!("Unknown operator {:?}, using contains", other);
                Self::Contains
            }
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Contains => "contains",
        }
    }
}

impl FromStr for Operator {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `field <operator> value` over one layer's features.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePredicate {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl AttributePredicate {
    pub fn new(field: impl Into<String>, operator: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::parse(operator),
            value: value.into(),
        }
    }

    /// Features lacking the field (or holding `null`) never match, even
    /// for `!=`.
    pub fn matches(&self, feature: &Feature) -> bool {
        let Some(property) = feature.property(&self.field) else {
            return false;
        };

        match self.operator {
            Operator::Eq => to_js_string(property) == self.value,
            Operator::Ne => to_js_string(property) != self.value,
            Operator::Gt => to_js_number(property) > str_to_js_number(&self.value),
            Operator::Lt => to_js_number(property) < str_to_js_number(&self.value),
            Operator::Contains => to_js_string(property)
                .to_lowercase()
                .contains(&self.value.to_lowercase()),
        }
    }
}

/// A user query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPredicate {
    /// Filter one layer by attribute.
    Attribute {
        layer: usize,
        predicate: AttributePredicate,
    },
    /// Every feature of the selected layers touching the view rectangle.
    SpatialBBox {
        layers: Vec<usize>,
        bounds: Rect<f64>,
    },
}

/// String rendering of a property value.
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => format_number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // f64 Display prints whole numbers without a fraction
        n.to_string()
    }
}

/// Numeric coercion of a property value; NaN when it is not a number.
pub fn to_js_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => str_to_js_number(s),
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [single] => str_to_js_number(&to_js_string(single)),
            _ => f64::NAN,
        },
        Value::Object(_) => f64::NAN,
    }
}

/// Numeric coercion of text: blank is 0, anything unparseable is NaN.
pub fn str_to_js_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match s.get(..2).map(str::to_ascii_lowercase).as_deref() {
        Some("0x") => Some(16),
        Some("0o") => Some(8),
        Some("0b") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&s[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    // Rust accepts "inf" and "nan" spellings that are not numbers here
    if s.bytes().any(|b| b.is_ascii_alphabetic() && !matches!(b, b'e' | b'E')) {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use serde_json::json;

    fn feature(key: &str, value: Value) -> Feature {
        Feature::new(Point::new(-16.2, 15.6)).with_property(key, value)
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(Operator::parse("="), Operator::Eq);
        assert_eq!(Operator::parse(" != "), Operator::Ne);
        assert_eq!(">".parse::<Operator>().unwrap(), Operator::Gt);
        assert_eq!(Operator::parse("<"), Operator::Lt);
        assert_eq!(Operator::parse("contains"), Operator::Contains);
    }

    #[test]
    fn test_unknown_operator_is_contains() {
        let predicate = AttributePredicate::new("nom", "LIKE", "oug");
        assert_eq!(predicate.operator, Operator::Contains);
        assert!(predicate.matches(&feature("nom", json!("Louga"))));
        assert!(!predicate.matches(&feature("nom", json!("Dakar"))));
    }

    #[test]
    fn test_equality_is_exact_on_string_form() {
        let eq = AttributePredicate::new("code", "=", "42");
        assert!(eq.matches(&feature("code", json!(42))));
        assert!(eq.matches(&feature("code", json!("42"))));
        assert!(!eq.matches(&feature("code", json!("042"))));

        let case = AttributePredicate::new("nom", "=", "louga");
        assert!(!case.matches(&feature("nom", json!("Louga"))));
    }

    #[test]
    fn test_not_equal_skips_absent_fields() {
        let ne = AttributePredicate::new("nom", "!=", "Louga");
        assert!(ne.matches(&feature("nom", json!("Dakar"))));
        assert!(!ne.matches(&feature("nom", json!("Louga"))));
        assert!(!ne.matches(&feature("autre", json!("Dakar"))));
        assert!(!ne.matches(&feature("nom", Value::Null)));
    }

    #[test]
    fn test_numeric_comparison_coerces() {
        let gt = AttributePredicate::new("population", ">", "1000");
        assert!(gt.matches(&feature("population", json!("2000"))));
        assert!(gt.matches(&feature("population", json!(1000.5))));
        assert!(!gt.matches(&feature("population", json!("500"))));
        assert!(!gt.matches(&feature("population", json!("abc"))));

        let lt = AttributePredicate::new("population", "<", "abc");
        assert!(!lt.matches(&feature("population", json!(1))));
    }

    #[test]
    fn test_js_string_rendering() {
        assert_eq!(to_js_string(&json!(2.0)), "2");
        assert_eq!(to_js_string(&json!(2.5)), "2.5");
        assert_eq!(to_js_string(&json!(true)), "true");
        assert_eq!(to_js_string(&json!([1, null, "a"])), "1,,a");
        assert_eq!(to_js_string(&json!({"a": 1})), "[object Object]");
    }

    #[test]
    fn test_js_number_coercion() {
        assert_eq!(str_to_js_number("  12.5 "), 12.5);
        assert_eq!(str_to_js_number(""), 0.0);
        assert_eq!(str_to_js_number("0x10"), 16.0);
        assert_eq!(str_to_js_number("1e3"), 1000.0);
        assert_eq!(str_to_js_number("-Infinity"), f64::NEG_INFINITY);
        assert!(str_to_js_number("inf").is_nan());
        assert!(str_to_js_number("12abc").is_nan());
        assert_eq!(to_js_number(&json!(true)), 1.0);
        assert_eq!(to_js_number(&json!(["7"])), 7.0);
    }
}
