//! Numeric coercion for loosely-typed upstream values.
//!
//! Upstream fields arrive as JSON numbers, locale-formatted strings
//! ("1,234.50") or garbage. Anything that does not parse to a finite number
//! is treated as absent.

use serde_json::Value;

/// Coerce a JSON value to a finite `f64`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_numeric_text(s),
        _ => None,
    }
}

/// Parse text after stripping thousands separators and surrounding whitespace.
pub fn parse_numeric_text(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce an optional lookup result.
pub fn coerce_opt(value: Option<&Value>) -> Option<f64> {
    value.and_then(coerce_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_thousands_separators() {
        assert_eq!(parse_numeric_text("1,234.50"), Some(1234.5));
        assert_eq!(parse_numeric_text(" 12,00,000 "), Some(1_200_000.0));
    }

    #[test]
    fn garbage_is_absent() {
        assert_eq!(parse_numeric_text("abc"), None);
        assert_eq!(parse_numeric_text(""), None);
        assert_eq!(parse_numeric_text("   "), None);
        assert_eq!(parse_numeric_text("NaN"), None);
        assert_eq!(parse_numeric_text("inf"), None);
    }

    #[test]
    fn json_values() {
        assert_eq!(coerce_f64(&json!(42)), Some(42.0));
        assert_eq!(coerce_f64(&json!(1.5)), Some(1.5));
        assert_eq!(coerce_f64(&json!("2,000")), Some(2000.0));
        assert_eq!(coerce_f64(&json!(null)), None);
        assert_eq!(coerce_f64(&json!(true)), None);
        assert_eq!(coerce_f64(&json!({"raw": 1.0})), None);
    }

    #[test]
    fn missing_key_is_absent() {
        let obj = json!({"present": "3.25"});
        assert_eq!(coerce_opt(obj.get("present")), Some(3.25));
        assert_eq!(coerce_opt(obj.get("absent")), None);
    }
}
