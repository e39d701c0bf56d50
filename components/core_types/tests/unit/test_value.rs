//! Unit tests for Value enum

use core_types::{JsError, Value};

#[cfg(test)]
mod value_creation_tests {
    use super::*;

    #[test]
    fn test_value_from_primitives() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(7), Value::Smi(7));
        assert_eq!(Value::from(1.5), Value::Double(1.5));
        assert_eq!(Value::from("e"), Value::String("e".to_string()));
    }

    #[test]
    fn test_value_from_vec() {
        let value = Value::from(vec![Value::Smi(1), Value::Smi(2)]);
        assert!(matches!(value, Value::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn test_value_from_js_error() {
        let value = Value::from(JsError::range_error("deep"));
        assert!(value.as_error().is_some());
    }
}

#[cfg(test)]
mod display_tests {
    use super::*;

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::Smi(-3).to_string(), "-3");
        assert_eq!(Value::Double(2.0).to_string(), "2");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Double(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::Double(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_display_aggregates() {
        let array = Value::Array(vec![Value::Smi(1), Value::from("a")]);
        assert_eq!(array.to_string(), "1,a");
        let record = Value::object([("status", Value::from("fulfilled"))]);
        assert_eq!(record.to_string(), "[object Object]");
    }
}

#[cfg(test)]
mod equality_tests {
    use super::*;

    #[test]
    fn test_objects_compare_by_content() {
        let a = Value::object([("value", Value::Smi(1)), ("status", Value::from("fulfilled"))]);
        let b = Value::object([("status", Value::from("fulfilled")), ("value", Value::Smi(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_variants_are_unequal() {
        assert_ne!(Value::Smi(1), Value::Double(1.0));
        assert_ne!(Value::Undefined, Value::Null);
    }
}
