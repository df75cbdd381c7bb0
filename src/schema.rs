//! Validator capability and the stock implementations: JSON Schema (via the
//! `jsonschema` crate) and serde-typed deserialization.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// One problem a validator found with a request part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// JSON-pointer location of the offending value ("" for the root).
    pub path: String,
    pub message: String,
}

/// Checks an untyped value and yields typed data or the list of issues found.
/// Any schema library can be plugged in by implementing this shape.
pub trait Validator: Send + Sync {
    type Output;

    fn validate(&self, input: &Value) -> Result<Self::Output, Vec<Issue>>;
}

/// Slot filler for request parts with no validation configured. Never invoked
/// by the dispatcher; exists so an empty `RequestValidation` has a concrete
/// default type.
pub struct Unvalidated;

impl Validator for Unvalidated {
    type Output = Value;

    fn validate(&self, input: &Value) -> Result<Value, Vec<Issue>> {
        Ok(input.clone())
    }
}

/// JSON Schema validator. The schema is compiled once at route registration;
/// validation reports every failing location, not just the first.
#[derive(Debug)]
pub struct SchemaValidator {
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Result<Self, Error> {
        let compiled =
            jsonschema::Validator::new(schema).map_err(|e| Error::Schema(e.to_string()))?;
        Ok(Self { compiled })
    }
}

impl Validator for SchemaValidator {
    type Output = Value;

    fn validate(&self, input: &Value) -> Result<Value, Vec<Issue>> {
        let issues: Vec<Issue> = self
            .compiled
            .iter_errors(input)
            .map(|e| Issue {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        if issues.is_empty() {
            Ok(input.clone())
        } else {
            Err(issues)
        }
    }
}

/// Deserializes the input into `T`; serde's error becomes a single issue at
/// the root.
pub struct TypedValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedValidator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Validator for TypedValidator<T> {
    type Output = T;

    fn validate(&self, input: &Value) -> Result<T, Vec<Issue>> {
        serde_json::from_value(input.clone()).map_err(|e| {
            vec![Issue {
                path: String::new(),
                message: e.to_string(),
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "some": { "type": "string" }
            },
            "required": ["some"]
        })
    }

    #[test]
    fn schema_validator_accepts_matching_object() {
        let v = SchemaValidator::new(&schema()).unwrap();
        let input = json!({ "some": "data" });
        assert_eq!(v.validate(&input).unwrap(), input);
    }

    #[test]
    fn schema_validator_reports_missing_required_field() {
        let v = SchemaValidator::new(&schema()).unwrap();
        let issues = v.validate(&json!({ "someOther": "data" })).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("some"));
    }

    #[test]
    fn schema_validator_reports_every_failing_location() {
        let v = SchemaValidator::new(&json!({
            "type": "object",
            "properties": {
                "a": { "type": "string" },
                "b": { "type": "integer" }
            },
            "required": ["a", "b"]
        }))
        .unwrap();
        let issues = v.validate(&json!({ "a": 1, "b": "x" })).unwrap_err();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn schema_validator_rejects_invalid_schema() {
        let err = SchemaValidator::new(&json!({ "type": "no-such-type" })).unwrap_err();
        match err {
            Error::Schema(_) => {}
            other => panic!("expected Schema error, got {other:?}"),
        }
    }

    #[test]
    fn typed_validator_yields_typed_output() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Payload {
            some: String,
        }
        let v = TypedValidator::<Payload>::new();
        let out = v.validate(&json!({ "some": "data" })).unwrap();
        assert_eq!(
            out,
            Payload {
                some: "data".into()
            }
        );
        assert!(v.validate(&json!({ "someOther": "data" })).is_err());
    }
}
