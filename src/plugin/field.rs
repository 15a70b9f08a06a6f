//! Field extraction from vendor payloads.
//!
//! Values are rendered the way the host expects them: strings verbatim,
//! numbers in their shortest round-trip form (`21.0` stays `"21.0"`),
//! booleans as `True`/`False`.

use serde_json::Value;

use crate::error::MappingError;
use crate::fetch::Body;

/// Read access to one response body, turning every miss into a
/// [`MappingError`] that carries the whole body.
pub struct Payload<'a> {
    body: &'a Body,
}

impl<'a> Payload<'a> {
    pub fn new(body: &'a Body) -> Self {
        Self { body }
    }

    /// The value at JSON pointer `pointer`, e.g. `/attributes/temperature`.
    pub fn get(&self, field: &'static str, pointer: &str) -> Result<&'a Value, MappingError> {
        let root = match self.body {
            Body::Json(root) => root,
            Body::Raw(_) => return Err(self.error(field, "response is not JSON")),
        };
        root.pointer(pointer)
            .filter(|value| !value.is_null())
            .ok_or_else(|| self.error(field, format!("missing {pointer}")))
    }

    pub fn text(&self, field: &'static str, pointer: &str) -> Result<String, MappingError> {
        let value = self.get(field, pointer)?;
        text_of(value).ok_or_else(|| self.error(field, format!("{pointer} is not a scalar")))
    }

    pub fn integer(&self, field: &'static str, pointer: &str) -> Result<i64, MappingError> {
        let value = self.get(field, pointer)?;
        integer_of(value).ok_or_else(|| self.error(field, format!("{pointer} is not a number")))
    }

    pub fn error(&self, field: &'static str, reason: impl Into<String>) -> MappingError {
        MappingError::new(field, reason, self.body.describe())
    }
}

pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("True".into()),
        Value::Bool(false) => Some("False".into()),
        _ => None,
    }
}

/// Integers, floats (rounded) and integer strings. A string holding a
/// fraction is rejected.
pub fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.round() as i64),
        },
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Floats, integers and numeric strings.
pub fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
