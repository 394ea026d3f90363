//! Runtime value typing for capability parameters and returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared type of a capability parameter or return value.
///
/// `Any` accepts every non-null value. `Null` exists only so that errors
/// can name the type of a null value; it is never a useful declaration,
/// since a capability that produces nothing reports an error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
  Any,
  Null,
  Bool,
  Number,
  String,
  Array,
  Object,
}

impl ValueType {
  /// Classify a JSON value.
  pub fn of(value: &Value) -> ValueType {
    match value {
      Value::Null => ValueType::Null,
      Value::Bool(_) => ValueType::Bool,
      Value::Number(_) => ValueType::Number,
      Value::String(_) => ValueType::String,
      Value::Array(_) => ValueType::Array,
      Value::Object(_) => ValueType::Object,
    }
  }

  /// Whether a concrete value conforms to this declared type.
  pub fn matches(&self, value: &Value) -> bool {
    let actual = ValueType::of(value);
    if actual == ValueType::Null {
      return false;
    }
    *self == ValueType::Any || *self == actual
  }

  /// Whether a value of type `other` can flow into a slot declared as
  /// `self`. `Any` is compatible in either direction.
  pub fn compatible(&self, other: ValueType) -> bool {
    *self == ValueType::Any || other == ValueType::Any || *self == other
  }
}

impl std::fmt::Display for ValueType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      ValueType::Any => "any",
      ValueType::Null => "null",
      ValueType::Bool => "bool",
      ValueType::Number => "number",
      ValueType::String => "string",
      ValueType::Array => "array",
      ValueType::Object => "object",
    };
    f.write_str(name)
  }
}
