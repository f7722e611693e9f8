// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./value_test.rs"]
mod value_test;

use crate::Error;
use crate::native::NativeOracle;
use cf_key_value::StoredValue;
use std::fmt::Display;

//
// ValueType
//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
  Bool,
  Int,
  Double,
  String,
}

//
// Value
//

/// A resolved flag or parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Bool(bool),
  Int(i32),
  Double(f64),
  String(String),
}

impl Value {
  #[must_use]
  pub const fn value_type(&self) -> ValueType {
    match self {
      Self::Bool(_) => ValueType::Bool,
      Self::Int(_) => ValueType::Int,
      Self::Double(_) => ValueType::Double,
      Self::String(_) => ValueType::String,
    }
  }

  /// Parses a raw string as a value of the given type. Booleans only accept the exact strings
  /// "true" and "false".
  pub fn parse(value_type: ValueType, raw: &str) -> Result<Self, Error> {
    let parse_error = || Error::Parse {
      expected: value_type,
      raw: raw.to_string(),
    };

    Ok(match value_type {
      ValueType::Bool => match raw {
        "true" => Self::Bool(true),
        "false" => Self::Bool(false),
        _ => return Err(parse_error()),
      },
      ValueType::Int => Self::Int(raw.parse().map_err(|_| parse_error())?),
      ValueType::Double => Self::Double(raw.parse().map_err(|_| parse_error())?),
      ValueType::String => Self::String(raw.to_string()),
    })
  }

  /// Converts to the persisted representation. Doubles are stored as their raw bit pattern so
  /// that they round trip exactly.
  #[must_use]
  #[allow(clippy::cast_possible_wrap)]
  pub fn to_stored(&self) -> StoredValue {
    match self {
      Self::Bool(value) => StoredValue::Bool(*value),
      Self::Int(value) => StoredValue::Int(*value),
      Self::Double(value) => StoredValue::Long(value.to_bits() as i64),
      Self::String(value) => StoredValue::String(value.clone()),
    }
  }

  /// Reads a persisted value as the expected type. Returns `None` on a type mismatch.
  #[must_use]
  #[allow(clippy::cast_sign_loss)]
  pub fn from_stored(value_type: ValueType, stored: &StoredValue) -> Option<Self> {
    match (value_type, stored) {
      (ValueType::Bool, StoredValue::Bool(value)) => Some(Self::Bool(*value)),
      (ValueType::Int, StoredValue::Int(value)) => Some(Self::Int(*value)),
      (ValueType::Double, StoredValue::Long(bits)) => {
        Some(Self::Double(f64::from_bits(*bits as u64)))
      },
      (ValueType::String, StoredValue::String(value)) => Some(Self::String(value.clone())),
      _ => None,
    }
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Bool(value) => write!(f, "{value}"),
      Self::Int(value) => write!(f, "{value}"),
      Self::Double(value) => write!(f, "{value}"),
      Self::String(value) => write!(f, "{value:?}"),
    }
  }
}

//
// ParamValue
//

/// A Rust type usable as a cached parameter value.
pub trait ParamValue: Clone + std::fmt::Debug + Send + Sync + 'static {
  const TYPE: ValueType;

  fn into_value(self) -> Value;

  fn from_value(value: &Value) -> Option<Self>;

  /// Reads the current value from the native engine, using `default` when the engine has no
  /// usable value.
  fn from_native(native: &dyn NativeOracle, feature: &str, param: &str, default: &Self) -> Self;

  fn parse(raw: &str) -> Result<Self, Error> {
    Value::parse(Self::TYPE, raw).and_then(|value| {
      Self::from_value(&value).ok_or_else(|| Error::Parse {
        expected: Self::TYPE,
        raw: raw.to_string(),
      })
    })
  }
}

impl ParamValue for bool {
  const TYPE: ValueType = ValueType::Bool;

  fn into_value(self) -> Value {
    Value::Bool(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(value) => Some(*value),
      _ => None,
    }
  }

  fn from_native(native: &dyn NativeOracle, feature: &str, param: &str, default: &Self) -> Self {
    native.field_trial_param_by_feature_as_boolean(feature, param, *default)
  }
}

impl ParamValue for i32 {
  const TYPE: ValueType = ValueType::Int;

  fn into_value(self) -> Value {
    Value::Int(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Int(value) => Some(*value),
      _ => None,
    }
  }

  fn from_native(native: &dyn NativeOracle, feature: &str, param: &str, default: &Self) -> Self {
    native.field_trial_param_by_feature_as_int(feature, param, *default)
  }
}

impl ParamValue for f64 {
  const TYPE: ValueType = ValueType::Double;

  fn into_value(self) -> Value {
    Value::Double(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Double(value) => Some(*value),
      _ => None,
    }
  }

  fn from_native(native: &dyn NativeOracle, feature: &str, param: &str, default: &Self) -> Self {
    native.field_trial_param_by_feature_as_double(feature, param, *default)
  }
}

impl ParamValue for String {
  const TYPE: ValueType = ValueType::String;

  fn into_value(self) -> Value {
    Value::String(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::String(value) => Some(value.clone()),
      _ => None,
    }
  }

  fn from_native(native: &dyn NativeOracle, feature: &str, param: &str, default: &Self) -> Self {
    let value = native.field_trial_param_by_feature(feature, param);
    if value.is_empty() {
      default.clone()
    } else {
      value
    }
  }
}
