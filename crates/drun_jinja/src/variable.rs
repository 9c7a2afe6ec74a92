//! This module defines the `Variable` type, the dynamic value carried in
//! recipe contexts. Variables can be strings, numbers, booleans, or nested
//! lists and maps of these types.

use minijinja::Value;
use minijinja::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// A dynamically typed context value. It is a wrapper around a
/// `minijinja::Value`, which already covers the scalar, sequence and
/// mapping shapes YAML can produce.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable(Value);

impl From<Variable> for Value {
    fn from(variable: Variable) -> Self {
        variable.0
    }
}

impl AsRef<Value> for Variable {
    fn as_ref(&self) -> &Value {
        &self.0
    }
}

impl From<bool> for Variable {
    fn from(value: bool) -> Self {
        Variable(Value::from(value))
    }
}

impl From<i64> for Variable {
    fn from(value: i64) -> Self {
        Variable(Value::from(value))
    }
}

impl From<String> for Variable {
    fn from(value: String) -> Self {
        Variable(Value::from_safe_string(value))
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Variable(Value::from_safe_string(value.to_string()))
    }
}

impl From<Vec<Variable>> for Variable {
    fn from(value: Vec<Variable>) -> Self {
        Variable(Value::from_serialize(value))
    }
}

impl Variable {
    /// The string content, if this variable is a string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// True if this variable is a boolean.
    pub fn is_bool(&self) -> bool {
        self.0.kind() == ValueKind::Bool
    }

    /// True if this variable is an integral number.
    pub fn is_int(&self) -> bool {
        self.0.kind() == ValueKind::Number && i64::try_from(self.0.clone()).is_ok()
    }

    /// True if this variable is a sequence whose items are all strings.
    pub fn is_string_list(&self) -> bool {
        if self.0.kind() != ValueKind::Seq {
            return false;
        }
        match self.0.try_iter() {
            Ok(items) => items.into_iter().all(|v| v.as_str().is_some()),
            Err(_) => false,
        }
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(s) = self.0.as_str() {
            write!(f, "\"{}\"", s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}
