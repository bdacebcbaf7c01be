//! The dynamically typed values exchanged between sources and destinations.
//!
//! Every source (defaults, environment, config documents, flags) produces a
//! [`Value`]; every variable coerces a `Value` into its native type when it
//! is applied. The set of shapes is closed on purpose: config documents that
//! hold arrays or tables at a variable's path are rejected rather than
//! smuggled through.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::duration::format_duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    #[serde(serialize_with = "serialize_duration")]
    Duration(Duration),
}

fn serialize_duration<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*d))
}

impl Value {
    /// Short name of the value's shape, used in reports and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Duration(_) => "duration",
        }
    }

    /// Convert a TOML leaf. Datetimes become strings; arrays and tables have
    /// no scalar representation and are rejected.
    pub fn from_toml(value: &toml::Value) -> Result<Value, String> {
        match value {
            toml::Value::String(s) => Ok(Value::String(s.clone())),
            toml::Value::Integer(i) => Ok(Value::Int(*i)),
            toml::Value::Float(f) => Ok(Value::Float(*f)),
            toml::Value::Boolean(b) => Ok(Value::Bool(*b)),
            toml::Value::Datetime(dt) => Ok(Value::String(dt.to_string())),
            toml::Value::Array(_) => Err("expected a scalar, found an array".into()),
            toml::Value::Table(_) => Err("expected a scalar, found a table".into()),
        }
    }

    /// Convert a JSON leaf. `null` is treated as absent by the caller and is
    /// rejected here.
    pub fn from_json(value: &serde_json::Value) -> Result<Value, String> {
        match value {
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("unrepresentable number {n}")),
            },
            serde_json::Value::Null => Err("expected a scalar, found null".into()),
            serde_json::Value::Array(_) => Err("expected a scalar, found an array".into()),
            serde_json::Value::Object(_) => Err("expected a scalar, found an object".into()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_scalars_convert() {
        let table: toml::Table = "s = \"x\"\ni = 3\nf = 1.5\nb = true\n".parse().unwrap();
        assert_eq!(Value::from_toml(&table["s"]).unwrap(), Value::from("x"));
        assert_eq!(Value::from_toml(&table["i"]).unwrap(), Value::Int(3));
        assert_eq!(Value::from_toml(&table["f"]).unwrap(), Value::Float(1.5));
        assert_eq!(Value::from_toml(&table["b"]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn toml_containers_rejected() {
        let table: toml::Table = "a = [1, 2]\n[t]\nk = 1\n".parse().unwrap();
        assert!(Value::from_toml(&table["a"]).is_err());
        assert!(Value::from_toml(&table["t"]).is_err());
    }

    #[test]
    fn json_numbers_prefer_integers() {
        let doc: serde_json::Value = serde_json::from_str(r#"{"i": 7, "f": 2.5}"#).unwrap();
        assert_eq!(Value::from_json(&doc["i"]).unwrap(), Value::Int(7));
        assert_eq!(Value::from_json(&doc["f"]).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn display_and_json_use_duration_grammar() {
        let v = Value::Duration(Duration::from_secs(90));
        assert_eq!(v.to_string(), "1m30s");
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1m30s\"");
    }
}
