//! # Wire Values
//!
//! The narrow set of values that cross the session link. Anything richer than
//! a scalar, a string or an array stays in the remote runtime and travels as a
//! handle.

use serde::Deserialize;
use serde::Serialize;

/// What a remote handle points at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// An ordinary object (including strings, arrays and exceptions held remotely).
    Object,
    /// A constructor, method or field.
    Executable,
    /// A remote execution thread.
    Thread,
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Executable => write!(f, "executable"),
            Self::Thread => write!(f, "thread"),
        }
    }
}

/// A value as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Non-finite values travel as `"NaN"`, `"Infinity"` and `"-Infinity"`.
    Float(#[serde(with = "float")] f64),
    Char(char),
    Str(String),
    Array(Vec<WireValue>),
    Ref { kind: RefKind, handle: u64 },
}

impl WireValue {
    /// Short name of the variant, used in diagnostics.
    pub fn desc(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Ref { .. } => "ref",
        }
    }
}

/// JSON has no literal for NaN or the infinities, so those are spelled out.
mod float {
    use serde::Deserializer;
    use serde::Serializer;
    use serde::de;

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { INFINITY } else { NEG_INFINITY })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl de::Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "a number, \"{}\", \"{}\" or \"{}\"", NAN, INFINITY, NEG_INFINITY)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<f64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<f64, E> {
            match value {
                NAN => Ok(f64::NAN),
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}
