//! # Requests
//!
//! The operations a bridge can ask of a remote runtime, and the metadata
//! shapes the runtime answers introspection with.
//!
//! Every request is either instance-level (control and introspection) or
//! thread-affine (it runs user code and must execute on a worker thread bound
//! to the caller).

use serde::Deserialize;
use serde::Serialize;

use crate::value::WireValue;

/// Where a request executes on the remote side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Affinity {
    /// Served by the runtime's control loop; no worker thread involved.
    Instance,
    /// Served on the worker thread named in the call envelope.
    Thread,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    NewThread,
    Free { handle: u64 },
    DescribeType { name: String },
    ClassOf { handle: u64 },
    Construct { ctor: u64, args: Vec<WireValue> },
    Invoke { method: u64, receiver: Option<u64>, args: Vec<WireValue> },
    GetField { field: u64, receiver: Option<u64> },
    SetField { field: u64, receiver: Option<u64>, value: WireValue },
    NewArray { element: String, values: Vec<WireValue> },
    ArrayToList { handle: u64 },
    NewString { value: String },
    StringToLocal { handle: u64 },
    StackTrace { handle: u64 },
}

impl Request {
    pub fn affinity(&self) -> Affinity {
        match self {
            Self::NewThread
            | Self::Free { .. }
            | Self::DescribeType { .. }
            | Self::ClassOf { .. } => Affinity::Instance,
            Self::Construct { .. }
            | Self::Invoke { .. }
            | Self::GetField { .. }
            | Self::SetField { .. }
            | Self::NewArray { .. }
            | Self::ArrayToList { .. }
            | Self::NewString { .. }
            | Self::StringToLocal { .. }
            | Self::StackTrace { .. } => Affinity::Thread,
        }
    }

    /// The operation tag as written on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            Self::NewThread => "new_thread",
            Self::Free { .. } => "free",
            Self::DescribeType { .. } => "describe_type",
            Self::ClassOf { .. } => "class_of",
            Self::Construct { .. } => "construct",
            Self::Invoke { .. } => "invoke",
            Self::GetField { .. } => "get_field",
            Self::SetField { .. } => "set_field",
            Self::NewArray { .. } => "new_array",
            Self::ArrayToList { .. } => "array_to_list",
            Self::NewString { .. } => "new_string",
            Self::StringToLocal { .. } => "string_to_local",
            Self::StackTrace { .. } => "stack_trace",
        }
    }
}

/// The shape of a remote type, as answered to `describe_type`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeShape {
    pub name: String,
    /// Every superclass and interface, transitively. Excludes the type itself.
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub constructors: Vec<MemberShape>,
    #[serde(default)]
    pub methods: Vec<MemberShape>,
    #[serde(default)]
    pub fields: Vec<MemberShape>,
}

/// One constructor, method or field of a remote type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberShape {
    /// Executable handle, valid for the lifetime of the runtime process.
    pub handle: u64,
    pub name: String,
    /// Parameter type names. Always empty for fields.
    #[serde(default)]
    pub params: Vec<String>,
    /// Return type for methods, declared type for fields.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub is_static: bool,
}
