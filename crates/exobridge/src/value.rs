//! # Local Values
//!
//! What callers hand to and get back from the bridge. Scalars, strings and
//! arrays are copied across; everything else stays remote behind a
//! [`Reference`].

use exowire::FaultBody;
use exowire::WireValue;

use crate::error::UsageError;
use crate::node::NodeId;
use crate::reference::Handle;
use crate::reference::Reference;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Array(Vec<Value>),
    Ref(Reference),
    /// A remote exception, delivered as a value when the node runs in
    /// [`FaultMode::AsValue`](crate::config::FaultMode::AsValue).
    Fault(RemoteFault),
}

impl Value {
    /// The reference this value carries, if any.
    pub fn reference(&self) -> Option<Reference> {
        match self {
            Self::Ref(r) => Some(*r),
            Self::Fault(fault) => fault.exception,
            _ => None,
        }
    }

    /// Every reference this value carries, nested ones included.
    pub(crate) fn references(&self) -> Vec<Reference> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references(&self, found: &mut Vec<Reference>) {
        match self {
            Self::Array(items) => items.iter().for_each(|item| item.collect_references(found)),
            other => found.extend(other.reference()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

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
            Self::Ref(_) => "reference",
            Self::Fault(_) => "fault",
        }
    }

    /// Converts to the wire form for a call against `node` at `epoch`.
    ///
    /// References must belong to `node` and still be live there.
    pub(crate) fn lower(&self, node: NodeId, epoch: u64) -> Result<WireValue, UsageError> {
        Ok(match self {
            Self::Null => WireValue::Null,
            Self::Bool(b) => WireValue::Bool(*b),
            Self::Int(i) => WireValue::Int(*i),
            Self::Float(x) => WireValue::Float(*x),
            Self::Char(c) => WireValue::Char(*c),
            Self::Str(s) => WireValue::Str(s.clone()),
            Self::Array(items) => WireValue::Array(
                items
                    .iter()
                    .map(|item| item.lower(node, epoch))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Self::Ref(r) => check_reference(r, node, epoch)?.to_wire(),
            Self::Fault(fault) => match &fault.exception {
                Some(r) => check_reference(r, node, epoch)?.to_wire(),
                None => {
                    return Err(UsageError::Unsendable(format!(
                        "{} has no remote handle",
                        fault.class
                    )));
                }
            },
        })
    }

    /// Converts a wire value received from `node` at `epoch`.
    pub(crate) fn lift(wire: WireValue, node: NodeId, epoch: u64) -> Self {
        match wire {
            WireValue::Null => Self::Null,
            WireValue::Bool(b) => Self::Bool(b),
            WireValue::Int(i) => Self::Int(i),
            WireValue::Float(x) => Self::Float(x),
            WireValue::Char(c) => Self::Char(c),
            WireValue::Str(s) => Self::Str(s),
            WireValue::Array(items) => Self::Array(
                items
                    .into_iter()
                    .map(|item| Self::lift(item, node, epoch))
                    .collect(),
            ),
            WireValue::Ref { kind, handle } => Self::Ref(Reference::new(
                kind,
                Handle { node, id: handle, epoch },
            )),
        }
    }
}

fn check_reference(r: &Reference, node: NodeId, epoch: u64) -> Result<Reference, UsageError> {
    if r.node() != node {
        return Err(UsageError::ForeignReference { reference: *r, node });
    }
    if !r.is_live_in(epoch) {
        return Err(UsageError::InvalidReference(*r));
    }
    Ok(*r)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Self::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Self::Ref(r)
    }
}

/// An exception raised by the remote runtime during a call.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteFault {
    /// Runtime type name of the exception.
    pub class: String,
    pub message: String,
    /// The exception object itself, for stack traces and further calls.
    pub exception: Option<Reference>,
}

impl RemoteFault {
    pub(crate) fn lift(body: FaultBody, node: NodeId, epoch: u64) -> Self {
        Self {
            class: body.class,
            message: body.message,
            exception: body
                .exception
                .map(|id| Reference::Object(Handle { node, id, epoch })),
        }
    }
}

impl std::fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

/// A call argument, optionally pinned to a parameter type.
///
/// Hints disambiguate overloads the value alone cannot, e.g. `int` versus `long`.
#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    pub value: Value,
    pub hint: Option<String>,
}

impl Arg {
    pub fn hinted(hint: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            hint: Some(hint.into()),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self { value, hint: None }
    }
}

#[cfg(test)]
mod tests {
    use exowire::RefKind;

    use super::*;

    fn object(node: u64, id: u64, epoch: u64) -> Reference {
        Reference::Object(Handle { node: NodeId(node), id, epoch })
    }

    #[test]
    fn test_lift_binds_node_and_epoch() {
        let wire = WireValue::Array(vec![
            WireValue::Int(1),
            WireValue::Ref { kind: RefKind::Object, handle: 5 },
        ]);
        let value = Value::lift(wire, NodeId(2), 3);
        assert_eq!(value, Value::Array(vec![Value::Int(1), Value::Ref(object(2, 5, 3))]));
    }

    #[test]
    fn test_lower_rejects_stale_reference() {
        let stale = Value::Array(vec![Value::Ref(object(2, 5, 0))]);
        let err = stale.lower(NodeId(2), 1).unwrap_err();
        assert_eq!(err, UsageError::InvalidReference(object(2, 5, 0)));
    }

    #[test]
    fn test_lower_rejects_foreign_reference() {
        let err = Value::Ref(object(1, 5, 0)).lower(NodeId(2), 0).unwrap_err();
        assert!(matches!(err, UsageError::ForeignReference { node: NodeId(2), .. }));
    }

    #[test]
    fn test_fault_lowers_to_its_exception() {
        let fault = RemoteFault {
            class: "demo.Oops".into(),
            message: "bad".into(),
            exception: Some(object(1, 9, 0)),
        };
        assert_eq!(
            Value::Fault(fault.clone()).lower(NodeId(1), 0).unwrap(),
            WireValue::Ref { kind: RefKind::Object, handle: 9 }
        );

        let detached = RemoteFault { exception: None, ..fault };
        assert!(matches!(
            Value::Fault(detached).lower(NodeId(1), 0),
            Err(UsageError::Unsendable(_))
        ));
    }

    #[test]
    fn test_hinted_arg() {
        let arg = Arg::hinted("long", 3i64);
        assert_eq!(arg.value, Value::Int(3));
        assert_eq!(arg.hint.as_deref(), Some("long"));
        assert_eq!(Arg::from(Value::Null).hint, None);
    }
}
