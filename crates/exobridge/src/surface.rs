//! # Call Surface
//!
//! The operations callers use to drive a remote runtime: construct objects,
//! invoke methods, read and write fields, convert arrays and strings, and
//! introspect types.
//!
//! Each operation resolves the type it needs, asks the member selector for
//! the exact member, checks the receiver and arguments locally, and only then
//! dispatches. Remote faults and resolution failures pass through untouched.

use std::sync::Arc;

use exowire::Request;
use exowire::WireValue;

use crate::bridge::Bridge;
use crate::context::CallContext;
use crate::error::Error;
use crate::error::Result;
use crate::error::UsageError;
use crate::metadata::TypeDescriptor;
use crate::node::Node;
use crate::node::NodeId;
use crate::reference::Reference;
use crate::value::Arg;
use crate::value::Value;

/// The object reference behind an instance operation's receiver.
fn receiver(value: &Value) -> std::result::Result<Reference, UsageError> {
    match value {
        Value::Null => Err(UsageError::NullReceiver),
        Value::Ref(r @ Reference::Object(_)) => Ok(*r),
        Value::Fault(fault) => fault.exception.ok_or(UsageError::NotAnObject("fault")),
        other => Err(UsageError::NotAnObject(other.desc())),
    }
}

impl Bridge {
    /// Lowers `value` for a call on `node`, refusing released objects.
    fn lower(&self, value: &Value, node: &Node, epoch: u64) -> Result<WireValue> {
        if let Some(freed) = value.references().into_iter().find(|r| self.freed.contains(r)) {
            return Err(UsageError::InvalidReference(freed).into());
        }
        Ok(value.lower(node.id(), epoch)?)
    }

    fn lower_args(&self, args: &[Arg], node: &Node, epoch: u64) -> Result<Vec<WireValue>> {
        args.iter().map(|arg| self.lower(&arg.value, node, epoch)).collect()
    }

    /// Resolves `type_name` on `node` through the metadata cache.
    pub async fn resolve_type(&self, node: NodeId, type_name: &str) -> Result<Arc<TypeDescriptor>> {
        let descriptor = self
            .metadata
            .resolve_with(node, type_name, || self.resolver.resolve(self, node, type_name))
            .await?;
        // Teardown may have evicted the node while the resolution was running.
        if !self.nodes.contains_key(&node) {
            self.metadata.evict_node(node);
        }
        Ok(descriptor)
    }

    /// Runtime type of the object behind `object`, cached per reference.
    pub async fn class_of(&self, ctx: &mut CallContext, object: &Value) -> Result<Arc<TypeDescriptor>> {
        let reference = receiver(object)?;
        let node = self.live_node(reference)?;
        if let Some(descriptor) = self.metadata.class_binding(&reference) {
            return Ok(descriptor);
        }

        let epoch = node.epoch();
        let request = Request::ClassOf { handle: reference.id() };
        let type_name = match self.control(ctx, &node, epoch, request).await? {
            Value::Str(name) => name,
            other => return Err(Error::Protocol(format!("class_of returned a {}", other.desc()))),
        };

        let descriptor = self.resolve_type(node.id(), &type_name).await?;
        if node.epoch() == epoch {
            self.metadata.bind_class(reference, descriptor.clone());
        }
        Ok(descriptor)
    }

    /// Runtime type name of `object`.
    pub async fn type_of(&self, ctx: &mut CallContext, object: &Value) -> Result<String> {
        Ok(self.class_of(ctx, object).await?.name.clone())
    }

    /// Creates an instance of `type_name` on `node`.
    pub async fn construct(
        &self,
        ctx: &mut CallContext,
        node: NodeId,
        type_name: &str,
        args: &[Arg],
    ) -> Result<Value> {
        let node = self.connected(node)?;
        let ty = self.resolve_type(node.id(), type_name).await?;
        let ctor = self.selector.constructor(&ty, args)?;

        let epoch = node.epoch();
        let request = Request::Construct {
            ctor: ctor.handle.id(),
            args: self.lower_args(args, &node, epoch)?,
        };
        self.call(ctx, &node, epoch, request).await
    }

    /// Invokes an instance method on `target`.
    pub async fn invoke(
        &self,
        ctx: &mut CallContext,
        target: &Value,
        method: &str,
        args: &[Arg],
    ) -> Result<Value> {
        let reference = receiver(target)?;
        let node = self.live_node(reference)?;
        let ty = self.class_of(ctx, target).await?;
        let member = self.selector.method(&ty, method, false, args)?;

        let epoch = node.epoch();
        let request = Request::Invoke {
            method: member.handle.id(),
            receiver: Some(reference.id()),
            args: self.lower_args(args, &node, epoch)?,
        };
        self.call(ctx, &node, epoch, request).await
    }

    /// Invokes a static method of `type_name` on `node`.
    pub async fn invoke_static(
        &self,
        ctx: &mut CallContext,
        node: NodeId,
        type_name: &str,
        method: &str,
        args: &[Arg],
    ) -> Result<Value> {
        let node = self.connected(node)?;
        let ty = self.resolve_type(node.id(), type_name).await?;
        let member = self.selector.method(&ty, method, true, args)?;

        let epoch = node.epoch();
        let request = Request::Invoke {
            method: member.handle.id(),
            receiver: None,
            args: self.lower_args(args, &node, epoch)?,
        };
        self.call(ctx, &node, epoch, request).await
    }

    pub async fn get_field(&self, ctx: &mut CallContext, target: &Value, field: &str) -> Result<Value> {
        let reference = receiver(target)?;
        let node = self.live_node(reference)?;
        let ty = self.class_of(ctx, target).await?;
        let member = self.selector.field(&ty, field, false)?;

        let request = Request::GetField {
            field: member.handle.id(),
            receiver: Some(reference.id()),
        };
        self.call(ctx, &node, node.epoch(), request).await
    }

    pub async fn set_field(
        &self,
        ctx: &mut CallContext,
        target: &Value,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let value = value.into();
        let reference = receiver(target)?;
        let node = self.live_node(reference)?;
        let ty = self.class_of(ctx, target).await?;
        let member = self.selector.field(&ty, field, false)?;

        let epoch = node.epoch();
        let request = Request::SetField {
            field: member.handle.id(),
            receiver: Some(reference.id()),
            value: self.lower(&value, &node, epoch)?,
        };
        self.call(ctx, &node, epoch, request).await
    }

    pub async fn get_static_field(
        &self,
        ctx: &mut CallContext,
        node: NodeId,
        type_name: &str,
        field: &str,
    ) -> Result<Value> {
        let node = self.connected(node)?;
        let ty = self.resolve_type(node.id(), type_name).await?;
        let member = self.selector.field(&ty, field, true)?;

        let request = Request::GetField {
            field: member.handle.id(),
            receiver: None,
        };
        self.call(ctx, &node, node.epoch(), request).await
    }

    pub async fn set_static_field(
        &self,
        ctx: &mut CallContext,
        node: NodeId,
        type_name: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let value = value.into();
        let node = self.connected(node)?;
        let ty = self.resolve_type(node.id(), type_name).await?;
        let member = self.selector.field(&ty, field, true)?;

        let epoch = node.epoch();
        let request = Request::SetField {
            field: member.handle.id(),
            receiver: None,
            value: self.lower(&value, &node, epoch)?,
        };
        self.call(ctx, &node, epoch, request).await
    }

    /// Builds a remote array of `element` holding `values`.
    pub async fn new_array(
        &self,
        ctx: &mut CallContext,
        node: NodeId,
        element: &str,
        values: &[Value],
    ) -> Result<Value> {
        let node = self.connected(node)?;
        let epoch = node.epoch();
        let values = values
            .iter()
            .map(|value| self.lower(value, &node, epoch))
            .collect::<Result<Vec<_>>>()?;

        let request = Request::NewArray {
            element: element.to_string(),
            values,
        };
        self.call(ctx, &node, epoch, request).await
    }

    /// Copies a remote array's elements into a local [`Value::Array`].
    pub async fn array_to_list(&self, ctx: &mut CallContext, array: &Value) -> Result<Value> {
        let reference = receiver(array)?;
        let node = self.live_node(reference)?;
        let request = Request::ArrayToList { handle: reference.id() };
        self.call(ctx, &node, node.epoch(), request).await
    }

    /// Creates a remote string holding `value`.
    pub async fn new_string(&self, ctx: &mut CallContext, node: NodeId, value: &str) -> Result<Value> {
        let node = self.connected(node)?;
        let request = Request::NewString {
            value: value.to_string(),
        };
        self.call(ctx, &node, node.epoch(), request).await
    }

    /// Copies a remote string's contents.
    pub async fn string_to_local(&self, ctx: &mut CallContext, string: &Value) -> Result<Value> {
        let reference = receiver(string)?;
        let node = self.live_node(reference)?;
        let request = Request::StringToLocal { handle: reference.id() };
        self.call(ctx, &node, node.epoch(), request).await
    }

    /// Whether `object` is an instance of `type_name`. `null` is an instance
    /// of nothing.
    pub async fn instance_of(&self, ctx: &mut CallContext, object: &Value, type_name: &str) -> Result<bool> {
        if object.is_null() {
            return Ok(false);
        }
        let ty = self.class_of(ctx, object).await?;
        Ok(ty.is_subtype_of(type_name))
    }

    /// Whether `sub` is `sup` or one of its descendants on `node`.
    pub async fn is_subtype(&self, node: NodeId, sub: &str, sup: &str) -> Result<bool> {
        let ty = self.resolve_type(node, sub).await?;
        Ok(ty.is_subtype_of(sup))
    }

    /// The stack trace of a remote exception, one frame per line.
    pub async fn stack_trace(&self, ctx: &mut CallContext, exception: &Value) -> Result<Vec<String>> {
        let reference = receiver(exception)?;
        let node = self.live_node(reference)?;
        let request = Request::StackTrace { handle: reference.id() };
        match self.control(ctx, &node, node.epoch(), request).await? {
            Value::Array(frames) => frames
                .into_iter()
                .map(|frame| match frame {
                    Value::Str(line) => Ok(line),
                    other => Err(Error::Protocol(format!("stack frame is a {}", other.desc()))),
                })
                .collect(),
            other => Err(Error::Protocol(format!("stack_trace returned a {}", other.desc()))),
        }
    }

    /// Releases the remote object behind `reference`.
    ///
    /// Later uses of the reference fail locally with
    /// [`UsageError::InvalidReference`].
    pub async fn free(&self, ctx: &mut CallContext, reference: Reference) -> Result<()> {
        if let Reference::Executable(_) = reference {
            return Err(UsageError::NotAnObject("executable").into());
        }
        let node = self.live_node(reference)?;
        let request = Request::Free { handle: reference.id() };
        self.control(ctx, &node, node.epoch(), request).await?;
        self.metadata.unbind_class(&reference);
        self.freed.insert(reference);
        Ok(())
    }
}
