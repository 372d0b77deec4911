//! # Member Selection
//!
//! Picks the one constructor, method or field a call means, given the
//! type's descriptor, the arguments and any type hints. Selection is pure:
//! it never talks to the remote runtime.

use crate::error::UsageError;
use crate::metadata::Member;
use crate::metadata::TypeDescriptor;
use crate::value::Arg;
use crate::value::Value;

pub type Result<T> = std::result::Result<T, UsageError>;

pub trait MemberSelector: Send + Sync + 'static {
    fn constructor<'a>(&self, ty: &'a TypeDescriptor, args: &[Arg]) -> Result<&'a Member>;

    fn method<'a>(
        &self,
        ty: &'a TypeDescriptor,
        name: &str,
        is_static: bool,
        args: &[Arg],
    ) -> Result<&'a Member>;

    fn field<'a>(&self, ty: &'a TypeDescriptor, name: &str, is_static: bool) -> Result<&'a Member>;
}

/// Narrows by name, staticness and arity, then by explicit hints, then by
/// whether each argument value fits its parameter type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArityMatcher;

impl ArityMatcher {
    fn pick<'a>(
        ty: &'a TypeDescriptor,
        pool: &'a [Member],
        name: Option<&str>,
        is_static: Option<bool>,
        args: &[Arg],
    ) -> Result<&'a Member> {
        let label = || format!("{}/{}", name.unwrap_or("new"), args.len());

        let mut candidates: Vec<&Member> = pool
            .iter()
            .filter(|m| name.is_none_or(|name| m.name == name))
            .filter(|m| is_static.is_none_or(|s| m.is_static == s))
            .filter(|m| m.arity() == args.len())
            .collect();

        if args.iter().any(|arg| arg.hint.is_some()) {
            candidates.retain(|m| {
                m.params
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| arg.hint.as_deref().is_none_or(|hint| hint == param))
            });
        }

        if candidates.len() > 1 {
            candidates.retain(|m| {
                m.params
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| fits(param, &arg.value))
            });
        }

        match candidates.as_slice() {
            [only] => Ok(*only),
            [] => Err(UsageError::NoSuchMember {
                type_name: ty.name.clone(),
                member: label(),
            }),
            many => Err(UsageError::Ambiguous {
                type_name: ty.name.clone(),
                member: label(),
                candidates: many.len(),
            }),
        }
    }
}

impl MemberSelector for ArityMatcher {
    fn constructor<'a>(&self, ty: &'a TypeDescriptor, args: &[Arg]) -> Result<&'a Member> {
        Self::pick(ty, &ty.constructors, None, None, args)
    }

    fn method<'a>(
        &self,
        ty: &'a TypeDescriptor,
        name: &str,
        is_static: bool,
        args: &[Arg],
    ) -> Result<&'a Member> {
        Self::pick(ty, &ty.methods, Some(name), Some(is_static), args)
    }

    fn field<'a>(&self, ty: &'a TypeDescriptor, name: &str, is_static: bool) -> Result<&'a Member> {
        Self::pick(ty, &ty.fields, Some(name), Some(is_static), &[])
    }
}

const PRIMITIVES: [&str; 8] = ["boolean", "byte", "short", "int", "long", "float", "double", "char"];

fn is_primitive(param: &str) -> bool {
    PRIMITIVES.contains(&param)
}

/// Whether `value` can be passed where `param` is declared.
fn fits(param: &str, value: &Value) -> bool {
    if param == "java.lang.Object" {
        return true;
    }
    match value {
        Value::Null | Value::Ref(_) | Value::Fault(_) => !is_primitive(param),
        Value::Bool(_) => matches!(param, "boolean" | "java.lang.Boolean"),
        Value::Int(_) => matches!(
            param,
            "byte"
                | "short"
                | "int"
                | "long"
                | "float"
                | "double"
                | "java.lang.Byte"
                | "java.lang.Short"
                | "java.lang.Integer"
                | "java.lang.Long"
                | "java.lang.Number"
        ),
        Value::Float(_) => matches!(
            param,
            "float" | "double" | "java.lang.Float" | "java.lang.Double" | "java.lang.Number"
        ),
        Value::Char(_) => matches!(param, "char" | "java.lang.Character"),
        Value::Str(_) => matches!(param, "java.lang.String" | "java.lang.CharSequence"),
        Value::Array(_) => param.ends_with("[]"),
    }
}
