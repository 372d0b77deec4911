//! # Metadata Cache
//!
//! Resolved type descriptors per node, plus the runtime type of every object
//! the bridge has asked about.
//!
//! ## Invariants
//! - **Single Flight**: At most one resolution per `(node, type)` runs at a
//!   time. Other callers wait on the claim's `Notify` and then read the cache.
//! - **No Poisoning**: A failed resolution releases its claim and caches
//!   nothing; the next caller tries again.
//! - **Immutable Entries**: Descriptors are shared as `Arc` and never change
//!   after insertion. They survive a reset and die with their node.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use exowire::MemberShape;
use exowire::TypeShape;
use tokio::sync::Notify;
use tracing::debug;

use crate::bridge::Bridge;
use crate::error::Error;
use crate::error::Result;
use crate::node::NodeId;
use crate::reference::Handle;
use crate::reference::Reference;

/// One constructor, method or field of a remote type.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub name: String,
    /// Executable reference used to invoke or access the member.
    pub handle: Reference,
    /// Parameter type names. Empty for fields.
    pub params: Vec<String>,
    /// Return type for methods, declared type for fields.
    pub returns: Option<String>,
    pub is_static: bool,
}

impl Member {
    fn from_shape(shape: MemberShape, node: NodeId) -> Self {
        Self {
            name: shape.name,
            handle: Reference::Executable(Handle {
                node,
                id: shape.handle,
                epoch: 0,
            }),
            params: shape.params,
            returns: shape.returns,
            is_static: shape.is_static,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Cached metadata for one named type on one node.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    /// Every superclass and interface, transitively.
    pub supertypes: BTreeSet<String>,
    pub constructors: Vec<Member>,
    pub methods: Vec<Member>,
    pub fields: Vec<Member>,
}

impl TypeDescriptor {
    pub fn from_shape(shape: TypeShape, node: NodeId) -> Self {
        let members = |shapes: Vec<MemberShape>| {
            shapes
                .into_iter()
                .map(|shape| Member::from_shape(shape, node))
                .collect()
        };
        Self {
            name: shape.name,
            supertypes: shape.supertypes.into_iter().collect(),
            constructors: members(shape.constructors),
            methods: members(shape.methods),
            fields: members(shape.fields),
        }
    }

    /// Whether values of this type are also values of `other`.
    pub fn is_subtype_of(&self, other: &str) -> bool {
        self.name == other || self.supertypes.contains(other)
    }
}

/// Produces type descriptors on a cache miss.
#[async_trait::async_trait]
pub trait TypeResolver: Send + Sync + 'static {
    async fn resolve(&self, bridge: &Bridge, node: NodeId, type_name: &str) -> Result<TypeDescriptor>;
}

/// Asks the remote runtime to describe the type.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteResolver;

#[async_trait::async_trait]
impl TypeResolver for RemoteResolver {
    async fn resolve(&self, bridge: &Bridge, node: NodeId, type_name: &str) -> Result<TypeDescriptor> {
        let shape = bridge.describe(node, type_name).await?;
        if shape.name != type_name {
            return Err(Error::Protocol(format!(
                "asked to describe {}, got {}",
                type_name, shape.name
            )));
        }
        Ok(TypeDescriptor::from_shape(shape, node))
    }
}

type TypeKey = (NodeId, String);

#[derive(Default)]
pub struct MetadataCache {
    types: DashMap<TypeKey, Arc<TypeDescriptor>>,
    claims: DashMap<TypeKey, Arc<Notify>>,
    classes: DashMap<Reference, Arc<TypeDescriptor>>,
}

/// An exclusive right to resolve one key. Dropping it wakes the waiters.
struct Claim<'a> {
    cache: &'a MetadataCache,
    key: TypeKey,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Some((_, notify)) = self.cache.claims.remove(&self.key) {
            notify.notify_waiters();
        }
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeId, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types
            .get(&(node, type_name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Returns the cached descriptor, running `load` if nobody has yet.
    ///
    /// Concurrent callers for the same key share one `load`. If it fails, the
    /// error goes to the caller that ran it and the waiters try again.
    pub async fn resolve_with<F, Fut>(
        &self,
        node: NodeId,
        type_name: &str,
        load: F,
    ) -> Result<Arc<TypeDescriptor>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TypeDescriptor>>,
    {
        let key: TypeKey = (node, type_name.to_string());

        let claim = loop {
            if let Some(found) = self.types.get(&key) {
                return Ok(found.value().clone());
            }

            let contender = match self.claims.entry(key.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(Notify::new()));
                    None
                }
                Entry::Occupied(occupied) => Some(occupied.get().clone()),
            };

            let Some(notify) = contender else {
                break Claim {
                    cache: self,
                    key: key.clone(),
                };
            };

            // Registered before the re-check, so a release in between still wakes us.
            let notified = notify.notified();
            if self.is_claimed_by(&key, &notify) && !self.types.contains_key(&key) {
                debug!(node = %node, type_name, "Waiting for type resolution");
                notified.await;
            }
        };

        if let Some(found) = self.types.get(&key) {
            return Ok(found.value().clone());
        }

        debug!(node = %node, type_name, "Resolving type");
        let descriptor = Arc::new(load().await?);
        self.types.insert(key, descriptor.clone());
        drop(claim);
        Ok(descriptor)
    }

    fn is_claimed_by(&self, key: &TypeKey, notify: &Arc<Notify>) -> bool {
        self.claims
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), notify))
    }

    /// The runtime type recorded for `reference`, if any.
    pub fn class_binding(&self, reference: &Reference) -> Option<Arc<TypeDescriptor>> {
        self.classes.get(reference).map(|entry| entry.value().clone())
    }

    pub fn bind_class(&self, reference: Reference, descriptor: Arc<TypeDescriptor>) {
        self.classes.insert(reference, descriptor);
    }

    pub fn unbind_class(&self, reference: &Reference) {
        self.classes.remove(reference);
    }

    /// Forgets every object binding on `node`, keeping its type metadata.
    pub fn evict_objects(&self, node: NodeId) {
        self.classes.retain(|reference, _| reference.node() != node);
    }

    /// Forgets everything about `node`.
    pub fn evict_node(&self, node: NodeId) {
        self.types.retain(|(bound, _), _| *bound != node);
        self.evict_objects(node);
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn clear(&self) {
        self.types.clear();
        self.classes.clear();
    }
}
