//! # Remote References
//!
//! Opaque handles to values owned by a remote runtime. The bridge never owns
//! the storage behind a reference; it only remembers which node issued it and
//! in which epoch, so that stale handles are caught locally instead of being
//! shipped to a runtime that has already forgotten them.

use exowire::RefKind;
use exowire::WireValue;

use crate::node::NodeId;

/// One remote value within one node.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct Handle {
    pub node: NodeId,
    pub id: u64,
    /// Node epoch the handle was issued in. Every reset advances the epoch.
    pub epoch: u64,
}

/// A handle tagged with what it points at.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Reference {
    Object(Handle),
    Executable(Handle),
    Thread(Handle),
}

impl Reference {
    pub fn new(kind: RefKind, handle: Handle) -> Self {
        match kind {
            RefKind::Object => Self::Object(handle),
            RefKind::Executable => Self::Executable(handle),
            RefKind::Thread => Self::Thread(handle),
        }
    }

    pub fn kind(&self) -> RefKind {
        match self {
            Self::Object(_) => RefKind::Object,
            Self::Executable(_) => RefKind::Executable,
            Self::Thread(_) => RefKind::Thread,
        }
    }

    pub fn handle(&self) -> Handle {
        match self {
            Self::Object(h) | Self::Executable(h) | Self::Thread(h) => *h,
        }
    }

    pub fn node(&self) -> NodeId {
        self.handle().node
    }

    /// The remote handle number.
    pub fn id(&self) -> u64 {
        self.handle().id
    }

    /// Whether the reference is still usable once its node has reached `epoch`.
    ///
    /// Executables name type metadata, which a reset leaves intact. Objects and
    /// threads die with the epoch that produced them.
    pub fn is_live_in(&self, epoch: u64) -> bool {
        match self {
            Self::Executable(_) => true,
            Self::Object(h) | Self::Thread(h) => h.epoch == epoch,
        }
    }

    pub(crate) fn to_wire(self) -> WireValue {
        WireValue::Ref {
            kind: self.kind(),
            handle: self.id(),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = self.handle();
        write!(f, "{}#{}@{}", self.kind(), h.id, h.node)
    }
}
