//! # Call Dispatcher
//!
//! Turns a request into exactly one outcome: a value, a remote fault, or a
//! timeout. Thread-affine requests run on the calling context's worker
//! thread, created on first use; instance-level requests go to the node
//! itself. Nothing is retried.

use exowire::Affinity;
use exowire::FaultBody;
use exowire::ReplyBody;
use exowire::Request;
use exowire::TypeShape;
use tracing::debug;

use crate::bridge::Bridge;
use crate::config::FaultMode;
use crate::context::CallContext;
use crate::error::Error;
use crate::error::Result;
use crate::node::Node;
use crate::node::NodeId;
use crate::peer::Completion;
use crate::reference::Reference;
use crate::value::RemoteFault;
use crate::value::Value;

impl Bridge {
    /// Sends `request` to `node` on behalf of `ctx` and settles the answer
    /// according to the node's fault mode.
    ///
    /// `epoch` is the node epoch the request's references were checked
    /// against; references in the reply are issued in it too.
    pub(crate) async fn call(
        &self,
        ctx: &mut CallContext,
        node: &Node,
        epoch: u64,
        request: Request,
    ) -> Result<Value> {
        let completion = self.exchange(ctx, node, request).await?;
        match completion {
            Completion::Reply(body) => self.lift_value(node, epoch, body),
            Completion::Fault(body) => {
                let fault = self.lift_fault(node, epoch, body);
                debug!(node = %node.id(), class = %fault.class, "Remote fault");
                match node.config().fault_mode {
                    FaultMode::AsValue => Ok(Value::Fault(fault)),
                    FaultMode::AsError => Err(Error::RemoteFault(fault)),
                }
            }
        }
    }

    /// Like [`call`](Self::call), but a fault is always an error. Used for
    /// requests the bridge issues for its own bookkeeping.
    pub(crate) async fn control(
        &self,
        ctx: &mut CallContext,
        node: &Node,
        epoch: u64,
        request: Request,
    ) -> Result<Value> {
        match self.exchange(ctx, node, request).await? {
            Completion::Reply(body) => self.lift_value(node, epoch, body),
            Completion::Fault(body) => Err(Error::RemoteFault(self.lift_fault(node, epoch, body))),
        }
    }

    /// Lifts a reply value. Handles the remote hands out again are no longer
    /// released.
    fn lift_value(&self, node: &Node, epoch: u64, body: ReplyBody) -> Result<Value> {
        let value = lift_reply(node, epoch, body)?;
        if !self.freed.is_empty() {
            for reference in value.references() {
                self.freed.remove(&reference);
            }
        }
        Ok(value)
    }

    fn lift_fault(&self, node: &Node, epoch: u64, body: FaultBody) -> RemoteFault {
        let fault = RemoteFault::lift(body, node.id(), epoch);
        if let Some(exception) = &fault.exception {
            self.freed.remove(exception);
        }
        fault
    }

    async fn exchange(&self, ctx: &mut CallContext, node: &Node, request: Request) -> Result<Completion> {
        let timeout = ctx.effective_timeout(node.config()).duration();
        let thread = match request.affinity() {
            Affinity::Instance => None,
            Affinity::Thread => Some(self.worker(ctx, node).await?.id()),
        };
        Ok(node.peer.request(thread, request, timeout).await?)
    }

    /// The worker thread serving `ctx` on `node`, created on first use.
    async fn worker(&self, ctx: &mut CallContext, node: &Node) -> Result<Reference> {
        loop {
            let epoch = node.epoch();
            if let Some(thread) = self.workers.get(node.id(), ctx.id()) {
                if thread.is_live_in(epoch) {
                    return Ok(thread);
                }
                self.workers.unbind(node.id(), ctx.id(), thread);
            }

            let timeout = ctx.effective_timeout(node.config()).duration();
            let value = match node.peer.request(None, Request::NewThread, timeout).await? {
                Completion::Reply(body) => lift_reply(node, epoch, body)?,
                Completion::Fault(body) => {
                    return Err(Error::RemoteFault(RemoteFault::lift(body, node.id(), epoch)));
                }
            };
            let Value::Ref(thread @ Reference::Thread(_)) = value else {
                return Err(Error::Protocol(format!("new_thread returned a {}", value.desc())));
            };

            let bound = self.workers.bind(node.id(), ctx.id(), thread);
            if node.epoch() == epoch {
                debug!(node = %node.id(), ctx = %ctx.id(), thread = %bound, "Bound worker thread");
                return Ok(bound);
            }
            // A reset overtook the request; the thread may already be gone.
            self.workers.unbind(node.id(), ctx.id(), bound);
        }
    }

    /// The worker thread currently bound to `ctx` on `node`, if any.
    pub fn worker_of(&self, ctx: &CallContext, node: NodeId) -> Option<Reference> {
        self.workers.get(node, ctx.id())
    }

    /// Asks `node` to describe `type_name`, with the node's default timeout.
    ///
    /// Faults are always errors here, whatever the node's fault mode.
    pub async fn describe(&self, node: NodeId, type_name: &str) -> Result<TypeShape> {
        let node = self.connected(node)?;
        let epoch = node.epoch();
        let request = Request::DescribeType {
            name: type_name.to_string(),
        };
        let timeout = node.config().call_timeout.duration();
        match node.peer.request(None, request, timeout).await? {
            Completion::Reply(ReplyBody::Shape(shape)) => Ok(shape),
            Completion::Reply(ReplyBody::Value(value)) => Err(Error::Protocol(format!(
                "describe_type returned a {} value",
                value.desc()
            ))),
            Completion::Fault(body) => Err(Error::RemoteFault(RemoteFault::lift(body, node.id(), epoch))),
        }
    }
}

fn lift_reply(node: &Node, epoch: u64, body: ReplyBody) -> Result<Value> {
    match body {
        ReplyBody::Value(wire) => Ok(Value::lift(wire, node.id(), epoch)),
        ReplyBody::Shape(shape) => Err(Error::Protocol(format!(
            "expected a value, got the shape of {}",
            shape.name
        ))),
    }
}
