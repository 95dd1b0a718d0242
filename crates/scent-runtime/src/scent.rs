//! The application-facing handle.
//!
//! A [`Scent`] picks the role for its frame (hub at the top of the tree, nub
//! everywhere else), installs the frame's inbound listener and exposes the
//! four operations applications use:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`emit`](Scent::emit) | fire-and-forget event to every other frame |
//! | [`call`](Scent::call) | request answered by whichever frame handles the name |
//! | [`on`](Scent::on) / [`off`](Scent::off) | register or remove the local handler |
//!
//! Most programs have one context per process and use [`Scent::init`] /
//! [`Scent::get`]. Tests and embedders hosting several frames in one process
//! build explicit handles with [`Scent::new`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use scent_core::{
    CallHandle, Envelope, EventRegistry, FrameRef, HandlerOutput, Hub, InboundListener, Message,
    Node, NodeId, NodeOptions, RoleKind,
};
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::config::NodeConfig;
use crate::error::{RuntimeError, RuntimeResult};

static INSTANCE: OnceLock<Scent> = OnceLock::new();

/// Handle to the local node of one frame.
pub struct Scent {
    events: Arc<EventRegistry>,
    node: Arc<Node>,
}

impl Scent {
    /// Builds the node for `frame` and starts listening on it.
    ///
    /// In a nested frame this immediately announces the node to the top
    /// frame of the tree.
    pub fn new(frame: FrameRef, options: NodeOptions) -> Self {
        let events = Arc::new(EventRegistry::new());
        let node = Node::for_frame(Arc::clone(&frame), Arc::clone(&events), options);
        frame.listen(inbound_listener(&node));

        info!(
            node_id = %node.id(),
            role = %node.role_kind(),
            frame = %frame.label(),
            "Scent node started"
        );
        Self { events, node }
    }

    /// Builds the node with options taken from configuration.
    pub fn from_config(frame: FrameRef, config: &NodeConfig) -> Self {
        Self::new(frame, config.to_options())
    }

    /// Initializes the process-wide instance.
    ///
    /// Fails with [`RuntimeError::AlreadyInitialized`] on any later call; the
    /// frame passed to a failed call is left untouched.
    pub fn init(frame: FrameRef, options: NodeOptions) -> RuntimeResult<&'static Scent> {
        if INSTANCE.get().is_some() {
            return Err(RuntimeError::AlreadyInitialized);
        }
        let mut created = false;
        let scent = INSTANCE.get_or_init(|| {
            created = true;
            Self::new(frame, options)
        });
        if created {
            Ok(scent)
        } else {
            Err(RuntimeError::AlreadyInitialized)
        }
    }

    /// Returns the process-wide instance, if initialized.
    pub fn get() -> Option<&'static Scent> {
        INSTANCE.get()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Sends `name` to every other frame. Nothing comes back.
    pub fn emit(&self, name: impl Into<String>, payload: Value) -> &Self {
        let name = name.into();
        trace!(node_id = %self.node.id(), event = %name, "Emitting");
        self.node.emit(name, payload);
        self
    }

    /// Asks the frame handling `name` for a value.
    ///
    /// On the hub a locally registered handler answers without touching the
    /// transport. Otherwise the call is broadcast and the handle resolves with
    /// the first reply; a nub's own handler never answers its own call. Without a configured timeout an unanswered call stays pending.
    pub fn call(&self, name: impl Into<String>, payload: Value) -> CallHandle {
        self.node.call(name, payload)
    }

    /// Registers the handler for `name`, replacing any previous one.
    pub fn on<F, O>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(Value) -> O + Send + Sync + 'static,
        O: Into<HandlerOutput>,
    {
        self.events.on(name, handler);
        self
    }

    /// Registers an async handler; callers receive its settled value.
    pub fn on_async<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        self.events.on_async(name, handler);
        self
    }

    /// Removes the handler for `name`.
    pub fn off(&self, name: &str) -> &Self {
        self.events.off(name);
        self
    }

    /// Returns `true` if a local handler exists for `name`.
    pub fn has(&self, name: &str) -> bool {
        self.events.has(name)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn id(&self) -> &NodeId {
        self.node.id()
    }

    pub fn role(&self) -> RoleKind {
        self.node.role_kind()
    }

    /// The underlying routing node.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Snapshot of the node's tables.
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            role: self.node.role_kind(),
            id: self.node.id().clone(),
            children: self.node.as_hub().map_or(0, Hub::len),
            pending: self.node.pending_count(),
            handlers: self.events.len(),
        }
    }
}

impl fmt::Debug for Scent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scent")
            .field("node", &self.node)
            .field("events", &self.events)
            .finish()
    }
}

/// Decodes tagged payloads and hands them to the node.
///
/// Holds the node weakly so a frame outliving its node drops payloads
/// instead of keeping the node alive.
fn inbound_listener(node: &Arc<Node>) -> InboundListener {
    let weak = Arc::downgrade(node);
    Arc::new(move |data: Value, origin: FrameRef| {
        if !Envelope::is_tagged(&data) {
            trace!("Untagged payload ignored");
            return;
        }
        let Some(node) = weak.upgrade() else {
            trace!("Node dropped, payload ignored");
            return;
        };
        match Envelope::from_wire(data).and_then(Message::try_from) {
            Ok(message) => node.receive(message, origin),
            Err(e) => debug!(node_id = %node.id(), error = %e, "Undecodable envelope dropped"),
        }
    })
}

/// Statistics about a node.
#[derive(Debug, Clone)]
pub struct NodeStats {
    /// Role of the node.
    pub role: RoleKind,
    /// Node id.
    pub id: NodeId,
    /// Registered children (always 0 on a nub).
    pub children: usize,
    /// Calls waiting for a reply.
    pub pending: usize,
    /// Local handlers.
    pub handlers: usize,
}

impl fmt::Display for NodeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} children, {} pending calls, {} handlers",
            self.role, self.id, self.children, self.pending, self.handlers
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scent_core::{Frame, RouteError};
    use scent_transport::MemoryFrame;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    /// Lets every frame pump drain its inbox.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn scent(frame: &Arc<MemoryFrame>) -> Scent {
        Scent::new(frame.as_frame(), NodeOptions::default())
    }

    fn counter(scent: &Scent, name: &str) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        scent.on(name, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[tokio::test]
    async fn test_lone_hub_answers_locally() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        hub.on("x", |v: Value| json!(v.as_i64().unwrap_or(0) + 1));

        assert_eq!(hub.role(), RoleKind::Hub);
        assert_eq!(hub.call("x", json!(1)).await, Ok(json!(2)));
        assert_eq!(hub.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_child_registers_with_hub() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        assert_eq!(hub.stats().children, 0);

        let child_frame = top.embed("child");
        let child = scent(&child_frame);
        assert_eq!(child.role(), RoleKind::Nub);

        eventually(|| hub.stats().children == 1).await;
        let table = hub.node().as_hub().unwrap();
        assert!(table.contains(child.id()));
    }

    #[tokio::test]
    async fn test_call_between_siblings() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let (fa, fb) = (top.embed("a"), top.embed("b"));
        let a = scent(&fa);
        let b = scent(&fb);
        b.on("y", |_| 42i64);
        eventually(|| hub.stats().children == 2).await;

        let answer = timeout(WAIT, a.call("y", Value::Null)).await.unwrap();
        assert_eq!(answer, Ok(json!(42)));
        assert_eq!(a.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_nub_call_goes_to_peer_even_with_local_handler() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let (fa, fb) = (top.embed("a"), top.embed("b"));
        let a = scent(&fa);
        let b = scent(&fb);
        a.on("y", |_| "from-a-itself");
        b.on("y", |_| 42i64);
        eventually(|| hub.stats().children == 2).await;

        let answer = timeout(WAIT, a.call("y", Value::Null)).await.unwrap();
        assert_eq!(answer, Ok(json!(42)));
        assert_eq!(a.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_hub_call_reaches_child() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let fb = top.embed("b");
        let b = scent(&fb);
        b.on("echo", |v: Value| v);
        eventually(|| hub.stats().children == 1).await;

        let answer = timeout(WAIT, hub.call("echo", json!({"k": [1, 2]}))).await.unwrap();
        assert_eq!(answer, Ok(json!({"k": [1, 2]})));
    }

    #[tokio::test]
    async fn test_async_handler_reply() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let (fa, fb) = (top.embed("a"), top.embed("b"));
        let a = scent(&fa);
        let b = scent(&fb);
        b.on_async("slow", |v: Value| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            json!(format!("done {}", v.as_str().unwrap_or_default()))
        });
        eventually(|| hub.stats().children == 2).await;

        let answer = timeout(WAIT, a.call("slow", json!("job"))).await.unwrap();
        assert_eq!(answer, Ok(json!("done job")));
    }

    #[tokio::test]
    async fn test_nested_frame_attaches_to_top() {
        let top = MemoryFrame::top("top");
        let mid_frame = top.embed("mid");
        let leaf_frame = mid_frame.embed("leaf");
        let hub = scent(&top);
        let mid = scent(&mid_frame);
        let leaf = scent(&leaf_frame);
        mid.on("where", |_| "mid");

        eventually(|| hub.stats().children == 2).await;
        let answer = timeout(WAIT, leaf.call("where", Value::Null)).await.unwrap();
        assert_eq!(answer, Ok(json!("mid")));
    }

    #[tokio::test]
    async fn test_emit_skips_sender() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let (fa, fb) = (top.embed("a"), top.embed("b"));
        let a = scent(&fa);
        let b = scent(&fb);
        let on_a = counter(&a, "e");
        let on_b = counter(&b, "e");
        eventually(|| hub.stats().children == 2).await;

        a.emit("e", json!(1));
        eventually(|| on_b.load(Ordering::SeqCst) == 1).await;
        settle().await;
        assert_eq!(on_a.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hub_handled_broadcast_stops_at_hub() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let (fa, fb) = (top.embed("a"), top.embed("b"));
        let a = scent(&fa);
        let b = scent(&fb);
        let on_hub = counter(&hub, "e");
        let on_b = counter(&b, "e");
        eventually(|| hub.stats().children == 2).await;

        a.emit("e", Value::Null);
        eventually(|| on_hub.load(Ordering::SeqCst) == 1).await;
        settle().await;
        assert_eq!(on_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_untagged_payload_is_ignored() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let hits = counter(&hub, "y");

        top.post(json!({"name": "y"}), top.as_frame());
        top.post(json!("y"), top.as_frame());
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        top.post(Message::broadcast("y", Value::Null).into_wire(), top.as_frame());
        eventually(|| hits.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_teardown_unregisters_child() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let (fa, fb) = (top.embed("a"), top.embed("b"));
        let a = scent(&fa);
        let _b = scent(&fb);
        eventually(|| hub.stats().children == 2).await;

        fa.tear_down();
        eventually(|| hub.stats().children == 1).await;
        assert!(!hub.node().as_hub().unwrap().contains(a.id()));
    }

    #[tokio::test]
    async fn test_unhandled_call_stays_pending() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let fa = top.embed("a");
        let a = scent(&fa);
        eventually(|| hub.stats().children == 1).await;

        let waited = timeout(Duration::from_millis(100), a.call("nobody", Value::Null)).await;
        assert!(waited.is_err());
        assert_eq!(a.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_callable_answer_leaves_caller_pending() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        hub.on("f", |_| HandlerOutput::callable(|v| v));
        let fa = top.embed("a");
        let a = scent(&fa);
        eventually(|| hub.stats().children == 1).await;

        let waited = timeout(Duration::from_millis(100), a.call("f", Value::Null)).await;
        assert!(waited.is_err());
        assert_eq!(a.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_configured_timeout_expires_call() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        let fa = top.embed("a");
        let config = NodeConfig {
            call_timeout_ms: 30,
            ..Default::default()
        };
        let a = Scent::from_config(fa.as_frame(), &config);
        eventually(|| hub.stats().children == 1).await;

        let result = timeout(WAIT, a.call("nobody", Value::Null)).await.unwrap();
        assert!(matches!(result, Err(RouteError::Timeout { .. })));
        assert_eq!(a.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_chaining_and_stats() {
        let top = MemoryFrame::top("top");
        let hub = scent(&top);
        hub.on("a", |_| ()).on("b", |_| ()).off("a");

        assert!(!hub.has("a"));
        assert!(hub.has("b"));
        let stats = hub.stats();
        assert_eq!(stats.handlers, 1);
        assert!(stats.to_string().starts_with("hub "));
    }

    #[tokio::test]
    async fn test_init_only_once() {
        let top = MemoryFrame::top("global");
        let first = Scent::init(top.as_frame(), NodeOptions::default()).unwrap();
        assert!(std::ptr::eq(first, Scent::get().unwrap()));

        let again = Scent::init(top.as_frame(), NodeOptions::default());
        assert!(matches!(again, Err(RuntimeError::AlreadyInitialized)));
    }
}
