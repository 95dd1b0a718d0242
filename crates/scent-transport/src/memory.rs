//! In-process frame tree.
//!
//! Every [`MemoryFrame`] owns an unbounded inbox drained by one pump task,
//! started when a listener is installed. Payloads posted before that are
//! buffered, so a root created first never misses an early `ready`.
//!
//! ```text
//!  post(data, origin) ──▶ inbox (mpsc) ──▶ pump task ──▶ listener(data, origin)
//! ```
//!
//! Tearing a frame down tears down its embedded frames first, runs the
//! frame's teardown hooks, then stops its pump. Later posts to it are dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use scent_core::{Frame, FrameRef, InboundListener, TeardownHook};

/// A payload waiting in a frame's inbox.
struct Delivery {
    data: Value,
    origin: FrameRef,
}

/// Frame living in the current process.
pub struct MemoryFrame {
    label: String,
    parent: Option<Arc<MemoryFrame>>,
    children: Mutex<Vec<Weak<MemoryFrame>>>,
    attached: AtomicBool,
    inbox_tx: mpsc::UnboundedSender<Delivery>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    listener: Arc<RwLock<Option<InboundListener>>>,
    hooks: Mutex<Vec<TeardownHook>>,
    shutdown: CancellationToken,
}

impl MemoryFrame {
    fn build(label: String, parent: Option<Arc<MemoryFrame>>) -> Arc<Self> {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            label,
            parent,
            children: Mutex::new(Vec::new()),
            attached: AtomicBool::new(true),
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
            listener: Arc::new(RwLock::new(None)),
            hooks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Creates the topmost frame of a new tree.
    pub fn top(label: impl Into<String>) -> Arc<Self> {
        Self::build(label.into(), None)
    }

    /// Creates a frame embedded in this one.
    pub fn embed(self: &Arc<Self>, label: impl Into<String>) -> Arc<Self> {
        let child = Self::build(label.into(), Some(Arc::clone(self)));
        self.children.lock().push(Arc::downgrade(&child));
        child
    }

    /// Returns the frame's label.
    pub fn name(&self) -> &str {
        &self.label
    }

    /// Returns how many frames enclose this one.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_ref();
        while let Some(parent) = current {
            depth += 1;
            current = parent.parent.as_ref();
        }
        depth
    }

    /// Returns this frame as a trait object.
    pub fn as_frame(self: &Arc<Self>) -> FrameRef {
        Arc::clone(self) as FrameRef
    }

    /// Removes the frame from the tree.
    ///
    /// Embedded frames go first, then this frame's hooks run, then delivery
    /// stops. Calling it again is a no-op.
    pub fn tear_down(&self) {
        let children: Vec<Arc<MemoryFrame>> = self
            .children
            .lock()
            .drain(..)
            .filter_map(|c| c.upgrade())
            .collect();
        for child in children {
            child.tear_down();
        }

        if !self.attached.load(Ordering::SeqCst) {
            return;
        }

        let hooks: Vec<TeardownHook> = self.hooks.lock().drain(..).collect();
        for hook in hooks {
            hook();
        }

        self.attached.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        self.listener.write().take();
        debug!(frame = %self.label, "Frame torn down");
    }

    fn start_pump(&self) {
        let Some(mut rx) = self.inbox_rx.lock().take() else {
            return;
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(frame = %self.label, "No tokio runtime, inbound delivery not started");
                *self.inbox_rx.lock() = Some(rx);
                return;
            }
        };

        let listener = Arc::clone(&self.listener);
        let shutdown = self.shutdown.clone();
        let label = self.label.clone();
        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    delivery = rx.recv() => {
                        let Some(Delivery { data, origin }) = delivery else {
                            break;
                        };
                        let current = listener.read().clone();
                        match current {
                            Some(listener) => listener(data, origin),
                            None => trace!(frame = %label, "No listener, payload dropped"),
                        }
                    }
                }
            }
            trace!(frame = %label, "Inbox pump stopped");
        });
    }
}

impl Frame for MemoryFrame {
    fn parent(&self) -> Option<FrameRef> {
        self.parent.clone().map(|p| p as FrameRef)
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn post(&self, data: Value, origin: FrameRef) {
        if !self.is_attached() {
            trace!(frame = %self.label, "Post to detached frame dropped");
            return;
        }
        if self.inbox_tx.send(Delivery { data, origin }).is_err() {
            trace!(frame = %self.label, "Inbox closed, payload dropped");
        }
    }

    fn listen(&self, listener: InboundListener) {
        *self.listener.write() = Some(listener);
        self.start_pump();
    }

    fn on_teardown(&self, hook: TeardownHook) {
        self.hooks.lock().push(hook);
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl fmt::Debug for MemoryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryFrame")
            .field("label", &self.label)
            .field("depth", &self.depth())
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scent_core::{is_top, top_of};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn collecting(frame: &Arc<MemoryFrame>) -> mpsc::UnboundedReceiver<(Value, String)> {
        let (tx, rx) = mpsc::unbounded_channel();
        frame.listen(Arc::new(move |data: Value, origin: FrameRef| {
            let _ = tx.send((data, origin.label()));
        }));
        rx
    }

    #[test]
    fn test_parent_chain() {
        let top = MemoryFrame::top("top");
        let mid = top.embed("mid");
        let leaf = mid.embed("leaf");

        assert!(is_top(top.as_ref()));
        assert!(!is_top(leaf.as_ref()));
        assert_eq!(leaf.depth(), 2);
        assert_eq!(top_of(&leaf.as_frame()).label(), "top");
    }

    #[tokio::test]
    async fn test_delivery_preserves_order_and_origin() {
        let top = MemoryFrame::top("top");
        let child = top.embed("child");
        let mut rx = collecting(&top);

        for i in 0..5 {
            top.post(json!(i), child.as_frame());
        }
        for i in 0..5 {
            let (data, origin) = rx.recv().await.unwrap();
            assert_eq!(data, json!(i));
            assert_eq!(origin, "child");
        }
    }

    #[tokio::test]
    async fn test_posts_before_listen_are_buffered() {
        let top = MemoryFrame::top("top");
        top.post(json!("early"), top.as_frame());
        let mut rx = collecting(&top);
        assert_eq!(rx.recv().await.unwrap().0, json!("early"));
    }

    #[tokio::test]
    async fn test_teardown_runs_hooks_and_stops_delivery() {
        let top = MemoryFrame::top("top");
        let child = top.embed("child");
        let grandchild = child.embed("grandchild");
        let mut rx = collecting(&child);

        let (hook_tx, mut hook_rx) = mpsc::unbounded_channel();
        for frame in [&child, &grandchild] {
            let tx = hook_tx.clone();
            let label = frame.name().to_string();
            frame.on_teardown(Box::new(move || {
                let _ = tx.send(label);
            }));
        }

        child.tear_down();
        assert_eq!(hook_rx.recv().await.unwrap(), "grandchild");
        assert_eq!(hook_rx.recv().await.unwrap(), "child");
        assert!(!child.is_attached());
        assert!(!grandchild.is_attached());
        assert!(top.is_attached());

        child.post(json!(1), top.as_frame());
        let waited = timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(waited, Ok(Some(_))));
    }
}
