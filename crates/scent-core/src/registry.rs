//! Local event registry.
//!
//! Each context keeps at most one handler per event name. Registering a name
//! again replaces the previous handler; there is no fan-out to several
//! subscribers inside one context.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

/// A function returned by a handler.
pub type Callable = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// What a handler produced for an event.
///
/// Only [`Value`](HandlerOutput::Value) and
/// [`Deferred`](HandlerOutput::Deferred) can become a reply; a
/// [`Callable`](HandlerOutput::Callable) is rejected when a reply is built.
pub enum HandlerOutput {
    /// A ready payload.
    Value(Value),
    /// A payload that becomes available once the future settles.
    Deferred(BoxFuture<'static, Value>),
    /// A function. Useful to local callers, never transmissible.
    Callable(Callable),
}

impl HandlerOutput {
    /// Wraps a future whose output becomes the payload.
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = Value> + Send + 'static,
    {
        Self::Deferred(fut.boxed())
    }

    /// Wraps a function.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::Callable(Arc::new(f))
    }
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        Self::Value(Value::Null)
    }
}

impl From<bool> for HandlerOutput {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for HandlerOutput {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<u64> for HandlerOutput {
    fn from(value: u64) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for HandlerOutput {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for HandlerOutput {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<&str> for HandlerOutput {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

/// A registered event handler.
pub type Handler = Arc<dyn Fn(Value) -> HandlerOutput + Send + Sync>;

/// Name → handler map shared between a facade and its node.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `name`, replacing any previous one.
    pub fn on<F, O>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> O + Send + Sync + 'static,
        O: Into<HandlerOutput>,
    {
        let name = name.into();
        trace!(event = %name, "Registering handler");
        let handler: Handler = Arc::new(move |payload: Value| -> HandlerOutput {
            handler(payload).into()
        });
        self.handlers.write().insert(name, handler);
    }

    /// Registers an async handler; its output is sent once it settles.
    pub fn on_async<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        self.on(name, move |payload| HandlerOutput::deferred(handler(payload)));
    }

    /// Removes the handler for `name`, if any.
    pub fn off(&self, name: &str) {
        self.handlers.write().remove(name);
    }

    /// Returns `true` if a handler is registered for `name`.
    pub fn has(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invokes the handler for `name`.
    ///
    /// Returns `None` when nothing is registered, which is distinct from any
    /// output a handler can produce (including `null`). The lock is released
    /// before the handler runs, so handlers may register or remove handlers.
    pub fn fire(&self, name: &str, payload: Value) -> Option<HandlerOutput> {
        let handler = self.handlers.read().get(name).cloned()?;
        Some(handler(payload))
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("handler_count", &self.len())
            .finish()
    }
}
