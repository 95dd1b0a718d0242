//! # Scent
//!
//! Named events and request/response calls across a tree of nested contexts.
//!
//! ## Overview
//!
//! Every context (frame) in a tree runs one scent node. The node in the
//! topmost frame is the hub; every other node links straight to the hub,
//! however deep its frame is nested. Applications only ever see four
//! operations: `emit`, `call`, `on` and `off`.
//!
//! ```text
//!                 ┌──────────────────────┐
//!   emit / call ─▶│ Hub (top frame)      │◀─ ready / sync
//!                 └──────────────────────┘
//!                   ▲        ▲         ▲
//!              ┌────┘        │         └────┐
//!          ┌───────┐     ┌───────┐     ┌───────┐
//!          │ Nub A │     │ Nub B │     │ Nub C │  (C nested in B)
//!          └───────┘     └───────┘     └───────┘
//! ```
//!
//! - **Core**: message model, handler registry, pending calls, Hub/Nub routing
//! - **Transport**: [`Frame`](scent_core::Frame) implementations
//! - **Runtime**: the [`Scent`](scent_runtime::Scent) facade, configuration and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scent::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let page = MemoryFrame::top("page");
//!     let widget = page.embed("widget");
//!
//!     let hub = Scent::new(page.as_frame(), NodeOptions::default());
//!     let nub = Scent::new(widget.as_frame(), NodeOptions::default());
//!     nub.on("size", |_| json!({"w": 320, "h": 200}));
//!
//!     let size = hub.call("size", Value::Null).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use scent_core as core;
pub use scent_runtime as runtime;
pub use scent_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Facade - main entry point
    pub use scent_runtime::{NodeStats, Scent};

    // Configuration and logging
    pub use scent_runtime::config::{ConfigLoader, NodeConfig, ScentConfig};
    pub use scent_runtime::logging::LoggingBuilder;

    // Handler results and call outcomes
    pub use scent_core::{CallHandle, HandlerOutput, NodeOptions, RoleKind, RouteError};

    // Transport boundary
    pub use scent_core::{Frame, FrameRef};
    pub use scent_transport::MemoryFrame;

    // Payloads
    pub use serde_json::{Value, json};
}
