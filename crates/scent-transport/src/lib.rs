//! # Scent Transport
//!
//! [`Frame`](scent_core::Frame) implementations for the scent routing core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  scent-runtime      │  (facade: emit / call / on / off)
//! ├─────────────────────┤
//! │  scent-core         │  (Hub / Nub routing, Frame trait)
//! ├─────────────────────┤
//! │  scent-transport    │  <- This crate (implementations)
//! └─────────────────────┘
//! ```
//!
//! ## Implementations
//!
//! | Frame | Description | Use Case |
//! |-------|-------------|----------|
//! | [`MemoryFrame`] | tokio channels inside one process | tests, demos, embedding several contexts in one program |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scent_transport::MemoryFrame;
//!
//! let top = MemoryFrame::top("page");
//! let widget = top.embed("widget");
//! let nested = widget.embed("nested");
//!
//! // Hand `top.as_frame()` / `nested.as_frame()` to the runtime facade.
//! ```

pub mod memory;

pub use memory::MemoryFrame;
