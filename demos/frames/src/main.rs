//! Frames Demo
//!
//! Builds an in-process tree of frames, runs one scent node per frame and
//! routes events and calls through it:
//!
//! ```text
//! page (hub)
//! ├── widget-0 (nub)
//! │   └── widget-0/inner (nub, linked straight to page)
//! └── widget-1 (nub)
//!     └── widget-1/inner (nub)
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package frames-demo -- --widgets 3 --nested
//! SCENT_LOGGING__LEVEL=debug cargo run --package frames-demo
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use scent::prelude::*;
use scent::runtime::logging;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "frames-demo", about = "Route events through a nested frame tree")]
struct Args {
    /// Number of widget frames embedded in the page.
    #[arg(short, long, default_value_t = 2)]
    widgets: usize,

    /// Embed an inner frame in every widget.
    #[arg(long)]
    nested: bool,

    /// Configuration file (defaults to scent.toml in the usual locations).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Milliseconds to wait for every frame to attach.
    #[arg(long, default_value_t = 1000)]
    attach_timeout_ms: u64,
}

/// One frame of the tree and the node running in it.
struct Embedded {
    frame: Arc<MemoryFrame>,
    scent: Scent,
}

fn load_config(args: &Args) -> Result<ScentConfig> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::new().file(path),
        None => ConfigLoader::new(),
    };
    loader.load().context("failed to load configuration")
}

async fn wait_for_children(hub: &Scent, expected: usize, limit: Duration) -> Result<()> {
    let deadline = Instant::now() + limit;
    while hub.stats().children < expected {
        if Instant::now() >= deadline {
            bail!(
                "only {} of {expected} frames attached in time",
                hub.stats().children
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    logging::init_from_config(&config.logging);

    let started = Instant::now();
    let page = MemoryFrame::top("page");
    let hub = Scent::from_config(page.as_frame(), &config.node);
    hub.on("clock", move |_| json!(started.elapsed().as_millis() as u64));

    let mut widgets = Vec::with_capacity(args.widgets);
    let mut inners = Vec::new();
    for i in 0..args.widgets {
        let frame = page.embed(format!("widget-{i}"));
        let scent = Scent::from_config(frame.as_frame(), &config.node);
        let label = frame.name().to_string();
        scent
            .on("sum", |v: Value| {
                let total: i64 = v
                    .as_array()
                    .map(|xs| xs.iter().filter_map(Value::as_i64).sum())
                    .unwrap_or(0);
                total
            })
            .on("notice", move |v: Value| {
                info!(widget = %label, notice = %v, "Notice received");
            });

        if args.nested {
            let inner = frame.embed(format!("widget-{i}/inner"));
            let inner_scent = Scent::from_config(inner.as_frame(), &config.node);
            let inner_label = inner.name().to_string();
            inner_scent.on_async("greet", move |v: Value| {
                let inner_label = inner_label.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    json!(format!(
                        "hello {} from {inner_label}",
                        v.as_str().unwrap_or("stranger")
                    ))
                }
            });
            inners.push(Embedded {
                frame: inner,
                scent: inner_scent,
            });
        }
        widgets.push(Embedded { frame, scent });
    }

    let expected = widgets.len() + inners.len();
    wait_for_children(&hub, expected, Duration::from_millis(args.attach_timeout_ms)).await?;
    info!(stats = %hub.stats(), "Tree ready");

    hub.emit("notice", json!("page loaded"));

    if !widgets.is_empty() {
        let total = hub.call("sum", json!([1, 2, 3, 4])).await?;
        info!(%total, "sum answered by a widget");
    }

    if let (Some(first), Some(_)) = (widgets.first(), inners.first()) {
        let greeting = first.scent.call("greet", json!(first.frame.name())).await?;
        info!(%greeting, "greet answered by an inner frame");
    }

    if let Some(deepest) = inners.last().or(widgets.last()) {
        let elapsed = deepest.scent.call("clock", Value::Null).await?;
        info!(from = %deepest.frame.name(), elapsed_ms = %elapsed, "clock answered by the page");
    }

    if let Some(last) = widgets.last() {
        last.frame.tear_down();
        let remaining = expected - 1 - usize::from(args.nested);
        let deadline = Instant::now() + Duration::from_millis(args.attach_timeout_ms);
        while hub.stats().children > remaining && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        info!(stats = %hub.stats(), "After removing {}", last.frame.name());
    }

    Ok(())
}
