// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Delegation basics.
//!
//! Registers click handlers on a toolbar, on one of its buttons and on the
//! document, then shows which one each click lands on. Also shows a handler
//! chaining a synthesized event and the registration-time warning for a
//! missing handler.
//!
//! Run:
//! - `cargo run -p understory_delegate_demos --example delegate_basics`
//! - `RUST_LOG=understory_delegate=debug cargo run -p understory_delegate_demos --example delegate_basics`

use tracing_subscriber::EnvFilter;
use understory_delegate::adapters::memory::{MemoryTree, NodeId, RecordingSource};
use understory_delegate::dispatcher::{Config, Dispatcher};
use understory_delegate::handlers::Aliases;
use understory_delegate::registry::Descriptor;
use understory_delegate::types::{Event, Target, Timestamp};

type D = Dispatcher<NodeId, String, MemoryTree, RecordingSource>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // body > .toolbar > button.save > svg, body > p
    let mut tree = MemoryTree::new();
    let body = tree.insert(None, &["body"]);
    let toolbar = tree.insert(Some(body), &[".toolbar"]);
    let save = tree.insert(Some(toolbar), &["button", ".save"]);
    let icon = tree.insert(Some(save), &["svg"]);
    let para = tree.insert(Some(body), &["p"]);
    tree.set_actionable(save, true);

    let config = Config {
        enable_stats: true,
        auto_target_resolution: true,
        abort_signal: true,
        aliases: Aliases::new().with("keydown", "handleKeydown", "handleShortcut"),
        ..Config::default()
    };
    let mut d = D::with_config(tree, RecordingSource::new(), config);

    d.on("handleToolbarClick", |e, cx| {
        println!("toolbar: click from {:?}, acting on {:?}", e.origin, cx.target());
    });
    d.on("handleSave", |_, cx| {
        println!("save: acting on {:?}", cx.target());
        cx.dispatch("documentSaved", Some("draft.txt".into()), None);
    });
    d.on("handleDocumentsaved", |e, _| {
        println!("saved: {}", e.payload.as_deref().unwrap_or("?"));
    });
    d.on("handleClick", |e, _| println!("document: click from {:?}", e.origin));
    d.on("handleShortcut", |_, cx| println!("shortcut under {}", cx.scope()));

    d.add(Descriptor::new(".toolbar", "click").with_handler("handleToolbarClick"));
    d.add(Descriptor::new(".save", "click").with_handler("handleSave"));
    d.add(Descriptor::new("document", "click"));
    d.add(Descriptor::new("document", "documentSaved"));
    d.add(Descriptor::new("document", "keydown"));
    // No `handleSubmit` anywhere: registered, with a warning.
    d.add(Descriptor::new("form", "submit"));
    d.start();

    println!("== Clicks ==");
    d.handle_event(Event::new("click", Target::Node(icon)), Timestamp(0));
    d.handle_event(Event::new("click", Target::Node(toolbar)), Timestamp(10));
    d.handle_event(Event::new("click", Target::Node(para)), Timestamp(20));
    d.handle_event(Event::new("keydown", Target::Node(para)), Timestamp(30));

    if let Some(stats) = d.stats() {
        println!("== Stats ==");
        println!("{stats:#?}");
    }

    d.stop();
    println!(
        "== After stop == live subscriptions: {}, bulk aborts: {}",
        d.source().live().len(),
        d.source().aborts()
    );
}
