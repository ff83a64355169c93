// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Throttle and debounce.
//!
//! Feeds a burst of `mousemove` and `input` events through a throttled and a
//! debounced registration, driving time explicitly, and prints when each
//! handler runs.
//!
//! Run:
//! - `cargo run -p understory_delegate_demos --example delegate_rate_limit`

use tracing_subscriber::EnvFilter;
use understory_delegate::adapters::memory::{MemoryTree, NodeId, RecordingSource};
use understory_delegate::dispatcher::Dispatcher;
use understory_delegate::limiter::RateLimit;
use understory_delegate::registry::Descriptor;
use understory_delegate::types::{Event, Target, Timestamp};

type D = Dispatcher<NodeId, u32, MemoryTree, RecordingSource>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut tree = MemoryTree::new();
    let canvas = tree.insert(None, &[".canvas"]);
    let field = tree.insert(None, &["input.search"]);

    let mut d = D::new(tree, RecordingSource::new());
    d.on("handleMousemove", |e, cx| {
        println!("[{:>4}ms] mousemove #{:?}", cx.now().as_millis(), e.payload);
    });
    d.on("handleInput", |e, cx| {
        println!("[{:>4}ms] input #{:?} (settled)", cx.now().as_millis(), e.payload);
    });

    let throttle = match RateLimit::throttle(100.0) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("bad delay: {e}");
            return;
        }
    };
    let debounce = match RateLimit::debounce(250.0) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("bad delay: {e}");
            return;
        }
    };
    d.add(Descriptor::new(".canvas", "mousemove").with_rate_limit(throttle));
    d.add(Descriptor::new("input.search", "input").with_rate_limit(debounce));
    d.start();

    // A negative delay is rejected before anything is registered.
    if let Err(e) = RateLimit::debounce(-1.0) {
        println!("rejected: {e}");
    }

    println!("== Burst: one event every 20ms for 300ms ==");
    for i in 0..15_u32 {
        let now = Timestamp::from_millis(u64::from(i) * 20);
        d.handle_event(
            Event::new("mousemove", Target::Node(canvas)).with_payload(i),
            now,
        );
        d.handle_event(Event::new("input", Target::Node(field)).with_payload(i), now);
    }

    println!("== Idle: firing trailing runs ==");
    while let Some(due) = d.next_deadline() {
        d.advance(due);
    }
    println!("no timers left: {}", d.next_deadline().is_none());
}
