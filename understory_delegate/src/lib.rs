// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Delegate: deterministic, `no_std` closest-scope event delegation.
//!
//! ## Overview
//!
//! Handlers are registered against a [`Scope`](crate::types::Scope) (a selector,
//! or one of the universal roots) and an event category. When an event arrives,
//! exactly one registration handles it: the one whose scope is the nearest
//! ancestor-or-self of the event's origin. Universal scopes catch whatever no
//! concrete scope contains.
//!
//! This crate does not own a UI tree or an event loop. The host provides both:
//!
//! - a [`ScopeQuery`](crate::types::ScopeQuery) answering "which nodes match this
//!   selector" and "what is this node's parent";
//! - an [`EventSource`](crate::types::EventSource) that forwards native events for
//!   subscribed `(target, category)` pairs.
//!
//! ## Layers
//!
//! - [`limiter`]: keyed throttle and debounce over explicit [`Timestamp`](crate::types::Timestamp)s.
//! - [`registry`]: `(scope, category)` descriptors and their native subscriptions.
//! - [`resolver`]: closest-scope selection, a pure function of the tree.
//! - [`handlers`]: handler tables, naming conventions and aliases.
//! - [`dispatcher`]: lifecycle, routing, rate limiting and teardown.
//!
//! ## Time
//!
//! Nothing here reads a clock. Pass the current time with every event, and call
//! [`Dispatcher::advance`](crate::dispatcher::Dispatcher::advance) when
//! [`next_deadline`](crate::dispatcher::Dispatcher::next_deadline) comes due so
//! trailing throttle and debounce runs fire.
//!
//! ## Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use understory_delegate::adapters::memory::{MemoryTree, RecordingSource};
//! use understory_delegate::dispatcher::Dispatcher;
//! use understory_delegate::limiter::Delay;
//! use understory_delegate::registry::Descriptor;
//! use understory_delegate::types::{Event, Target, Timestamp};
//!
//! let mut tree = MemoryTree::new();
//! let list = tree.insert(None, &[".list"]);
//! let row = tree.insert(Some(list), &[".row"]);
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let mut d: Dispatcher<_, (), _, _> = Dispatcher::new(tree, RecordingSource::new());
//! let l = log.clone();
//! d.on("handleInput", move |_, cx| l.borrow_mut().push(cx.now()));
//! d.add(Descriptor::new(".list", "input").debounced(Delay::from_millis(200)));
//! d.start();
//!
//! for t in [0, 50, 100] {
//!     d.handle_event(Event::new("input", Target::Node(row)), Timestamp(t));
//! }
//! assert!(log.borrow().is_empty());
//! if let Some(due) = d.next_deadline() {
//!     d.advance(due);
//! }
//! assert_eq!(*log.borrow(), vec![Timestamp(300)]);
//!
//! d.stop();
//! assert!(d.source().live().is_empty());
//! ```
//!
//! This crate is `no_std` and uses `alloc`. Diagnostics go through `tracing`.

#![no_std]

extern crate alloc;

pub mod adapters;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod registry;
pub mod resolver;
pub mod types;
