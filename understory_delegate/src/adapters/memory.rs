// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory host services.
//!
//! ## Notes
//!
//! [`MemoryTree`] is a parent-linked tree whose nodes carry a list of labels;
//! a selector matches a node when it equals one of its labels. There is no
//! selector grammar. [`RecordingSource`] keeps a table of live subscriptions so
//! callers can check what the dispatcher asked the host to forward.
//!
//! Both are small enough to drive tests and demos without a real UI host.

use alloc::string::String;
use alloc::vec::Vec;

use crate::types::{
    AbortSignal, EventSource, ListenerOptions, ParentLookup, ScopeQuery, Target,
};

/// Handle of a node in a [`MemoryTree`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u32);

#[derive(Clone, Debug)]
struct NodeData {
    parent: Option<NodeId>,
    labels: Vec<String>,
    actionable: bool,
}

/// A parent-linked tree with label-matched selectors.
#[derive(Clone, Debug, Default)]
pub struct MemoryTree {
    nodes: Vec<NodeData>,
}

impl MemoryTree {
    /// Create an empty tree.
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Insert a node under `parent` (or as a root) carrying `labels`.
    ///
    /// Nodes are kept in insertion order, which is the order [`ScopeQuery::query`] returns.
    pub fn insert(&mut self, parent: Option<NodeId>, labels: &[&str]) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(NodeData {
            parent,
            labels: labels.iter().map(|l| String::from(*l)).collect(),
            actionable: false,
        });
        id
    }

    /// Add a label to an existing node.
    pub fn add_label(&mut self, id: NodeId, label: &str) {
        if let Some(n) = self.node_mut(id) {
            n.labels.push(label.into());
        }
    }

    /// Mark or unmark a node as actionable.
    pub fn set_actionable(&mut self, id: NodeId, actionable: bool) {
        if let Some(n) = self.node_mut(id) {
            n.actionable = actionable;
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0 as usize)
    }
}

impl ParentLookup<NodeId> for MemoryTree {
    fn parent_of(&self, node: &NodeId) -> Option<NodeId> {
        self.node(*node)?.parent
    }
}

impl ScopeQuery<NodeId> for MemoryTree {
    fn query(&self, selector: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .zip(0_u32..)
            .filter(|(n, _)| n.labels.iter().any(|l| l == selector))
            .map(|(_, i)| NodeId(i))
            .collect()
    }

    fn is_actionable(&self, node: &NodeId) -> bool {
        self.node(*node).is_some_and(|n| n.actionable)
    }
}

/// Handle returned by [`RecordingSource::subscribe`](EventSource::subscribe).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub u64);

/// A live subscription held by a [`RecordingSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Handle given back to the subscriber.
    pub id: SubscriptionId,
    /// Subscribed target.
    pub target: Target<NodeId>,
    /// Subscribed category.
    pub category: String,
    /// Options the subscriber asked for.
    pub options: ListenerOptions,
}

/// An event source that only records what it was asked to do.
#[derive(Clone, Debug)]
pub struct RecordingSource {
    live: Vec<Record>,
    next_id: u64,
    next_signal: u64,
    passive: bool,
    subscribed: usize,
    unsubscribed: usize,
    aborts: usize,
}

impl Default for RecordingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSource {
    /// Create a source that supports passive listeners.
    pub const fn new() -> Self {
        Self {
            live: Vec::new(),
            next_id: 0,
            next_signal: 0,
            passive: true,
            subscribed: 0,
            unsubscribed: 0,
            aborts: 0,
        }
    }

    /// Builder toggle for passive listener support.
    pub const fn with_passive_support(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    /// Live subscriptions in subscription order.
    pub fn live(&self) -> &[Record] {
        &self.live
    }

    /// Live subscription for `(target, category)`, if any.
    pub fn find(&self, target: Target<NodeId>, category: &str) -> Option<&Record> {
        self.live
            .iter()
            .find(|r| r.target == target && r.category == category)
    }

    /// Total subscriptions ever established.
    pub fn subscribed_total(&self) -> usize {
        self.subscribed
    }

    /// Total subscriptions released one by one.
    pub fn unsubscribed_total(&self) -> usize {
        self.unsubscribed
    }

    /// Number of bulk aborts performed.
    pub fn aborts(&self) -> usize {
        self.aborts
    }
}

impl EventSource<NodeId> for RecordingSource {
    type Subscription = SubscriptionId;

    fn subscribe(
        &mut self,
        target: Target<NodeId>,
        category: &str,
        options: ListenerOptions,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribed += 1;
        self.live.push(Record {
            id,
            target,
            category: category.into(),
            options,
        });
        id
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        if let Some(i) = self.live.iter().position(|r| r.id == subscription) {
            self.live.remove(i);
            self.unsubscribed += 1;
        }
    }

    fn create_signal(&mut self) -> AbortSignal {
        let signal = AbortSignal(self.next_signal);
        self.next_signal += 1;
        signal
    }

    fn abort(&mut self, signal: AbortSignal) {
        self.aborts += 1;
        self.live.retain(|r| r.options.signal != Some(signal));
    }

    fn supports_passive(&self) -> bool {
        self.passive
    }
}
