// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for delegation: scopes, targets, events, time, listener options, and host traits.
//!
//! ## Overview
//!
//! These types describe what the dispatcher routes and the two host services it talks to:
//! a containment tree ([`ScopeQuery`]) and a native event source ([`EventSource`]).
//! They are referenced by the [`registry`](crate::registry), [`resolver`](crate::resolver)
//! and [`dispatcher`](crate::dispatcher) modules.

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

/// A point on the host's monotonic clock, in milliseconds.
///
/// The dispatcher never reads a clock itself. Hosts pass the current time to
/// [`Dispatcher::handle_event`](crate::dispatcher::Dispatcher::handle_event) and
/// [`Dispatcher::advance`](crate::dispatcher::Dispatcher::advance).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Milliseconds since the clock origin.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

/// A registration scope.
///
/// `Document` and `Window` are the two universal scopes: they contain every
/// origin but always lose to a concrete ancestor. `Selector` scopes are
/// resolved to nodes through [`ScopeQuery::query`] each time an event is routed.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Scope {
    /// Top-level universal scope; the default target of synthesized events.
    Document,
    /// Secondary universal scope.
    Window,
    /// Scope named by a selector understood by the host's query layer.
    Selector(String),
}

impl Scope {
    /// Create a selector scope.
    pub fn selector(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }

    /// Parse a scope name; `"document"` and `"window"` map to the universal scopes.
    pub fn parse(name: &str) -> Self {
        match name {
            "document" => Self::Document,
            "window" => Self::Window,
            other => Self::Selector(other.into()),
        }
    }

    /// Whether this scope matches every origin.
    #[inline]
    pub const fn is_universal(&self) -> bool {
        matches!(self, Self::Document | Self::Window)
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Window => f.write_str("window"),
            Self::Selector(s) => f.write_str(s),
        }
    }
}

/// A concrete event target: one of the universal roots or a tree node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Target<K> {
    /// The document root.
    Document,
    /// The window root.
    Window,
    /// A node of the containment tree.
    Node(K),
}

impl<K> Target<K> {
    /// The node key, if this target is a node.
    #[inline]
    pub fn node(&self) -> Option<&K> {
        match self {
            Self::Node(k) => Some(k),
            _ => None,
        }
    }
}

/// An event to be routed.
///
/// Native events come from the host through
/// [`Dispatcher::handle_event`](crate::dispatcher::Dispatcher::handle_event).
/// Synthesized events are created by
/// [`Dispatcher::dispatch`](crate::dispatcher::Dispatcher::dispatch) and carry
/// `synthetic = true`, which selects the synthetic handler naming convention.
#[derive(Clone, Debug, PartialEq)]
pub struct Event<K, P = ()> {
    /// Event category, the primary routing key (for example `"click"`).
    pub category: String,
    /// Where the event originated.
    pub origin: Target<K>,
    /// Optional payload (the `detail` of a custom event).
    pub payload: Option<P>,
    /// Whether the event was synthesized by the dispatcher.
    pub synthetic: bool,
}

impl<K, P> Event<K, P> {
    /// Create a native event without payload.
    pub fn new(category: impl Into<String>, origin: Target<K>) -> Self {
        Self {
            category: category.into(),
            origin,
            payload: None,
            synthetic: false,
        }
    }

    /// Create a synthesized event.
    pub fn synthetic(category: impl Into<String>, payload: Option<P>, origin: Target<K>) -> Self {
        Self {
            category: category.into(),
            origin,
            payload,
            synthetic: true,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }
}

bitflags! {
    /// Native listener flags requested for a subscription.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ListenerFlags: u8 {
        /// Listen during the capture phase.
        const CAPTURE = 1 << 0;
        /// Remove the native listener after its first delivery.
        const ONCE = 1 << 1;
        /// Promise the host that the listener never cancels the default action.
        const PASSIVE = 1 << 2;
    }
}

/// Token covering many subscriptions so they can be cancelled with one call.
///
/// Minted by [`EventSource::create_signal`] and released by [`EventSource::abort`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AbortSignal(pub u64);

/// Options handed to [`EventSource::subscribe`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ListenerOptions {
    /// Listener flags after passive detection.
    pub flags: ListenerFlags,
    /// Bulk-cancel token, if the dispatcher uses one for this subscription.
    pub signal: Option<AbortSignal>,
}

/// Look up the parent of a node to measure ancestor distance.
pub trait ParentLookup<K> {
    /// Returns the parent of `node`, or `None` if `node` is a root.
    fn parent_of(&self, node: &K) -> Option<K>;
}

/// The containment-tree query service.
///
/// Resolves selector scopes to nodes and answers containment questions.
/// Selector semantics are entirely the host's business.
pub trait ScopeQuery<K>: ParentLookup<K> {
    /// Returns every node matching `selector`, in document order.
    fn query(&self, selector: &str) -> Vec<K>;

    /// Whether `node` is an actionable element for smart target resolution
    /// (a button, a link, or anything carrying an action marker).
    fn is_actionable(&self, _node: &K) -> bool {
        false
    }

    /// Number of parent edges from `node` up to `ancestor`, or `None` if
    /// `ancestor` is not an ancestor-or-self of `node`.
    fn ancestor_distance(&self, ancestor: &K, node: &K) -> Option<u32>
    where
        K: Copy + Eq,
    {
        let mut cur = *node;
        let mut distance = 0_u32;
        // Caller ensures acyclic ancestry.
        loop {
            if cur == *ancestor {
                return Some(distance);
            }
            cur = self.parent_of(&cur)?;
            distance = distance.saturating_add(1);
        }
    }

    /// Whether `ancestor` is an ancestor of `node` or `node` itself.
    fn is_ancestor_or_self(&self, ancestor: &K, node: &K) -> bool
    where
        K: Copy + Eq,
    {
        self.ancestor_distance(ancestor, node).is_some()
    }
}

impl<K, T: ParentLookup<K> + ?Sized> ParentLookup<K> for &T {
    #[inline]
    fn parent_of(&self, node: &K) -> Option<K> {
        (**self).parent_of(node)
    }
}

impl<K, T: ScopeQuery<K> + ?Sized> ScopeQuery<K> for &T {
    #[inline]
    fn query(&self, selector: &str) -> Vec<K> {
        (**self).query(selector)
    }

    #[inline]
    fn is_actionable(&self, node: &K) -> bool {
        (**self).is_actionable(node)
    }

    #[inline]
    fn ancestor_distance(&self, ancestor: &K, node: &K) -> Option<u32>
    where
        K: Copy + Eq,
    {
        (**self).ancestor_distance(ancestor, node)
    }

    #[inline]
    fn is_ancestor_or_self(&self, ancestor: &K, node: &K) -> bool
    where
        K: Copy + Eq,
    {
        (**self).is_ancestor_or_self(ancestor, node)
    }
}

/// The native event source the dispatcher subscribes to.
///
/// Subscriptions only tell the host which targets and categories to forward;
/// the host then delivers each raw event once through
/// [`Dispatcher::handle_event`](crate::dispatcher::Dispatcher::handle_event).
pub trait EventSource<K> {
    /// Handle returned by [`subscribe`](Self::subscribe) and consumed by
    /// [`unsubscribe`](Self::unsubscribe).
    type Subscription;

    /// Start forwarding `category` events for `target`.
    fn subscribe(
        &mut self,
        target: Target<K>,
        category: &str,
        options: ListenerOptions,
    ) -> Self::Subscription;

    /// Stop forwarding events for a single subscription.
    fn unsubscribe(&mut self, subscription: Self::Subscription);

    /// Mint a fresh bulk-cancel token.
    fn create_signal(&mut self) -> AbortSignal;

    /// Cancel every subscription registered with `signal`.
    fn abort(&mut self, signal: AbortSignal);

    /// Whether the host honors [`ListenerFlags::PASSIVE`].
    fn supports_passive(&self) -> bool {
        true
    }
}
