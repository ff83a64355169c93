// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Registration table.
//!
//! ## Overview
//!
//! Maps each event category to the descriptors registered for it, in
//! registration order, and tracks the native subscriptions established for
//! every `(scope, category)` pair.
//!
//! ## Invariants
//!
//! - At most one descriptor per `(scope, category)`; a second [`Registry::add`]
//!   for the same pair is refused and changes nothing.
//! - Order within a category is registration order. The
//!   [resolver](crate::resolver) uses it only to break ties.
//! - A pair is subscribed with the host at most once, however often
//!   [`Registry::subscribe`] is called for it.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::RegistrationError;
use crate::limiter::{Delay, RateLimit, RateLimitKind};
use crate::types::{
    AbortSignal, EventSource, ListenerFlags, ListenerOptions, Scope, ScopeQuery, Target,
};

/// Per-descriptor listener preferences.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ListenerConfig {
    /// Flags passed through to the host.
    pub flags: ListenerFlags,
    /// Force passive on or off; `None` defers to passive detection.
    pub passive: Option<bool>,
    /// Whether the subscription joins the dispatcher's bulk-cancel signal.
    pub use_signal: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            flags: ListenerFlags::empty(),
            passive: None,
            use_signal: true,
        }
    }
}

/// Association of a scope and category with a handler and optional rate limit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    /// Where the registration lives.
    pub scope: Scope,
    /// Event category routed to this descriptor.
    pub category: String,
    /// Explicit handler name; `None` uses the naming convention.
    pub handler: Option<String>,
    /// Optional throttle or debounce.
    pub rate_limit: Option<RateLimit>,
    /// Native listener preferences.
    pub listener: ListenerConfig,
}

impl Descriptor {
    /// Create a descriptor using the default handler name.
    pub fn new(scope: impl Into<Scope>, category: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            category: category.into(),
            handler: None,
            rate_limit: None,
            listener: ListenerConfig::default(),
        }
    }

    /// Route to an explicitly named handler.
    pub fn with_handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    /// Attach a rate limit.
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Throttle invocations by `delay`.
    pub fn throttled(self, delay: Delay) -> Self {
        self.with_rate_limit(RateLimit::new(RateLimitKind::Throttle, delay))
    }

    /// Debounce invocations by `delay`.
    pub fn debounced(self, delay: Delay) -> Self {
        self.with_rate_limit(RateLimit::new(RateLimitKind::Debounce, delay))
    }

    /// Set native listener preferences.
    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }

    /// Check the descriptor is well formed.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.category.trim().is_empty() {
            return Err(RegistrationError::EmptyCategory);
        }
        if let Scope::Selector(s) = &self.scope
            && s.trim().is_empty()
        {
            return Err(RegistrationError::EmptySelector);
        }
        Ok(())
    }

    /// Timer key for this descriptor's rate limit, if it has one.
    pub fn timer_key(&self) -> Option<TimerKey> {
        self.rate_limit.map(|rl| TimerKey {
            scope: self.scope.clone(),
            category: self.category.clone(),
            kind: rl.kind,
        })
    }
}

/// Key of an active throttle or debounce timer.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerKey {
    /// Scope of the owning descriptor.
    pub scope: Scope,
    /// Category of the owning descriptor.
    pub category: String,
    /// Throttle or debounce.
    pub kind: RateLimitKind,
}

/// A live native subscription.
#[derive(Clone, Debug)]
pub struct Live<K, S> {
    /// Subscribed target.
    pub target: Target<K>,
    /// Host handle.
    pub handle: S,
    /// Whether the subscription is covered by the bulk-cancel signal.
    pub signaled: bool,
}

type PairKey = (Scope, String);

/// Registration table plus native subscription bookkeeping.
pub struct Registry<K, S> {
    by_category: BTreeMap<String, Vec<Descriptor>>,
    live: BTreeMap<PairKey, Vec<Live<K, S>>>,
}

impl<K, S> core::fmt::Debug for Registry<K, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.len())
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl<K, S> Default for Registry<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> Registry<K, S> {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            by_category: BTreeMap::new(),
            live: BTreeMap::new(),
        }
    }

    /// Add a descriptor. Returns `false` and changes nothing if its
    /// `(scope, category)` pair is already registered.
    pub fn add(&mut self, descriptor: Descriptor) -> bool {
        if self.has(&descriptor.scope, &descriptor.category) {
            return false;
        }
        self.by_category
            .entry(descriptor.category.clone())
            .or_default()
            .push(descriptor);
        true
    }

    /// Remove the descriptor for `(scope, category)`, returning it.
    ///
    /// Subscriptions are left in place; release them with
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn remove(&mut self, scope: &Scope, category: &str) -> Option<Descriptor> {
        let list = self.by_category.get_mut(category)?;
        let i = list.iter().position(|d| d.scope == *scope)?;
        let removed = list.remove(i);
        if list.is_empty() {
            self.by_category.remove(category);
        }
        Some(removed)
    }

    /// Whether `(scope, category)` is registered.
    pub fn has(&self, scope: &Scope, category: &str) -> bool {
        self.get(scope, category).is_some()
    }

    /// The descriptor registered for `(scope, category)`.
    pub fn get(&self, scope: &Scope, category: &str) -> Option<&Descriptor> {
        self.all_for(category).iter().find(|d| d.scope == *scope)
    }

    /// Descriptors registered for `category`, in registration order.
    pub fn all_for(&self, category: &str) -> &[Descriptor] {
        self.by_category.get(category).map_or(&[][..], Vec::as_slice)
    }

    /// Every descriptor, grouped by category.
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.by_category.values().flatten()
    }

    /// Categories with at least one descriptor.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.by_category.keys().map(String::as_str)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    /// Whether no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    /// Whether native subscriptions exist for `(scope, category)`.
    pub fn is_subscribed(&self, scope: &Scope, category: &str) -> bool {
        self.live.contains_key(&(scope.clone(), String::from(category)))
    }

    /// Establish native subscriptions for `(scope, category)`, one per target
    /// the scope resolves to. Does nothing if the pair is already subscribed or
    /// the scope resolves to no target. Returns how many were established.
    pub fn subscribe<Q, E>(
        &mut self,
        scope: &Scope,
        category: &str,
        query: &Q,
        source: &mut E,
        options: ListenerOptions,
    ) -> usize
    where
        K: Copy,
        Q: ScopeQuery<K> + ?Sized,
        E: EventSource<K, Subscription = S> + ?Sized,
    {
        let key = (scope.clone(), String::from(category));
        if self.live.contains_key(&key) {
            return 0;
        }
        let targets: Vec<Target<K>> = match scope {
            Scope::Document => alloc::vec![Target::Document],
            Scope::Window => alloc::vec![Target::Window],
            Scope::Selector(s) => query.query(s).into_iter().map(Target::Node).collect(),
        };
        if targets.is_empty() {
            tracing::debug!(%scope, category, "scope matched no targets; nothing subscribed");
            return 0;
        }
        let live: Vec<Live<K, S>> = targets
            .into_iter()
            .map(|target| Live {
                target,
                handle: source.subscribe(target, category, options),
                signaled: options.signal.is_some(),
            })
            .collect();
        let n = live.len();
        self.live.insert(key, live);
        n
    }

    /// Release the native subscriptions for `(scope, category)` one by one.
    /// Returns how many were released.
    pub fn unsubscribe<E>(&mut self, scope: &Scope, category: &str, source: &mut E) -> usize
    where
        E: EventSource<K, Subscription = S> + ?Sized,
    {
        let Some(live) = self.live.remove(&(scope.clone(), String::from(category))) else {
            return 0;
        };
        let n = live.len();
        for l in live {
            source.unsubscribe(l.handle);
        }
        n
    }

    /// Release every native subscription exactly once.
    ///
    /// With a `signal`, a single [`EventSource::abort`] covers all signaled
    /// subscriptions and only the opted-out ones are removed individually.
    /// Returns how many subscriptions were released.
    pub fn release_all<E>(&mut self, source: &mut E, signal: Option<AbortSignal>) -> usize
    where
        E: EventSource<K, Subscription = S> + ?Sized,
    {
        let live = core::mem::take(&mut self.live);
        let mut n = 0;
        if let Some(signal) = signal {
            source.abort(signal);
        }
        for l in live.into_values().flatten() {
            n += 1;
            if !(l.signaled && signal.is_some()) {
                source.unsubscribe(l.handle);
            }
        }
        n
    }

    /// Live subscriptions, keyed by `(scope, category)`.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&Scope, &str, &[Live<K, S>])> {
        self.live
            .iter()
            .map(|((scope, category), live)| (scope, category.as_str(), live.as_slice()))
    }

    /// Total number of live native subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }

    /// Drop every descriptor and forget every subscription without releasing it.
    pub fn clear(&mut self) {
        self.by_category.clear();
        self.live.clear();
    }
}
