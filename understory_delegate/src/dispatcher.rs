// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dispatcher: registration lifecycle, routing, rate limiting, and teardown.
//!
//! ## Overview
//!
//! A [`Dispatcher`] owns a [`Registry`], the handler tables, and a
//! [`RateLimiter`]. The host feeds it raw events with
//! [`Dispatcher::handle_event`] and drives time with [`Dispatcher::advance`].
//!
//! ## Lifecycle
//!
//! - `Idle`: registrations are recorded, nothing is subscribed, nothing is routed.
//! - `Active`: every registration holds its native subscriptions; events are routed.
//! - `Terminated`: timers are cancelled, subscriptions released, the registry is
//!   cleared. Every further operation is a no-op.
//!
//! ## Routing
//!
//! For each event, in delivery order:
//!
//! 1. Due timers fire first, so trailing runs never overtake newer events.
//! 2. The interaction flag is updated.
//! 3. The [resolver](crate::resolver) picks the closest descriptor.
//! 4. The handler name is resolved through aliases and the handler sources.
//!    A missing handler is logged and the event is dropped.
//! 5. The descriptor's rate limit, if any, decides whether the handler runs now,
//!    later, or not at all. Otherwise it runs now, exactly once.
//!
//! Events a handler queues through its [`Context`] are routed right after it
//! returns, before the next host event.
//!
//! ## Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use understory_delegate::adapters::memory::{MemoryTree, RecordingSource};
//! use understory_delegate::dispatcher::Dispatcher;
//! use understory_delegate::registry::Descriptor;
//! use understory_delegate::types::{Event, Target, Timestamp};
//!
//! let mut tree = MemoryTree::new();
//! let container = tree.insert(None, &[".container"]);
//! let button = tree.insert(Some(container), &["button"]);
//!
//! let clicks = Rc::new(Cell::new(0));
//! let seen = clicks.clone();
//! let mut d: Dispatcher<_, (), _, _> = Dispatcher::new(tree, RecordingSource::new());
//! d.on("handleButtonClick", move |_, _| seen.set(seen.get() + 1));
//! d.on("handleClick", |_, _| unreachable!("container is farther away"));
//! d.add(Descriptor::new(".container", "click"));
//! d.add(Descriptor::new("button", "click").with_handler("handleButtonClick"));
//! d.start();
//!
//! d.handle_event(Event::new("click", Target::Node(button)), Timestamp(0));
//! assert_eq!(clicks.get(), 1);
//! ```

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::RegistrationError;
use crate::handlers::{
    Aliases, Context, HandlerProvider, HandlerSource, HandlerTable, handler_name,
    synthetic_handler_name,
};
use crate::limiter::{RateLimitKind, RateLimiter};
use crate::registry::{Descriptor, Registry, TimerKey};
use crate::resolver::{actionable_target, resolve};
use crate::types::{
    AbortSignal, Event, EventSource, ListenerFlags, ListenerOptions, Scope, ScopeQuery, Target,
    Timestamp,
};

/// Categories treated as passive by default.
///
/// They get [`ListenerFlags::PASSIVE`] when the host supports it, and they do
/// not count as user interaction.
pub const DEFAULT_PASSIVE_CATEGORIES: &[&str] = &[
    "scroll",
    "touchstart",
    "touchmove",
    "touchend",
    "touchcancel",
    "wheel",
    "mousewheel",
    "pointermove",
    "pointerenter",
    "pointerleave",
    "resize",
    "orientationchange",
    "load",
    "beforeunload",
    "unload",
];

/// Categories whose handler target is refined by smart target resolution.
pub const DEFAULT_TARGET_RESOLUTION_CATEGORIES: &[&str] =
    &["click", "touchstart", "touchend", "mousedown", "mouseup"];

/// Dispatcher configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Collect [`Stats`]; [`Dispatcher::stats`] returns `None` otherwise.
    pub enable_stats: bool,
    /// Order in which handler sources are searched.
    pub resolution_order: [HandlerSource; 3],
    /// Categories that are passive and not user interaction.
    pub passive_categories: Vec<String>,
    /// Register subscriptions under one bulk-cancel signal.
    pub abort_signal: bool,
    /// Refine handler targets to the nearest actionable node.
    pub auto_target_resolution: bool,
    /// Categories subject to target refinement.
    pub target_resolution_categories: Vec<String>,
    /// Category-scoped handler name aliases.
    pub aliases: Aliases,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_stats: false,
            resolution_order: HandlerSource::DEFAULT_ORDER,
            passive_categories: DEFAULT_PASSIVE_CATEGORIES
                .iter()
                .map(|c| String::from(*c))
                .collect(),
            abort_signal: false,
            auto_target_resolution: false,
            target_resolution_categories: DEFAULT_TARGET_RESOLUTION_CATEGORIES
                .iter()
                .map(|c| String::from(*c))
                .collect(),
            aliases: Aliases::new(),
        }
    }
}

impl Config {
    /// Search the methods table before own handlers.
    pub fn methods_first(mut self) -> Self {
        self.resolution_order = HandlerSource::METHODS_FIRST;
        self
    }

    /// Whether `category` is passive.
    pub fn is_passive(&self, category: &str) -> bool {
        self.passive_categories.iter().any(|c| c == category)
    }

    /// Whether `category` gets smart target resolution.
    pub fn resolves_target(&self, category: &str) -> bool {
        self.auto_target_resolution
            && self
                .target_resolution_categories
                .iter()
                .any(|c| c == category)
    }
}

/// Dispatcher lifecycle state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Lifecycle {
    /// Not yet started.
    Idle,
    /// Subscribed and routing.
    Active,
    /// Stopped for good.
    Terminated,
}

/// Snapshot of dispatcher bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Live native subscriptions.
    pub total_listeners: usize,
    /// Distinct subscribed targets.
    pub total_targets: usize,
    /// Distinct subscribed categories.
    pub total_categories: usize,
    /// Live subscriptions per category.
    pub categories: BTreeMap<String, usize>,
    /// Whether a non-passive event has been seen.
    pub user_has_interacted: bool,
    /// Live throttle timers.
    pub active_throttle: usize,
    /// Live debounce timers.
    pub active_debounce: usize,
}

// Arguments remembered for a deferred invocation.
struct Deferred<K, P> {
    event: Event<K, P>,
    target: Target<K>,
}

/// Closest-scope event dispatcher.
///
/// `K` is the host's node key, `P` the event payload, `Q` the containment
/// tree and `E` the native event source.
pub struct Dispatcher<K, P, Q, E: EventSource<K>> {
    query: Q,
    source: E,
    config: Config,
    registry: Registry<K, E::Subscription>,
    handlers: HandlerProvider<K, P>,
    limiter: RateLimiter<TimerKey, Deferred<K, P>>,
    lifecycle: Lifecycle,
    signal: Option<AbortSignal>,
    interacted: bool,
    now: Timestamp,
    queue: VecDeque<Event<K, P>>,
}

impl<K, P, Q, E: EventSource<K>> core::fmt::Debug for Dispatcher<K, P, Q, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lifecycle", &self.lifecycle)
            .field("registry", &self.registry)
            .field("handlers", &self.handlers)
            .field("timers", &self.limiter.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl<K, P, Q, E> Dispatcher<K, P, Q, E>
where
    K: Copy + Eq + core::fmt::Debug,
    Q: ScopeQuery<K>,
    E: EventSource<K>,
{
    /// Create an idle dispatcher with the default configuration.
    pub fn new(query: Q, source: E) -> Self {
        Self::with_config(query, source, Config::default())
    }

    /// Create an idle dispatcher.
    pub fn with_config(query: Q, mut source: E, config: Config) -> Self {
        let signal = config.abort_signal.then(|| source.create_signal());
        let handlers = HandlerProvider::new(config.resolution_order, config.aliases.clone());
        Self {
            query,
            source,
            config,
            registry: Registry::new(),
            handlers,
            limiter: RateLimiter::new(),
            lifecycle: Lifecycle::Idle,
            signal,
            interacted: false,
            now: Timestamp::ZERO,
            queue: VecDeque::new(),
        }
    }

    /// Install the injected methods table.
    pub fn with_methods(mut self, methods: HandlerTable<K, P>) -> Self {
        self.handlers.set_methods(methods);
        self
    }

    /// Provide the fallback table searched after own handlers and methods.
    pub fn with_fallback(mut self, fallback: HandlerTable<K, P>) -> Self {
        self.handlers.set_fallback(Some(fallback));
        self
    }

    /// Register an own handler under `name`.
    pub fn on(
        &mut self,
        name: impl Into<String>,
        handler: impl FnMut(&Event<K, P>, &mut Context<K, P>) + 'static,
    ) -> &mut Self {
        if let Some(own) = self.handlers.table_mut(HandlerSource::Own) {
            own.insert(name, handler);
        }
        self
    }

    /// The handler sources.
    pub fn handlers(&self) -> &HandlerProvider<K, P> {
        &self.handlers
    }

    /// Mutable access to the handler sources.
    pub fn handlers_mut(&mut self) -> &mut HandlerProvider<K, P> {
        &mut self.handlers
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether events are being routed.
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Whether a non-passive event has been routed. Never resets.
    pub fn has_user_interacted(&self) -> bool {
        self.interacted
    }

    /// Latest time seen.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Earliest pending rate-limited run, for hosts scheduling a wake-up.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.limiter.next_deadline()
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registration table.
    pub fn registry(&self) -> &Registry<K, E::Subscription> {
        &self.registry
    }

    /// The containment tree.
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Mutable access to the containment tree, for hosts whose tree changes.
    pub fn query_mut(&mut self) -> &mut Q {
        &mut self.query
    }

    /// The native event source.
    pub fn source(&self) -> &E {
        &self.source
    }

    /// Register a descriptor. Returns `false` if it was refused; see [`try_add`](Self::try_add).
    pub fn add(&mut self, descriptor: Descriptor) -> bool {
        match self.try_add(descriptor) {
            Ok(()) => true,
            Err(e @ (RegistrationError::Duplicate { .. } | RegistrationError::Terminated)) => {
                tracing::debug!(error = %e, "registration skipped");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "registration rejected");
                false
            }
        }
    }

    /// Register a descriptor, reporting why it was refused.
    ///
    /// While active, the descriptor's native subscriptions are established
    /// immediately. A descriptor whose handler cannot be found is still
    /// registered, with a warning.
    pub fn try_add(&mut self, descriptor: Descriptor) -> Result<(), RegistrationError> {
        if self.lifecycle == Lifecycle::Terminated {
            return Err(RegistrationError::Terminated);
        }
        descriptor.validate()?;
        if self.registry.has(&descriptor.scope, &descriptor.category) {
            return Err(RegistrationError::Duplicate {
                scope: descriptor.scope,
                category: descriptor.category,
            });
        }
        self.check_handler(&descriptor);
        let scope = descriptor.scope.clone();
        let category = descriptor.category.clone();
        let options = self.listener_options(&descriptor);
        self.registry.add(descriptor);
        if self.lifecycle == Lifecycle::Active {
            let n = self.registry.subscribe(
                &scope,
                &category,
                &self.query,
                &mut self.source,
                options,
            );
            tracing::debug!(%scope, %category, subscriptions = n, "registered");
        }
        Ok(())
    }

    /// Remove the registration for `(scope, category)`, releasing its native
    /// subscriptions and cancelling its timers. Returns `false` if nothing matched.
    pub fn remove(&mut self, scope: &Scope, category: &str) -> bool {
        if self.lifecycle == Lifecycle::Terminated {
            return false;
        }
        if self.registry.remove(scope, category).is_none() {
            return false;
        }
        let released = self.registry.unsubscribe(scope, category, &mut self.source);
        let timers = self
            .limiter
            .cancel_matching(|k| k.scope == *scope && k.category == category);
        tracing::debug!(%scope, category, released, timers, "unregistered");
        true
    }

    /// Whether `(scope, category)` is registered.
    pub fn has(&self, scope: &Scope, category: &str) -> bool {
        self.registry.has(scope, category)
    }

    /// Subscribe every registration and begin routing. Returns `false` unless idle.
    pub fn start(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Idle {
            return false;
        }
        self.lifecycle = Lifecycle::Active;
        let pending: Vec<(Scope, String, ListenerOptions)> = self
            .registry
            .iter()
            .map(|d| (d.scope.clone(), d.category.clone(), self.listener_options(d)))
            .collect();
        let mut subscribed = 0;
        for (scope, category, options) in &pending {
            subscribed += self.registry.subscribe(
                scope,
                category,
                &self.query,
                &mut self.source,
                *options,
            );
        }
        tracing::debug!(
            descriptors = pending.len(),
            subscriptions = subscribed,
            "delegation started"
        );
        true
    }

    /// Tear down: cancel every timer, release every native subscription once,
    /// and clear the registry. Returns `false` if already terminated.
    pub fn stop(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Terminated {
            return false;
        }
        let timers = self.limiter.len();
        self.limiter.clear();
        self.queue.clear();
        let signal = self.signal.take();
        let released = self.registry.release_all(&mut self.source, signal);
        self.registry.clear();
        self.lifecycle = Lifecycle::Terminated;
        tracing::debug!(
            released,
            timers,
            bulk = signal.is_some(),
            "delegation stopped"
        );
        true
    }

    /// Route a raw event from the host at time `now`.
    ///
    /// Ignored unless active.
    pub fn handle_event(&mut self, event: Event<K, P>, now: Timestamp) {
        if self.lifecycle != Lifecycle::Active {
            tracing::trace!(category = %event.category, lifecycle = ?self.lifecycle, "event ignored");
            return;
        }
        self.advance(now);
        self.queue.push_back(event);
        self.drain();
    }

    /// Emit a synthesized event from `target` (default [`Target::Document`])
    /// through the normal routing path, at the current time.
    pub fn dispatch(
        &mut self,
        category: impl Into<String>,
        payload: Option<P>,
        target: Option<Target<K>>,
    ) -> &mut Self {
        if self.lifecycle == Lifecycle::Active {
            self.queue.push_back(Event::synthetic(
                category,
                payload,
                target.unwrap_or(Target::Document),
            ));
            self.drain();
        }
        self
    }

    /// Move time forward to `now` and run every due trailing invocation.
    ///
    /// Time never moves backwards; an earlier `now` only fires what is due at
    /// the latest time already seen.
    pub fn advance(&mut self, now: Timestamp) {
        self.now = self.now.max(now);
        if self.lifecycle != Lifecycle::Active {
            return;
        }
        for fired in self.limiter.poll(self.now) {
            if self.lifecycle != Lifecycle::Active {
                break;
            }
            let Deferred { event, target } = fired.args;
            let Some(descriptor) = self.registry.get(&fired.key.scope, &fired.key.category)
            else {
                continue;
            };
            let Some(name) = self.lookup(descriptor, &event) else {
                continue;
            };
            tracing::trace!(category = %event.category, kind = ?fired.kind, "trailing run");
            self.invoke(&name, fired.key.scope, &event, target);
            self.drain();
        }
    }

    /// Bookkeeping snapshot, or `None` when stats are disabled.
    pub fn stats(&self) -> Option<Stats> {
        if !self.config.enable_stats {
            return None;
        }
        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        let mut targets: Vec<Target<K>> = Vec::new();
        for (_, category, live) in self.registry.subscriptions() {
            *categories.entry(String::from(category)).or_default() += live.len();
            for l in live {
                if !targets.contains(&l.target) {
                    targets.push(l.target);
                }
            }
        }
        Some(Stats {
            total_listeners: self.registry.subscription_count(),
            total_targets: targets.len(),
            total_categories: categories.len(),
            categories,
            user_has_interacted: self.interacted,
            active_throttle: self.limiter.active(RateLimitKind::Throttle),
            active_debounce: self.limiter.active(RateLimitKind::Debounce),
        })
    }

    fn drain(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            if self.lifecycle != Lifecycle::Active {
                self.queue.clear();
                return;
            }
            self.route(event);
        }
    }

    fn route(&mut self, event: Event<K, P>) {
        if !self.interacted && !self.config.is_passive(&event.category) {
            self.interacted = true;
            tracing::debug!(category = %event.category, "first user interaction");
        }

        let Some(resolution) = resolve(
            self.registry.all_for(&event.category),
            &event.origin,
            &self.query,
        ) else {
            tracing::trace!(category = %event.category, "no scope matched");
            return;
        };
        let descriptor = resolution.descriptor;
        let Some(name) = self.lookup(descriptor, &event) else {
            return;
        };
        let target = if self.config.resolves_target(&event.category) {
            actionable_target(&event.origin, &resolution.boundary, &self.query)
                .map_or(event.origin, Target::Node)
        } else {
            event.origin
        };
        let scope = descriptor.scope.clone();
        let timer = descriptor.timer_key().zip(descriptor.rate_limit);

        match timer {
            None => self.invoke(&name, scope, &event, target),
            Some((key, limit)) => match limit.kind {
                RateLimitKind::Throttle => {
                    let deferred = Deferred { event, target };
                    match self.limiter.throttle(key, limit.delay, deferred, self.now) {
                        Some(Deferred { event, target }) => {
                            self.invoke(&name, scope, &event, target);
                        }
                        None => tracing::trace!(%scope, "throttled"),
                    }
                }
                RateLimitKind::Debounce => {
                    tracing::trace!(%scope, "debounced");
                    self.limiter
                        .debounce(key, limit.delay, Deferred { event, target }, self.now);
                }
            },
        }
    }

    // Alias-resolved name of the handler `descriptor` routes `event` to, if one exists.
    fn lookup(&self, descriptor: &Descriptor, event: &Event<K, P>) -> Option<String> {
        let default = match &descriptor.handler {
            Some(h) => h.clone(),
            None if event.synthetic => synthetic_handler_name(&event.category),
            None => handler_name(&event.category),
        };
        let name = self.handlers.resolve_name(&event.category, &default);
        if self.handlers.find(name).is_some() {
            return Some(String::from(name));
        }
        tracing::warn!(
            handler = name,
            alias = (name != default).then_some(default.as_str()),
            category = %event.category,
            scope = %descriptor.scope,
            "handler not found"
        );
        None
    }

    fn invoke(&mut self, name: &str, scope: Scope, event: &Event<K, P>, target: Target<K>) {
        let Some(handler) = self.handlers.get_mut(name) else {
            return;
        };
        let mut cx = Context::new(target, scope, self.now);
        handler(event, &mut cx);
        let (queued, stop) = cx.into_parts();
        if stop {
            self.stop();
            return;
        }
        self.queue.extend(queued);
    }

    // Warn at registration time when no conventional or explicit name resolves.
    fn check_handler(&self, descriptor: &Descriptor) {
        let category = descriptor.category.as_str();
        let candidates: Vec<String> = match &descriptor.handler {
            Some(h) => alloc::vec![h.clone()],
            None => alloc::vec![handler_name(category), synthetic_handler_name(category)],
        };
        if candidates
            .iter()
            .any(|c| self.handlers.find(self.handlers.resolve_name(category, c)).is_some())
        {
            return;
        }
        let original = &candidates[0];
        let resolved = self.handlers.resolve_name(category, original);
        let order = self.handlers.order().map(HandlerSource::label);
        tracing::warn!(
            handler = resolved,
            alias = (resolved != original.as_str()).then_some(original.as_str()),
            category,
            scope = %descriptor.scope,
            checked = ?order,
            "handler not found"
        );
    }

    fn listener_options(&self, descriptor: &Descriptor) -> ListenerOptions {
        let mut flags = descriptor.listener.flags;
        let detected =
            self.source.supports_passive() && self.config.is_passive(&descriptor.category);
        let passive = descriptor
            .listener
            .passive
            .unwrap_or(detected || flags.contains(ListenerFlags::PASSIVE));
        flags.set(ListenerFlags::PASSIVE, passive);
        ListenerOptions {
            flags,
            signal: self.signal.filter(|_| descriptor.listener.use_signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryTree, NodeId, RecordingSource};
    use crate::limiter::Delay;
    use crate::registry::ListenerConfig;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::{Cell, RefCell};

    type D<P = ()> = Dispatcher<NodeId, P, MemoryTree, RecordingSource>;
    type Log = Rc<RefCell<Vec<String>>>;

    struct Nodes {
        body: NodeId,
        container: NodeId,
        button: NodeId,
        svg: NodeId,
        sidebar: NodeId,
    }

    // body > .container > button > svg, body > .sidebar
    fn tree() -> (MemoryTree, Nodes) {
        let mut t = MemoryTree::new();
        let body = t.insert(None, &["body"]);
        let container = t.insert(Some(body), &[".container"]);
        let button = t.insert(Some(container), &["button", ".btn"]);
        let svg = t.insert(Some(button), &["svg"]);
        let sidebar = t.insert(Some(body), &[".sidebar"]);
        (
            t,
            Nodes {
                body,
                container,
                button,
                svg,
                sidebar,
            },
        )
    }

    fn dispatcher(config: Config) -> (D, Nodes) {
        let (t, n) = tree();
        (D::with_config(t, RecordingSource::new(), config), n)
    }

    fn record<P: 'static>(d: &mut D<P>, log: &Log, name: &'static str) {
        let log = log.clone();
        d.on(name, move |_, _| log.borrow_mut().push(String::from(name)));
    }

    fn click(n: NodeId) -> Event<NodeId> {
        Event::new("click", Target::Node(n))
    }

    #[test]
    fn closest_scope_wins_over_outer_registration() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleContainerClick");
        record(&mut d, &log, "handleButtonClick");
        d.add(Descriptor::new(".container", "click").with_handler("handleContainerClick"));
        d.add(Descriptor::new("button", "click").with_handler("handleButtonClick"));
        assert!(d.start());

        d.handle_event(click(n.svg), Timestamp(0));
        d.handle_event(click(n.button), Timestamp(1));
        d.handle_event(click(n.container), Timestamp(2));
        assert_eq!(
            *log.borrow(),
            vec![
                "handleButtonClick",
                "handleButtonClick",
                "handleContainerClick"
            ]
        );
    }

    #[test]
    fn universal_scope_catches_everything_else() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleClick");
        record(&mut d, &log, "handleSidebar");
        d.add(Descriptor::new("document", "click"));
        d.add(Descriptor::new(".container", "click").with_handler("handleSidebar"));
        d.start();

        d.handle_event(click(n.sidebar), Timestamp(0));
        d.handle_event(Event::new("click", Target::Document), Timestamp(0));
        d.handle_event(click(n.svg), Timestamp(0));
        assert_eq!(
            *log.borrow(),
            vec!["handleClick", "handleClick", "handleSidebar"]
        );
    }

    #[test]
    fn unmatched_events_invoke_nothing() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleClick");
        d.add(Descriptor::new(".container", "click"));
        d.start();
        d.handle_event(click(n.sidebar), Timestamp(0));
        d.handle_event(Event::new("keydown", Target::Node(n.button)), Timestamp(0));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn idle_dispatcher_neither_subscribes_nor_routes() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleClick");
        d.add(Descriptor::new("document", "click"));
        assert_eq!(d.lifecycle(), Lifecycle::Idle);
        assert!(d.source().live().is_empty());

        d.handle_event(click(n.body), Timestamp(0));
        d.dispatch("click", None, None);
        assert!(log.borrow().is_empty());
        assert!(!d.has_user_interacted());

        assert!(d.start());
        assert!(!d.start());
        assert_eq!(d.source().live().len(), 1);
    }

    #[test]
    fn throttle_runs_leading_and_one_trailing() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleMousemove");
        d.add(Descriptor::new(".container", "mousemove").throttled(Delay::from_millis(100)));
        d.start();

        for t in [0, 10, 20, 30, 40] {
            d.handle_event(Event::new("mousemove", Target::Node(n.svg)), Timestamp(t));
        }
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(d.next_deadline(), Some(Timestamp(140)));

        d.advance(Timestamp(139));
        assert_eq!(log.borrow().len(), 1);
        d.advance(Timestamp(140));
        assert_eq!(log.borrow().len(), 2);
        d.advance(Timestamp(1_000));
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn debounce_runs_once_with_latest_arguments() {
        let (t, n) = tree();
        let mut d: D<u32> = Dispatcher::new(t, RecordingSource::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        d.on("handleInput", move |e, cx| {
            s.borrow_mut().push((e.payload, cx.now()));
        });
        d.add(Descriptor::new(".container", "input").debounced(Delay::from_millis(100)));
        d.start();

        for (i, t) in [0_u64, 10, 20, 30, 40].into_iter().enumerate() {
            let payload = u32::try_from(i).unwrap();
            d.handle_event(
                Event::new("input", Target::Node(n.button)).with_payload(payload),
                Timestamp(t),
            );
        }
        d.advance(Timestamp(139));
        assert!(seen.borrow().is_empty());
        d.advance(Timestamp(500));
        assert_eq!(*seen.borrow(), vec![(Some(4), Timestamp(500))]);
    }

    #[test]
    fn due_trailing_run_fires_before_next_event() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleInput");
        record(&mut d, &log, "handleClick");
        d.add(Descriptor::new("document", "input").debounced(Delay::from_millis(50)));
        d.add(Descriptor::new("document", "click"));
        d.start();

        d.handle_event(Event::new("input", Target::Node(n.body)), Timestamp(0));
        d.handle_event(click(n.body), Timestamp(80));
        assert_eq!(*log.borrow(), vec!["handleInput", "handleClick"]);
        assert_eq!(d.now(), Timestamp(80));
    }

    #[test]
    fn stop_releases_everything_once() {
        let config = Config {
            abort_signal: true,
            ..Config::default()
        };
        let (mut d, n) = dispatcher(config);
        let log = Log::default();
        record(&mut d, &log, "handleResize");
        record(&mut d, &log, "handleClick");
        d.add(Descriptor::new("window", "resize").debounced(Delay::from_millis(50)));
        d.add(Descriptor::new("document", "click"));
        d.add(
            Descriptor::new(".container", "click").with_listener(ListenerConfig {
                use_signal: false,
                ..ListenerConfig::default()
            }),
        );
        d.start();
        assert_eq!(d.source().live().len(), 3);

        d.handle_event(Event::new("resize", Target::Window), Timestamp(0));
        assert!(d.next_deadline().is_some());

        assert!(d.stop());
        assert_eq!(d.lifecycle(), Lifecycle::Terminated);
        assert!(d.source().live().is_empty());
        assert_eq!(d.source().aborts(), 1);
        assert_eq!(d.source().unsubscribed_total(), 1);
        assert!(d.registry().is_empty());
        assert_eq!(d.next_deadline(), None);

        assert!(!d.stop());
        assert_eq!(d.source().aborts(), 1);
        d.advance(Timestamp(1_000));
        d.handle_event(click(n.body), Timestamp(1_001));
        assert!(log.borrow().is_empty());
        assert!(!d.add(Descriptor::new("document", "keydown")));
        assert_eq!(
            d.try_add(Descriptor::new("document", "keydown")),
            Err(RegistrationError::Terminated)
        );
    }

    #[test]
    fn stop_without_signal_unsubscribes_each() {
        let (mut d, _) = dispatcher(Config::default());
        d.add(Descriptor::new("document", "click"));
        d.add(Descriptor::new(".btn", "click"));
        d.start();
        assert!(d.stop());
        assert_eq!(d.source().aborts(), 0);
        assert_eq!(d.source().unsubscribed_total(), 2);
        assert!(d.source().live().is_empty());
    }

    #[test]
    fn stop_requested_by_handler_drops_queued_events() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleReady");
        let l = log.clone();
        d.on("handleClick", move |_, cx| {
            l.borrow_mut().push(String::from("handleClick"));
            cx.dispatch("ready", None, None).stop();
        });
        d.add(Descriptor::new("document", "click"));
        d.add(Descriptor::new("document", "ready"));
        d.start();

        d.handle_event(click(n.svg), Timestamp(0));
        assert_eq!(*log.borrow(), vec!["handleClick"]);
        assert_eq!(d.lifecycle(), Lifecycle::Terminated);
        assert!(d.source().live().is_empty());
    }

    #[test]
    fn stop_in_trailing_run_drops_other_due_runs() {
        let (mut d, n) = dispatcher(Config::default());
        let hits = Rc::new(Cell::new(0_u32));
        let h = hits.clone();
        d.on("handleInput", move |_, cx| {
            h.set(h.get() + 1);
            cx.stop();
        });
        let h = hits.clone();
        d.on("handleChange", move |_, _| h.set(h.get() + 100));
        d.add(Descriptor::new("document", "input").debounced(Delay::from_millis(10)));
        d.add(Descriptor::new("document", "change").debounced(Delay::from_millis(20)));
        d.start();

        d.handle_event(Event::new("input", Target::Node(n.body)), Timestamp(0));
        d.handle_event(Event::new("change", Target::Node(n.body)), Timestamp(0));
        assert_eq!(d.next_deadline(), Some(Timestamp(10)));

        d.advance(Timestamp(100));
        assert_eq!(hits.get(), 1);
        assert_eq!(d.lifecycle(), Lifecycle::Terminated);
        assert_eq!(d.next_deadline(), None);
        assert!(d.source().live().is_empty());

        d.advance(Timestamp(1_000));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn throttled_stream_runs_once_per_window() {
        let (mut d, n) = dispatcher(Config::default());
        let runs = Rc::new(RefCell::new(Vec::new()));
        let r = runs.clone();
        d.on("handleMousemove", move |_, cx| r.borrow_mut().push(cx.now().as_millis()));
        d.add(Descriptor::new(".container", "mousemove").throttled(Delay::from_millis(100)));
        d.start();

        for t in (0..500_u64).step_by(10) {
            d.handle_event(Event::new("mousemove", Target::Node(n.svg)), Timestamp(t));
        }
        assert_eq!(*runs.borrow(), vec![0, 100, 200, 300, 400]);
        d.advance(Timestamp(1_000));
        assert_eq!(*runs.borrow(), vec![0, 100, 200, 300, 400, 1_000]);
    }

    #[test]
    fn handlers_can_chain_synthetic_events() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleSaved");
        let l = log.clone();
        let button = n.button;
        d.on("handleClick", move |_, cx| {
            l.borrow_mut().push(String::from("handleClick"));
            cx.dispatch("saved", None, Some(Target::Node(button)));
        });
        d.add(Descriptor::new("document", "click"));
        d.add(Descriptor::new(".btn", "saved"));
        d.start();

        d.handle_event(click(n.sidebar), Timestamp(0));
        assert_eq!(*log.borrow(), vec!["handleClick", "handleSaved"]);
    }

    #[test]
    fn synthetic_events_use_lowercased_names() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleUseraction");
        d.add(Descriptor::new("document", "userAction"));
        d.start();

        d.dispatch("userAction", None, None);
        assert_eq!(*log.borrow(), vec!["handleUseraction"]);

        // Native events keep the category's case and find no handler.
        d.handle_event(Event::new("userAction", Target::Node(n.body)), Timestamp(0));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn aliases_apply_per_category() {
        let config = Config {
            aliases: Aliases::new().with("click", "handleClick", "onTap"),
            ..Config::default()
        };
        let (mut d, n) = dispatcher(config);
        let log = Log::default();
        record(&mut d, &log, "onTap");
        record(&mut d, &log, "handleClick");
        d.add(Descriptor::new("document", "click"));
        d.add(Descriptor::new("document", "dblclick").with_handler("handleClick"));
        d.start();

        d.handle_event(click(n.body), Timestamp(0));
        d.handle_event(Event::new("dblclick", Target::Node(n.body)), Timestamp(0));
        assert_eq!(*log.borrow(), vec!["onTap", "handleClick"]);
    }

    #[test]
    fn resolution_order_picks_source() {
        for (config, expected) in [
            (Config::default(), "own"),
            (Config::default().methods_first(), "methods"),
        ] {
            let (t, n) = tree();
            let log = Log::default();
            let l = log.clone();
            let methods = HandlerTable::new()
                .with("handleClick", move |_, _| l.borrow_mut().push("methods".into()));
            let mut d: D = Dispatcher::with_config(t, RecordingSource::new(), config)
                .with_methods(methods);
            let l = log.clone();
            d.on("handleClick", move |_, _| l.borrow_mut().push("own".into()));
            d.add(Descriptor::new("document", "click"));
            d.start();
            d.handle_event(click(n.svg), Timestamp(0));
            assert_eq!(*log.borrow(), vec![expected]);
        }
    }

    #[test]
    fn fallback_table_is_searched_last() {
        let (t, _) = tree();
        let log = Log::default();
        let l = log.clone();
        let fallback =
            HandlerTable::new().with("handleResize", move |_, _| l.borrow_mut().push("fb".into()));
        let mut d: D = Dispatcher::new(t, RecordingSource::new()).with_fallback(fallback);
        d.add(Descriptor::new("window", "resize"));
        d.start();
        d.handle_event(Event::new("resize", Target::Window), Timestamp(0));
        assert_eq!(*log.borrow(), vec!["fb"]);
        assert_eq!(
            d.handlers().find("handleResize"),
            Some(HandlerSource::Fallback)
        );
    }

    #[test]
    fn missing_handler_still_registers() {
        let (mut d, n) = dispatcher(Config::default());
        assert!(d.add(Descriptor::new("document", "click")));
        assert!(d.has(&Scope::Document, "click"));
        d.start();
        d.handle_event(click(n.body), Timestamp(0));
        assert!(d.has_user_interacted());
    }

    #[test]
    fn registration_errors() {
        let (mut d, _) = dispatcher(Config::default());
        assert_eq!(
            d.try_add(Descriptor::new("document", " ")),
            Err(RegistrationError::EmptyCategory)
        );
        assert!(d.add(Descriptor::new(".btn", "click")));
        assert!(matches!(
            d.try_add(Descriptor::new(".btn", "click")),
            Err(RegistrationError::Duplicate { .. })
        ));
        assert!(!d.add(Descriptor::new(".btn", "click")));
        assert_eq!(d.registry().len(), 1);
    }

    #[test]
    fn add_and_remove_while_active() {
        let (mut d, n) = dispatcher(Config::default());
        let log = Log::default();
        record(&mut d, &log, "handleInput");
        d.start();

        assert!(d.add(Descriptor::new(".item", "click")));
        assert_eq!(d.source().subscribed_total(), 0);
        assert!(d.add(Descriptor::new(".btn", "input").debounced(Delay::from_millis(10))));
        assert!(d.source().find(Target::Node(n.button), "input").is_some());

        d.handle_event(Event::new("input", Target::Node(n.svg)), Timestamp(0));
        assert!(d.next_deadline().is_some());
        assert!(d.remove(&Scope::selector(".btn"), "input"));
        assert!(!d.remove(&Scope::selector(".btn"), "input"));
        assert_eq!(d.next_deadline(), None);
        assert!(d.source().find(Target::Node(n.button), "input").is_none());

        d.advance(Timestamp(100));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn listener_options_follow_passive_detection_and_signal() {
        let config = Config {
            abort_signal: true,
            ..Config::default()
        };
        let (mut d, _) = dispatcher(config);
        d.add(Descriptor::new("document", "scroll"));
        d.add(Descriptor::new("document", "click"));
        d.add(
            Descriptor::new("document", "touchstart").with_listener(ListenerConfig {
                passive: Some(false),
                use_signal: false,
                ..ListenerConfig::default()
            }),
        );
        d.add(
            Descriptor::new("window", "message").with_listener(ListenerConfig {
                flags: ListenerFlags::CAPTURE | ListenerFlags::PASSIVE,
                ..ListenerConfig::default()
            }),
        );
        d.start();

        let src = d.source();
        let scroll = src.find(Target::Document, "scroll").unwrap().options;
        assert!(scroll.flags.contains(ListenerFlags::PASSIVE));
        assert!(scroll.signal.is_some());
        let click = src.find(Target::Document, "click").unwrap().options;
        assert!(!click.flags.contains(ListenerFlags::PASSIVE));
        let touch = src.find(Target::Document, "touchstart").unwrap().options;
        assert!(!touch.flags.contains(ListenerFlags::PASSIVE));
        assert!(touch.signal.is_none());
        let message = src.find(Target::Window, "message").unwrap().options;
        assert!(message.flags.contains(ListenerFlags::CAPTURE | ListenerFlags::PASSIVE));
    }

    #[test]
    fn passive_detection_respects_host_support() {
        let (t, _) = tree();
        let source = RecordingSource::new().with_passive_support(false);
        let mut d: D = Dispatcher::new(t, source);
        d.add(Descriptor::new("window", "scroll"));
        d.start();
        let opts = d.source().find(Target::Window, "scroll").unwrap().options;
        assert!(!opts.flags.contains(ListenerFlags::PASSIVE));
        assert_eq!(opts.signal, None);
    }

    #[test]
    fn passive_categories_are_not_interaction() {
        let (mut d, n) = dispatcher(Config::default());
        d.add(Descriptor::new("document", "scroll"));
        d.add(Descriptor::new("document", "click"));
        d.start();
        d.handle_event(Event::new("scroll", Target::Node(n.body)), Timestamp(0));
        assert!(!d.has_user_interacted());
        d.handle_event(click(n.body), Timestamp(1));
        assert!(d.has_user_interacted());
    }

    #[test]
    fn stats_snapshot() {
        let (mut d, n) = dispatcher(Config::default());
        d.add(Descriptor::new("document", "click"));
        d.start();
        assert_eq!(d.stats(), None);

        let config = Config {
            enable_stats: true,
            ..Config::default()
        };
        let (mut d, _) = dispatcher(config);
        record(&mut d, &Log::default(), "handleScroll");
        record(&mut d, &Log::default(), "handleInput");
        d.add(Descriptor::new("document", "click"));
        d.add(Descriptor::new(".btn", "click"));
        d.add(Descriptor::new("document", "scroll").throttled(Delay::from_millis(10)));
        d.add(Descriptor::new("document", "input").debounced(Delay::from_millis(10)));
        d.start();
        d.handle_event(Event::new("scroll", Target::Node(n.body)), Timestamp(0));
        d.handle_event(Event::new("input", Target::Node(n.body)), Timestamp(0));

        let s = d.stats().unwrap();
        assert_eq!(s.total_listeners, 4);
        assert_eq!(s.total_targets, 2);
        assert_eq!(s.total_categories, 3);
        assert_eq!(s.categories.get("click"), Some(&2));
        assert!(s.user_has_interacted);
        assert_eq!(s.active_throttle, 1);
        assert_eq!(s.active_debounce, 1);
    }

    #[test]
    fn smart_target_resolution_finds_actionable_ancestor() {
        let config = Config {
            auto_target_resolution: true,
            ..Config::default()
        };
        let (mut t, n) = tree();
        t.set_actionable(n.button, true);
        let mut d: D = Dispatcher::with_config(t, RecordingSource::new(), config);
        let targets = Rc::new(RefCell::new(Vec::new()));
        let seen = targets.clone();
        d.on("handleClick", move |_, cx| seen.borrow_mut().push(*cx.target()));
        let seen = targets.clone();
        d.on("handleKeydown", move |_, cx| seen.borrow_mut().push(*cx.target()));
        d.add(Descriptor::new(".container", "click"));
        d.add(Descriptor::new(".container", "keydown"));
        d.start();

        d.handle_event(click(n.svg), Timestamp(0));
        d.handle_event(Event::new("keydown", Target::Node(n.svg)), Timestamp(0));
        d.handle_event(click(n.container), Timestamp(0));
        assert_eq!(
            *targets.borrow(),
            vec![
                Target::Node(n.button),
                Target::Node(n.svg),
                Target::Node(n.container)
            ]
        );
    }

    #[test]
    fn smart_target_resolution_is_off_by_default() {
        let (mut t, n) = tree();
        t.set_actionable(n.button, true);
        let mut d: D = Dispatcher::new(t, RecordingSource::new());
        let targets = Rc::new(RefCell::new(Vec::new()));
        let seen = targets.clone();
        d.on("handleClick", move |_, cx| seen.borrow_mut().push(*cx.target()));
        d.add(Descriptor::new("document", "click"));
        d.start();
        d.handle_event(click(n.svg), Timestamp(0));
        assert_eq!(*targets.borrow(), vec![Target::Node(n.svg)]);
    }
}
