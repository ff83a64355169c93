// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handler tables, naming conventions, aliases, and the invocation context.
//!
//! ## Lookup
//!
//! A resolved descriptor names a handler either explicitly or by convention
//! ([`handler_name`] / [`synthetic_handler_name`]). The name is first passed
//! through the category's [`Aliases`], then looked up in up to three
//! [`HandlerTable`]s in the order given by [`HandlerSource`]:
//!
//! - `Own`: handlers registered on the dispatcher itself.
//! - `Methods`: an injected table.
//! - `Fallback`: an optional table handed to the dispatcher at construction.
//!
//! ```
//! use understory_delegate::handlers::{handler_name, synthetic_handler_name};
//!
//! assert_eq!(handler_name("click"), "handleClick");
//! assert_eq!(handler_name("keyDown"), "handleKeyDown");
//! assert_eq!(synthetic_handler_name("userAction"), "handleUseraction");
//! ```

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::types::{Event, Scope, Target, Timestamp};

/// A handler callable.
///
/// Receives the routed event and a [`Context`] carrying the resolved target.
pub type Handler<K, P> = Box<dyn FnMut(&Event<K, P>, &mut Context<K, P>)>;

/// Default handler name for a native category: `handle` followed by the
/// category with its first character uppercased.
pub fn handler_name(category: &str) -> String {
    let mut name = String::from("handle");
    let mut chars = category.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}

/// Default handler name for a synthesized category: `handle` followed by the
/// category with its first character uppercased and the rest lowercased.
///
/// This differs from [`handler_name`] for mixed-case categories, so the same
/// category maps to two default names depending on whether it arrived from the
/// host or from [`Dispatcher::dispatch`](crate::dispatcher::Dispatcher::dispatch).
/// Registration accepts either name; pass an explicit handler name to route
/// both kinds of event to one handler.
///
/// ```
/// use understory_delegate::handlers::{handler_name, synthetic_handler_name};
///
/// assert_eq!(handler_name("userAction"), "handleUserAction");
/// assert_eq!(synthetic_handler_name("userAction"), "handleUseraction");
/// assert_eq!(handler_name("ready"), synthetic_handler_name("ready"));
/// ```
pub fn synthetic_handler_name(category: &str) -> String {
    let mut name = String::from("handle");
    let mut chars = category.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.extend(chars.flat_map(char::to_lowercase));
    }
    name
}

/// A table of named handlers.
pub struct HandlerTable<K, P = ()> {
    handlers: BTreeMap<String, Handler<K, P>>,
}

impl<K, P> core::fmt::Debug for HandlerTable<K, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl<K, P> Default for HandlerTable<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> HandlerTable<K, P> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(
        mut self,
        name: impl Into<String>,
        handler: impl FnMut(&Event<K, P>, &mut Context<K, P>) + 'static,
    ) -> Self {
        self.insert(name, handler);
        self
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        handler: impl FnMut(&Event<K, P>, &mut Context<K, P>) + 'static,
    ) -> bool {
        self.handlers
            .insert(name.into(), Box::new(handler))
            .is_some()
    }

    /// Remove the handler registered under `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Mutable access to the handler registered under `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Handler<K, P>> {
        self.handlers.get_mut(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Where a handler may come from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HandlerSource {
    /// Handlers registered on the dispatcher.
    Own,
    /// The injected methods table.
    Methods,
    /// The fallback table, if one was provided.
    Fallback,
}

impl HandlerSource {
    /// Own handlers first, then methods, then fallback.
    pub const DEFAULT_ORDER: [Self; 3] = [Self::Own, Self::Methods, Self::Fallback];
    /// Methods first, then own handlers, then fallback.
    pub const METHODS_FIRST: [Self; 3] = [Self::Methods, Self::Own, Self::Fallback];

    /// Label used in diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Methods => "methods",
            Self::Fallback => "fallback",
        }
    }
}

/// Category-scoped handler name aliases.
///
/// An alias applies only to events of the category it was registered for.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Aliases {
    by_category: BTreeMap<String, BTreeMap<String, String>>,
}

impl Aliases {
    /// Create an empty alias table.
    pub const fn new() -> Self {
        Self {
            by_category: BTreeMap::new(),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(
        mut self,
        category: impl Into<String>,
        alias: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.insert(category, alias, name);
        self
    }

    /// Map `alias` to `name` for events of `category`.
    pub fn insert(
        &mut self,
        category: impl Into<String>,
        alias: impl Into<String>,
        name: impl Into<String>,
    ) {
        self.by_category
            .entry(category.into())
            .or_default()
            .insert(alias.into(), name.into());
    }

    /// The name `name` stands for under `category`, or `name` itself.
    pub fn resolve<'a>(&'a self, category: &str, name: &'a str) -> &'a str {
        self.by_category
            .get(category)
            .and_then(|m| m.get(name))
            .map_or(name, String::as_str)
    }

    /// Whether no alias is registered.
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

/// The handler sources of a dispatcher, searched in a configurable order.
pub struct HandlerProvider<K, P = ()> {
    own: HandlerTable<K, P>,
    methods: HandlerTable<K, P>,
    fallback: Option<HandlerTable<K, P>>,
    order: [HandlerSource; 3],
    aliases: Aliases,
}

impl<K, P> core::fmt::Debug for HandlerProvider<K, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerProvider")
            .field("own", &self.own)
            .field("methods", &self.methods)
            .field("fallback", &self.fallback)
            .field("order", &self.order)
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl<K, P> HandlerProvider<K, P> {
    /// Create a provider with empty tables.
    pub fn new(order: [HandlerSource; 3], aliases: Aliases) -> Self {
        Self {
            own: HandlerTable::new(),
            methods: HandlerTable::new(),
            fallback: None,
            order,
            aliases,
        }
    }

    /// Table for `source`; `None` for a fallback that was never provided.
    pub fn table(&self, source: HandlerSource) -> Option<&HandlerTable<K, P>> {
        match source {
            HandlerSource::Own => Some(&self.own),
            HandlerSource::Methods => Some(&self.methods),
            HandlerSource::Fallback => self.fallback.as_ref(),
        }
    }

    /// Mutable table for `source`; `None` for a fallback that was never provided.
    pub fn table_mut(&mut self, source: HandlerSource) -> Option<&mut HandlerTable<K, P>> {
        match source {
            HandlerSource::Own => Some(&mut self.own),
            HandlerSource::Methods => Some(&mut self.methods),
            HandlerSource::Fallback => self.fallback.as_mut(),
        }
    }

    /// Replace the methods table.
    pub fn set_methods(&mut self, methods: HandlerTable<K, P>) {
        self.methods = methods;
    }

    /// Provide or withdraw the fallback table.
    pub fn set_fallback(&mut self, fallback: Option<HandlerTable<K, P>>) {
        self.fallback = fallback;
    }

    /// The search order.
    pub fn order(&self) -> [HandlerSource; 3] {
        self.order
    }

    /// Change the search order.
    pub fn set_order(&mut self, order: [HandlerSource; 3]) {
        self.order = order;
    }

    /// Alias table.
    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    /// Apply the category's aliases to `name`.
    pub fn resolve_name<'a>(&'a self, category: &str, name: &'a str) -> &'a str {
        self.aliases.resolve(category, name)
    }

    /// First source, in search order, that holds `name`.
    pub fn find(&self, name: &str) -> Option<HandlerSource> {
        self.order
            .into_iter()
            .find(|s| self.table(*s).is_some_and(|t| t.contains(name)))
    }

    /// The handler for `name` from the first source that holds it.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Handler<K, P>> {
        let source = self.find(name)?;
        self.table_mut(source)?.get_mut(name)
    }
}

/// What a handler sees besides the event, and its channel back to the dispatcher.
///
/// Events queued with [`dispatch`](Self::dispatch) are routed after the handler
/// returns, in the order they were queued. A [`stop`](Self::stop) request tears
/// the dispatcher down once the handler returns and drops anything still queued.
#[derive(Debug)]
pub struct Context<K, P = ()> {
    target: Target<K>,
    scope: Scope,
    now: Timestamp,
    queued: Vec<Event<K, P>>,
    stop: bool,
}

impl<K, P> Context<K, P> {
    pub(crate) fn new(target: Target<K>, scope: Scope, now: Timestamp) -> Self {
        Self {
            target,
            scope,
            now,
            queued: Vec::new(),
            stop: false,
        }
    }

    /// The target the handler acts on: the event origin, or the nearest
    /// actionable node when smart target resolution applies.
    pub fn target(&self) -> &Target<K> {
        &self.target
    }

    /// Scope of the descriptor that matched.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Dispatcher time at invocation.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Queue a synthesized event; `target` defaults to [`Target::Document`].
    pub fn dispatch(
        &mut self,
        category: impl Into<String>,
        payload: Option<P>,
        target: Option<Target<K>>,
    ) -> &mut Self {
        self.queued.push(Event::synthetic(
            category,
            payload,
            target.unwrap_or(Target::Document),
        ));
        self
    }

    /// Ask the dispatcher to stop once this handler returns.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn stop_requested(&self) -> bool {
        self.stop
    }

    pub(crate) fn into_parts(self) -> (Vec<Event<K, P>>, bool) {
        (self.queued, self.stop)
    }
}
