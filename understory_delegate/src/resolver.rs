// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Closest-scope resolution.
//!
//! ## Overview
//!
//! Given the descriptors registered for a category and the origin of an event,
//! picks the single descriptor whose scope is the nearest ancestor-or-self of
//! the origin.
//!
//! ## Ranking
//!
//! - A selector scope qualifies when one of its nodes is an ancestor-or-self of
//!   the origin; its [`Proximity`] is the number of parent edges to the nearest
//!   such node.
//! - Universal scopes always qualify and rank below every concrete ancestor.
//! - Equal proximity keeps the first registered descriptor. Under strict tree
//!   containment two distinct selector nodes never share a distance, so this
//!   only decides between the two universal scopes or selectors naming the
//!   same node.
//!
//! Resolution is a pure function of the descriptors and the tree.

use crate::registry::Descriptor;
use crate::types::{Scope, ScopeQuery, Target};

/// How close a scope is to the origin of an event. Smaller is closer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Proximity {
    /// Parent edges from the origin up to the scope node (`0` for the origin itself).
    Ancestor(u32),
    /// A universal scope; ranks after every ancestor.
    Universal,
}

/// The descriptor selected for an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution<'a, K> {
    /// Position of the descriptor within the slice passed to [`resolve`].
    pub index: usize,
    /// The winning descriptor.
    pub descriptor: &'a Descriptor,
    /// How close the winning scope is.
    pub proximity: Proximity,
    /// The target the winning scope matched: the ancestor node, or the universal root.
    pub boundary: Target<K>,
}

/// Proximity of `scope` to `origin`, with the target it matched, or `None`
/// when the scope does not contain the origin.
pub fn proximity_of<K, Q>(
    scope: &Scope,
    origin: &Target<K>,
    query: &Q,
) -> Option<(Proximity, Target<K>)>
where
    K: Copy + Eq,
    Q: ScopeQuery<K> + ?Sized,
{
    match scope {
        Scope::Document => Some((Proximity::Universal, Target::Document)),
        Scope::Window => Some((Proximity::Universal, Target::Window)),
        Scope::Selector(selector) => {
            let Target::Node(origin) = origin else {
                return None;
            };
            query
                .query(selector)
                .into_iter()
                .filter_map(|n| query.ancestor_distance(&n, origin).map(|d| (d, n)))
                .min_by_key(|(d, _)| *d)
                .map(|(d, n)| (Proximity::Ancestor(d), Target::Node(n)))
        }
    }
}

/// Select the descriptor closest to `origin`, or `None` if no scope contains it.
pub fn resolve<'a, K, Q>(
    descriptors: &'a [Descriptor],
    origin: &Target<K>,
    query: &Q,
) -> Option<Resolution<'a, K>>
where
    K: Copy + Eq,
    Q: ScopeQuery<K> + ?Sized,
{
    let mut best: Option<Resolution<'a, K>> = None;
    for (index, descriptor) in descriptors.iter().enumerate() {
        let Some((proximity, boundary)) = proximity_of(&descriptor.scope, origin, query) else {
            continue;
        };
        // Strictly closer only: the earlier registration keeps ties.
        if best.as_ref().is_none_or(|b| proximity < b.proximity) {
            best = Some(Resolution {
                index,
                descriptor,
                proximity,
                boundary,
            });
        }
    }
    best
}

/// Find the actionable node an event should be reported against.
///
/// Walks from `origin` toward `boundary` and returns the first node the query
/// marks actionable. The boundary itself counts only if it is actionable.
/// Returns `None` when nothing on the way qualifies, or when the walk reaches
/// a root without meeting the boundary.
pub fn actionable_target<K, Q>(origin: &Target<K>, boundary: &Target<K>, query: &Q) -> Option<K>
where
    K: Copy + Eq,
    Q: ScopeQuery<K> + ?Sized,
{
    let Target::Node(mut cur) = *origin else {
        return None;
    };
    loop {
        if query.is_actionable(&cur) {
            return Some(cur);
        }
        if *boundary == Target::Node(cur) {
            return None;
        }
        cur = query.parent_of(&cur)?;
    }
}
