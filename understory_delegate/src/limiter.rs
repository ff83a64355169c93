// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Throttle and debounce over explicit time.
//!
//! ## Overview
//!
//! [`RateLimiter`] is a keyed table of timers. It never reads a clock and never
//! runs anything itself: callers pass `now` into every call, run the leading
//! invocation a throttle hands back, and collect trailing invocations from
//! [`RateLimiter::poll`].
//!
//! ## Throttle
//!
//! - The first call in a window runs immediately.
//! - Calls inside the window are suppressed; the latest arguments are kept and a
//!   single trailing run is (re)scheduled `delay` after the last suppressed call.
//! - A trailing run opens another window of `delay`.
//! - The first call after a window ends runs immediately and replaces any
//!   trailing run still pending, so a continuous stream runs once per window.
//! - A key with nothing pending is dropped once its window has elapsed.
//!
//! ## Debounce
//!
//! Every call replaces the pending arguments and pushes the run `delay` into
//! the future, so only the last call in a quiet period runs.
//!
//! ```
//! use understory_delegate::limiter::{Delay, RateLimiter};
//! use understory_delegate::types::Timestamp;
//!
//! let mut limiter: RateLimiter<&str, u32> = RateLimiter::new();
//! let delay = Delay::from_millis(100);
//! assert_eq!(limiter.throttle("scroll", delay, 1, Timestamp(0)), Some(1));
//! assert_eq!(limiter.throttle("scroll", delay, 2, Timestamp(10)), None);
//! assert_eq!(limiter.throttle("scroll", delay, 3, Timestamp(20)), None);
//!
//! let fired = limiter.poll(Timestamp(120));
//! assert_eq!(fired.len(), 1);
//! assert_eq!(fired[0].args, 3);
//! ```

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::DelayError;
use crate::types::Timestamp;

/// A validated, non-negative delay in milliseconds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Delay(u64);

impl Delay {
    /// No delay.
    pub const ZERO: Self = Self(0);

    /// Create a delay from whole milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Create a delay from a floating-point millisecond count.
    ///
    /// Fractional milliseconds are truncated.
    pub fn try_from_millis_f64(ms: f64) -> Result<Self, DelayError> {
        if !ms.is_finite() {
            return Err(DelayError::NonFinite(ms));
        }
        if ms < 0.0 {
            return Err(DelayError::Negative(ms));
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "finite and non-negative; saturating float cast"
        )]
        let whole = ms as u64;
        Ok(Self(whole))
    }

    /// The delay in milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl core::ops::Add<Delay> for Timestamp {
    type Output = Self;

    #[inline]
    fn add(self, delay: Delay) -> Self {
        Self(self.0.saturating_add(delay.0))
    }
}

/// Which rate-limiting behavior applies.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RateLimitKind {
    /// Leading run plus at most one trailing run per window.
    Throttle,
    /// Only the last call of a quiet period runs.
    Debounce,
}

/// Rate-limit configuration attached to a descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RateLimit {
    /// Throttle or debounce.
    pub kind: RateLimitKind,
    /// Window length.
    pub delay: Delay,
}

impl RateLimit {
    /// Create a rate limit from an already validated delay.
    #[inline]
    pub const fn new(kind: RateLimitKind, delay: Delay) -> Self {
        Self { kind, delay }
    }

    /// A throttle of `ms` milliseconds; fails on negative or non-finite input.
    pub fn throttle(ms: f64) -> Result<Self, DelayError> {
        Ok(Self::new(
            RateLimitKind::Throttle,
            Delay::try_from_millis_f64(ms)?,
        ))
    }

    /// A debounce of `ms` milliseconds; fails on negative or non-finite input.
    pub fn debounce(ms: f64) -> Result<Self, DelayError> {
        Ok(Self::new(
            RateLimitKind::Debounce,
            Delay::try_from_millis_f64(ms)?,
        ))
    }
}

/// A trailing invocation returned by [`RateLimiter::poll`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fired<T, A> {
    /// Key the timer was registered under.
    pub key: T,
    /// Behavior that scheduled the run.
    pub kind: RateLimitKind,
    /// Arguments of the call that won.
    pub args: A,
    /// When the run was due.
    pub due: Timestamp,
}

struct Pending<A> {
    args: A,
    due: Timestamp,
    seq: u64,
}

struct Slot<A> {
    kind: RateLimitKind,
    delay: Delay,
    // End of the current throttle window.
    window_end: Timestamp,
    pending: Option<Pending<A>>,
}

/// Keyed throttle/debounce timers.
///
/// Each key is an independent rate-limit domain holding at most one pending
/// run. `T` is the key, `A` the arguments remembered for a deferred run.
pub struct RateLimiter<T, A> {
    slots: BTreeMap<T, Slot<A>>,
    seq: u64,
}

impl<T: core::fmt::Debug, A> core::fmt::Debug for RateLimiter<T, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("keys", &self.slots.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<T: Ord, A> Default for RateLimiter<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord, A> RateLimiter<T, A> {
    /// Create an empty limiter.
    pub const fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Throttled call.
    ///
    /// Returns `Some(args)` when the call is the leading run and must execute
    /// now, or `None` when it was suppressed and possibly deferred.
    ///
    /// A call arriving after the window has ended leads a new window even if a
    /// trailing run is still pending; the pending run is superseded by it. A
    /// steady stream of calls therefore runs once per window.
    ///
    /// Callers are expected to [`poll`](Self::poll) up to `now` first so that
    /// due trailing runs are not mistaken for open windows.
    pub fn throttle(&mut self, key: T, delay: Delay, args: A, now: Timestamp) -> Option<A> {
        let seq = self.next_seq();
        if let Some(slot) = self.slots.get_mut(&key)
            && slot.kind == RateLimitKind::Throttle
            && now < slot.window_end
        {
            slot.pending = Some(Pending {
                args,
                due: now + slot.delay,
                seq,
            });
            return None;
        }
        self.slots.insert(
            key,
            Slot {
                kind: RateLimitKind::Throttle,
                delay,
                window_end: now + delay,
                pending: None,
            },
        );
        Some(args)
    }

    /// Debounced call: replace any pending run with one due `delay` from `now`.
    pub fn debounce(&mut self, key: T, delay: Delay, args: A, now: Timestamp) {
        let seq = self.next_seq();
        let due = now + delay;
        self.slots.insert(
            key,
            Slot {
                kind: RateLimitKind::Debounce,
                delay,
                window_end: due,
                pending: Some(Pending { args, due, seq }),
            },
        );
    }

    /// Collect every run due at or before `now`, ordered by due time and then
    /// by call order, and drop timers whose window elapsed with nothing pending.
    pub fn poll(&mut self, now: Timestamp) -> Vec<Fired<T, A>>
    where
        T: Clone,
    {
        let mut fired: Vec<(u64, Fired<T, A>)> = Vec::new();
        let mut expired: Vec<T> = Vec::new();
        for (key, slot) in &mut self.slots {
            if let Some(p) = slot.pending.take_if(|p| p.due <= now) {
                // A trailing run opens a fresh window; debounce timers are done.
                slot.window_end = p.due + slot.delay;
                fired.push((
                    p.seq,
                    Fired {
                        key: key.clone(),
                        kind: slot.kind,
                        args: p.args,
                        due: p.due,
                    },
                ));
                if slot.kind == RateLimitKind::Debounce {
                    expired.push(key.clone());
                    continue;
                }
            }
            if slot.pending.is_none() && slot.window_end <= now {
                expired.push(key.clone());
            }
        }
        for key in &expired {
            self.slots.remove(key);
        }
        fired.sort_by_key(|(seq, f)| (f.due, *seq));
        fired.into_iter().map(|(_, f)| f).collect()
    }

    /// Cancel the timer for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: &T) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Cancel every timer whose key satisfies `pred`. Returns how many were cancelled.
    pub fn cancel_matching(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.slots.len();
        self.slots.retain(|k, _| !pred(k));
        before - self.slots.len()
    }

    /// Cancel every timer.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Whether a timer exists for `key`.
    pub fn contains(&self, key: &T) -> bool {
        self.slots.contains_key(key)
    }

    /// Whether a run is pending for `key`.
    pub fn is_pending(&self, key: &T) -> bool {
        self.slots.get(key).is_some_and(|s| s.pending.is_some())
    }

    /// Earliest due time of any pending run.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.slots
            .values()
            .filter_map(|s| s.pending.as_ref().map(|p| p.due))
            .min()
    }

    /// Number of live timers of the given kind.
    pub fn active(&self, kind: RateLimitKind) -> usize {
        self.slots.values().filter(|s| s.kind == kind).count()
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no timer is live.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
