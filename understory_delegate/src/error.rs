// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors raised while configuring delegation.
//!
//! Nothing on the routing path returns these; they surface only when a rate
//! limit is built or a descriptor is registered.

use alloc::string::String;

use thiserror::Error;

use crate::types::Scope;

/// A rate-limit delay that cannot be scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum DelayError {
    /// The delay was NaN or infinite.
    #[error("delay must be finite, got {0}")]
    NonFinite(f64),
    /// The delay was below zero.
    #[error("delay must not be negative, got {0}ms")]
    Negative(f64),
}

/// A registration the dispatcher refused.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegistrationError {
    /// The descriptor named no event category.
    #[error("event category must not be empty")]
    EmptyCategory,
    /// The descriptor's selector scope was blank.
    #[error("scope selector must not be empty")]
    EmptySelector,
    /// A descriptor already exists for this scope and category.
    #[error("`{category}` is already registered on `{scope}`")]
    Duplicate {
        /// Scope of the existing registration.
        scope: Scope,
        /// Category of the existing registration.
        category: String,
    },
    /// The dispatcher has been stopped.
    #[error("dispatcher is terminated")]
    Terminated,
}
