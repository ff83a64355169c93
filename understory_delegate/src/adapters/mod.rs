// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host adapters.
//!
//! The dispatcher only talks to a host through [`ScopeQuery`](crate::types::ScopeQuery)
//! and [`EventSource`](crate::types::EventSource). The adapters here implement
//! both in memory for tests, demos and headless use.

pub mod memory;
