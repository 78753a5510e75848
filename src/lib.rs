// Copyright 2026 Vouchsafe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Vouchsafe library: browser-driven voucher classification and stock
//! scanning for the SHEIN India storefront.
//!
//! The [`session::SessionHost`] owns the one shared browser session and
//! exposes every operation; the `storefront` modules hold the pure
//! classifiers the operations are built from.

#![allow(
    dead_code,
    unused_imports,
    clippy::new_without_default,
    clippy::should_implement_trait
)]

pub mod audit;
pub mod browser;
pub mod cli;
pub mod codes;
pub mod config;
pub mod events;
pub mod protect;
pub mod scan;
pub mod session;
pub mod storefront;
