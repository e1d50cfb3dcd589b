//! Devflow Core -- a deterministic stock-and-flow model of a software
//! delivery pipeline.
//!
//! Work items (tickets) move through five stages, from Backlog to Live in
//! Production. Each step some work advances, some is found defective and
//! sent back upstream as rework, and WIP-capped stages refuse work beyond
//! their capacity. The crate exposes the configuration, the per-step update
//! rule, and the History a run produces; hosts render and analyse it.
//!
//! # Step Pipeline
//!
//! Each call to [`engine::step`] computes every flow from the previous
//! snapshot and applies them together:
//!
//! 1. **Rework** -- stages with an error target earmark a fraction of their
//!    stock to send back.
//! 2. **Admission** -- rework is admitted into WIP-capped targets up to
//!    their headroom.
//! 3. **Forward** -- each stage advances up to its flow rate, clamped to the
//!    downstream headroom.
//! 4. **Apply** -- all flows (and external arrivals) land at once.
//!
//! The ticket total is conserved exactly, and a configuration always
//! produces a bit-identical History.
//!
//! ```rust
//! use devflow_core::config::SimConfig;
//! use devflow_core::engine::run;
//! use devflow_core::fixed::Fixed64;
//! use devflow_core::stage::Stage;
//!
//! let config = SimConfig::builder().initial_backlog(100).duration(50).build().unwrap();
//! let history = run(&config);
//! assert_eq!(history.len(), 51);
//! assert_eq!(history.final_state().total(), config.initial_total());
//! assert!(history.final_state().stock(Stage::LiveInProduction) > Fixed64::ZERO);
//! ```
//!
//! # Key Types
//!
//! - [`config::SimConfig`] -- Immutable, validated parameters built through
//!   [`config::SimConfigBuilder`].
//! - [`stage::Stage`] -- The five pipeline stages and their fixed wiring.
//! - [`engine::Engine`] -- Steppable wrapper that records a
//!   [`history::History`].
//! - [`sim::FlowRecord`] -- Forward and error flows realized in one step.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`validation`] -- Invariant audit and determinism check.

pub mod config;
pub mod engine;
pub mod fixed;
pub mod history;
pub mod sim;
pub mod stage;
pub mod sweep;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
