// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Pools and Swaps Pipelines
//!
//! Each pipeline is one batch run: fetch every page from the subgraphs,
//! normalize into USD, compute all metrics in memory and only then push the
//! results to the configured sinks.
//!
//! ### `pools_processor`
//! Liquidity deposits and withdrawals plus cumulative Tigris volume and fee
//! statistics. Produces TVL flows, daily volume and fees, and pool health.
//!
//! ### `swaps_processor`
//! Swap and fee events joined on transaction hash. Produces per-pool,
//! per-day and per-pool-day swap metrics and a headline summary.
//!
//! ### `events`
//! Pure calculation engines shared by both pipelines. Nothing in there
//! performs I/O, so every metric can be tested from fixture records.
//!
//! ## Data Flow
//!
//! ```text
//! Subgraphs ─┐
//! Prices ────┼→ TokenNormalizer → calculators → BigQuery / Postgres / snapshots
//! Explorer ──┘
//! ```

/// Shared clients, sinks and run switches
pub mod context;

/// Normalization and metric calculation engines
pub mod events;

/// Liquidity, TVL and pool health pipeline
pub mod pools_processor;

/// Swap volume and fee pipeline
pub mod swaps_processor;
