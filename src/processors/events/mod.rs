// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Event Normalization and Metric Calculators
//!
//! Everything between the raw subgraph records and the rows that get
//! uploaded lives here. No module in this tree performs I/O; all functions
//! are pure over the records of a single run.
//!
//! ## Stages
//!
//! ```text
//! raw_events ──► normalizer ──► tvl_calculator ──────────┐
//!                    │                                    ├──► health_calculator
//!                    ├────────► pool_stats_calculator ───┘
//!                    └────────► volume_calculator
//! ```
//!
//! - **raw_events**: serde shapes of subgraph records
//! - **normalizer**: decimal rescaling and USD pricing
//! - **tvl_calculator**: running TVL from deposit/withdrawal deltas
//! - **pool_stats_calculator**: daily values from cumulative Tigris stats
//! - **volume_calculator**: swap volume attribution and fee joins
//! - **health_calculator**: pool efficiency scoring
//! - **bucket_calculator** / **rolling**: day bucketing and window statistics

/// Token symbols, decimals and price feed ids
pub mod constants;

/// Subgraph record shapes
pub mod raw_events;

/// Raw amount rescaling and USD conversion
pub mod normalizer;

/// UTC day bucketing of unix timestamps
pub mod bucket_calculator;

/// Moving averages, standard deviations and running sums
pub mod rolling;

/// Running TVL reconstruction
pub mod tvl_calculator;

/// Swap volume attribution and rollups
pub mod volume_calculator;

/// Differencing of cumulative pool statistics
pub mod pool_stats_calculator;

/// Pool health and efficiency scoring
pub mod health_calculator;
