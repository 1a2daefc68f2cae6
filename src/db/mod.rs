// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Database Layer
//!
//! Postgres (Supabase) storage for the metrics the dashboards read directly.
//! The warehouse keeps the full history; this database keeps the latest
//! upserted view keyed by pool and date.
//!
//! ## Tables
//!
//! - `pool_tvl_snapshots`: current TVL per pool
//! - `daily_pool_metrics`: daily TVL and flows per pool, plus `ALL_POOLS` rows
//! - `pool_health_metrics`: efficiency scoring per pool-day
//! - `swap_pool_metrics`: lifetime swap totals per pool
//! - `daily_swap_metrics`: protocol-wide swap activity per day
//!
//! Every write is `INSERT .. ON CONFLICT (key) DO UPDATE`, so reruns are
//! idempotent. Migrations are embedded in the binary and run at startup.

/// Insert models shared by the processors
pub mod common;

/// Schema and migrations
pub mod postgres;
