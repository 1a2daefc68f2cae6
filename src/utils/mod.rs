// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Utility Functions and Shared Components
//!
//! ### Database Utilities (`database`)
//! - Connection pool over TLS for Supabase
//! - Embedded migrations run at startup
//! - Chunked statement execution with SQL logged on failure
//!
//! ### Snapshots (`snapshot`)
//! - Per-run JSON metrics files consumed by report generation
//! - Optional dumps of intermediate tables for debugging a run

/// Database connection management, pooling, and utility functions
pub mod database;

/// Metrics snapshot and debug dump writers
pub mod snapshot;
