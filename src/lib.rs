// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Mezo Pool & Swap Analytics
//!
//! Batch pipelines over Mezo AMM subgraph data. Each run fetches raw events,
//! normalizes token amounts into USD, computes pool and swap metrics in memory
//! and only then uploads the results to BigQuery, Postgres and JSON snapshots.

pub mod clients;
pub mod config;
pub mod db;
pub mod errors;
pub mod processors;
pub mod utils;

pub use db::postgres::schema;
pub use errors::PipelineError;
