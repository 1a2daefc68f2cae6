// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Network Clients
//!
//! Thin clients for every external system the pipelines talk to. They all
//! share one [`http::HttpTransport`] so tests can script responses without a
//! network.
//!
//! - **subgraph**: GraphQL `skip` pagination until an empty page
//! - **explorer**: block explorer REST with `next_page_params` cursors
//! - **price_feed**: CoinGecko `simple/price` with bounded retry
//! - **bigquery**: warehouse sink (append new ids, MERGE snapshots)
//!
//! Clients are built once in `main` and handed to the processors by
//! reference.

/// HTTP seam and the reqwest implementation
pub mod http;

/// Exponential backoff retry policy
pub mod retry;

/// GraphQL documents for the Mezo subgraphs
pub mod queries;

/// Paged subgraph fetcher
pub mod subgraph;

/// Cursor-paged block explorer fetcher
pub mod explorer;

/// USD price feed
pub mod price_feed;

/// BigQuery REST sink
pub mod bigquery;
