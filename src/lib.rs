//! Token flow metrics for an SLP token on Bitcoin Cash.
//!
//! Classifies the token transfers seen by two liquidity addresses into
//! inflows, outflows and burns over a block window, using a REST indexer for
//! address history and transaction detail.

pub mod aggregator;
pub mod api;
pub mod classifier;
pub mod config;
pub mod db;
pub mod indexer;
pub mod models;
pub mod parser;
pub mod report;
pub mod rpc;
pub mod wallet;

pub use classifier::{FlowClassifier, FlowError, Pacing};
pub use models::{ClassifiedEntry, FlowKind, FlowReport, TokenDescriptor, TokenId, Watchlist};
pub use rpc::{DecodeError, Indexer, IndexerError, RestIndexer, TokenDecoder};
