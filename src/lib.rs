//! Mirror the files published by an open-data portal.
//!
//! A catalog (`data.json` or a DCAT RDF graph) is normalized into download
//! tasks, tasks whose file already exists are dropped, and the rest are
//! downloaded by a bounded pool of worker threads. Individual download
//! failures are collected and reported; only a catalog that cannot be fetched
//! or parsed fails the run.

pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod http;
pub mod layout;
pub mod ledger;
pub mod output;
pub mod plan;
