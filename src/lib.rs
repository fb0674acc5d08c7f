//! Community Feed - a community-content aggregator
//!
//! This crate serves paginated feeds of posts crawled from external community sites,
//! and provides the reader-side client: de-duplicating pagination, read tracking,
//! persisted settings and the startup sequence that ties them together.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod ladder;
pub mod models;
pub mod pagination;
pub mod reader;
pub mod reads;
pub mod routes;
pub mod settings;
pub mod storage;
pub mod syncer;

#[cfg(test)]
mod test_support;
