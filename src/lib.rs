pub mod auth;
pub mod config;
pub mod error;
pub mod fleet;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod mock;
pub mod seed;
pub mod storage;
pub mod vehicle;
