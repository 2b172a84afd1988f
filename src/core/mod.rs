pub mod api;
pub mod config;
pub mod dates;
pub mod feed;
pub mod ingest;
pub mod storage;
