pub mod analytics;
pub mod cache;
pub mod config;
pub mod models;
pub mod redirect;
pub mod storage;
pub mod threat;
