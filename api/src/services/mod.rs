pub mod analyzer;
pub mod auth;
pub mod detections;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod normalizer;
pub mod parser;
pub mod rate_limit;
pub mod reports;
pub mod store;
pub mod vision;
