pub mod cache;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod key_pool;
pub mod models;
pub mod provider;
pub mod router;
pub mod storage;
pub mod token_bucket;

pub use error::{EngineError, EngineResult};
