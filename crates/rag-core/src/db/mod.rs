pub mod pool;
pub mod repository;
pub mod vector_store;

pub use pool::DbPool;
pub use repository::Repository;
pub use vector_store::{NewChunk, PgVectorStore, VectorStore};
