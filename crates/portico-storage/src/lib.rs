// Storage layer for Portico
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// - Database: PostgreSQL repositories (sqlx, embedded migrations)
// - InMemoryDatabase: HashMap-backed twin with the same constraints
// - StorageBackend: enum dispatch over the two, hashes local passwords

pub mod backend;
pub mod memory;
pub mod models;
pub mod password;
pub mod repositories;

pub use backend::StorageBackend;
pub use memory::InMemoryDatabase;
pub use models::*;
pub use password::{hash_password, validate_password, verify_password};
pub use repositories::Database;
