//! Video record repositories
//
// Repository trait shared by every backend
pub mod repository;
//
// Backends
pub mod memory;
pub mod postgres;
//
// Connection and migrations
pub mod setup;

pub use memory::InMemoryVideoRepository;
pub use postgres::PgVideoRepository;
pub use repository::VideoRepository;
pub use setup::connect_and_migrate;
