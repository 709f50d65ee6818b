//! Srce DB Library
//!
//! Persistence of video records behind the [`VideoRepository`] trait, with a
//! PostgreSQL implementation and an in-memory one.

pub mod db;

pub use db::{
    connect_and_migrate, InMemoryVideoRepository, PgVideoRepository, VideoRepository,
};
