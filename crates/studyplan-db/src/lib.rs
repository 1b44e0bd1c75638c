//! Persistence layer for studyplan: configuration, pool management, row
//! models, and query functions over the PostgreSQL schema.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
