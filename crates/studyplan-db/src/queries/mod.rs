//! Query functions, one module per table.
//!
//! Functions that participate in multi-statement writes take any
//! [`sqlx::PgExecutor`] so they can run on a pool or inside a transaction.

pub mod metrics;
pub mod plan_versions;
pub mod plans;
pub mod profiles;
pub mod revoked_tokens;
pub mod users;
