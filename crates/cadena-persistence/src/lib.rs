//! cadena-persistence: backend Postgres (Diesel) del motor.
pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgCircleStore, PgPlanCatalog, PgPool,
             PoolProvider};
