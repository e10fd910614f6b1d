//! Property-graph storage for services, env vars and incidents.
//!
//! `GraphStore` is the persistence seam: `PgGraphStore` backs it with Postgres
//! (recursive CTE traversal), `InMemoryGraphStore` with plain maps. Everything
//! above the store talks to it through `EntitySchema`, which owns node id
//! canonicalization.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;
pub(crate) mod traversal;

pub use error::GraphError;
pub use memory::InMemoryGraphStore;
pub use postgres::PgGraphStore;
pub use schema::{env_var_key, generate_node_id, EntitySchema, MissingEnvVars, RolloutRisks};
pub use store::{GraphStore, DEFAULT_LIST_LIMIT};
