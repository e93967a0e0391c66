//! Configuration: schema, file discovery, `${VAR}` substitution and
//! `WABRIDGE_*` environment overrides.

pub mod env_subst;
pub mod loader;
pub mod overrides;
pub mod schema;

pub use {
    loader::{discover_and_load, load, load_config},
    schema::WabridgeConfig,
};
