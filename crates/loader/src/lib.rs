mod alterscript;
mod db_config;
mod error;
mod hash;

pub use alterscript::{LoadedAlters, load_alterscripts, parse_alterscript};
pub use db_config::{DbConfigFile, Engine, InstanceSpec, POSTGRES_ROLE_KEY};
pub use error::{LoadError, Result};
pub use hash::{ContentHash, to_hex};
