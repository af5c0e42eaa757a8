use std::{io, path::PathBuf};

use applyalter_core::ConfigError;
use thiserror::Error;

pub type Result<T, E = LoadError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("can not read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to deserialize `{source_name}`")]
    Parse {
        source_name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no such datafile: `{datafile}` for {alterscript}")]
    Datafile {
        alterscript: String,
        datafile: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid `{field}` in `{source_name}`: {reason}")]
    InvalidValue {
        source_name: String,
        field: &'static str,
        reason: String,
    },
    #[error("engine `{engine}` of instance `{instance}` is not enabled in this build")]
    EngineUnavailable { engine: String, instance: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
