use std::{collections::BTreeMap, fmt, fs, path::Path, str::FromStr, sync::Arc};

use applyalter_core::{
    ConfigError, ConnectionConfig, Db2Dialect, DbConfig, DbInstance, Dialect, OracleDialect,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{LoadError, Result};

/// Extra key read by the PostgreSQL connection to `set role` after login.
pub const POSTGRES_ROLE_KEY: &str = "postgres.role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Engine {
    Postgres,
    Mysql,
    Sqlite,
    Db2,
    Oracle,
}

impl Engine {
    pub const ALL: [Self; 5] = [
        Self::Postgres,
        Self::Mysql,
        Self::Sqlite,
        Self::Db2,
        Self::Oracle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Db2 => "db2",
            Self::Oracle => "oracle",
        }
    }

    /// Dialects that need no driver crate.
    pub fn builtin_dialect(self) -> Option<Arc<dyn Dialect>> {
        match self {
            Self::Db2 => Some(Arc::new(Db2Dialect)),
            Self::Oracle => Some(Arc::new(OracleDialect)),
            Self::Postgres | Self::Mysql | Self::Sqlite => None,
        }
    }
}

impl FromStr for Engine {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlite" => Ok(Self::Sqlite),
            "db2" => Ok(Self::Db2),
            "oracle" => Ok(Self::Oracle),
            _ => Err(ConfigError::UnknownEngine {
                engine: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed database configuration file, before dialects are attached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbConfigFile {
    pub environment: Option<String>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub instance_type: Option<String>,
    pub engine: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Absent for instances that only declare a known type.
    #[serde(default)]
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub socket: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl InstanceSpec {
    pub fn engine(&self) -> Result<Engine> {
        Ok(self.engine.parse::<Engine>()?)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let mut extra = self.extra.clone();
        if let Some(role) = &self.role {
            extra.insert(POSTGRES_ROLE_KEY.to_string(), role.clone());
        }
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            socket: self.socket.clone(),
            extra,
        }
    }
}

impl DbConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&path.display().to_string(), &source)
    }

    pub fn from_yaml(source_name: &str, source: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(source).map_err(|source| LoadError::Parse {
            source_name: source_name.to_string(),
            source,
        })?;
        if file.instances.is_empty() {
            return Err(LoadError::InvalidValue {
                source_name: source_name.to_string(),
                field: "instances",
                reason: "at least one instance is required".to_string(),
            });
        }
        Ok(file)
    }

    /// Attaches a dialect to every instance. `resolve` supplies the dialects
    /// backed by driver crates; DB2 and Oracle are always available.
    pub fn into_db_config(
        self,
        resolve: impl Fn(Engine) -> Option<Arc<dyn Dialect>>,
    ) -> Result<DbConfig> {
        let mut instances = Vec::with_capacity(self.instances.len());
        for spec in &self.instances {
            let engine = spec.engine()?;
            let dialect = resolve(engine)
                .or_else(|| engine.builtin_dialect())
                .ok_or_else(|| LoadError::EngineUnavailable {
                    engine: engine.to_string(),
                    instance: spec.id.clone(),
                })?;
            debug!(instance = %spec.id, engine = %engine, "instance configured");

            let mut instance = DbInstance::new(&spec.id, dialect, spec.connection_config());
            if let Some(instance_type) = &spec.instance_type {
                instance = instance.with_type(instance_type);
            }
            instances.push(instance);
        }
        Ok(DbConfig::new(instances).with_environment(self.environment))
    }
}
