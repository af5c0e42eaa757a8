use std::{collections::BTreeSet, sync::Arc, sync::LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::{Connection, ConnectionConfig, ConnectionError, Dialect};

static HOSTNAME_ENVIRONMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)\.(\w+).(.*)$").expect("hostname environment pattern is valid")
});

/// One configured database, owning at most one connection for its lifetime.
pub struct DbInstance {
    id: String,
    instance_type: Option<String>,
    config: ConnectionConfig,
    dialect: Arc<dyn Dialect>,
    connection: Option<Box<dyn Connection>>,
}

impl DbInstance {
    pub fn new(id: impl Into<String>, dialect: Arc<dyn Dialect>, config: ConnectionConfig) -> Self {
        Self {
            id: id.into(),
            instance_type: None,
            config,
            dialect,
            connection: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    /// Uses an already open connection instead of asking the dialect for one.
    #[must_use]
    pub fn with_connection(mut self, connection: Box<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared role of the instance; defaults to its id.
    pub fn instance_type(&self) -> &str {
        self.instance_type.as_deref().unwrap_or(&self.id)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn dialect_handle(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.dialect)
    }

    pub fn engine(&self) -> &'static str {
        self.dialect.engine()
    }

    pub fn url(&self) -> String {
        self.dialect.connection_url(&self.config)
    }

    pub fn is_real(&self) -> bool {
        self.config.is_real() || self.connection.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The instance connection, opened on first use.
    pub fn connection(&mut self) -> Result<&mut dyn Connection, ConnectionError> {
        if self.connection.is_none() {
            debug!(instance = %self.id, url = %self.url(), "connecting");
            let connection = self.dialect.connect(&self.id, &self.config)?;
            self.connection = Some(connection);
        }

        let engine = self.dialect.engine();
        let id = self.id.clone();
        match self.connection.as_mut() {
            Some(connection) => Ok(connection.as_mut()),
            None => Err(ConnectionError::DriverUnavailable {
                engine: engine.to_string(),
                instance: id,
            }),
        }
    }

    /// The connection if one is open, without connecting.
    pub fn open_connection(&mut self) -> Option<&mut dyn Connection> {
        match self.connection.as_mut() {
            Some(connection) => Some(connection.as_mut()),
            None => None,
        }
    }

    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take()
            && let Err(error) = connection.close()
        {
            warn!(instance = %self.id, error = %error, "closing connection failed");
        }
    }

    /// Environment guessed from a host name shaped like `name.env.domain`.
    pub fn guess_environment(&self) -> Option<String> {
        let host = self.config.host.as_deref()?;
        let guessed = guess_environment(host);
        match &guessed {
            Some(environment) => debug!(host, environment = %environment, "environment guessed"),
            None => debug!(host, "environment cannot be guessed"),
        }
        guessed
    }
}

impl std::fmt::Debug for DbInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbInstance")
            .field("id", &self.id)
            .field("instance_type", &self.instance_type())
            .field("engine", &self.engine())
            .field("connected", &self.is_connected())
            .finish()
    }
}

pub fn guess_environment(host: &str) -> Option<String> {
    HOSTNAME_ENVIRONMENT
        .captures(host)
        .map(|captures| captures[2].to_string())
}

/// The configured instances of one run.
#[derive(Debug, Default)]
pub struct DbConfig {
    environment: Option<String>,
    instances: Vec<DbInstance>,
    known_types: BTreeSet<String>,
}

impl DbConfig {
    /// Instances without a database only contribute their type to the set
    /// of known types; they are never connected.
    pub fn new(instances: Vec<DbInstance>) -> Self {
        let known_types = instances
            .iter()
            .map(|instance| instance.instance_type().to_string())
            .collect();
        let instances = instances
            .into_iter()
            .filter(DbInstance::is_real)
            .collect();

        Self {
            environment: None,
            instances,
            known_types,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Declared environment, else one guessed from the first instance host.
    pub fn resolve_environment(&self) -> Option<String> {
        self.environment
            .clone()
            .or_else(|| self.instances.first()?.guess_environment())
    }

    pub fn instances(&self) -> &[DbInstance] {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut [DbInstance] {
        &mut self.instances
    }

    pub fn known_types(&self) -> &BTreeSet<String> {
        &self.known_types
    }

    pub fn close_connections(&mut self) {
        for instance in &mut self.instances {
            instance.close();
        }
    }
}
