mod db2;
mod oracle;

use crate::{
    Check, CheckError, Connection, ConnectionConfig, ConnectionError, IsolationLevel, SqlResult,
    Value,
};

pub use db2::Db2Dialect;
pub use oracle::OracleDialect;

pub const LOG_TABLE: &str = "applyalter_log";
pub const PACKAGE_LOG_TABLE: &str = "applyalter_pkg";

/// Catalog query for an existence check; the object exists when it returns
/// at least one row.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CheckQuery {
    pub fn any_row(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Engine-specific behaviour, selected once per configured instance.
pub trait Dialect: Send + Sync {
    /// Engine tag matched against an alterscript's `engine` filter.
    fn engine(&self) -> &'static str;

    /// Readable location of the instance, used for reporting only.
    fn connection_url(&self, config: &ConnectionConfig) -> String;

    fn connect(
        &self,
        instance: &str,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        Err(ConnectionError::DriverUnavailable {
            engine: self.engine().to_string(),
            instance: instance.to_string(),
        })
    }

    /// Bind marker for the 1-based parameter `index`.
    fn bind_marker(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn set_schema(&self, connection: &mut dyn Connection, schema: &str) -> SqlResult<()>;

    fn set_isolation(&self, connection: &mut dyn Connection, level: IsolationLevel)
    -> SqlResult<()>;

    /// Whether one failed statement poisons the whole transaction, so an
    /// ignorable failure must be fenced by a savepoint.
    fn savepoint_needed_for_ignored_failure(&self) -> bool {
        false
    }

    fn check_query(&self, check: &Check, schema: &str) -> Result<CheckQuery, CheckError>;

    /// Query evaluating a scalar SQL expression.
    fn scalar_query_sql(&self, expression: &str) -> String {
        format!("select {expression}")
    }

    /// Name under which a session-scoped staging table is referenced.
    fn temp_table_name(&self, base_name: &str) -> String;

    /// Statements creating an empty staging table shaped like `query`'s result.
    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String>;

    fn copy_rows_sql(&self, source: &str, target: &str, rows: i64) -> String {
        format!("insert into {target} select * from {source} limit {rows}")
    }

    fn log_table(&self) -> &'static str {
        LOG_TABLE
    }

    fn package_log_table(&self) -> &'static str {
        PACKAGE_LOG_TABLE
    }

    /// Schema holding the log tables, used by the bootstrap alterscripts.
    fn log_schema(&self) -> &'static str {
        crate::DEFAULT_SCHEMA
    }

    fn log_table_ddl(&self) -> String {
        format!(
            "create table {} (username varchar(255) not null, id varchar(255) not null, \
             duration bigint not null, hash varchar(64), at timestamp default current_timestamp not null)",
            self.log_table()
        )
    }

    fn package_log_table_ddl(&self) -> String {
        format!(
            "create table {} (dbid varchar(255) not null, hash varchar(64) not null, \
             username varchar(255) not null, at timestamp default current_timestamp not null)",
            self.package_log_table()
        )
    }
}

/// `host:port` segment shared by the URL builders.
pub fn host_and_port(config: &ConnectionConfig, default_port: u16) -> String {
    let host = config.host.as_deref().unwrap_or("localhost");
    format!("{host}:{}", config.port.unwrap_or(default_port))
}

/// Upper-cased schema and object name pair for catalog-case-sensitive engines.
pub(crate) fn upper(value: &str) -> Value {
    Value::Text(value.to_ascii_uppercase())
}
