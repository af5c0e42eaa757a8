use std::sync::Arc;

use applyalter_core::{
    Check, CheckError, CheckQuery, CheckType, Connection, ConnectionConfig, DbInstance, Dialect,
    IsolationLevel, SqlResult, Value,
};

use super::fake_connection::FakeConnection;

pub const FAKE_ENGINE: &str = "Fake";

/// Dialect emitting readable marker SQL so tests can assert on call order.
#[derive(Debug, Clone)]
pub struct FakeDialect {
    engine: &'static str,
    savepoints: bool,
    unsupported: Option<CheckType>,
}

impl Default for FakeDialect {
    fn default() -> Self {
        Self {
            engine: FAKE_ENGINE,
            savepoints: false,
            unsupported: None,
        }
    }
}

#[allow(dead_code)]
impl FakeDialect {
    pub fn with_savepoints() -> Self {
        Self {
            savepoints: true,
            ..Self::default()
        }
    }

    pub fn with_engine(engine: &'static str) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }

    pub fn without_check(check_type: CheckType) -> Self {
        Self {
            unsupported: Some(check_type),
            ..Self::default()
        }
    }
}

impl Dialect for FakeDialect {
    fn engine(&self) -> &'static str {
        self.engine
    }

    fn connection_url(&self, config: &ConnectionConfig) -> String {
        format!("fake://{}", config.database)
    }

    fn set_schema(&self, connection: &mut dyn Connection, schema: &str) -> SqlResult<()> {
        connection.execute(&format!("SET SCHEMA {schema}"), &[]).map(drop)
    }

    fn set_isolation(
        &self,
        connection: &mut dyn Connection,
        level: IsolationLevel,
    ) -> SqlResult<()> {
        connection
            .execute(&format!("SET ISOLATION {level}"), &[])
            .map(drop)
    }

    fn savepoint_needed_for_ignored_failure(&self) -> bool {
        self.savepoints
    }

    fn check_query(&self, check: &Check, schema: &str) -> Result<CheckQuery, CheckError> {
        if self.unsupported == Some(check.check_type) {
            return Err(CheckError::Unsupported {
                dialect: self.engine,
                check_type: check.check_type,
            });
        }
        Ok(CheckQuery::any_row(
            format!("CHECK {} {}.{}", check.check_type, schema, check.name),
            vec![Value::from(check.name.as_str())],
        ))
    }

    fn temp_table_name(&self, base_name: &str) -> String {
        format!("tmp_{base_name}")
    }

    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String> {
        vec![format!("CREATE TEMP tmp_{base_name} AS {query}")]
    }
}

#[allow(dead_code)]
pub fn test_connection_config(database: &str) -> ConnectionConfig {
    ConnectionConfig {
        database: database.to_string(),
        ..ConnectionConfig::default()
    }
}

/// Instance wired to `connection` through the given dialect.
#[allow(dead_code)]
pub fn fake_instance(id: &str, dialect: FakeDialect, connection: &FakeConnection) -> DbInstance {
    DbInstance::new(id, Arc::new(dialect), test_connection_config(id))
        .with_connection(Box::new(connection.clone()))
}
