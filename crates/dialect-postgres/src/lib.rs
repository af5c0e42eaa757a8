mod connection;

use applyalter_core::{
    Check, CheckError, CheckQuery, CheckType, Connection, ConnectionConfig, ConnectionError,
    Dialect, IsolationLevel, SqlResult, Value, host_and_port,
};

pub use connection::PostgresConnection;

const DEFAULT_PORT: u16 = 5432;
const LOG_SCHEMA: &str = "public";

/// PostgreSQL. Unquoted identifiers fold to lower case, so catalog lookups
/// compare lower-cased names.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn engine(&self) -> &'static str {
        "PostgreSQL"
    }

    fn connection_url(&self, config: &ConnectionConfig) -> String {
        match &config.socket {
            Some(socket) => format!("postgresql://{}?host={socket}", config.database),
            None => format!(
                "postgresql://{}/{}",
                host_and_port(config, DEFAULT_PORT),
                config.database
            ),
        }
    }

    fn connect(
        &self,
        instance: &str,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let connection =
            PostgresConnection::connect(config).map_err(|source| ConnectionError::Open {
                instance: instance.to_string(),
                url: self.connection_url(config),
                source,
            })?;
        Ok(Box::new(connection))
    }

    fn bind_marker(&self, index: usize) -> String {
        format!("${index}")
    }

    fn set_schema(&self, connection: &mut dyn Connection, schema: &str) -> SqlResult<()> {
        connection
            .execute(&format!("set search_path to {schema}, {LOG_SCHEMA}"), &[])
            .map(drop)
    }

    fn set_isolation(
        &self,
        connection: &mut dyn Connection,
        level: IsolationLevel,
    ) -> SqlResult<()> {
        connection
            .execute(
                &format!(
                    "set session characteristics as transaction isolation level {}",
                    level.ansi_name()
                ),
                &[],
            )
            .map(drop)
    }

    // Any failed statement aborts the transaction until a rollback.
    fn savepoint_needed_for_ignored_failure(&self) -> bool {
        true
    }

    fn check_query(&self, check: &Check, schema: &str) -> Result<CheckQuery, CheckError> {
        let schema = lower(schema);
        let name = lower(&check.name);
        let table = || lower(check.table.as_deref().unwrap_or_default());

        let query = match check.check_type {
            CheckType::Table => CheckQuery::any_row(
                "select 1 from information_schema.tables \
                 where lower(table_schema) = $1 and lower(table_name) = $2 and table_type = 'BASE TABLE'",
                vec![schema, name],
            ),
            CheckType::View => CheckQuery::any_row(
                "select 1 from information_schema.views where lower(table_schema) = $1 and lower(table_name) = $2",
                vec![schema, name],
            ),
            CheckType::Index => CheckQuery::any_row(
                "select 1 from pg_indexes where lower(schemaname) = $1 and lower(indexname) = $2",
                vec![schema, name],
            ),
            CheckType::Routine => CheckQuery::any_row(
                "select 1 from information_schema.routines \
                 where lower(routine_schema) = $1 and lower(routine_name) = $2",
                vec![schema, name],
            ),
            CheckType::Trigger => CheckQuery::any_row(
                "select 1 from information_schema.triggers \
                 where lower(event_object_schema) = $1 and lower(event_object_table) = $2 and lower(trigger_name) = $3",
                vec![schema, table(), name],
            ),
            CheckType::Reference | CheckType::Check => CheckQuery::any_row(
                format!(
                    "select 1 from information_schema.table_constraints \
                     where lower(constraint_schema) = $1 and lower(table_name) = $2 and lower(constraint_name) = $3 \
                     and constraint_type = '{}'",
                    if check.check_type == CheckType::Reference {
                        "FOREIGN KEY"
                    } else {
                        "CHECK"
                    }
                ),
                vec![schema, table(), name],
            ),
            CheckType::Column => CheckQuery::any_row(
                "select 1 from information_schema.columns \
                 where lower(table_schema) = $1 and lower(table_name) = $2 and lower(column_name) = $3",
                vec![schema, table(), name],
            ),
        };
        Ok(query)
    }

    fn temp_table_name(&self, base_name: &str) -> String {
        format!("pg_temp.{base_name}")
    }

    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String> {
        vec![
            format!("drop table if exists {}", self.temp_table_name(base_name)),
            format!("create temp table {base_name} as {query} with no data"),
        ]
    }

    fn log_table(&self) -> &'static str {
        "public.applyalter_log"
    }

    fn package_log_table(&self) -> &'static str {
        "public.applyalter_pkg"
    }

    fn log_schema(&self) -> &'static str {
        LOG_SCHEMA
    }
}

fn lower(value: &str) -> Value {
    Value::Text(value.to_ascii_lowercase())
}
