mod connection;

use applyalter_core::{
    Check, CheckError, CheckQuery, CheckType, Connection, ConnectionConfig, ConnectionError,
    Dialect, IsolationLevel, SqlResult, Value, host_and_port,
};

pub use connection::MysqlConnection;

const DEFAULT_PORT: u16 = 3306;

/// MySQL. A schema is a database, and the database is the one the instance
/// is configured with: schemas named by alterscripts are not switched to and
/// catalog lookups filter on `database()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn engine(&self) -> &'static str {
        "MySQL"
    }

    fn connection_url(&self, config: &ConnectionConfig) -> String {
        match &config.socket {
            Some(socket) => format!("mysql://{}?socket={socket}", config.database),
            None => format!(
                "mysql://{}/{}",
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
            MysqlConnection::connect(config).map_err(|source| ConnectionError::Open {
                instance: instance.to_string(),
                url: self.connection_url(config),
                source,
            })?;
        Ok(Box::new(connection))
    }

    fn set_schema(&self, _connection: &mut dyn Connection, _schema: &str) -> SqlResult<()> {
        Ok(())
    }

    fn set_isolation(
        &self,
        connection: &mut dyn Connection,
        level: IsolationLevel,
    ) -> SqlResult<()> {
        connection
            .execute(
                &format!(
                    "set session transaction isolation level {}",
                    level.ansi_name()
                ),
                &[],
            )
            .map(drop)
    }

    fn check_query(&self, check: &Check, _schema: &str) -> Result<CheckQuery, CheckError> {
        let name = Value::from(check.name.as_str());
        let table = || Value::from(check.table.as_deref().unwrap_or_default());

        let query = match check.check_type {
            CheckType::Table => CheckQuery::any_row(
                "select 1 from information_schema.tables \
                 where table_schema = database() and table_name = ? and table_type = 'BASE TABLE'",
                vec![name],
            ),
            CheckType::View => CheckQuery::any_row(
                "select 1 from information_schema.views \
                 where table_schema = database() and table_name = ?",
                vec![name],
            ),
            CheckType::Index => CheckQuery::any_row(
                "select 1 from information_schema.statistics \
                 where table_schema = database() and table_name = ? and index_name = ?",
                vec![table(), name],
            ),
            CheckType::Routine => CheckQuery::any_row(
                "select 1 from information_schema.routines \
                 where routine_schema = database() and routine_name = ?",
                vec![name],
            ),
            CheckType::Trigger => CheckQuery::any_row(
                "select 1 from information_schema.triggers \
                 where event_object_schema = database() and event_object_table = ? \
                 and trigger_name = ?",
                vec![table(), name],
            ),
            CheckType::Reference | CheckType::Check => CheckQuery::any_row(
                format!(
                    "select 1 from information_schema.table_constraints \
                     where constraint_schema = database() and table_name = ? \
                     and constraint_name = ? and constraint_type = '{}'",
                    if check.check_type == CheckType::Reference {
                        "FOREIGN KEY"
                    } else {
                        "CHECK"
                    }
                ),
                vec![table(), name],
            ),
            CheckType::Column => CheckQuery::any_row(
                "select 1 from information_schema.columns \
                 where table_schema = database() and table_name = ? and column_name = ?",
                vec![table(), name],
            ),
        };
        Ok(query)
    }

    // Temporary tables are per session and unqualified.
    fn temp_table_name(&self, base_name: &str) -> String {
        base_name.to_string()
    }

    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String> {
        vec![
            format!("drop temporary table if exists {base_name}"),
            format!("create temporary table {base_name} select * from ({query}) as src limit 0"),
        ]
    }
}
