mod connection;

use applyalter_core::{
    Check, CheckError, CheckQuery, CheckType, Connection, ConnectionConfig, ConnectionError,
    Dialect, IsolationLevel, SqlResult, Value,
};

pub use connection::SqliteConnection;

const TEMP_SCHEMA: &str = "temp";
const MAIN_SCHEMA: &str = "main";

/// SQLite database files. There are no schemas, so alterscript schemas are
/// accepted and ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn engine(&self) -> &'static str {
        "SQLite"
    }

    fn connection_url(&self, config: &ConnectionConfig) -> String {
        format!("sqlite://{}", config.database)
    }

    fn connect(
        &self,
        instance: &str,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let connection =
            SqliteConnection::open(&config.database).map_err(|source| ConnectionError::Open {
                instance: instance.to_string(),
                url: self.connection_url(config),
                source,
            })?;
        Ok(Box::new(connection))
    }

    fn bind_marker(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn set_schema(&self, _connection: &mut dyn Connection, _schema: &str) -> SqlResult<()> {
        Ok(())
    }

    fn set_isolation(
        &self,
        connection: &mut dyn Connection,
        level: IsolationLevel,
    ) -> SqlResult<()> {
        let read_uncommitted = u8::from(level == IsolationLevel::Ur);
        connection
            .execute(&format!("PRAGMA read_uncommitted = {read_uncommitted}"), &[])
            .map(drop)
    }

    fn check_query(&self, check: &Check, _schema: &str) -> Result<CheckQuery, CheckError> {
        let name = Value::from(check.name.as_str());
        let query = match check.check_type {
            CheckType::Table | CheckType::View | CheckType::Index => CheckQuery::any_row(
                format!(
                    "select name from sqlite_master where type = '{}' and lower(name) = lower(?1)",
                    check.check_type
                ),
                vec![name],
            ),
            CheckType::Trigger => CheckQuery::any_row(
                "select name from sqlite_master where type = 'trigger' \
                 and lower(tbl_name) = lower(?1) and lower(name) = lower(?2)",
                vec![table_param(check), name],
            ),
            CheckType::Column => CheckQuery::any_row(
                "select name from pragma_table_info(?1) where lower(name) = lower(?2)",
                vec![table_param(check), name],
            ),
            CheckType::Routine | CheckType::Reference | CheckType::Check => {
                return Err(CheckError::Unsupported {
                    dialect: self.engine(),
                    check_type: check.check_type,
                });
            }
        };
        Ok(query)
    }

    fn temp_table_name(&self, base_name: &str) -> String {
        format!("{TEMP_SCHEMA}.{base_name}")
    }

    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String> {
        vec![
            format!("drop table if exists {}", self.temp_table_name(base_name)),
            format!("create temp table {base_name} as select * from ({query}) where 0"),
        ]
    }

    fn log_schema(&self) -> &'static str {
        MAIN_SCHEMA
    }
}

fn table_param(check: &Check) -> Value {
    Value::from(check.table.as_deref().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_check_reads_table_info() {
        let check = Check::new(CheckType::Column, "email").on_table("users");
        let query = SqliteDialect
            .check_query(&check, "main")
            .unwrap_or_else(|error| panic!("check query should build: {error}"));

        assert_eq!(
            query.sql,
            "select name from pragma_table_info(?1) where lower(name) = lower(?2)"
        );
        assert_eq!(query.params, vec![Value::from("users"), Value::from("email")]);
    }

    #[test]
    fn constraint_checks_are_unsupported() {
        for check_type in [CheckType::Reference, CheckType::Check, CheckType::Routine] {
            let check = Check::new(check_type, "x").on_table("t");
            assert!(matches!(
                SqliteDialect.check_query(&check, "main"),
                Err(CheckError::Unsupported { .. })
            ));
        }
    }

    #[test]
    fn numbered_markers_keep_datafile_params_in_place() {
        assert_eq!(SqliteDialect.bind_marker(3), "?3");
    }
}
