use crate::{
    Check, CheckError, CheckQuery, Connection, ConnectionConfig, Dialect, IsolationLevel,
    SqlResult,
};

use super::{host_and_port, upper};

const DEFAULT_PORT: u16 = 50000;

/// IBM DB2. Catalog lookups go through `syscat`, identifiers are stored
/// upper-cased. No driver ships with the core; an embedding application hands
/// connections to [`crate::DbInstance::with_connection`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Db2Dialect;

impl Dialect for Db2Dialect {
    fn engine(&self) -> &'static str {
        "DB2"
    }

    fn connection_url(&self, config: &ConnectionConfig) -> String {
        format!(
            "db2://{}/{}",
            host_and_port(config, DEFAULT_PORT),
            config.database
        )
    }

    fn set_schema(&self, connection: &mut dyn Connection, schema: &str) -> SqlResult<()> {
        connection
            .execute("set schema ?", &[upper(schema)])
            .map(drop)
    }

    fn set_isolation(
        &self,
        connection: &mut dyn Connection,
        level: IsolationLevel,
    ) -> SqlResult<()> {
        connection
            .execute(&format!("set current isolation = {}", level.as_str()), &[])
            .map(drop)
    }

    fn check_query(&self, check: &Check, schema: &str) -> Result<CheckQuery, CheckError> {
        let check_type = check.check_type;
        let abbreviation = check_type.abbreviation();
        let mut sql = format!(
            "select * from syscat.{} where {abbreviation}schema = ? and {abbreviation}name = ?",
            check_type.catalog_table()
        );
        let mut params = vec![upper(schema)];
        if let Some(table) = &check.table
            && check_type.requires_table()
        {
            params.push(upper(table));
        }
        if let Some(extra) = check_type.extra_column() {
            sql.push_str(&format!(" and {extra} = ?"));
        }
        params.push(upper(&check.name));

        Ok(CheckQuery::any_row(sql, params))
    }

    fn scalar_query_sql(&self, expression: &str) -> String {
        format!("values {expression}")
    }

    fn temp_table_name(&self, base_name: &str) -> String {
        format!("session.{}", base_name.to_ascii_uppercase())
    }

    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String> {
        vec![format!(
            "declare global temporary table {} as ({query}) definition only \
             on commit preserve rows not logged on rollback delete rows with replace",
            self.temp_table_name(base_name)
        )]
    }

    fn copy_rows_sql(&self, source: &str, target: &str, rows: i64) -> String {
        format!("insert into {target} (select * from {source} fetch first {rows} rows only)")
    }

    fn log_table(&self) -> &'static str {
        "wasg2.applyalter_log"
    }

    fn package_log_table(&self) -> &'static str {
        "wasg2.applyalter_pkg"
    }
}
