use crate::{
    Check, CheckError, CheckQuery, CheckType, Connection, ConnectionConfig, Dialect,
    IsolationLevel, SqlResult,
};

use super::{host_and_port, upper};

const DEFAULT_PORT: u16 = 1521;

/// Oracle. Like DB2 it ships without a driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn engine(&self) -> &'static str {
        "Oracle"
    }

    fn connection_url(&self, config: &ConnectionConfig) -> String {
        match config.host {
            Some(_) => format!(
                "oracle://{}/{}",
                host_and_port(config, DEFAULT_PORT),
                config.database
            ),
            None => format!("oracle:{}", config.database),
        }
    }

    fn bind_marker(&self, index: usize) -> String {
        format!(":{index}")
    }

    fn set_schema(&self, connection: &mut dyn Connection, schema: &str) -> SqlResult<()> {
        connection
            .execute(&format!("alter session set current_schema = {schema}"), &[])
            .map(drop)
    }

    fn set_isolation(
        &self,
        connection: &mut dyn Connection,
        level: IsolationLevel,
    ) -> SqlResult<()> {
        let level = match level {
            IsolationLevel::Ur | IsolationLevel::Cs => "read committed",
            IsolationLevel::Rs | IsolationLevel::Rr => "serializable",
        };
        connection
            .execute(&format!("alter session set isolation_level = {level}"), &[])
            .map(drop)
    }

    fn savepoint_needed_for_ignored_failure(&self) -> bool {
        true
    }

    fn check_query(&self, check: &Check, schema: &str) -> Result<CheckQuery, CheckError> {
        let (view, name_column, constraint_type) = match check.check_type {
            CheckType::Table => ("all_tables", "table_name", None),
            CheckType::View => ("all_views", "view_name", None),
            CheckType::Index => ("all_indexes", "index_name", None),
            CheckType::Routine => ("all_procedures", "object_name", None),
            CheckType::Trigger => ("all_triggers", "trigger_name", None),
            CheckType::Reference => ("all_constraints", "constraint_name", Some("R")),
            CheckType::Check => ("all_constraints", "constraint_name", Some("C")),
            CheckType::Column => ("all_tab_columns", "column_name", None),
        };

        let mut sql = format!("select 1 from {view} where owner = :1");
        let mut params = vec![upper(schema)];
        if let Some(table) = &check.table
            && check.check_type.requires_table()
        {
            params.push(upper(table));
            sql.push_str(&format!(" and table_name = :{}", params.len()));
        }
        params.push(upper(&check.name));
        sql.push_str(&format!(" and {name_column} = :{}", params.len()));
        if let Some(constraint_type) = constraint_type {
            sql.push_str(&format!(" and constraint_type = '{constraint_type}'"));
        }

        Ok(CheckQuery::any_row(sql, params))
    }

    fn scalar_query_sql(&self, expression: &str) -> String {
        format!("select {expression} from dual")
    }

    fn temp_table_name(&self, base_name: &str) -> String {
        format!("ORA$PTT_{}", base_name.to_ascii_uppercase())
    }

    fn create_temp_table_sql(&self, base_name: &str, query: &str) -> Vec<String> {
        vec![format!(
            "create private temporary table {} on commit preserve definition \
             as select * from ({query}) where 1 = 0",
            self.temp_table_name(base_name)
        )]
    }

    fn copy_rows_sql(&self, source: &str, target: &str, rows: i64) -> String {
        format!("insert into {target} select * from {source} fetch first {rows} rows only")
    }

    fn log_table(&self) -> &'static str {
        "wasg2.applyalter_log"
    }

    fn package_log_table(&self) -> &'static str {
        "wasg2.applyalter_pkg"
    }

    fn log_table_ddl(&self) -> String {
        format!(
            "create table {} (username varchar2(255) not null, id varchar2(255) not null, \
             duration number(19) not null, hash varchar2(64), at timestamp default systimestamp not null)",
            self.log_table()
        )
    }

    fn package_log_table_ddl(&self) -> String {
        format!(
            "create table {} (dbid varchar2(255) not null, hash varchar2(64) not null, \
             username varchar2(255) not null, at timestamp default systimestamp not null)",
            self.package_log_table()
        )
    }
}
