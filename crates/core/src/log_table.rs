use std::{collections::BTreeSet, time::Duration};

use crate::{
    AlterStatement, Alterscript, Check, CheckType, Connection, Dialect, SqlResult, Value,
    dialect::{LOG_TABLE, PACKAGE_LOG_TABLE},
};

/// One successful application of an alterscript on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry<'a> {
    pub username: &'a str,
    pub alterscript: &'a str,
    pub duration: Duration,
    pub hash: &'a str,
}

pub fn insert_log_entry(
    connection: &mut dyn Connection,
    dialect: &dyn Dialect,
    entry: &LogEntry<'_>,
) -> SqlResult<u64> {
    let sql = format!(
        "insert into {} (username, id, duration, hash) values ({}, {}, {}, {})",
        dialect.log_table(),
        dialect.bind_marker(1),
        dialect.bind_marker(2),
        dialect.bind_marker(3),
        dialect.bind_marker(4)
    );
    let duration = i64::try_from(entry.duration.as_millis()).unwrap_or(i64::MAX);
    connection.execute(
        &sql,
        &[
            Value::from(entry.username),
            Value::from(entry.alterscript),
            Value::Integer(duration),
            Value::from(entry.hash),
        ],
    )
}

/// Ids of every alterscript logged on the instance.
pub fn logged_ids(
    connection: &mut dyn Connection,
    dialect: &dyn Dialect,
) -> SqlResult<BTreeSet<String>> {
    let sql = format!("select distinct id from {}", dialect.log_table());
    let rows = connection.query(&sql, &[])?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.first().and_then(Value::as_text))
        .collect())
}

/// Records a whole-bundle application and commits it right away.
pub fn insert_package_entry(
    connection: &mut dyn Connection,
    dialect: &dyn Dialect,
    dbid: &str,
    hash: &str,
    username: &str,
) -> SqlResult<()> {
    let sql = format!(
        "insert into {} (dbid, hash, username) values ({}, {}, {})",
        dialect.package_log_table(),
        dialect.bind_marker(1),
        dialect.bind_marker(2),
        dialect.bind_marker(3)
    );
    connection.execute(
        &sql,
        &[Value::from(dbid), Value::from(hash), Value::from(username)],
    )?;
    connection.commit()
}

/// Alterscripts creating the log tables, one pair per distinct engine. Each
/// is guarded by a table check so it only runs where the table is missing.
pub fn bootstrap_alterscripts<'d>(
    dialects: impl IntoIterator<Item = &'d dyn Dialect>,
) -> Vec<Alterscript> {
    let mut engines = BTreeSet::new();
    let mut alters = Vec::new();

    for dialect in dialects {
        if !engines.insert(dialect.engine()) {
            continue;
        }
        let engine = dialect.engine().to_ascii_lowercase();
        for (table, ddl) in [
            (LOG_TABLE, dialect.log_table_ddl()),
            (PACKAGE_LOG_TABLE, dialect.package_log_table_ddl()),
        ] {
            let mut alter = Alterscript::new(format!("{table}_{engine}"), "");
            alter.engine = Some(dialect.engine().to_string());
            alter.schema = dialect.log_schema().to_string();
            alter.checks.push(Check::new(CheckType::Table, table));
            alter.statements.push(AlterStatement::sql(ddl));
            alters.push(alter);
        }
    }

    alters
}
