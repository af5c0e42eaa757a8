use tracing::debug;

use crate::{
    Alterscript, Check, CheckError, Connection, Dialect, Result, Value,
    connection::query_scalar,
};

/// Value the custom probe must return for an alterscript to count as applied.
pub const PROBE_SENTINEL: &str = "OK";

/// Whether `alter` is already applied on the connected instance.
///
/// A probe answering the sentinel is sufficient. Otherwise every catalog
/// check must pass; no checks at all means "not applied".
pub fn is_applied(
    connection: &mut dyn Connection,
    dialect: &dyn Dialect,
    alter: &Alterscript,
) -> Result<bool> {
    if let Some(probe) = alter.checkok.as_deref()
        && run_probe(connection, probe)?
    {
        return Ok(true);
    }

    if alter.checks.is_empty() {
        return Ok(false);
    }

    for check in &alter.checks {
        if !run_check(connection, dialect, check, &alter.schema)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Runs the custom probe query; only a first column equal to `OK`, ignoring
/// case, reports the alterscript as applied.
pub fn run_probe(connection: &mut dyn Connection, sql: &str) -> Result<bool, CheckError> {
    if sql.trim().is_empty() {
        return Ok(false);
    }
    debug!(check = sql, "running checkok probe");

    let value = query_scalar(connection, sql, &[]).map_err(|source| CheckError::Query {
        check: sql.to_string(),
        source,
    })?;
    Ok(value
        .as_ref()
        .and_then(Value::as_text)
        .is_some_and(|text| text.eq_ignore_ascii_case(PROBE_SENTINEL)))
}

/// Evaluates one catalog check, already XOR-ed with its `inverted` flag.
pub fn run_check(
    connection: &mut dyn Connection,
    dialect: &dyn Dialect,
    check: &Check,
    schema: &str,
) -> Result<bool> {
    check.validate()?;
    let query = dialect.check_query(check, schema)?;
    debug!(check = %check, sql = %query.sql, "running catalog check");

    let rows = connection
        .query(&query.sql, &query.params)
        .map_err(|source| CheckError::Query {
            check: check.to_string(),
            source,
        })?;

    Ok(!rows.is_empty() ^ check.inverted)
}
