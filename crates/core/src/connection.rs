use crate::{ParamType, Row, SqlResult, Value};

/// Name of the savepoint taken around statements whose failure may be ignored.
pub const SAVEPOINT_NAME: &str = "applyalter_statement";

/// Name of the savepoint fencing one id-list batch when the run does not commit.
pub const BATCH_SAVEPOINT_NAME: &str = "applyalter_batch";

/// A live, non-autocommit session on one database instance.
///
/// Implementations open a transaction on demand so that every statement runs
/// inside one until `commit` or `rollback` ends it. Parameters are bound
/// positionally using the dialect's bind markers.
pub trait Connection {
    /// Executes a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64>;

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>>;

    /// Parameter types of a prepared statement, in bind order.
    fn describe_params(&mut self, sql: &str) -> SqlResult<Vec<ParamType>>;

    fn commit(&mut self) -> SqlResult<()>;

    fn rollback(&mut self) -> SqlResult<()>;

    fn savepoint(&mut self, name: &str) -> SqlResult<()> {
        self.execute(&format!("SAVEPOINT {name}"), &[]).map(drop)
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> SqlResult<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
            .map(drop)
    }

    fn close(&mut self) -> SqlResult<()> {
        Ok(())
    }
}

/// First column of the first row, if the query produced any row.
pub fn query_scalar(
    connection: &mut dyn Connection,
    sql: &str,
    params: &[Value],
) -> SqlResult<Option<Value>> {
    let rows = connection.query(sql, params)?;
    Ok(rows
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next()))
}
