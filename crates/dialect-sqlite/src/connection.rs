use applyalter_core::{Connection, ParamType, Row, SqlError, SqlResult, Value};
use rusqlite::{
    ToSql, params_from_iter,
    types::{ToSqlOutput, ValueRef},
};
use tracing::debug;

const BEGIN_SQL: &str = "BEGIN";
const COMMIT_SQL: &str = "COMMIT";
const ROLLBACK_SQL: &str = "ROLLBACK";
const VERSION_QUERY: &str = "select sqlite_version()";

/// A SQLite session that keeps a transaction open between commits.
pub struct SqliteConnection {
    connection: rusqlite::Connection,
    in_transaction: bool,
}

impl SqliteConnection {
    pub fn open(path: &str) -> SqlResult<Self> {
        let connection = rusqlite::Connection::open(path).map_err(sql_error)?;
        let version: String = connection
            .query_row(VERSION_QUERY, [], |row| row.get(0))
            .map_err(sql_error)?;
        debug!(path, version = %version, "sqlite database opened");

        Ok(Self {
            connection,
            in_transaction: false,
        })
    }

    fn begin_if_needed(&mut self) -> SqlResult<()> {
        if !self.in_transaction {
            self.connection.execute_batch(BEGIN_SQL).map_err(sql_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn end(&mut self, sql: &str) -> SqlResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.connection.execute_batch(sql).map_err(sql_error)
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        self.begin_if_needed()?;
        // `changes()` keeps the count of the last DML statement, so DDL would report it again.
        let before = self.connection.total_changes();
        {
            let mut statement = self.connection.prepare(sql).map_err(sql_error)?;
            // Rows are drained so statements returning rows (pragmas) run too.
            let mut rows = statement.query(bind(params)).map_err(sql_error)?;
            while rows.next().map_err(sql_error)?.is_some() {}
        }
        let changed = self.connection.total_changes().saturating_sub(before);
        Ok(u64::try_from(changed).unwrap_or_default())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        self.begin_if_needed()?;
        let mut statement = self.connection.prepare(sql).map_err(sql_error)?;
        let columns = statement.column_count();
        let mut rows = statement.query(bind(params)).map_err(sql_error)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(sql_error)? {
            let values = (0..columns)
                .map(|index| row.get_ref(index).map(to_value))
                .collect::<rusqlite::Result<Row>>()
                .map_err(sql_error)?;
            result.push(values);
        }
        Ok(result)
    }

    fn describe_params(&mut self, sql: &str) -> SqlResult<Vec<ParamType>> {
        let statement = self.connection.prepare(sql).map_err(sql_error)?;
        Ok(vec![ParamType::Unknown; statement.parameter_count()])
    }

    fn commit(&mut self) -> SqlResult<()> {
        self.end(COMMIT_SQL)
    }

    fn rollback(&mut self) -> SqlResult<()> {
        self.end(ROLLBACK_SQL)
    }

    fn close(&mut self) -> SqlResult<()> {
        self.end(ROLLBACK_SQL)
    }
}

struct Param<'a>(&'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            Value::Float(value) => ToSqlOutput::Borrowed(ValueRef::Real(*value)),
            Value::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Value::Bytes(value) => ToSqlOutput::Borrowed(ValueRef::Blob(value)),
            Value::Timestamp(value) => return value.to_sql(),
        })
    }
}

fn bind(params: &[Value]) -> impl rusqlite::Params + '_ {
    params_from_iter(params.iter().map(Param))
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Integer(value),
        ValueRef::Real(value) => Value::Float(value),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Driver error with the extended result code as vendor code.
fn sql_error(source: rusqlite::Error) -> SqlError {
    let code = match &source {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code),
        _ => None,
    };
    let error = SqlError::from_source(source);
    match code {
        Some(code) => error.with_sql_code(code),
        None => error,
    }
}
