use applyalter_core::{ConnectionConfig, ParamType, Row, SqlError, SqlResult, Value};
use chrono::{Datelike, NaiveDate, Timelike};
use mysql::{Conn, OptsBuilder, Params, prelude::Queryable};
use tracing::debug;

const BEGIN_SQL: &str = "BEGIN";
const COMMIT_SQL: &str = "COMMIT";
const ROLLBACK_SQL: &str = "ROLLBACK";
const VERSION_QUERY: &str = "select version()";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3306;

/// A MySQL session that keeps a transaction open between commits. DDL still
/// commits implicitly, as it always does on MySQL.
pub struct MysqlConnection {
    connection: Conn,
    in_transaction: bool,
}

impl MysqlConnection {
    pub fn connect(config: &ConnectionConfig) -> SqlResult<Self> {
        let mut builder = OptsBuilder::new()
            .ip_or_hostname(config.host.clone().or(Some(DEFAULT_HOST.to_string())))
            .tcp_port(config.port.unwrap_or(DEFAULT_PORT))
            .user(config.user.clone())
            .pass(config.password.clone())
            .db_name(Some(config.database.clone()));
        if let Some(socket) = &config.socket {
            builder = builder.socket(Some(socket.clone()));
        }

        let mut connection = Conn::new(builder).map_err(sql_error)?;
        let version = connection
            .query_first::<String, _>(VERSION_QUERY)
            .map_err(sql_error)?
            .unwrap_or_default();
        debug!(database = %config.database, version = %version, "mysql session opened");

        Ok(Self {
            connection,
            in_transaction: false,
        })
    }

    fn begin_if_needed(&mut self) -> SqlResult<()> {
        if !self.in_transaction {
            self.connection.query_drop(BEGIN_SQL).map_err(sql_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn end(&mut self, sql: &str) -> SqlResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.connection.query_drop(sql).map_err(sql_error)
    }
}

impl applyalter_core::Connection for MysqlConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        self.begin_if_needed()?;
        // Not every statement can be prepared, so parameterless ones go as text.
        if params.is_empty() {
            self.connection.query_drop(sql).map_err(sql_error)?;
        } else {
            self.connection
                .exec_drop(sql, positional(params))
                .map_err(sql_error)?;
        }
        Ok(self.connection.affected_rows())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        self.begin_if_needed()?;
        let rows = if params.is_empty() {
            self.connection
                .query::<mysql::Row, _>(sql)
                .map_err(sql_error)?
        } else {
            self.connection
                .exec::<mysql::Row, _, _>(sql, positional(params))
                .map_err(sql_error)?
        };
        Ok(rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(from_mysql).collect())
            .collect())
    }

    // The server reports no useful parameter types, only their count.
    fn describe_params(&mut self, sql: &str) -> SqlResult<Vec<ParamType>> {
        let statement = self.connection.prep(sql).map_err(sql_error)?;
        let count = usize::from(statement.num_params());
        self.connection.close(statement).map_err(sql_error)?;
        Ok(vec![ParamType::Unknown; count])
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

fn positional(params: &[Value]) -> Params {
    Params::Positional(params.iter().map(to_mysql).collect())
}

fn to_mysql(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Integer(value) => mysql::Value::Int(*value),
        Value::Float(value) => mysql::Value::Double(*value),
        Value::Text(value) => mysql::Value::Bytes(value.as_bytes().to_vec()),
        Value::Bytes(value) => mysql::Value::Bytes(value.clone()),
        Value::Timestamp(value) => mysql::Value::Date(
            u16::try_from(value.year()).unwrap_or_default(),
            value.month() as u8,
            value.day() as u8,
            value.hour() as u8,
            value.minute() as u8,
            value.second() as u8,
            value.nanosecond() / 1_000,
        ),
    }
}

fn from_mysql(value: mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Int(value) => Value::Integer(value),
        mysql::Value::UInt(value) => {
            i64::try_from(value).map_or_else(|_| Value::Text(value.to_string()), Value::Integer)
        }
        mysql::Value::Float(value) => Value::Float(f64::from(value)),
        mysql::Value::Double(value) => Value::Float(value),
        mysql::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(error) => Value::Bytes(error.into_bytes()),
        },
        mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map_or(Value::Null, Value::Timestamp)
        }
        mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let hours = days * 24 + u32::from(hours);
            Value::Text(format!(
                "{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

/// Driver error carrying the server error number as vendor code and the
/// SQLSTATE.
fn sql_error(source: mysql::Error) -> SqlError {
    let server = match &source {
        mysql::Error::MySqlError(server) => Some(server.clone()),
        _ => None,
    };
    let error = SqlError::from_source(source);
    match server {
        Some(server) => error
            .with_message(server.message)
            .with_sql_state(server.state)
            .with_sql_code(i32::from(server.code)),
        None => error,
    }
}
