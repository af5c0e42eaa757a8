use std::{error::Error as StdError, str::FromStr};

use applyalter_core::{ConnectionConfig, ParamType, Row, SqlError, SqlResult, Value};
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime};
use postgres::{
    Client, NoTls, SimpleQueryMessage,
    types::{IsNull, ToSql, Type, to_sql_checked},
};
use rust_decimal::Decimal;
use tracing::debug;

const BEGIN_SQL: &str = "BEGIN";
const COMMIT_SQL: &str = "COMMIT";
const ROLLBACK_SQL: &str = "ROLLBACK";
const DEFAULT_HOST: &str = "127.0.0.1";
const ROLE_KEY: &str = "postgres.role";
const APPLICATION_NAME: &str = "applyalter";

/// A PostgreSQL session that keeps a transaction open between commits.
pub struct PostgresConnection {
    client: Client,
    in_transaction: bool,
}

impl PostgresConnection {
    pub fn connect(config: &ConnectionConfig) -> SqlResult<Self> {
        let mut postgres_config = postgres::Config::new();
        if let Some(socket_path) = &config.socket {
            postgres_config.host_path(socket_path);
        } else {
            postgres_config.host(config.host.as_deref().unwrap_or(DEFAULT_HOST));
        }
        if let Some(port) = config.port {
            postgres_config.port(port);
        }
        if let Some(user) = &config.user {
            postgres_config.user(user);
        }
        if let Some(password) = &config.password {
            postgres_config.password(password);
        }
        postgres_config
            .dbname(&config.database)
            .application_name(APPLICATION_NAME);

        let mut client = postgres_config.connect(NoTls).map_err(sql_error)?;
        if let Some(role) = config.extra.get(ROLE_KEY) {
            client
                .batch_execute(&format!("set role {role}"))
                .map_err(sql_error)?;
        }
        let version = client
            .query_one("show server_version", &[])
            .and_then(|row| row.try_get::<_, String>(0))
            .map_err(sql_error)?;
        debug!(database = %config.database, version = %version, "postgres session opened");

        Ok(Self {
            client,
            in_transaction: false,
        })
    }

    fn begin_if_needed(&mut self) -> SqlResult<()> {
        if !self.in_transaction {
            self.client.batch_execute(BEGIN_SQL).map_err(sql_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn end(&mut self, sql: &str) -> SqlResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client.batch_execute(sql).map_err(sql_error)
    }
}

impl applyalter_core::Connection for PostgresConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        self.begin_if_needed()?;
        if params.is_empty() {
            // The simple protocol also accepts scripts such as function bodies.
            let messages = self.client.simple_query(sql).map_err(sql_error)?;
            return Ok(messages
                .iter()
                .rev()
                .find_map(|message| match message {
                    SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                    _ => None,
                })
                .unwrap_or_default());
        }
        let params = params.iter().map(Param).collect::<Vec<_>>();
        self.client
            .execute(sql, &references(&params))
            .map_err(sql_error)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        self.begin_if_needed()?;
        if params.is_empty() {
            let messages = self.client.simple_query(sql).map_err(sql_error)?;
            return Ok(messages
                .iter()
                .filter_map(|message| match message {
                    SimpleQueryMessage::Row(row) => Some(
                        (0..row.len())
                            .map(|index| row.get(index).map_or(Value::Null, Value::from))
                            .collect(),
                    ),
                    _ => None,
                })
                .collect());
        }

        let params = params.iter().map(Param).collect::<Vec<_>>();
        let rows = self
            .client
            .query(sql, &references(&params))
            .map_err(sql_error)?;
        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|index| column_value(row, index))
                    .collect::<SqlResult<Row>>()
            })
            .collect()
    }

    fn describe_params(&mut self, sql: &str) -> SqlResult<Vec<ParamType>> {
        let statement = self.client.prepare(sql).map_err(sql_error)?;
        Ok(statement.params().iter().map(param_type).collect())
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

/// Binds a [`Value`] to whatever type the server inferred for the parameter.
///
/// Values are converted to the binary format of that type; types without a
/// conversion accept only text and fail otherwise instead of sending text
/// bytes where binary ones are expected.
#[derive(Debug)]
struct Param<'a>(&'a Value);

type ToSqlResult = Result<IsNull, Box<dyn StdError + Sync + Send>>;

impl ToSql for Param<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => bool_value(value)?.to_sql(ty, out),
            Type::INT2 | Type::INT4 | Type::INT8 => integer_to_sql(integer_value(value)?, ty, out),
            Type::FLOAT4 | Type::FLOAT8 => float_to_sql(float_value(value)?, ty, out),
            Type::NUMERIC => decimal_value(value)?.to_sql(ty, out),
            Type::DATE => timestamp_value(value)?.date().to_sql(ty, out),
            Type::TIMESTAMP => timestamp_value(value)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => timestamp_value(value)?.and_utc().to_sql(ty, out),
            Type::BYTEA => match value {
                Value::Bytes(bytes) => bytes.as_slice().to_sql(ty, out),
                other => other.to_string().as_bytes().to_sql(ty, out),
            },
            _ if <&str as ToSql>::accepts(ty) => value.to_string().as_str().to_sql(ty, out),
            _ => Err(unsupported(value, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn unsupported(value: &Value, ty: &Type) -> Box<dyn StdError + Sync + Send> {
    format!("can not bind `{value}` to a parameter of type {ty}; cast the parameter in the statement").into()
}

fn integer_value(value: &Value) -> Result<i64, Box<dyn StdError + Sync + Send>> {
    match value {
        Value::Integer(number) => Ok(*number),
        Value::Text(text) => Ok(text.trim().parse()?),
        other => other.as_i64().ok_or_else(|| format!("`{other}` is not an integer").into()),
    }
}

fn float_value(value: &Value) -> Result<f64, Box<dyn StdError + Sync + Send>> {
    match value {
        Value::Float(number) => Ok(*number),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(number) => Ok(*number as f64),
        other => Ok(other.to_string().trim().parse()?),
    }
}

fn decimal_value(value: &Value) -> Result<Decimal, Box<dyn StdError + Sync + Send>> {
    match value {
        Value::Integer(number) => Ok(Decimal::from(*number)),
        Value::Float(number) => Ok(Decimal::try_from(*number)?),
        other => {
            let text = other.to_string();
            let text = text.trim();
            Ok(Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text))?)
        }
    }
}

fn bool_value(value: &Value) -> Result<bool, Box<dyn StdError + Sync + Send>> {
    match value {
        Value::Integer(number) => Ok(*number != 0),
        other => match other.to_string().trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
            "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
            _ => Err(format!("`{other}` is not a boolean").into()),
        },
    }
}

fn timestamp_value(value: &Value) -> Result<NaiveDateTime, Box<dyn StdError + Sync + Send>> {
    match value {
        Value::Timestamp(timestamp) => Ok(*timestamp),
        other => {
            let text = other.to_string();
            let text = text.trim();
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })
                .ok_or_else(|| format!("`{text}` is not a timestamp").into())
        }
    }
}

fn integer_to_sql(value: i64, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
    match *ty {
        Type::INT2 => i16::try_from(value)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(value)?.to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

fn float_to_sql(value: f64, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
    match *ty {
        #[allow(clippy::cast_possible_truncation)]
        Type::FLOAT4 => (value as f32).to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

fn references<'p>(params: &'p [Param<'_>]) -> Vec<&'p (dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| param as &(dyn ToSql + Sync))
        .collect()
}

fn column_value(row: &postgres::Row, index: usize) -> SqlResult<Value> {
    let ty = row.columns()[index].type_().clone();
    let value = match ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(index).map(|v| v.map(i64::from).into()),
        Type::INT4 => row.try_get::<_, Option<i32>>(index).map(|v| v.map(i64::from).into()),
        Type::INT8 => row.try_get::<_, Option<i64>>(index).map(Value::from),
        Type::OID => row
            .try_get::<_, Option<u32>>(index)
            .map(|v| v.map(i64::from).into()),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(index)
            .map(|v| v.map(i64::from).into()),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map(|v| v.map_or(Value::Null, |v| Value::Float(f64::from(v)))),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(index)
            .map(|v| v.map_or(Value::Null, Value::Float)),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(index)
            .map(|v| v.map_or(Value::Null, Value::Bytes)),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(index)
            .map(|v| v.map_or(Value::Null, |v| Value::Text(v.to_string()))),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)
            .map(|v| {
                v.and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map_or(Value::Null, Value::Timestamp)
            }),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map(|v| v.map_or(Value::Null, Value::Timestamp)),
        _ => row.try_get::<_, Option<String>>(index).map(Value::from),
    };
    value.map_err(sql_error)
}

fn param_type(ty: &Type) -> ParamType {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => ParamType::Integer,
        Type::FLOAT4 | Type::FLOAT8 => ParamType::Float,
        Type::NUMERIC => ParamType::Decimal,
        Type::BOOL => ParamType::Boolean,
        Type::DATE => ParamType::Date,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => ParamType::Timestamp,
        Type::BYTEA => ParamType::Binary,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => ParamType::Text,
        _ => ParamType::Unknown,
    }
}

/// Driver error carrying the server SQLSTATE and, for server errors, just
/// the server message.
fn sql_error(source: postgres::Error) -> SqlError {
    let sql_state = source.code().map(|state| state.code().to_string());
    let message = source.as_db_error().map(|db| db.message().to_string());
    let mut error = SqlError::from_source(source);
    if let Some(message) = message {
        error = error.with_message(message);
    }
    match sql_state {
        Some(state) => error.with_sql_state(state),
        None => error,
    }
}
