use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::CheckType;

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type SqlResult<T> = std::result::Result<T, SqlError>;
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Failure reported by a database driver, carrying the vendor diagnostics the
/// ignorable-failure policy looks at.
#[derive(Debug)]
pub struct SqlError {
    message: String,
    sql_state: Option<String>,
    sql_code: Option<i32>,
    source: Option<BoxedError>,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            sql_code: None,
            source: None,
        }
    }

    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            sql_state: None,
            sql_code: None,
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    #[must_use]
    pub fn with_sql_code(mut self, sql_code: i32) -> Self {
        self.sql_code = Some(sql_code);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    pub fn sql_code(&self) -> Option<i32> {
        self.sql_code
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match (&self.sql_state, self.sql_code) {
            (Some(state), Some(code)) => write!(f, " (SQLSTATE={state}, SQLCODE={code})"),
            (Some(state), None) => write!(f, " (SQLSTATE={state})"),
            (None, Some(code)) => write!(f, " (SQLCODE={code})"),
            (None, None) => Ok(()),
        }
    }
}

impl StdError for SqlError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown database type `{instance_type}` in alterscript `{alterscript}`; possible values: {known:?}")]
    UnknownInstanceType {
        instance_type: String,
        alterscript: String,
        known: Vec<String>,
    },
    #[error("invalid alterscript: missing `{parameter}` for {statement}")]
    MissingParameter {
        statement: String,
        parameter: &'static str,
    },
    #[error("invalid alterscript: invalid `{parameter}` for {statement}: {reason}")]
    InvalidParameter {
        statement: String,
        parameter: &'static str,
        reason: String,
    },
    #[error("invalid placeholder, not a valid regex: `{placeholder}`")]
    InvalidPlaceholder {
        placeholder: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid query (missing `{placeholder}` placeholder): {statement}")]
    PlaceholderNotFound {
        placeholder: String,
        statement: String,
    },
    #[error("invalid check `{check}`: {reason}")]
    InvalidCheck { check: String, reason: &'static str },
    #[error("missing datafile `{name}`")]
    MissingDatafile { name: String },
    #[error("datafile `{name}` is not valid UTF-8 text")]
    DatafileEncoding {
        name: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("unknown database engine `{engine}`")]
    UnknownEngine { engine: String },
    #[error("incremental mode requires the log table")]
    IncrementalWithoutLogTable,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("can not acquire db connection for {url} (instance `{instance}`)")]
    Open {
        instance: String,
        url: String,
        #[source]
        source: SqlError,
    },
    #[error("no driver for engine {engine} is available to open instance `{instance}`")]
    DriverUnavailable { engine: String, instance: String },
    #[error("can not {action} on instance `{instance}`")]
    Session {
        instance: String,
        action: String,
        #[source]
        source: SqlError,
    },
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("statement failed: {sql}")]
    Sql {
        sql: String,
        #[source]
        source: SqlError,
    },
    #[error("{statement}: {message}")]
    Failed { statement: String, message: String },
}

impl StatementError {
    pub fn sql(sql: impl Into<String>, source: SqlError) -> Self {
        Self::Sql {
            sql: sql.into(),
            source,
        }
    }

    pub fn failed(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            statement: statement.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("dialect {dialect} does not support check type {check_type}")]
    Unsupported {
        dialect: &'static str,
        check_type: CheckType,
    },
    #[error("can not check {check}")]
    Query {
        check: String,
        #[source]
        source: SqlError,
    },
}

/// One unrecovered failure of an alterscript on one instance.
#[derive(Debug)]
pub struct Failure {
    pub alterscript: String,
    pub instance: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct AggregateError {
    failures: Vec<Failure>,
}

impl AggregateError {
    #[must_use]
    pub fn new(failures: Vec<Failure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<Failure> {
        self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} alterscript failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "\n[{} @ {}] {}",
                failure.alterscript,
                failure.instance,
                failure.error.message_chain().join(": ")
            )?;
        }
        Ok(())
    }
}

impl StdError for AggregateError {}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl Error {
    /// Driver diagnostics of a failed SQL statement, if that is what failed.
    pub fn sql_error(&self) -> Option<&SqlError> {
        match self {
            Self::Statement(StatementError::Sql { source, .. }) => Some(source),
            _ => None,
        }
    }

    /// Messages from this error down through every `source()`, cause by cause.
    pub fn message_chain(&self) -> Vec<String> {
        if let Self::Aggregate(aggregate) = self {
            return aggregate
                .failures()
                .iter()
                .flat_map(|failure| {
                    let mut chain = failure.error.message_chain();
                    if let Some(first) = chain.first_mut() {
                        *first = format!(
                            "[{} @ {}] {first}",
                            failure.alterscript, failure.instance
                        );
                    }
                    chain
                })
                .collect();
        }

        let mut chain = vec![self.to_string()];
        let mut cause = StdError::source(self);
        while let Some(error) = cause {
            chain.push(error.to_string());
            cause = error.source();
        }
        chain
    }
}
