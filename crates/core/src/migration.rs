mod id_list;
mod id_range;
mod proc;

use std::fmt;

use regex::{Captures, Regex};

use crate::{ConfigError, ExecutionContext, Result, StatementError, connection::query_scalar};

pub use id_list::{IdListMigration, ID_LIST_PLACEHOLDER};
pub use id_range::{IdRangeMigration, IdRangeWindows, BETWEEN_RANGE_PLACEHOLDER};
pub use proc::ProcMigration;

pub const DEFAULT_STEP: i64 = 20_000;

/// Parameters shared by every migration statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    pub logid: Option<String>,
    pub description: Option<String>,
    /// Upper limit on processed chunks; zero or absent means unlimited.
    pub max_blocks: Option<i64>,
    pub step: i64,
    /// Regular expression overriding the default placeholder token.
    pub placeholder: Option<String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            logid: None,
            description: None,
            max_blocks: None,
            step: DEFAULT_STEP,
            placeholder: None,
        }
    }
}

impl MigrationSettings {
    fn validate_step(&self, statement: &str) -> Result<(), ConfigError> {
        if self.step < 1 {
            return Err(ConfigError::InvalidParameter {
                statement: statement.to_string(),
                parameter: "step",
                reason: format!("must be positive, got {}", self.step),
            });
        }
        Ok(())
    }

    fn block_limit(&self) -> Option<u64> {
        self.max_blocks
            .filter(|limit| *limit > 0)
            .and_then(|limit| u64::try_from(limit).ok())
    }

    fn placeholder_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.placeholder.as_deref().unwrap_or(default)
    }
}

/// Bound of an id range: a literal, or an SQL expression evaluated once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeBound {
    Literal(i64),
    Expression(String),
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Expression(expression) => f.write_str(expression),
        }
    }
}

/// Totals reported when a chunked migration finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub chunks: u64,
    pub changed_rows: u64,
    pub processed_rows: u64,
}

/// Statement text after placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedQuery {
    pub statement: String,
    pub replacements: usize,
}

/// Replaces every match of `placeholder` (a regular expression) in `raw`,
/// calling `replacement` with the 0-based occurrence index. Zero matches is a
/// configuration error.
pub fn process_query(
    raw: &str,
    placeholder: &str,
    mut replacement: impl FnMut(usize) -> String,
) -> Result<ProcessedQuery, ConfigError> {
    let pattern = Regex::new(placeholder).map_err(|source| ConfigError::InvalidPlaceholder {
        placeholder: placeholder.to_string(),
        source,
    })?;

    let mut replacements = 0;
    let statement = pattern
        .replace_all(raw, |_: &Captures<'_>| {
            let text = replacement(replacements);
            replacements += 1;
            text
        })
        .into_owned();

    if replacements == 0 {
        return Err(ConfigError::PlaceholderNotFound {
            placeholder: placeholder.to_string(),
            statement: raw.to_string(),
        });
    }

    Ok(ProcessedQuery {
        statement,
        replacements,
    })
}

fn required<'a, T>(
    value: Option<&'a T>,
    statement: &str,
    parameter: &'static str,
) -> Result<&'a T, ConfigError>
where
    T: ?Sized,
{
    value.ok_or_else(|| ConfigError::MissingParameter {
        statement: statement.to_string(),
        parameter,
    })
}

fn resolve_bound(ctx: &mut ExecutionContext<'_>, bound: &RangeBound, name: &str) -> Result<i64> {
    let expression = match bound {
        RangeBound::Literal(value) => return Ok(*value),
        RangeBound::Expression(expression) => expression,
    };

    let sql = ctx.dialect().scalar_query_sql(expression);
    let value = query_scalar(ctx.raw_connection(), &sql, &[])
        .map_err(|source| StatementError::sql(&sql, source))?;

    value.as_ref().and_then(crate::Value::as_i64).ok_or_else(|| {
        StatementError::failed(
            sql.clone(),
            format!("{name} expression did not produce an integer (got {value:?})"),
        )
        .into()
    })
}

fn write_common(f: &mut fmt::Formatter<'_>, settings: &MigrationSettings) -> fmt::Result {
    if let Some(logid) = &settings.logid {
        write!(f, "\n  logid: {logid}")?;
    }
    if let Some(description) = &settings.description {
        write!(f, "\n  description: {description}")?;
    }
    if let Some(max_blocks) = settings.max_blocks {
        write!(f, "\n  maxblkcnt: {max_blocks}")?;
    }
    write!(f, "\n  step: {}", settings.step)?;
    if let Some(placeholder) = &settings.placeholder {
        write!(f, "\n  placeholder: {placeholder}")?;
    }
    Ok(())
}
