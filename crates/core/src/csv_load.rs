use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::{
    ConfigError, ExecutionContext, ParamType, Result, StatementError, Value,
    datafile::expand_datafiles,
};

const STATEMENT_TYPE: &str = "CSV";
const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d-%H.%M.%S%.f",
];

/// Executes `statement` once per data row of a CSV datafile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvLoad {
    pub statement: String,
    /// Datafile name; the first row is a header naming the columns.
    pub file: String,
    /// Rows between commit steps; absent or zero never commits midway.
    pub step: Option<u32>,
}

impl CsvLoad {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.statement.trim().is_empty() {
            return Err(ConfigError::MissingParameter {
                statement: STATEMENT_TYPE.to_string(),
                parameter: "statement",
            });
        }
        if self.file.trim().is_empty() {
            return Err(ConfigError::MissingParameter {
                statement: STATEMENT_TYPE.to_string(),
                parameter: "file",
            });
        }
        Ok(())
    }

    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let raw = ctx
            .datafiles()
            .get(&self.file)
            .ok_or_else(|| ConfigError::MissingDatafile {
                name: self.file.clone(),
            })?;
        let text = std::str::from_utf8(raw)
            .map_err(|error| self.failure(format!("file is not valid UTF-8: {error}")))?;
        let mut records = parse_csv(text)
            .map_err(|reason| self.failure(reason))?
            .into_iter();
        let header = records
            .next()
            .ok_or_else(|| self.failure("file has no header row"))?;
        debug!(columns = ?header, "CSV columns");

        // Datafile parameters are bound after the CSV columns.
        let bound = expand_datafiles(
            self.statement.trim(),
            ctx.datafiles(),
            ctx.dialect(),
            header.len(),
        )?;
        let param_types = ctx.describe_params(&bound.sql)?;
        if param_types.len() != header.len() + bound.params.len() {
            return Err(self
                .failure(format!(
                    "invalid CSV: {} columns for {} query parameters",
                    header.len(),
                    param_types.len().saturating_sub(bound.params.len())
                ))
                .into());
        }

        let step = self.step.filter(|step| *step > 0).map(u64::from);
        let mut executions = 0_u64;
        let mut changed = 0_u64;
        for (line, record) in records.enumerate() {
            if record.len() < header.len() {
                return Err(self
                    .failure(format!(
                        "row {} has {} fields, header has {}",
                        line + 2,
                        record.len(),
                        header.len()
                    ))
                    .into());
            }

            let mut params = record
                .iter()
                .zip(&param_types)
                .map(|(field, param_type)| convert_field(field, *param_type))
                .collect::<Result<Vec<_>, String>>()
                .map_err(|reason| self.failure(format!("row {}: {reason}", line + 2)))?;
            params.extend(bound.params.iter().cloned());

            changed += ctx.execute(&bound.sql, &params)?;
            executions += 1;

            if step.is_some_and(|step| executions % step == 0) {
                ctx.commit_step()?;
            }
        }

        debug!(
            executions,
            rows = changed,
            "statement executed {executions} times, changed rows: {changed}"
        );
        Ok(())
    }

    fn failure(&self, message: impl Into<String>) -> StatementError {
        StatementError::failed(format!("{STATEMENT_TYPE} {}", self.file), message)
    }
}

impl fmt::Display for CsvLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n  file: {}", self.statement, self.file)?;
        if let Some(step) = self.step {
            write!(f, "\n  step: {step}")?;
        }
        Ok(())
    }
}

/// Converts one CSV field for a parameter of the given type. Empty fields are
/// NULL except for text parameters.
pub fn convert_field(field: &str, param_type: ParamType) -> Result<Value, String> {
    if param_type.is_textual() {
        return Ok(Value::Text(field.to_string()));
    }
    if field.is_empty() {
        return Ok(Value::Null);
    }

    match param_type {
        ParamType::Integer => field
            .trim()
            .parse()
            .map(Value::Integer)
            .map_err(|error| format!("invalid integer `{field}`: {error}")),
        ParamType::Float => field
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|error| format!("invalid number `{field}`: {error}")),
        ParamType::Decimal => field
            .trim()
            .parse::<f64>()
            .map(|_| Value::Text(field.trim().to_string()))
            .map_err(|error| format!("invalid number `{field}`: {error}")),
        ParamType::Boolean => parse_boolean(field.trim())
            .map(|value| Value::Integer(i64::from(value)))
            .ok_or_else(|| format!("invalid boolean `{field}`")),
        ParamType::Date => NaiveDate::parse_from_str(field.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .or_else(|| parse_timestamp(field.trim()))
            .map(Value::Timestamp)
            .ok_or_else(|| format!("invalid date `{field}`")),
        ParamType::Timestamp => parse_timestamp(field.trim())
            .map(Value::Timestamp)
            .ok_or_else(|| format!("invalid timestamp `{field}`")),
        ParamType::Binary => Ok(Value::Bytes(field.as_bytes().to_vec())),
        ParamType::Text | ParamType::Unknown => Ok(Value::Text(field.to_string())),
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" => Some(true),
        "0" | "f" | "false" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Splits CSV text into records. Double quotes enclose fields that contain
/// commas, quotes (doubled) or line breaks; blank lines are skipped.
pub fn parse_csv(input: &str) -> Result<Vec<Vec<String>>, String> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes())
        .into_records()
        .map(|record| {
            record
                .map(|record| record.iter().map(str::to_string).collect())
                .map_err(|error| error.to_string())
        })
        .collect()
}
