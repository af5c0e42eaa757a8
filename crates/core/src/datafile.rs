use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::{ConfigError, Datafiles, Dialect, Value};

static DATAFILE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i):(blob|clob)\(([^)\s]+)\)").expect("datafile reference pattern is valid")
});

/// Statement text with datafile references turned into bind markers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Replaces `:blob(name)` / `:clob(name)` references to known datafiles with
/// bind markers numbered after `preceding_params` already-bound parameters.
/// References to unknown names stay in the text as written.
pub fn expand_datafiles(
    sql: &str,
    datafiles: &Datafiles,
    dialect: &dyn Dialect,
    preceding_params: usize,
) -> Result<BoundSql, ConfigError> {
    let mut params = Vec::new();
    let mut failure = None;

    let expanded = DATAFILE_REFERENCE.replace_all(sql, |captures: &Captures<'_>| {
        let whole = captures[0].to_string();
        let Some(bytes) = datafiles.get(&captures[2]) else {
            return whole;
        };

        let value = if captures[1].eq_ignore_ascii_case("clob") {
            match String::from_utf8(bytes.clone()) {
                Ok(text) => Value::Text(text),
                Err(source) => {
                    failure.get_or_insert(ConfigError::DatafileEncoding {
                        name: captures[2].to_string(),
                        source,
                    });
                    return whole;
                }
            }
        } else {
            Value::Bytes(bytes.clone())
        };

        params.push(value);
        dialect.bind_marker(preceding_params + params.len())
    });

    if let Some(error) = failure {
        return Err(error);
    }

    Ok(BoundSql {
        sql: expanded.into_owned(),
        params,
    })
}
