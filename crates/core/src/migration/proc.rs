use std::fmt;

use tracing::debug;

use super::{MigrationSettings, RangeBound, required, resolve_bound, write_common};
use crate::{ConfigError, ExecutionContext, Result, Value};

const STATEMENT_TYPE: &str = "MigrationProc";
const BLOCKUPDATE: &str = "g2fn.blockupdate";
const BLOCKUPDATE_RANGE: &str = "g2fn.blockupdate_ft";

/// Migration delegated to the server-side `g2fn.blockupdate` procedures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcMigration {
    pub statement: Option<String>,
    pub settings: MigrationSettings,
    pub lower: Option<RangeBound>,
    pub upper: Option<RangeBound>,
}

struct Call<'m> {
    logid: &'m str,
    max_blocks: i64,
    description: &'m str,
    statement: &'m str,
    range: Option<(&'m RangeBound, &'m RangeBound)>,
}

impl ProcMigration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.call().map(drop)
    }

    /// The ranged procedure is used when both bounds are present.
    pub fn is_ranged(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    fn call(&self) -> Result<Call<'_>, ConfigError> {
        let logid = required(self.settings.logid.as_deref(), STATEMENT_TYPE, "logid")?;
        let max_blocks = *required(self.settings.max_blocks.as_ref(), STATEMENT_TYPE, "maxblkcnt")?;
        let description =
            required(self.settings.description.as_deref(), STATEMENT_TYPE, "description")?;
        let statement = required(self.statement.as_deref(), STATEMENT_TYPE, "statement")?;

        let range = match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => {
                self.settings.validate_step(STATEMENT_TYPE)?;
                Some((lower, upper))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingParameter {
                    statement: STATEMENT_TYPE.to_string(),
                    parameter: "toid",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingParameter {
                    statement: STATEMENT_TYPE.to_string(),
                    parameter: "fromid",
                });
            }
        };

        Ok(Call {
            logid,
            max_blocks,
            description,
            statement,
            range,
        })
    }

    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let call = self.call()?;
        let dialect = ctx.dialect();

        let mut params = vec![
            Value::from(call.logid),
            Value::Integer(call.max_blocks),
            Value::from(call.description),
            Value::from(call.statement),
        ];
        let procedure = match call.range {
            Some((lower, upper)) => {
                let lower = resolve_bound(ctx, lower, "fromid")?;
                let upper = resolve_bound(ctx, upper, "toid")?;
                params.extend([
                    Value::Integer(lower),
                    Value::Integer(upper),
                    Value::Integer(self.settings.step),
                ]);
                BLOCKUPDATE_RANGE
            }
            None => BLOCKUPDATE,
        };

        let markers = (1..=params.len())
            .map(|index| dialect.bind_marker(index))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!("call {procedure}({markers})");
        ctx.execute(&sql, &params)?;
        debug!(procedure, "migration procedure called");
        Ok(())
    }
}

impl fmt::Display for ProcMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.statement.as_deref().unwrap_or_default())?;
        if let Some(lower) = &self.lower {
            write!(f, "\n  fromid: {lower}")?;
        }
        if let Some(upper) = &self.upper {
            write!(f, "\n  toid: {upper}")?;
        }
        write_common(f, &self.settings)
    }
}
