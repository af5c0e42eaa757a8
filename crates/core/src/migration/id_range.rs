use std::fmt;

use tracing::{info, trace};

use super::{
    MigrationSettings, MigrationSummary, ProcessedQuery, RangeBound, process_query, required,
    resolve_bound, write_common,
};
use crate::{ConfigError, ExecutionContext, Result, Value};

pub const BETWEEN_RANGE_PLACEHOLDER: &str = "BETWEEN_RANGE";

const STATEMENT_TYPE: &str = "MigrationIdRange";

/// Chunked update over a single numeric key, one committed window at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRangeMigration {
    pub statement: Option<String>,
    pub settings: MigrationSettings,
    pub lower: Option<RangeBound>,
    pub upper: Option<RangeBound>,
}

impl IdRangeMigration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prepare(|_| "?".to_string()).map(drop)
    }

    fn prepare(
        &self,
        bind_marker: impl Fn(usize) -> String,
    ) -> Result<(ProcessedQuery, &RangeBound, &RangeBound), ConfigError> {
        let statement = required(self.statement.as_deref(), STATEMENT_TYPE, "statement")?;
        self.settings.validate_step(STATEMENT_TYPE)?;
        let lower = required(self.lower.as_ref(), STATEMENT_TYPE, "fromid")?;
        let upper = required(self.upper.as_ref(), STATEMENT_TYPE, "toid")?;

        let processed = process_query(
            statement,
            self.settings.placeholder_or(BETWEEN_RANGE_PLACEHOLDER),
            |occurrence| {
                format!(
                    "{} and {}",
                    bind_marker(occurrence * 2 + 1),
                    bind_marker(occurrence * 2 + 2)
                )
            },
        )?;

        Ok((processed, lower, upper))
    }

    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<MigrationSummary> {
        let dialect = ctx.dialect();
        let (processed, lower, upper) = self.prepare(|index| dialect.bind_marker(index))?;

        let lower = resolve_bound(ctx, lower, "fromid")?;
        let upper = resolve_bound(ctx, upper, "toid")?;
        let step = self.settings.step;

        let mut summary = MigrationSummary::default();
        for (start, end) in IdRangeWindows::new(lower, upper, step) {
            if self
                .settings
                .block_limit()
                .is_some_and(|limit| summary.chunks >= limit)
            {
                info!(chunks = summary.chunks, "block limit reached");
                break;
            }

            let params = (0..processed.replacements)
                .flat_map(|_| [Value::Integer(start), Value::Integer(end)])
                .collect::<Vec<_>>();
            let rows = ctx.execute(&processed.statement, &params)?;
            ctx.commit_step()?;

            summary.chunks += 1;
            summary.changed_rows += rows;
            summary.processed_rows += u64::try_from(end - start + 1).unwrap_or(0);
            trace!(chunk = summary.chunks, from = start, to = end, rows, "id range chunk");
        }

        info!(
            chunks = summary.chunks,
            rows = summary.changed_rows,
            "migration finished, {} chunk(s), {} changed row(s)",
            summary.chunks,
            summary.changed_rows
        );
        Ok(summary)
    }
}

impl fmt::Display for IdRangeMigration {
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

/// Inclusive `(start, end)` windows of width `step`, starting at `lower`.
///
/// Iteration stops once the window start reaches `upper - step`, so a final
/// window shorter than `step` is never produced.
#[derive(Debug, Clone)]
pub struct IdRangeWindows {
    current: i64,
    limit: i64,
    step: i64,
}

impl IdRangeWindows {
    pub fn new(lower: i64, upper: i64, step: i64) -> Self {
        let step = step.max(1);
        Self {
            current: lower,
            limit: upper.saturating_sub(step),
            step,
        }
    }
}

impl Iterator for IdRangeWindows {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.limit {
            return None;
        }
        let start = self.current;
        let end = start.saturating_add(self.step - 1);
        self.current = start.saturating_add(self.step);
        Some((start, end))
    }
}
