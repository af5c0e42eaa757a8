use std::fmt;

use tracing::{debug, info, trace, warn};

use super::{MigrationSettings, MigrationSummary, process_query, required, write_common};
use crate::{BATCH_SAVEPOINT_NAME, ConfigError, ExecutionContext, Result, StatementError};

pub const ID_LIST_PLACEHOLDER: &str = "ID_LIST";

const STATEMENT_TYPE: &str = "MigrationIdList";
const IDS_TABLE: &str = "migration_ids";
const BATCH_TABLE: &str = "migration_batch";

/// Chunked update over keys produced by an arbitrary query.
///
/// The keys are staged once into a session table and drained `step` rows at
/// a time through a batch table that the main statement selects from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdListMigration {
    pub statement: Option<String>,
    pub settings: MigrationSettings,
    /// Query producing the keys to process.
    pub id_query: Option<String>,
    /// Comma-separated key columns of `id_query`'s result.
    pub id_column: Option<String>,
}

struct Plan<'m> {
    main: String,
    id_query: &'m str,
    key_columns: &'m str,
}

impl IdListMigration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plan("migration_batch").map(drop)
    }

    fn plan(&self, batch_table: &str) -> Result<Plan<'_>, ConfigError> {
        let statement = required(self.statement.as_deref(), STATEMENT_TYPE, "statement")?;
        self.settings.validate_step(STATEMENT_TYPE)?;
        let id_query = required(self.id_query.as_deref(), STATEMENT_TYPE, "idquery")?;
        let key_columns = required(self.id_column.as_deref(), STATEMENT_TYPE, "idcolumn")?;
        if key_columns.trim().is_empty() {
            return Err(ConfigError::MissingParameter {
                statement: STATEMENT_TYPE.to_string(),
                parameter: "idcolumn",
            });
        }

        let processed = process_query(
            statement,
            self.settings.placeholder_or(ID_LIST_PLACEHOLDER),
            |_| format!("(select * from {batch_table})"),
        )?;

        Ok(Plan {
            main: processed.statement,
            id_query,
            key_columns,
        })
    }

    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<MigrationSummary> {
        let dialect = ctx.dialect();
        let ids = dialect.temp_table_name(IDS_TABLE);
        let batch = dialect.temp_table_name(BATCH_TABLE);
        let plan = self.plan(&batch)?;

        for base in [IDS_TABLE, BATCH_TABLE] {
            for sql in dialect.create_temp_table_sql(base, plan.id_query) {
                ctx.execute(&sql, &[])?;
            }
        }
        let staged = ctx.execute(&format!("insert into {ids} {}", plan.id_query), &[])?;
        debug!(rows = staged, "staged {staged} id row(s)");

        // A NULL key never matches the drain, so it would be copied again on every batch.
        let null_keys = plan
            .key_columns
            .split(',')
            .map(|column| format!("{} is null", column.trim()))
            .collect::<Vec<_>>()
            .join(" or ");
        let without_key = ctx.execute(&format!("delete from {ids} where {null_keys}"), &[])?;
        if without_key > 0 {
            warn!(rows = without_key, "skipping {without_key} id row(s) with a NULL key");
        }

        let copy_sql = dialect.copy_rows_sql(&ids, &batch, self.settings.step);
        let drain_sql = format!(
            "delete from {ids} where ({columns}) in (select {columns} from {batch})",
            columns = plan.key_columns
        );
        let clean_sql = format!("delete from {batch}");
        let commits = ctx.run_mode().commits();

        let mut summary = MigrationSummary::default();
        loop {
            if self
                .settings
                .block_limit()
                .is_some_and(|limit| summary.chunks >= limit)
            {
                info!(chunks = summary.chunks, "block limit reached");
                break;
            }

            let copied = ctx.execute(&copy_sql, &[])?;
            if copied == 0 {
                break;
            }

            let changed = if commits {
                ctx.execute(&plan.main, &[])?
            } else {
                ctx.savepoint(BATCH_SAVEPOINT_NAME)?;
                let changed = ctx.execute(&plan.main, &[])?;
                ctx.rollback_to_savepoint(BATCH_SAVEPOINT_NAME)?;
                changed
            };
            let drained = ctx.execute(&drain_sql, &[])?;
            if drained < copied {
                return Err(StatementError::failed(
                    drain_sql.as_str(),
                    format!("only {drained} of {copied} batch id row(s) left the id table"),
                )
                .into());
            }
            ctx.execute(&clean_sql, &[])?;
            if commits {
                ctx.commit_step()?;
            }

            summary.chunks += 1;
            summary.processed_rows += copied;
            summary.changed_rows += changed;
            trace!(chunk = summary.chunks, ids = copied, rows = changed, "id list batch");
        }

        info!(
            chunks = summary.chunks,
            processed = summary.processed_rows,
            rows = summary.changed_rows,
            "migration finished, {} id(s) processed, {} changed row(s)",
            summary.processed_rows,
            summary.changed_rows
        );
        Ok(summary)
    }
}

impl fmt::Display for IdListMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.statement.as_deref().unwrap_or_default())?;
        if let Some(id_query) = &self.id_query {
            write!(f, "\n  idquery: {id_query}")?;
        }
        if let Some(id_column) = &self.id_column {
            write!(f, "\n  idcolumn: {id_column}")?;
        }
        write_common(f, &self.settings)
    }
}
