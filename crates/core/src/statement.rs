use std::{collections::BTreeSet, fmt};

use tracing::{debug, info};

use crate::{
    ConfigError, CsvLoad, ExecutionContext, IdListMigration, IdRangeMigration, ProcMigration,
    Result, datafile::expand_datafiles,
};

/// One typed unit of work inside an alterscript.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterStatement {
    pub kind: StatementKind,
    pub can_fail: bool,
    pub ignored_sql_states: Option<BTreeSet<String>>,
    pub ignored_sql_codes: Option<BTreeSet<i32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Sql(String),
    Comment(String),
    /// Diagnostic query whose rows are reported.
    Select(String),
    /// Query whose first column yields statements to execute.
    Dynamic(String),
    Csv(CsvLoad),
    MigrationProc(ProcMigration),
    MigrationIdRange(IdRangeMigration),
    MigrationIdList(IdListMigration),
}

impl StatementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Sql(_) => "SQL",
            Self::Comment(_) => "Comment",
            Self::Select(_) => "Select",
            Self::Dynamic(_) => "DynamicQuery",
            Self::Csv(_) => "CSV",
            Self::MigrationProc(_) => "MigrationProc",
            Self::MigrationIdRange(_) => "MigrationIdRange",
            Self::MigrationIdList(_) => "MigrationIdList",
        }
    }
}

impl AlterStatement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            can_fail: false,
            ignored_sql_states: None,
            ignored_sql_codes: None,
        }
    }

    pub fn sql(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Sql(sql.into()))
    }

    #[must_use]
    pub fn with_can_fail(mut self, can_fail: bool) -> Self {
        self.can_fail = can_fail;
        self
    }

    #[must_use]
    pub fn ignoring_sql_state(mut self, state: impl Into<String>) -> Self {
        self.ignored_sql_states
            .get_or_insert_with(BTreeSet::new)
            .insert(state.into());
        self
    }

    #[must_use]
    pub fn ignoring_sql_code(mut self, code: i32) -> Self {
        self.ignored_sql_codes
            .get_or_insert_with(BTreeSet::new)
            .insert(code);
        self
    }

    /// Whether some failure of this statement could be ignored.
    pub fn may_be_ignored(&self) -> bool {
        self.can_fail || self.ignored_sql_states.is_some() || self.ignored_sql_codes.is_some()
    }

    pub fn ignores_sql_state(&self, state: &str) -> bool {
        self.ignored_sql_states
            .as_ref()
            .is_some_and(|states| states.contains(state))
    }

    pub fn ignores_sql_code(&self, code: i32) -> bool {
        self.ignored_sql_codes
            .as_ref()
            .is_some_and(|codes| codes.contains(&code))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.kind {
            StatementKind::Sql(text) | StatementKind::Select(text) | StatementKind::Dynamic(text) => {
                if text.trim().is_empty() {
                    return Err(ConfigError::MissingParameter {
                        statement: self.kind.type_name().to_string(),
                        parameter: "statement",
                    });
                }
                Ok(())
            }
            StatementKind::Comment(_) => Ok(()),
            StatementKind::Csv(load) => load.validate(),
            StatementKind::MigrationProc(migration) => migration.validate(),
            StatementKind::MigrationIdRange(migration) => migration.validate(),
            StatementKind::MigrationIdList(migration) => migration.validate(),
        }
    }

    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        match &self.kind {
            StatementKind::Sql(sql) => execute_sql(ctx, sql),
            StatementKind::Comment(text) => {
                debug!(comment = %text, "comment");
                Ok(())
            }
            StatementKind::Select(sql) => execute_select(ctx, sql),
            StatementKind::Dynamic(sql) => execute_dynamic(ctx, sql),
            StatementKind::Csv(load) => load.execute(ctx),
            StatementKind::MigrationProc(migration) => migration.execute(ctx),
            StatementKind::MigrationIdRange(migration) => migration.execute(ctx).map(drop),
            StatementKind::MigrationIdList(migration) => migration.execute(ctx).map(drop),
        }
    }
}

impl fmt::Display for AlterStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind.type_name())?;
        match &self.kind {
            StatementKind::Sql(text)
            | StatementKind::Comment(text)
            | StatementKind::Select(text)
            | StatementKind::Dynamic(text) => f.write_str(text),
            StatementKind::Csv(load) => write!(f, "{load}"),
            StatementKind::MigrationProc(migration) => write!(f, "{migration}"),
            StatementKind::MigrationIdRange(migration) => write!(f, "{migration}"),
            StatementKind::MigrationIdList(migration) => write!(f, "{migration}"),
        }
    }
}

fn execute_sql(ctx: &mut ExecutionContext<'_>, sql: &str) -> Result<()> {
    let bound = expand_datafiles(sql, ctx.datafiles(), ctx.dialect(), 0)?;
    let rows = ctx.execute(&bound.sql, &bound.params)?;
    debug!(rows, "statement changed {rows} row(s)");
    Ok(())
}

fn execute_select(ctx: &mut ExecutionContext<'_>, sql: &str) -> Result<()> {
    let bound = expand_datafiles(sql, ctx.datafiles(), ctx.dialect(), 0)?;
    let rows = ctx.query(&bound.sql, &bound.params)?;
    for row in &rows {
        let rendered = row
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        info!(row = %rendered, "select");
    }
    debug!(rows = rows.len(), "select returned {} row(s)", rows.len());
    Ok(())
}

fn execute_dynamic(ctx: &mut ExecutionContext<'_>, sql: &str) -> Result<()> {
    let bound = expand_datafiles(sql, ctx.datafiles(), ctx.dialect(), 0)?;
    let generated = ctx.query(&bound.sql, &bound.params)?;

    let mut statements = 0_usize;
    let mut changed = 0_u64;
    for row in generated {
        let Some(statement) = row.first().and_then(crate::Value::as_text) else {
            continue;
        };
        debug!(statement = %statement, "dynamic statement");
        changed += ctx.execute(&statement, &[])?;
        statements += 1;
    }
    debug!(statements, rows = changed, "dynamic query executed {statements} statement(s)");
    Ok(())
}
