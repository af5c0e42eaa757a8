use tracing::{debug, warn};

use crate::{
    AlterStatement, Connection, Datafiles, Dialect, Error, Result, Row, RunMode, SAVEPOINT_NAME,
    SqlResult, StatementError, Value,
};

/// Everything a statement needs while it runs on one instance.
pub struct ExecutionContext<'a> {
    connection: &'a mut dyn Connection,
    dialect: &'a dyn Dialect,
    run_mode: RunMode,
    datafiles: &'a Datafiles,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        connection: &'a mut dyn Connection,
        dialect: &'a dyn Dialect,
        run_mode: RunMode,
        datafiles: &'a Datafiles,
    ) -> Self {
        Self {
            connection,
            dialect,
            run_mode,
            datafiles,
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn datafiles(&self) -> &'a Datafiles {
        self.datafiles
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.connection
            .execute(sql, params)
            .map_err(|source| StatementError::sql(sql, source).into())
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.connection
            .query(sql, params)
            .map_err(|source| StatementError::sql(sql, source).into())
    }

    pub fn describe_params(&mut self, sql: &str) -> Result<Vec<crate::ParamType>> {
        self.connection
            .describe_params(sql)
            .map_err(|source| StatementError::sql(sql, source).into())
    }

    pub fn savepoint(&mut self, name: &str) -> Result<()> {
        self.connection
            .savepoint(name)
            .map_err(|source| StatementError::sql(format!("SAVEPOINT {name}"), source).into())
    }

    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.connection
            .rollback_to_savepoint(name)
            .map_err(|source| {
                StatementError::sql(format!("ROLLBACK TO SAVEPOINT {name}"), source).into()
            })
    }

    /// Ends the current unit of work: commit when the run mode commits,
    /// rollback otherwise.
    pub fn commit_step(&mut self) -> Result<()> {
        let (sql, outcome) = if self.run_mode.commits() {
            ("COMMIT", self.connection.commit())
        } else {
            ("ROLLBACK", self.connection.rollback())
        };
        outcome.map_err(|source| StatementError::sql(sql, source).into())
    }

    pub(crate) fn raw_connection(&mut self) -> &mut dyn Connection {
        &mut *self.connection
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutcome {
    Executed,
    /// The statement failed and the failure was ignored.
    IgnoredFailure,
}

/// Runs one statement under the ignorable-failure policy.
///
/// Configuration errors always propagate. Any other failure is ignored when
/// the statement may fail, and SQL failures are also ignored when their
/// state or code is declared ignorable. After an ignored failure the
/// transaction is rolled back to the savepoint taken before the statement, on
/// dialects that need one.
pub fn execute_statement(
    ctx: &mut ExecutionContext<'_>,
    statement: &AlterStatement,
) -> Result<StatementOutcome> {
    let fenced =
        ctx.dialect().savepoint_needed_for_ignored_failure() && statement.may_be_ignored();
    if fenced {
        ctx.savepoint(SAVEPOINT_NAME)?;
    }

    let error = match statement.execute(ctx) {
        Ok(()) => return Ok(StatementOutcome::Executed),
        Err(Error::Config(error)) => return Err(error.into()),
        Err(error) => error,
    };

    if !is_ignored(statement, &error) {
        return Err(error);
    }

    if fenced && let Err(rollback_error) = ctx.rollback_to_savepoint(SAVEPOINT_NAME) {
        debug!(error = %rollback_error, "rollback to savepoint failed");
        return Err(error);
    }

    Ok(StatementOutcome::IgnoredFailure)
}

fn is_ignored(statement: &AlterStatement, error: &Error) -> bool {
    if statement.can_fail {
        warn!(statement = %statement, error = %error, "statement failed, continuing (canfail)");
        return true;
    }

    let Some(sql_error) = error.sql_error() else {
        return false;
    };

    if let Some(state) = sql_error.sql_state()
        && statement.ignores_sql_state(state)
    {
        warn!(statement = %statement, sql_state = state, error = %sql_error, "ignoring SQL failure by SQLSTATE");
        return true;
    }

    if let Some(code) = sql_error.sql_code()
        && statement.ignores_sql_code(code)
    {
        warn!(statement = %statement, sql_code = code, error = %sql_error, "ignoring SQL failure by SQLCODE");
        return true;
    }

    false
}

/// Commits or rolls back a connection, the way `commit_step` does, outside
/// of any statement.
pub(crate) fn end_transaction(connection: &mut dyn Connection, commit: bool) -> SqlResult<()> {
    if commit {
        connection.commit()
    } else {
        connection.rollback()
    }
}
