use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

use tracing::{debug, error};

use crate::{
    AggregateError, Alterscript, ApplyOptions, ConfigError, ConnectionError, DbConfig, DbInstance,
    Error, ExecutionContext, Failure, IncrementalDecision, Result, RunMode, StatementError, check,
    executor::{end_transaction, execute_statement},
    incremental,
    log_table::{self, LogEntry},
};

macro_rules! report {
    ($quiet:expr, $($arg:tt)+) => {
        if $quiet {
            tracing::debug!($($arg)+)
        } else {
            tracing::info!($($arg)+)
        }
    };
}

/// What happened to one alterscript on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    EngineMismatch,
    EnvironmentMismatch,
    InstanceTypeMismatch,
    /// Skipped by the log table; `drift` when the logged hash differs.
    IncrementalSkip { drift: bool },
    AlreadyApplied,
    /// Reported by a look run as not applied yet.
    Unapplied,
    /// Statements were only printed.
    Printed,
    Applied { duration: Duration },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceOutcome {
    pub alterscript: String,
    pub instance: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcomes: Vec<InstanceOutcome>,
    /// Instance id to ids of alterscripts that look unapplied there.
    pub unapplied: BTreeMap<String, Vec<String>>,
}

impl ApplyReport {
    pub fn outcome(&self, alterscript: &str, instance: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|entry| entry.alterscript == alterscript && entry.instance == instance)
            .map(|entry| &entry.outcome)
    }

    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| matches!(entry.outcome, Outcome::Applied { .. }))
            .count()
    }
}

/// Mutable bookkeeping of a single run.
#[derive(Debug, Default)]
struct RunState {
    /// Instances that must commit or roll back when the alterscript ends.
    used: BTreeSet<usize>,
    failures: Vec<Failure>,
    report: ApplyReport,
    quiet: bool,
}

impl RunState {
    fn record(&mut self, alter: &Alterscript, instance: &str, outcome: Outcome) {
        self.report.outcomes.push(InstanceOutcome {
            alterscript: alter.id.clone(),
            instance: instance.to_string(),
            outcome,
        });
    }
}

/// Applies alterscripts to every configured instance.
pub struct Orchestrator<'c> {
    config: &'c mut DbConfig,
    options: ApplyOptions,
    validate: bool,
    package_hash: Option<String>,
}

impl<'c> Orchestrator<'c> {
    pub fn new(config: &'c mut DbConfig, options: ApplyOptions) -> Self {
        Self {
            config,
            options,
            validate: true,
            package_hash: None,
        }
    }

    /// Skips the up-front validation of checks and migration parameters.
    #[must_use]
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Records the bundle hash in the package log after a committed run.
    #[must_use]
    pub fn with_package_hash(mut self, hash: impl Into<String>) -> Self {
        self.package_hash = Some(hash.into());
        self
    }

    /// Applies `alters` and closes every connection afterwards.
    pub fn apply(&mut self, alters: &[Alterscript]) -> Result<ApplyReport> {
        let result = self.apply_all(alters);
        self.config.close_connections();
        result
    }

    fn apply_all(&mut self, alters: &[Alterscript]) -> Result<ApplyReport> {
        self.options.validate()?;
        if self.validate {
            for alter in alters {
                alter.validate()?;
            }
        }
        self.check_instance_types(alters)?;

        let options = self.options.clone();
        if options.use_log_table {
            self.apply_internal()?;
        }

        let environment = options
            .environment
            .clone()
            .or_else(|| self.config.resolve_environment());
        debug!(environment = ?environment, run_mode = %options.run_mode, "applying");

        let mut report = self.apply_without_closing(alters, &options, environment.as_deref(), false)?;

        if options.run_mode == RunMode::Look && options.use_log_table {
            self.drop_logged_unapplied(&mut report);
        }
        if let Some(hash) = self.package_hash.clone()
            && options.run_mode.commits()
            && options.use_log_table
        {
            self.record_package(&hash, &options.username);
        }

        Ok(report)
    }

    /// Creates missing log tables, committed and without closing connections.
    pub fn apply_internal(&mut self) -> Result<()> {
        let internal = log_table::bootstrap_alterscripts(
            self.config.instances().iter().map(DbInstance::dialect),
        );
        let options = self.options.internal();
        self.apply_without_closing(&internal, &options, None, true)
            .map(drop)
    }

    /// Runs the alterscripts × instances loop under `options`.
    ///
    /// Without ignore-failures the first failure rolls back the touched
    /// instances and is returned. With it, failures are collected and
    /// returned together once every alterscript has run. Configuration
    /// errors are never collected.
    pub fn apply_without_closing(
        &mut self,
        alters: &[Alterscript],
        options: &ApplyOptions,
        environment: Option<&str>,
        quiet: bool,
    ) -> Result<ApplyReport> {
        let mut state = RunState {
            quiet,
            ..RunState::default()
        };
        report!(
            quiet,
            alterscripts = alters.len(),
            instances = self.config.instances().len(),
            "executing {} alterscript(s) on {} database instance(s)",
            alters.len(),
            self.config.instances().len()
        );

        for alter in alters {
            self.apply_alterscript(alter, options, environment, &mut state)?;
        }

        if !state.failures.is_empty() {
            return Err(AggregateError::new(state.failures).into());
        }
        Ok(state.report)
    }

    fn check_instance_types(&self, alters: &[Alterscript]) -> Result<(), ConfigError> {
        let known = self.config.known_types();
        for alter in alters {
            if let Some(unknown) = alter.instances.iter().find(|name| !known.contains(*name)) {
                return Err(ConfigError::UnknownInstanceType {
                    instance_type: unknown.clone(),
                    alterscript: alter.id.clone(),
                    known: known.iter().cloned().collect(),
                });
            }
        }
        Ok(())
    }

    fn apply_alterscript(
        &mut self,
        alter: &Alterscript,
        options: &ApplyOptions,
        environment: Option<&str>,
        state: &mut RunState,
    ) -> Result<()> {
        report!(state.quiet, alterscript = %alter.id, "alterscript: {}", alter.id);
        let mut failed = false;

        for index in 0..self.config.instances().len() {
            let instance = &mut self.config.instances_mut()[index];
            let instance_id = instance.id().to_string();

            if let Some(skip) = skip_reason(alter, instance, environment, state.quiet) {
                state.record(alter, &instance_id, skip);
                continue;
            }

            match apply_on_instance(alter, index, instance, options, state) {
                Ok(outcome) => state.record(alter, &instance_id, outcome),
                Err(failure) => {
                    failed = true;
                    state.record(alter, &instance_id, Outcome::Failed);
                    // A failed read may leave the session in an aborted transaction.
                    if instance.is_connected() {
                        state.used.insert(index);
                    }
                    error!(
                        alterscript = %alter.id,
                        instance = %instance_id,
                        error = %failure,
                        "alterscript failed"
                    );

                    if options.ignore_failures && !matches!(failure, Error::Config(_)) {
                        state.failures.push(Failure {
                            alterscript: alter.id.clone(),
                            instance: instance_id,
                            error: failure,
                        });
                    } else {
                        if let Err(rollback) = self.end_transactions(alter, options, state, false) {
                            error!(error = %rollback, "rollback after failure failed");
                        }
                        return Err(failure);
                    }
                }
            }
        }

        let commit = !failed && options.run_mode.commits();
        self.end_transactions(alter, options, state, commit)
    }

    /// Commits or rolls back every instance marked used during `alter`.
    fn end_transactions(
        &mut self,
        alter: &Alterscript,
        options: &ApplyOptions,
        state: &mut RunState,
        commit: bool,
    ) -> Result<()> {
        let transaction_end = if commit { "COMMIT" } else { "ROLLBACK" };
        let mut first_error = None;

        for index in std::mem::take(&mut state.used) {
            let instance = &mut self.config.instances_mut()[index];
            let instance_id = instance.id().to_string();
            let Some(connection) = instance.open_connection() else {
                continue;
            };
            report!(
                state.quiet,
                alterscript = %alter.id,
                instance = %instance_id,
                transaction = transaction_end,
                "transaction {transaction_end}"
            );

            if let Err(source) = end_transaction(connection, commit) {
                let failure = Error::from(StatementError::sql(transaction_end, source));
                if options.ignore_failures {
                    state.failures.push(Failure {
                        alterscript: alter.id.clone(),
                        instance: instance_id,
                        error: failure,
                    });
                } else if first_error.is_none() {
                    first_error = Some(failure);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn drop_logged_unapplied(&mut self, report: &mut ApplyReport) {
        for instance in self.config.instances_mut() {
            let Some(ids) = report.unapplied.get_mut(instance.id()) else {
                continue;
            };
            let dialect = instance.dialect_handle();
            let instance_id = instance.id().to_string();
            let logged = instance
                .connection()
                .map_err(Error::from)
                .and_then(|connection| {
                    log_table::logged_ids(connection, dialect.as_ref()).map_err(|source| {
                        StatementError::sql(format!("select distinct id from {}", dialect.log_table()), source)
                            .into()
                    })
                });

            match logged {
                Ok(logged) => ids.retain(|id| !logged.contains(id)),
                Err(failure) => {
                    error!(instance = %instance_id, error = %failure, "failed to read applyalter_log records");
                }
            }
        }
        report.unapplied.retain(|_, ids| !ids.is_empty());
    }

    fn record_package(&mut self, hash: &str, username: &str) {
        for instance in self.config.instances_mut() {
            let dialect = instance.dialect_handle();
            let instance_id = instance.id().to_string();
            let recorded = instance
                .connection()
                .map_err(Error::from)
                .and_then(|connection| {
                    log_table::insert_package_entry(connection, dialect.as_ref(), &instance_id, hash, username)
                        .map_err(|source| {
                            StatementError::sql(dialect.package_log_table(), source).into()
                        })
                });
            if let Err(failure) = recorded {
                error!(instance = %instance_id, error = %failure, "failed to insert applyalter_pkg record");
            }
        }
    }
}

fn skip_reason(
    alter: &Alterscript,
    instance: &DbInstance,
    environment: Option<&str>,
    quiet: bool,
) -> Option<Outcome> {
    if !alter.matches_engine(instance.engine()) {
        report!(
            quiet,
            alterscript = %alter.id,
            instance = %instance.id(),
            "alterscript is only for {}, database is {}, skipping",
            alter.engine.as_deref().unwrap_or_default(),
            instance.engine()
        );
        return Some(Outcome::EngineMismatch);
    }
    if !alter.matches_environment(environment) {
        report!(
            quiet,
            alterscript = %alter.id,
            instance = %instance.id(),
            environment = ?environment,
            "alterscript is not for this environment, skipping"
        );
        return Some(Outcome::EnvironmentMismatch);
    }
    if !alter.matches_instance_type(instance.instance_type()) {
        debug!(
            alterscript = %alter.id,
            instance = %instance.id(),
            instance_type = instance.instance_type(),
            "instance type not targeted"
        );
        return Some(Outcome::InstanceTypeMismatch);
    }
    None
}

fn apply_on_instance(
    alter: &Alterscript,
    index: usize,
    instance: &mut DbInstance,
    options: &ApplyOptions,
    state: &mut RunState,
) -> Result<Outcome> {
    let started = Instant::now();
    let dialect = instance.dialect_handle();
    let instance_id = instance.id().to_string();
    let url = instance.url();
    let connection = instance.connection()?;
    debug!(instance = %instance_id, url = %url, schema = %alter.schema, "database instance");

    dialect
        .set_schema(connection, &alter.schema)
        .map_err(|source| ConnectionError::Session {
            instance: instance_id.clone(),
            action: format!("set schema {}", alter.schema),
            source,
        })?;
    if let Some(level) = alter.isolation {
        dialect
            .set_isolation(connection, level)
            .map_err(|source| ConnectionError::Session {
                instance: instance_id.clone(),
                action: format!("set isolation {level}"),
                source,
            })?;
    }

    if options.incremental {
        let decision = incremental::decide(connection, dialect.as_ref(), alter, &instance_id)?;
        if decision.skips() {
            return Ok(Outcome::IncrementalSkip {
                drift: matches!(decision, IncrementalDecision::Drift { .. }),
            });
        }
    }

    if check::is_applied(connection, dialect.as_ref(), alter)? {
        report!(state.quiet, alterscript = %alter.id, instance = %instance_id, "alter already applied, skipping");
        return Ok(Outcome::AlreadyApplied);
    }

    if options.run_mode == RunMode::Look {
        report!(state.quiet, alterscript = %alter.id, instance = %instance_id, "alter {} seems unapplied", alter.id);
        state
            .report
            .unapplied
            .entry(instance_id)
            .or_default()
            .push(alter.id.clone());
        return Ok(Outcome::Unapplied);
    }

    state.used.insert(index);
    {
        let mut ctx = ExecutionContext::new(
            &mut *connection,
            dialect.as_ref(),
            options.run_mode,
            &alter.datafiles,
        );
        for statement in &alter.statements {
            if options.run_mode == RunMode::Print {
                report!(state.quiet, alterscript = %alter.id, instance = %instance_id, "{statement}");
                continue;
            }
            debug!(alterscript = %alter.id, instance = %instance_id, statement = %statement, "executing");
            execute_statement(&mut ctx, statement)?;
            if alter.autocommit {
                ctx.commit_step()?;
            }
        }
    }

    if options.run_mode == RunMode::Print {
        return Ok(Outcome::Printed);
    }

    let duration = started.elapsed();
    report!(
        state.quiet,
        alterscript = %alter.id,
        instance = %instance_id,
        duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        "alter {} on {} took {} ms",
        alter.id,
        instance_id,
        duration.as_millis()
    );

    if options.run_mode.commits() && options.use_log_table {
        let entry = LogEntry {
            username: &options.username,
            alterscript: &alter.id,
            duration,
            hash: &alter.hash,
        };
        if let Err(failure) = log_table::insert_log_entry(connection, dialect.as_ref(), &entry) {
            error!(
                alterscript = %alter.id,
                instance = %instance_id,
                error = %failure,
                "failed to insert applyalter_log record"
            );
        }
    }

    Ok(Outcome::Applied { duration })
}
