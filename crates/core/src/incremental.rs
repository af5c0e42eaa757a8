use tracing::{debug, warn};

use crate::{Alterscript, Connection, Dialect, Result, StatementError, Value};

/// What the log table says about re-running an alterscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementalDecision {
    /// No log row yet.
    FirstRun,
    /// Logged with the same hash.
    Unchanged,
    /// Hash changed on a synchronization alterscript; it runs again.
    Synchronize { logged_hash: String },
    /// Hash changed on an ordinary alterscript; it is skipped with a warning.
    Drift { logged_hash: String },
}

impl IncrementalDecision {
    pub fn skips(&self) -> bool {
        matches!(self, Self::Unchanged | Self::Drift { .. })
    }
}

/// Compares the most recently logged hash with the current one.
pub fn classify(logged_hash: Option<&str>, current_hash: &str, synchronization: bool) -> IncrementalDecision {
    match logged_hash {
        None => IncrementalDecision::FirstRun,
        Some(logged) if logged.eq_ignore_ascii_case(current_hash) => IncrementalDecision::Unchanged,
        Some(logged) if synchronization => IncrementalDecision::Synchronize {
            logged_hash: logged.to_string(),
        },
        Some(logged) => IncrementalDecision::Drift {
            logged_hash: logged.to_string(),
        },
    }
}

/// Looks up the latest log row of `alter` and decides whether it runs.
pub fn decide(
    connection: &mut dyn Connection,
    dialect: &dyn Dialect,
    alter: &Alterscript,
    instance: &str,
) -> Result<IncrementalDecision> {
    let sql = format!(
        "select hash from {} where id = {} order by at desc",
        dialect.log_table(),
        dialect.bind_marker(1)
    );
    let rows = connection
        .query(&sql, &[Value::from(alter.id.as_str())])
        .map_err(|source| StatementError::sql(&sql, source))?;

    // A row logged before hashes were recorded compares as an empty hash.
    let logged = rows
        .into_iter()
        .next()
        .map(|row| row.first().and_then(Value::as_text).unwrap_or_default());
    let decision = classify(logged.as_deref(), &alter.hash, alter.synchronization);

    match &decision {
        IncrementalDecision::FirstRun => {
            debug!(alterscript = %alter.id, instance, "no log entry, applying");
        }
        IncrementalDecision::Unchanged => {
            debug!(alterscript = %alter.id, instance, "already applied with the same hash, skipping");
        }
        IncrementalDecision::Synchronize { logged_hash } => {
            debug!(
                alterscript = %alter.id,
                instance,
                logged_hash = %logged_hash,
                "synchronization alterscript changed, applying again"
            );
        }
        IncrementalDecision::Drift { logged_hash } => {
            warn!(
                alterscript = %alter.id,
                instance,
                logged_hash = %logged_hash,
                hash = %alter.hash,
                "alterscript changed since it was applied; skipping (not a synchronization alterscript)"
            );
        }
    }

    Ok(decision)
}
