use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use applyalter_core::{Connection, ParamType, Row, SqlError, SqlResult, Value};

pub const COMMIT_CALL: &str = "COMMIT";
pub const ROLLBACK_CALL: &str = "ROLLBACK";
pub const CLOSE_CALL: &str = "CLOSE";

#[derive(Debug, Clone)]
struct FailureRule {
    sql_fragment: String,
    message: String,
    sql_state: Option<String>,
    sql_code: Option<i32>,
}

#[derive(Debug, Default)]
struct FakeConnectionState {
    calls: Vec<String>,
    executed: Vec<(String, Vec<Value>)>,
    query_results: Vec<(String, Vec<Row>)>,
    row_counts: Vec<(String, VecDeque<u64>)>,
    failures: Vec<FailureRule>,
    param_types: Vec<ParamType>,
    commit_count: usize,
    rollback_count: usize,
}

/// Scripted connection; clones share one recorded state.
#[derive(Debug, Clone, Default)]
pub struct FakeConnection {
    state: Arc<Mutex<FakeConnectionState>>,
}

#[allow(dead_code)]
impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeConnectionState> {
        self.state.lock().expect("fake connection mutex should lock")
    }

    /// Queries whose SQL contains `sql_fragment` return `rows`.
    pub fn set_query_result(&self, sql_fragment: impl Into<String>, rows: Vec<Row>) {
        self.state().query_results.push((sql_fragment.into(), rows));
    }

    /// Successive executions whose SQL contains `sql_fragment` report these
    /// row counts, then zero.
    pub fn queue_row_counts(&self, sql_fragment: impl Into<String>, counts: impl IntoIterator<Item = u64>) {
        self.state()
            .row_counts
            .push((sql_fragment.into(), counts.into_iter().collect()));
    }

    pub fn fail_on_sql(&self, sql_fragment: impl Into<String>, message: impl Into<String>) {
        self.push_failure(sql_fragment.into(), message.into(), None, None);
    }

    pub fn fail_on_sql_with_state(
        &self,
        sql_fragment: impl Into<String>,
        message: impl Into<String>,
        sql_state: impl Into<String>,
    ) {
        self.push_failure(sql_fragment.into(), message.into(), Some(sql_state.into()), None);
    }

    pub fn fail_on_sql_with_code(
        &self,
        sql_fragment: impl Into<String>,
        message: impl Into<String>,
        sql_code: i32,
    ) {
        self.push_failure(sql_fragment.into(), message.into(), None, Some(sql_code));
    }

    fn push_failure(
        &self,
        sql_fragment: String,
        message: String,
        sql_state: Option<String>,
        sql_code: Option<i32>,
    ) {
        self.state().failures.push(FailureRule {
            sql_fragment,
            message,
            sql_state,
            sql_code,
        });
    }

    pub fn set_param_types(&self, param_types: Vec<ParamType>) {
        self.state().param_types = param_types;
    }

    /// Every call in order: SQL text for executions and queries, plus
    /// `COMMIT`, `ROLLBACK` and `CLOSE`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.state().executed.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.state().commit_count
    }

    pub fn rollback_count(&self) -> usize {
        self.state().rollback_count
    }

    pub fn was_closed(&self) -> bool {
        self.state().calls.iter().any(|call| call == CLOSE_CALL)
    }

    fn check_failure(state: &FakeConnectionState, sql: &str) -> SqlResult<()> {
        let Some(rule) = state
            .failures
            .iter()
            .find(|rule| sql.contains(&rule.sql_fragment))
        else {
            return Ok(());
        };

        let mut error = SqlError::new(rule.message.clone());
        if let Some(state) = &rule.sql_state {
            error = error.with_sql_state(state.clone());
        }
        if let Some(code) = rule.sql_code {
            error = error.with_sql_code(code);
        }
        Err(error)
    }
}

impl Connection for FakeConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        let mut state = self.state();
        state.calls.push(sql.to_string());
        Self::check_failure(&state, sql)?;
        state.executed.push((sql.to_string(), params.to_vec()));

        let count = state
            .row_counts
            .iter_mut()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .and_then(|(_, counts)| counts.pop_front())
            .unwrap_or(0);
        Ok(count)
    }

    fn query(&mut self, sql: &str, _params: &[Value]) -> SqlResult<Vec<Row>> {
        let mut state = self.state();
        state.calls.push(sql.to_string());
        Self::check_failure(&state, sql)?;

        Ok(state
            .query_results
            .iter()
            .rev()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn describe_params(&mut self, _sql: &str) -> SqlResult<Vec<ParamType>> {
        Ok(self.state().param_types.clone())
    }

    fn commit(&mut self) -> SqlResult<()> {
        let mut state = self.state();
        state.calls.push(COMMIT_CALL.to_string());
        Self::check_failure(&state, COMMIT_CALL)?;
        state.commit_count += 1;
        Ok(())
    }

    fn rollback(&mut self) -> SqlResult<()> {
        let mut state = self.state();
        state.calls.push(ROLLBACK_CALL.to_string());
        state.rollback_count += 1;
        Ok(())
    }

    fn close(&mut self) -> SqlResult<()> {
        self.state().calls.push(CLOSE_CALL.to_string());
        Ok(())
    }
}
