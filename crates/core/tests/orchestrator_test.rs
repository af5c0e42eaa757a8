use std::collections::BTreeSet;

use applyalter_core::{
    AlterStatement, Alterscript, ApplyOptions, Check, CheckError, CheckType, ConfigError,
    ConnectionError, DbConfig, Error, IsolationLevel, Orchestrator, Outcome, RunMode, Value,
};

#[path = "support/fake_connection.rs"]
mod fake_connection;
#[path = "support/fake_dialect.rs"]
mod fake_dialect;

use fake_connection::{CLOSE_CALL, COMMIT_CALL, FakeConnection, ROLLBACK_CALL};
use fake_dialect::{FakeDialect, fake_instance};

const SET_SCHEMA: &str = "SET SCHEMA wasg2";

fn options(run_mode: RunMode) -> ApplyOptions {
    ApplyOptions {
        run_mode,
        username: "deployer".to_string(),
        use_log_table: false,
        ..ApplyOptions::default()
    }
}

fn alter(id: &str, statements: &[&str]) -> Alterscript {
    let mut alter = Alterscript::new(id, format!("HASH-{id}"));
    alter.statements = statements.iter().map(|sql| AlterStatement::sql(*sql)).collect();
    alter
}

fn single(connection: &FakeConnection) -> DbConfig {
    DbConfig::new(vec![fake_instance("db1", FakeDialect::default(), connection)])
}

#[test]
fn each_alterscript_commits_on_every_touched_instance_before_the_next() {
    let first = FakeConnection::new();
    let second = FakeConnection::new();
    let mut config = DbConfig::new(vec![
        fake_instance("db1", FakeDialect::default(), &first),
        fake_instance("db2", FakeDialect::default(), &second),
    ]);

    let report = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[
            alter("a1", &["create table t1 (id int)"]),
            alter("a2", &["create table t2 (id int)"]),
        ])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(report.applied(), 4);
    for connection in [&first, &second] {
        assert_eq!(
            connection.calls(),
            vec![
                SET_SCHEMA,
                "create table t1 (id int)",
                COMMIT_CALL,
                SET_SCHEMA,
                "create table t2 (id int)",
                COMMIT_CALL,
                CLOSE_CALL,
            ]
        );
    }
}

#[test]
fn probe_answering_ok_in_any_case_skips_the_alterscript() {
    for answer in ["OK", "ok", "Ok"] {
        let connection = FakeConnection::new();
        connection.set_query_result("from probe", vec![vec![Value::from(answer)]]);
        let mut config = single(&connection);

        let mut probed = alter("a1", &["update t set x = 1"]);
        probed.checkok = Some("select status from probe".to_string());
        let report = Orchestrator::new(&mut config, options(RunMode::Commit))
            .apply(&[probed])
            .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

        assert_eq!(report.outcome("a1", "db1"), Some(&Outcome::AlreadyApplied));
        assert!(connection.executed_sql().iter().all(|sql| !sql.starts_with("update")));
        assert_eq!(connection.commit_count(), 0, "skipped instances are not committed");
    }
}

#[test]
fn probe_with_other_answer_or_no_row_applies() {
    for rows in [vec![vec![Value::from("NO")]], Vec::new()] {
        let connection = FakeConnection::new();
        connection.set_query_result("from probe", rows);
        let mut config = single(&connection);

        let mut probed = alter("a1", &["update t set x = 1"]);
        probed.checkok = Some("select status from probe".to_string());
        let report = Orchestrator::new(&mut config, options(RunMode::Commit))
            .apply(&[probed])
            .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

        assert!(matches!(report.outcome("a1", "db1"), Some(Outcome::Applied { .. })));
        assert!(connection.executed_sql().contains(&"update t set x = 1".to_string()));
    }
}

#[test]
fn all_checks_must_pass_and_inverted_checks_flip() {
    let connection = FakeConnection::new();
    connection.set_query_result("CHECK table wasg2.orders", vec![vec![Value::Integer(1)]]);
    let mut config = single(&connection);

    let mut present = alter("present", &["create table orders (id int)"]);
    present.checks.push(Check::new(CheckType::Table, "orders"));
    let mut dropped = alter("dropped", &["drop table orders"]);
    dropped.checks.push(Check::new(CheckType::Table, "orders").inverted());
    let mut partial = alter("partial", &["create table items (id int)"]);
    partial.checks.push(Check::new(CheckType::Table, "orders"));
    partial.checks.push(Check::new(CheckType::Table, "items"));

    let report = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[present, dropped, partial])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(report.outcome("present", "db1"), Some(&Outcome::AlreadyApplied));
    assert!(matches!(report.outcome("dropped", "db1"), Some(Outcome::Applied { .. })));
    assert!(matches!(report.outcome("partial", "db1"), Some(Outcome::Applied { .. })));
}

#[test]
fn unsupported_check_type_fails_the_alterscript() {
    let connection = FakeConnection::new();
    let mut config = DbConfig::new(vec![fake_instance(
        "db1",
        FakeDialect::without_check(CheckType::Routine),
        &connection,
    )]);

    let mut guarded = alter("a1", &["create procedure p() begin end"]);
    guarded.checks.push(Check::new(CheckType::Routine, "p"));
    let error = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[guarded])
        .expect_err("unsupported check must fail");

    assert!(matches!(
        error,
        Error::Check(CheckError::Unsupported {
            check_type: CheckType::Routine,
            ..
        })
    ));
    assert!(connection.was_closed());
}

#[test]
fn engine_environment_and_instance_type_filters_skip() {
    let connection = FakeConnection::new();
    let mut config = DbConfig::new(vec![
        fake_instance("db1", FakeDialect::default(), &connection).with_type("main"),
    ])
    .with_environment(Some("prod".to_string()));

    let mut other_engine = alter("engine", &["select 1"]);
    other_engine.engine = Some("Oracle".to_string());
    let mut same_engine = alter("engine-ok", &["create table e (id int)"]);
    same_engine.engine = Some("fake".to_string());
    let mut test_only = alter("env", &["select 1"]);
    test_only.environments = Some(BTreeSet::from(["test".to_string()]));
    let mut prod_only = alter("env-ok", &["create table p (id int)"]);
    prod_only.environments = Some(BTreeSet::from(["prod".to_string()]));

    let report = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[other_engine, same_engine, test_only, prod_only])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(report.outcome("engine", "db1"), Some(&Outcome::EngineMismatch));
    assert_eq!(report.outcome("env", "db1"), Some(&Outcome::EnvironmentMismatch));
    assert!(matches!(report.outcome("engine-ok", "db1"), Some(Outcome::Applied { .. })));
    assert!(matches!(report.outcome("env-ok", "db1"), Some(Outcome::Applied { .. })));
    assert!(!connection.executed_sql().contains(&"select 1".to_string()));
}

#[test]
fn instance_type_filter_uses_declared_types() {
    let main = FakeConnection::new();
    let reporting = FakeConnection::new();
    let mut config = DbConfig::new(vec![
        fake_instance("db1", FakeDialect::default(), &main).with_type("main"),
        fake_instance("db2", FakeDialect::default(), &reporting).with_type("reporting"),
    ]);

    let mut targeted = alter("a1", &["create table r (id int)"]);
    targeted.instances = BTreeSet::from(["reporting".to_string()]);
    let report = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[targeted])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(report.outcome("a1", "db1"), Some(&Outcome::InstanceTypeMismatch));
    assert!(main.executed_sql().is_empty());
    assert!(reporting.executed_sql().contains(&"create table r (id int)".to_string()));
}

#[test]
fn restricted_alterscript_never_runs_without_known_environment() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    let mut restricted = alter("a1", &["create table t (id int)"]);
    restricted.environments = Some(BTreeSet::from(["prod".to_string()]));
    let report = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[restricted])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(report.outcome("a1", "db1"), Some(&Outcome::EnvironmentMismatch));
}

#[test]
fn unknown_instance_type_is_rejected_before_any_connection_use() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    let mut targeted = alter("a1", &["create table t (id int)"]);
    targeted.instances = BTreeSet::from(["warehouse".to_string()]);
    let error = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[targeted])
        .expect_err("unknown instance type must be rejected");

    match error {
        Error::Config(ConfigError::UnknownInstanceType {
            instance_type,
            alterscript,
            known,
        }) => {
            assert_eq!(instance_type, "warehouse");
            assert_eq!(alterscript, "a1");
            assert_eq!(known, vec!["db1".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(connection.calls(), vec![CLOSE_CALL]);
}

#[test]
fn look_mode_lists_unapplied_minus_logged_ids() {
    let connection = FakeConnection::new();
    connection.set_query_result("CHECK table wasg2.applyalter_", vec![vec![Value::Integer(1)]]);
    connection.set_query_result(
        "select distinct id from applyalter_log",
        vec![vec![Value::from("a1")]],
    );
    let mut config = single(&connection);

    let report = Orchestrator::new(
        &mut config,
        ApplyOptions {
            use_log_table: true,
            ..options(RunMode::Look)
        },
    )
    .apply(&[
        alter("a1", &["create table t1 (id int)"]),
        alter("a2", &["create table t2 (id int)"]),
    ])
    .unwrap_or_else(|error| panic!("look run should succeed: {error}"));

    assert_eq!(report.outcome("a1", "db1"), Some(&Outcome::Unapplied));
    assert_eq!(
        report.unapplied.get("db1"),
        Some(&vec!["a2".to_string()])
    );
    assert!(
        connection
            .executed_sql()
            .iter()
            .all(|sql| sql.starts_with("SET SCHEMA")),
        "look mode must not execute statements: {:?}",
        connection.executed_sql()
    );
    assert_eq!(connection.commit_count(), 0);
}

#[test]
fn print_mode_executes_nothing() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    let report = Orchestrator::new(&mut config, options(RunMode::Print))
        .apply(&[alter("a1", &["create table t (id int)"])])
        .unwrap_or_else(|error| panic!("print run should succeed: {error}"));

    assert_eq!(report.outcome("a1", "db1"), Some(&Outcome::Printed));
    assert_eq!(connection.executed_sql(), vec![SET_SCHEMA.to_string()]);
    assert_eq!(connection.commit_count(), 0);
}

#[test]
fn dry_mode_executes_then_rolls_back() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    Orchestrator::new(&mut config, options(RunMode::Dry))
        .apply(&[alter("a1", &["create table t (id int)"])])
        .unwrap_or_else(|error| panic!("dry run should succeed: {error}"));

    assert_eq!(
        connection.calls(),
        vec![SET_SCHEMA, "create table t (id int)", ROLLBACK_CALL, CLOSE_CALL]
    );
}

#[test]
fn isolation_is_set_after_schema() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    let mut isolated = alter("a1", &["update t set x = 1"]);
    isolated.isolation = Some(IsolationLevel::Ur);
    isolated.schema = "sales".to_string();
    Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[isolated])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(connection.calls()[..2], ["SET SCHEMA sales", "SET ISOLATION UR"]);
}

#[test]
fn failure_aborts_the_run_and_rolls_back() {
    let first = FakeConnection::new();
    let second = FakeConnection::new();
    first.fail_on_sql_with_state("bad", "syntax error", "42601");
    let mut config = DbConfig::new(vec![
        fake_instance("db1", FakeDialect::default(), &first),
        fake_instance("db2", FakeDialect::default(), &second),
    ]);

    let error = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[
            alter("a1", &["create table ok (id int)", "bad statement"]),
            alter("a2", &["create table later (id int)"]),
        ])
        .expect_err("failure must abort");

    assert_eq!(
        error.sql_error().and_then(|sql| sql.sql_state()),
        Some("42601")
    );
    assert_eq!(first.commit_count(), 0);
    assert_eq!(first.rollback_count(), 1);
    assert!(second.calls() == vec![CLOSE_CALL], "db2 never reached: {:?}", second.calls());
    assert!(first.was_closed());
}

#[test]
fn ignore_failures_continues_and_aggregates() {
    let first = FakeConnection::new();
    let second = FakeConnection::new();
    first.fail_on_sql("bad", "boom");
    let mut config = DbConfig::new(vec![
        fake_instance("db1", FakeDialect::default(), &first),
        fake_instance("db2", FakeDialect::default(), &second),
    ]);

    let error = Orchestrator::new(
        &mut config,
        ApplyOptions {
            ignore_failures: true,
            ..options(RunMode::Commit)
        },
    )
    .apply(&[
        alter("a1", &["bad statement"]),
        alter("a2", &["create table later (id int)"]),
    ])
    .expect_err("collected failures are reported at the end");

    let Error::Aggregate(aggregate) = &error else {
        panic!("expected aggregate error, got {error:?}");
    };
    assert_eq!(aggregate.failures().len(), 1);
    assert_eq!(aggregate.failures()[0].alterscript, "a1");
    assert_eq!(aggregate.failures()[0].instance, "db1");
    assert!(error.to_string().contains("[a1 @ db1]"));

    // a1 is rolled back everywhere, a2 is committed everywhere.
    assert_eq!(first.rollback_count(), 1);
    assert_eq!(second.rollback_count(), 1);
    assert_eq!(first.commit_count(), 1);
    assert_eq!(second.commit_count(), 1);
    assert!(second.executed_sql().contains(&"bad statement".to_string()));
}

#[test]
fn session_setup_failure_is_a_connection_error() {
    let connection = FakeConnection::new();
    connection.fail_on_sql("SET SCHEMA", "schema missing");
    let mut config = single(&connection);

    let error = Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[alter("a1", &["select 1"])])
        .expect_err("schema failure must fail the alterscript");

    assert!(matches!(
        error,
        Error::Connection(ConnectionError::Session { .. })
    ));
}

#[test]
fn autocommit_commits_after_every_statement() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    let mut chatty = alter("a1", &["update a set x = 1", "update b set x = 1"]);
    chatty.autocommit = true;
    Orchestrator::new(&mut config, options(RunMode::Commit))
        .apply(&[chatty])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(
        connection.calls(),
        vec![
            SET_SCHEMA,
            "update a set x = 1",
            COMMIT_CALL,
            "update b set x = 1",
            COMMIT_CALL,
            COMMIT_CALL,
            CLOSE_CALL,
        ]
    );
}

fn logged_config(connection: &FakeConnection) -> DbConfig {
    // Log tables already exist.
    connection.set_query_result("CHECK table wasg2.applyalter_", vec![vec![Value::Integer(1)]]);
    single(connection)
}

fn logged(run_mode: RunMode) -> ApplyOptions {
    ApplyOptions {
        use_log_table: true,
        ..options(run_mode)
    }
}

#[test]
fn committed_alterscript_is_logged_with_user_and_hash() {
    let connection = FakeConnection::new();
    let mut config = logged_config(&connection);

    Orchestrator::new(&mut config, logged(RunMode::Commit))
        .apply(&[alter("a1", &["create table t (id int)"])])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    let (sql, params) = connection
        .executed()
        .into_iter()
        .find(|(sql, _)| sql.starts_with("insert into applyalter_log"))
        .unwrap_or_else(|| panic!("log row must be inserted: {:?}", connection.calls()));
    assert_eq!(
        sql,
        "insert into applyalter_log (username, id, duration, hash) values (?, ?, ?, ?)"
    );
    assert_eq!(params[0], Value::from("deployer"));
    assert_eq!(params[1], Value::from("a1"));
    assert!(matches!(params[2], Value::Integer(ms) if ms >= 0));
    assert_eq!(params[3], Value::from("HASH-a1"));
}

#[test]
fn dry_run_writes_no_log_row() {
    let connection = FakeConnection::new();
    let mut config = logged_config(&connection);

    Orchestrator::new(&mut config, logged(RunMode::Dry))
        .apply(&[alter("a1", &["create table t (id int)"])])
        .unwrap_or_else(|error| panic!("dry run should succeed: {error}"));

    assert!(
        !connection
            .executed_sql()
            .iter()
            .any(|sql| sql.starts_with("insert into applyalter_log"))
    );
}

#[test]
fn missing_log_tables_are_created_first() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    Orchestrator::new(&mut config, logged(RunMode::Dry))
        .apply(&[alter("a1", &["create table t (id int)"])])
        .unwrap_or_else(|error| panic!("dry run should succeed: {error}"));

    let executed = connection.executed_sql();
    assert!(executed[1].starts_with("create table applyalter_log ("));
    assert!(executed[3].starts_with("create table applyalter_pkg ("));
    // Bootstrap alterscripts commit even in a dry run.
    assert_eq!(connection.commit_count(), 2);
}

#[test]
fn package_hash_is_recorded_after_a_committed_run() {
    let connection = FakeConnection::new();
    let mut config = logged_config(&connection);

    Orchestrator::new(&mut config, logged(RunMode::Commit))
        .with_package_hash("BUNDLE")
        .apply(&[alter("a1", &["create table t (id int)"])])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    let (sql, params) = connection
        .executed()
        .into_iter()
        .find(|(sql, _)| sql.starts_with("insert into applyalter_pkg"))
        .unwrap_or_else(|| panic!("package row must be inserted: {:?}", connection.calls()));
    assert_eq!(
        sql,
        "insert into applyalter_pkg (dbid, hash, username) values (?, ?, ?)"
    );
    assert_eq!(
        params,
        vec![Value::from("db1"), Value::from("BUNDLE"), Value::from("deployer")]
    );
    let calls = connection.calls();
    assert_eq!(calls[calls.len() - 2], COMMIT_CALL);
}

fn incremental() -> ApplyOptions {
    ApplyOptions {
        incremental: true,
        ..logged(RunMode::Commit)
    }
}

#[test]
fn incremental_requires_the_log_table() {
    let connection = FakeConnection::new();
    let mut config = single(&connection);

    let error = Orchestrator::new(
        &mut config,
        ApplyOptions {
            incremental: true,
            ..options(RunMode::Commit)
        },
    )
    .apply(&[alter("a1", &["create table t (id int)"])])
    .expect_err("incremental without log table must be rejected");

    assert!(matches!(
        error,
        Error::Config(ConfigError::IncrementalWithoutLogTable)
    ));
    assert_eq!(connection.calls(), vec![CLOSE_CALL]);
}

#[test]
fn incremental_second_run_skips_unchanged_alterscript() {
    let connection = FakeConnection::new();
    let alters = [alter("a1", &["create table t (id int)"])];

    let mut config = logged_config(&connection);
    let first = Orchestrator::new(&mut config, incremental())
        .apply(&alters)
        .unwrap_or_else(|error| panic!("first run should succeed: {error}"));
    assert!(matches!(first.outcome("a1", "db1"), Some(Outcome::Applied { .. })));

    connection.set_query_result("select hash from applyalter_log", vec![vec![Value::from("hash-a1")]]);
    let mut config = logged_config(&connection);
    let second = Orchestrator::new(&mut config, incremental())
        .apply(&alters)
        .unwrap_or_else(|error| panic!("second run should succeed: {error}"));

    assert_eq!(
        second.outcome("a1", "db1"),
        Some(&Outcome::IncrementalSkip { drift: false })
    );
    let runs = connection
        .executed_sql()
        .iter()
        .filter(|sql| sql.as_str() == "create table t (id int)")
        .count();
    assert_eq!(runs, 1);
}

#[test]
fn incremental_changed_hash_skips_unless_synchronization() {
    let connection = FakeConnection::new();
    connection.set_query_result("select hash from applyalter_log", vec![vec![Value::from("OLD")]]);
    let mut config = logged_config(&connection);

    let ordinary = alter("a1", &["create table t (id int)"]);
    let mut synchronized = alter("a2", &["merge into lookup"]);
    synchronized.synchronization = true;
    let report = Orchestrator::new(&mut config, incremental())
        .apply(&[ordinary, synchronized])
        .unwrap_or_else(|error| panic!("apply should succeed: {error}"));

    assert_eq!(
        report.outcome("a1", "db1"),
        Some(&Outcome::IncrementalSkip { drift: true })
    );
    assert!(matches!(report.outcome("a2", "db1"), Some(Outcome::Applied { .. })));
    assert!(connection.executed_sql().contains(&"merge into lookup".to_string()));
}
