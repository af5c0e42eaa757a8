use applyalter_core::{
    AlterStatement, ConfigError, CsvLoad, Datafiles, Error, ExecutionContext, ParamType,
    RunMode, StatementError, StatementKind, Value, execute_statement,
};

#[path = "support/fake_connection.rs"]
mod fake_connection;
#[path = "support/fake_dialect.rs"]
mod fake_dialect;

use fake_connection::FakeConnection;
use fake_dialect::FakeDialect;

fn run_with(
    connection: &FakeConnection,
    run_mode: RunMode,
    datafiles: &Datafiles,
    statement: &AlterStatement,
) -> applyalter_core::Result<()> {
    let dialect = FakeDialect::default();
    let mut session = connection.clone();
    let mut ctx = ExecutionContext::new(&mut session, &dialect, run_mode, datafiles);
    execute_statement(&mut ctx, statement).map(drop)
}

fn datafiles(entries: &[(&str, &[u8])]) -> Datafiles {
    entries
        .iter()
        .map(|(name, bytes)| ((*name).to_string(), bytes.to_vec()))
        .collect()
}

#[test]
fn datafile_references_bind_as_clob_text_and_blob_bytes() {
    let connection = FakeConnection::new();
    let files = datafiles(&[("body.txt", b"hello"), ("logo.png", &[0x89, 0x50])]);

    run_with(
        &connection,
        RunMode::Commit,
        &files,
        &AlterStatement::sql(
            "insert into docs (body, logo, other) values (:clob(body.txt), :BLOB(logo.png), :clob(missing))",
        ),
    )
    .unwrap_or_else(|error| panic!("statement should run: {error}"));

    assert_eq!(
        connection.executed(),
        vec![(
            "insert into docs (body, logo, other) values (?, ?, :clob(missing))".to_string(),
            vec![Value::from("hello"), Value::Bytes(vec![0x89, 0x50])],
        )]
    );
}

#[test]
fn clob_datafile_must_be_utf8() {
    let connection = FakeConnection::new();
    let files = datafiles(&[("bad.txt", &[0xff, 0xfe])]);

    let error = run_with(
        &connection,
        RunMode::Commit,
        &files,
        &AlterStatement::sql("insert into docs values (:clob(bad.txt))"),
    )
    .expect_err("invalid UTF-8 clob must fail");

    assert!(matches!(
        error,
        Error::Config(ConfigError::DatafileEncoding { .. })
    ));
    assert!(connection.calls().is_empty());
}

#[test]
fn dynamic_statement_executes_each_generated_row_and_skips_nulls() {
    let connection = FakeConnection::new();
    connection.set_query_result(
        "from syscat.tables",
        vec![
            vec![Value::from("drop table a")],
            vec![Value::Null],
            vec![Value::from("drop table b")],
        ],
    );

    run_with(
        &connection,
        RunMode::Commit,
        &Datafiles::new(),
        &AlterStatement::new(StatementKind::Dynamic(
            "select 'drop table ' || tabname from syscat.tables".to_string(),
        )),
    )
    .unwrap_or_else(|error| panic!("dynamic statement should run: {error}"));

    assert_eq!(
        connection.executed_sql(),
        vec!["drop table a".to_string(), "drop table b".to_string()]
    );
}

#[test]
fn select_and_comment_do_not_execute_anything() {
    let connection = FakeConnection::new();
    connection.set_query_result("select count", vec![vec![Value::Integer(3)]]);

    for statement in [
        AlterStatement::new(StatementKind::Select("select count(*) from t".to_string())),
        AlterStatement::new(StatementKind::Comment("rebuilding t".to_string())),
    ] {
        run_with(&connection, RunMode::Commit, &Datafiles::new(), &statement)
            .unwrap_or_else(|error| panic!("statement should run: {error}"));
    }

    assert!(connection.executed().is_empty());
    assert_eq!(connection.calls(), vec!["select count(*) from t".to_string()]);
}

fn csv(step: Option<u32>) -> AlterStatement {
    AlterStatement::new(StatementKind::Csv(CsvLoad {
        statement: "insert into people (name, age, note) values (?, ?, :clob(note.txt))"
            .to_string(),
        file: "people.csv".to_string(),
        step,
    }))
}

#[test]
fn csv_rows_bind_converted_fields_then_datafile_params() {
    let connection = FakeConnection::new();
    connection.set_param_types(vec![ParamType::Text, ParamType::Integer, ParamType::Text]);
    let files = datafiles(&[
        ("people.csv", b"name,age\n\"Doe, J\",42\n,\nAnn,7\n"),
        ("note.txt", b"imported"),
    ]);

    run_with(&connection, RunMode::Commit, &files, &csv(Some(2)))
        .unwrap_or_else(|error| panic!("csv load should run: {error}"));

    let executed = connection.executed();
    assert_eq!(executed.len(), 3);
    assert_eq!(
        executed[0].0,
        "insert into people (name, age, note) values (?, ?, ?)"
    );
    assert_eq!(
        executed[0].1,
        vec![Value::from("Doe, J"), Value::Integer(42), Value::from("imported")]
    );
    // Empty text stays empty, other empty fields become NULL.
    assert_eq!(
        executed[1].1,
        vec![Value::from(""), Value::Null, Value::from("imported")]
    );
    assert_eq!(connection.commit_count(), 1);
}

#[test]
fn csv_header_must_match_parameter_count() {
    let connection = FakeConnection::new();
    connection.set_param_types(vec![ParamType::Text, ParamType::Text]);
    let files = datafiles(&[("people.csv", b"name,age\nAnn,7\n"), ("note.txt", b"x")]);

    let error = run_with(&connection, RunMode::Commit, &files, &csv(None))
        .expect_err("column count mismatch must fail");

    match error {
        Error::Statement(StatementError::Failed { message, .. }) => {
            assert_eq!(message, "invalid CSV: 2 columns for 1 query parameters");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(connection.executed().is_empty());
}

#[test]
fn csv_datafile_must_exist() {
    let connection = FakeConnection::new();
    let error = run_with(&connection, RunMode::Commit, &Datafiles::new(), &csv(None))
        .expect_err("missing datafile must fail");

    assert!(matches!(
        error,
        Error::Config(ConfigError::MissingDatafile { ref name }) if name == "people.csv"
    ));
}

#[test]
fn csv_bad_integer_reports_the_row() {
    let connection = FakeConnection::new();
    connection.set_param_types(vec![ParamType::Text, ParamType::Integer, ParamType::Text]);
    let files = datafiles(&[
        ("people.csv", b"name,age\nAnn,seven\n"),
        ("note.txt", b"x"),
    ]);

    let error = run_with(&connection, RunMode::Commit, &files, &csv(None))
        .expect_err("non-numeric integer must fail");

    let chain = error.message_chain().join(": ");
    assert!(chain.contains("row 2"), "unexpected message: {chain}");
}
