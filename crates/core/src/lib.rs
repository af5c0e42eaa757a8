mod alter;
pub mod check;
mod config;
mod connection;
mod csv_load;
pub mod datafile;
mod dialect;
mod error;
mod executor;
pub mod incremental;
mod instance;
pub mod log_table;
mod migration;
mod orchestrator;
pub mod renderer;
mod statement;
mod value;

pub use alter::{Alterscript, Check, CheckType, DEFAULT_SCHEMA, Datafiles, IsolationLevel};
pub use config::{ApplyOptions, ConnectionConfig, RunMode};
pub use connection::{BATCH_SAVEPOINT_NAME, Connection, SAVEPOINT_NAME, query_scalar};
pub use csv_load::{CsvLoad, convert_field, parse_csv};
pub use dialect::{
    CheckQuery, Db2Dialect, Dialect, LOG_TABLE, OracleDialect, PACKAGE_LOG_TABLE,
    host_and_port,
};
pub use error::{
    AggregateError, BoxedError, CheckError, ConfigError, ConnectionError, Error, Failure, Result,
    SqlError, SqlResult, StatementError,
};
pub use executor::{ExecutionContext, StatementOutcome, execute_statement};
pub use incremental::IncrementalDecision;
pub use instance::{DbConfig, DbInstance, guess_environment};
pub use migration::{
    BETWEEN_RANGE_PLACEHOLDER, DEFAULT_STEP, ID_LIST_PLACEHOLDER, IdListMigration,
    IdRangeMigration, IdRangeWindows, MigrationSettings, MigrationSummary, ProcMigration,
    ProcessedQuery, RangeBound, process_query,
};
pub use orchestrator::{ApplyReport, InstanceOutcome, Orchestrator, Outcome};
pub use statement::{AlterStatement, StatementKind};
pub use value::{ParamType, Row, Value};
