use std::{io, path::PathBuf, process::ExitCode};

use applyalter_loader::LoadError;
use miette::Report;

const APPLY_CONTEXT: &str = "while applying alterscripts";
const DBCONFIG_CONTEXT: &str = "while loading database configuration";
const ALTERSCRIPTS_CONTEXT: &str = "while loading alterscripts";
const LOG_OUTPUT_CONTEXT: &str = "while opening structured log output";

pub(crate) type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug)]
pub(crate) enum CliError {
    MissingUsername,
    DbConfig(LoadError),
    Alterscripts(LoadError),
    LogOutput {
        path: PathBuf,
        source: io::Error,
    },
    Core(applyalter_core::Error),
}

impl From<applyalter_core::Error> for CliError {
    fn from(value: applyalter_core::Error) -> Self {
        Self::Core(value)
    }
}

impl CliError {
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::MissingUsername => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

pub(crate) fn render_runtime_error(error: CliError) -> String {
    match error {
        CliError::MissingUsername => format!("[usage] {}", missing_username_message()),
        CliError::DbConfig(source) => {
            let category = load_category(&source);
            let report = report_with_context(source, DBCONFIG_CONTEXT);
            format!("[{category}] {report}")
        }
        CliError::Alterscripts(source) => {
            let category = load_category(&source);
            let report = report_with_context(source, ALTERSCRIPTS_CONTEXT);
            format!("[{category}] {report}")
        }
        CliError::LogOutput { path, source } => {
            let context = format!("{LOG_OUTPUT_CONTEXT} `{}`", path.display());
            let report = report_with_context(source, context);
            format!("[io] {report}")
        }
        CliError::Core(source) => {
            let category = core_category(&source);
            let report = report_with_context(source, APPLY_CONTEXT);
            format!("[{category}] {report}")
        }
    }
}

fn report_with_context<E, C>(source: E, context: C) -> Report
where
    E: std::error::Error + Send + Sync + 'static,
    C: Into<String>,
{
    let context = context.into();
    let anyhow_error = anyhow::Error::new(source).context(context);
    miette::miette!("{anyhow_error:#}")
}

fn core_category(error: &applyalter_core::Error) -> &'static str {
    match error {
        applyalter_core::Error::Config(_) => "config",
        applyalter_core::Error::Connection(_) => "connection",
        applyalter_core::Error::Statement(_) => "statement",
        applyalter_core::Error::Check(_) => "check",
        applyalter_core::Error::Aggregate(_) => "aggregate",
    }
}

fn load_category(error: &LoadError) -> &'static str {
    match error {
        LoadError::Read { .. } | LoadError::Datafile { .. } => "io",
        LoadError::Parse { .. }
        | LoadError::InvalidValue { .. }
        | LoadError::EngineUnavailable { .. }
        | LoadError::Config(_) => "config",
    }
}

fn missing_username_message() -> &'static str {
    "user name can not be determined: pass --username <NAME>"
}
