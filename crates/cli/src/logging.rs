use std::{
    fs::File,
    io::{self, IsTerminal},
    path::Path,
    sync::Mutex,
};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error_presentation::{CliError, CliResult};

const DEFAULT_FILTER: &str = "info";

/// Human-readable events go to stderr; with `log_output` every event is also
/// written to that file as one JSON object per line.
pub(crate) fn init(log_output: Option<&Path>) -> CliResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let ansi = io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();

    let json = log_output
        .map(|path| {
            File::create(path).map_err(|source| CliError::LogOutput {
                path: path.to_path_buf(),
                source,
            })
        })
        .transpose()?
        .map(|file| fmt::layer().json().with_writer(Mutex::new(file)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(ansi)
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(json)
        .init();
    Ok(())
}
