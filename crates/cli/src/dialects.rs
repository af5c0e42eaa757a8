use std::sync::Arc;

use applyalter_core::Dialect;
use applyalter_loader::Engine;

/// Dialects backed by driver crates compiled into this build.
pub(crate) fn resolve(engine: Engine) -> Option<Arc<dyn Dialect>> {
    match engine {
        #[cfg(feature = "postgres")]
        Engine::Postgres => Some(Arc::new(applyalter_dialect_postgres::PostgresDialect)),
        #[cfg(feature = "mysql")]
        Engine::Mysql => Some(Arc::new(applyalter_dialect_mysql::MysqlDialect)),
        #[cfg(feature = "sqlite")]
        Engine::Sqlite => Some(Arc::new(applyalter_dialect_sqlite::SqliteDialect)),
        _ => None,
    }
}

pub(crate) fn engines_help() -> String {
    let enabled = Engine::ALL
        .into_iter()
        .filter(|engine| resolve(*engine).is_some() || engine.builtin_dialect().is_some())
        .map(Engine::as_str)
        .collect::<Vec<_>>();
    format!("Engines: {}", enabled.join(", "))
}
