use std::{
    collections::BTreeSet,
    fs,
    io,
    path::{Path, PathBuf},
};

use applyalter_core::{
    AlterStatement, Alterscript, Check, CheckType, CsvLoad, DEFAULT_SCHEMA, DEFAULT_STEP,
    IdListMigration, IdRangeMigration, IsolationLevel, MigrationSettings, ProcMigration,
    RangeBound, StatementKind,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{LoadError, Result},
    hash::ContentHash,
};

const ALTERSCRIPT_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Alterscripts in load order plus the hash over every loaded source.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAlters {
    pub alterscripts: Vec<Alterscript>,
    pub bundle_hash: String,
}

/// Loads alterscript files and directories. A directory contributes its
/// `.yaml`/`.yml` files ordered by name; datafiles are resolved next to the
/// alterscript that names them.
pub fn load_alterscripts<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedAlters> {
    let mut bundle = ContentHash::new();
    let mut alterscripts = Vec::new();

    for path in paths {
        let path = path.as_ref();
        for file in expand(path)? {
            let source = fs::read(&file).map_err(|source| LoadError::Read {
                path: file.clone(),
                source,
            })?;
            bundle.update(&source);

            let directory = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let id = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let alter = parse_alterscript(&id, &source, |name| fs::read(directory.join(name)))?;
            debug!(alterscript = %alter.id, hash = %alter.hash, "alterscript loaded");
            alterscripts.push(alter);
        }
    }

    Ok(LoadedAlters {
        alterscripts,
        bundle_hash: bundle.finish(),
    })
}

fn expand(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = fs::read_dir(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = entry.path();
        let is_alterscript = file
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| ALTERSCRIPT_EXTENSIONS.contains(&extension));
        if file.is_file() && is_alterscript {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses one alterscript. The hash covers the source followed by every
/// datafile in declaration order.
pub fn parse_alterscript(
    id: &str,
    source: &[u8],
    mut read_datafile: impl FnMut(&str) -> io::Result<Vec<u8>>,
) -> Result<Alterscript> {
    let document: AlterDocument =
        serde_yaml::from_slice(source).map_err(|source| LoadError::Parse {
            source_name: id.to_string(),
            source,
        })?;

    let mut hash = ContentHash::new();
    hash.update(source);

    let mut alter = document.into_alterscript(id)?;
    for datafile in &alter.datafile_names {
        let bytes = read_datafile(datafile).map_err(|source| LoadError::Datafile {
            alterscript: id.to_string(),
            datafile: datafile.clone(),
            source,
        })?;
        hash.update(&bytes);
        alter.inner.datafiles.insert(datafile.clone(), bytes);
    }
    alter.inner.hash = hash.finish();
    Ok(alter.inner)
}

struct Parsed {
    inner: Alterscript,
    datafile_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlterDocument {
    engine: Option<String>,
    schema: Option<String>,
    isolation: Option<String>,
    #[serde(default, alias = "environments")]
    environment: Option<OneOrMany>,
    #[serde(default, alias = "instances")]
    instance: Option<OneOrMany>,
    checkok: Option<String>,
    #[serde(default)]
    checks: Vec<CheckDocument>,
    #[serde(default)]
    synchronization: bool,
    #[serde(default)]
    autocommit: bool,
    #[serde(default, alias = "datafiles")]
    datafile: Vec<String>,
    #[serde(default)]
    statements: Vec<StatementDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_set(self) -> BTreeSet<String> {
        match self {
            Self::One(value) => BTreeSet::from([value]),
            Self::Many(values) => values.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckDocument {
    #[serde(rename = "type")]
    check_type: String,
    name: String,
    table: Option<String>,
    #[serde(default)]
    inverted: bool,
}

#[derive(Debug, Deserialize)]
struct StatementDocument {
    #[serde(default)]
    canfail: bool,
    #[serde(default)]
    ignore_sqlstate: Vec<Code>,
    #[serde(default)]
    ignore_sqlcode: Vec<i32>,
    #[serde(flatten)]
    kind: KindDocument,
}

/// SQLSTATEs such as `23505` read as YAML integers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Code {
    Number(i64),
    Text(String),
}

impl Code {
    fn into_string(self) -> String {
        match self {
            Self::Number(value) => format!("{value:05}"),
            Self::Text(value) => value,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindDocument {
    Sql(String),
    Comment(String),
    Select(String),
    Dynamic(String),
    Csv(CsvDocument),
    MigrationProc(MigrationDocument),
    MigrationIdRange(MigrationDocument),
    MigrationIdList(MigrationDocument),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CsvDocument {
    statement: String,
    file: String,
    step: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationDocument {
    statement: Option<String>,
    logid: Option<String>,
    description: Option<String>,
    maxblkcnt: Option<i64>,
    step: Option<i64>,
    placeholder: Option<String>,
    fromid: Option<Bound>,
    toid: Option<Bound>,
    idquery: Option<String>,
    idcolumn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Bound {
    Literal(i64),
    Expression(String),
}

impl From<Bound> for RangeBound {
    fn from(value: Bound) -> Self {
        match value {
            Bound::Literal(value) => Self::Literal(value),
            Bound::Expression(expression) => match expression.trim().parse() {
                Ok(value) => Self::Literal(value),
                Err(_) => Self::Expression(expression),
            },
        }
    }
}

impl MigrationDocument {
    fn settings(&mut self) -> MigrationSettings {
        MigrationSettings {
            logid: self.logid.take(),
            description: self.description.take(),
            max_blocks: self.maxblkcnt,
            step: self.step.unwrap_or(DEFAULT_STEP),
            placeholder: self.placeholder.take(),
        }
    }
}

impl AlterDocument {
    fn into_alterscript(self, id: &str) -> Result<Parsed> {
        let invalid = |field, reason: String| LoadError::InvalidValue {
            source_name: id.to_string(),
            field,
            reason,
        };

        let mut alter = Alterscript::new(id, "");
        alter.engine = self.engine;
        alter.schema = self.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        alter.isolation = self
            .isolation
            .map(|raw| raw.parse::<IsolationLevel>())
            .transpose()
            .map_err(|reason| invalid("isolation", reason))?;
        alter.environments = self.environment.map(OneOrMany::into_set);
        alter.instances = self.instance.map(OneOrMany::into_set).unwrap_or_default();
        alter.checkok = self.checkok;
        alter.synchronization = self.synchronization;
        alter.autocommit = self.autocommit;

        for check in self.checks {
            let check_type = check
                .check_type
                .parse::<CheckType>()
                .map_err(|reason| invalid("checks", reason))?;
            alter.checks.push(Check {
                check_type,
                name: check.name,
                table: check.table,
                inverted: check.inverted,
            });
        }

        alter.statements = self
            .statements
            .into_iter()
            .map(StatementDocument::into_statement)
            .collect();

        Ok(Parsed {
            inner: alter,
            datafile_names: self.datafile,
        })
    }
}

impl StatementDocument {
    fn into_statement(self) -> AlterStatement {
        let kind = match self.kind {
            KindDocument::Sql(sql) => StatementKind::Sql(sql),
            KindDocument::Comment(text) => StatementKind::Comment(text),
            KindDocument::Select(sql) => StatementKind::Select(sql),
            KindDocument::Dynamic(sql) => StatementKind::Dynamic(sql),
            KindDocument::Csv(csv) => StatementKind::Csv(CsvLoad {
                statement: csv.statement,
                file: csv.file,
                step: csv.step,
            }),
            KindDocument::MigrationProc(mut doc) => StatementKind::MigrationProc(ProcMigration {
                settings: doc.settings(),
                statement: doc.statement,
                lower: doc.fromid.map(RangeBound::from),
                upper: doc.toid.map(RangeBound::from),
            }),
            KindDocument::MigrationIdRange(mut doc) => {
                StatementKind::MigrationIdRange(IdRangeMigration {
                    settings: doc.settings(),
                    statement: doc.statement,
                    lower: doc.fromid.map(RangeBound::from),
                    upper: doc.toid.map(RangeBound::from),
                })
            }
            KindDocument::MigrationIdList(mut doc) => {
                StatementKind::MigrationIdList(IdListMigration {
                    settings: doc.settings(),
                    statement: doc.statement,
                    id_query: doc.idquery,
                    id_column: doc.idcolumn,
                })
            }
        };

        let mut statement = AlterStatement::new(kind).with_can_fail(self.canfail);
        for state in self.ignore_sqlstate {
            statement = statement.ignoring_sql_state(state.into_string());
        }
        for code in self.ignore_sqlcode {
            statement = statement.ignoring_sql_code(code);
        }
        statement
    }
}
