use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use crate::{AlterStatement, ConfigError};

pub const DEFAULT_SCHEMA: &str = "wasg2";

/// Named byte blobs shipped next to an alterscript.
pub type Datafiles = BTreeMap<String, Vec<u8>>;

/// One versioned unit of schema or data change.
#[derive(Debug, Clone, PartialEq)]
pub struct Alterscript {
    pub id: String,
    /// Hex digest over the source and datafiles, computed once by the loader.
    pub hash: String,
    pub schema: String,
    pub engine: Option<String>,
    pub environments: Option<BTreeSet<String>>,
    /// Instance types to run on; empty means every instance.
    pub instances: BTreeSet<String>,
    pub isolation: Option<IsolationLevel>,
    pub checkok: Option<String>,
    pub checks: Vec<Check>,
    pub statements: Vec<AlterStatement>,
    pub synchronization: bool,
    pub autocommit: bool,
    pub datafiles: Datafiles,
}

impl Alterscript {
    pub fn new(id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hash: hash.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            engine: None,
            environments: None,
            instances: BTreeSet::new(),
            isolation: None,
            checkok: None,
            checks: Vec::new(),
            statements: Vec::new(),
            synchronization: false,
            autocommit: false,
            datafiles: Datafiles::new(),
        }
    }

    pub fn matches_engine(&self, engine: &str) -> bool {
        self.engine
            .as_deref()
            .is_none_or(|wanted| wanted.eq_ignore_ascii_case(engine))
    }

    /// An alterscript limited to some environments never runs when the
    /// environment is unknown.
    pub fn matches_environment(&self, environment: Option<&str>) -> bool {
        match (&self.environments, environment) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(allowed), Some(environment)) => allowed.contains(environment),
        }
    }

    pub fn matches_instance_type(&self, instance_type: &str) -> bool {
        self.instances.is_empty() || self.instances.contains(instance_type)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for check in &self.checks {
            check.validate()?;
        }
        for statement in &self.statements {
            statement.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Alterscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Isolation levels, named the DB2 way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Uncommitted read.
    Ur,
    /// Cursor stability.
    Cs,
    /// Read stability.
    Rs,
    /// Repeatable read.
    Rr,
}

impl IsolationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ur => "UR",
            Self::Cs => "CS",
            Self::Rs => "RS",
            Self::Rr => "RR",
        }
    }

    /// ANSI name of the equivalent level.
    pub fn ansi_name(self) -> &'static str {
        match self {
            Self::Ur => "READ UNCOMMITTED",
            Self::Cs => "READ COMMITTED",
            Self::Rs => "REPEATABLE READ",
            Self::Rr => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "UR" => Ok(Self::Ur),
            "CS" => Ok(Self::Cs),
            "RS" => Ok(Self::Rs),
            "RR" => Ok(Self::Rr),
            other => Err(format!(
                "unknown isolation level `{other}`; expected UR, CS, RS or RR"
            )),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckType {
    Table,
    View,
    Index,
    Routine,
    Trigger,
    Reference,
    Check,
    Column,
}

impl CheckType {
    pub const ALL: [Self; 8] = [
        Self::Table,
        Self::View,
        Self::Index,
        Self::Routine,
        Self::Trigger,
        Self::Reference,
        Self::Check,
        Self::Column,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Index => "index",
            Self::Routine => "routine",
            Self::Trigger => "trigger",
            Self::Reference => "reference",
            Self::Check => "check",
            Self::Column => "column",
        }
    }

    /// Catalog view listing objects of this type (DB2 `syscat` naming).
    pub fn catalog_table(self) -> &'static str {
        match self {
            Self::Table => "tables",
            Self::View => "views",
            Self::Index => "indexes",
            Self::Routine => "routines",
            Self::Trigger => "triggers",
            Self::Reference => "references",
            Self::Check => "checks",
            Self::Column => "columns",
        }
    }

    /// Column prefix of the `<prefix>schema` / `<prefix>name` catalog columns.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::Table | Self::Trigger | Self::Reference | Self::Check | Self::Column => "tab",
            Self::View => "view",
            Self::Index => "ind",
            Self::Routine => "routine",
        }
    }

    /// Discriminator column for objects that live inside a table.
    pub fn extra_column(self) -> Option<&'static str> {
        match self {
            Self::Trigger => Some("trigname"),
            Self::Reference | Self::Check => Some("constname"),
            Self::Column => Some("colname"),
            Self::Table | Self::View | Self::Index | Self::Routine => None,
        }
    }

    pub fn requires_table(self) -> bool {
        self.extra_column().is_some()
    }
}

impl FromStr for CheckType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|check_type| check_type.as_str() == lowered)
            .ok_or_else(|| format!("unknown check type `{value}`"))
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog existence probe used to infer that an alterscript is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub check_type: CheckType,
    pub name: String,
    pub table: Option<String>,
    pub inverted: bool,
}

impl Check {
    pub fn new(check_type: CheckType, name: impl Into<String>) -> Self {
        Self {
            check_type,
            name: name.into(),
            table: None,
            inverted: false,
        }
    }

    #[must_use]
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidCheck {
                check: self.to_string(),
                reason: "name is required",
            });
        }
        if self.check_type.requires_table()
            && self.table.as_deref().is_none_or(|table| table.trim().is_empty())
        {
            return Err(ConfigError::InvalidCheck {
                check: self.to_string(),
                reason: "table is required for this check type",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            f.write_str("not ")?;
        }
        write!(f, "{} ", self.check_type)?;
        if let Some(table) = &self.table {
            write!(f, "{table}.")?;
        }
        f.write_str(&self.name)
    }
}
