use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

use docql_error::{DocQlError, Result};
use docql_proto::{Datum, Term, TermType};

pub const DEFAULT_DATABASE: &str = "test";

/// How the server acknowledges writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Durability {
    /// Writes are acknowledged once on disk.
    #[default]
    Hard,
    /// Writes are acknowledged once in memory.
    Soft,
}

impl Durability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Durability::Hard => "hard",
            Durability::Soft => "soft",
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub default_database: String,
    pub durability: Durability,
    pub profile: bool,
    /// Maximum rows per batch. Zero lets the server decide.
    pub max_batch_rows: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            default_database: DEFAULT_DATABASE.to_string(),
            durability: Durability::Hard,
            profile: false,
            max_batch_rows: 0,
        }
    }
}

impl SessionConfig {
    pub fn set_from_datum(&mut self, name: &str, value: &Datum) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DocQlError::Build(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_datum(&self, name: &str) -> Result<Datum> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DocQlError::Build(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();
        let value = def_conf.get_as_datum(name)?;
        self.set_from_datum(name, &value)
    }

    /// Query-wide options sent with every start request.
    ///
    /// Settings at their server default are left out.
    pub fn start_options(&self) -> BTreeMap<String, Term> {
        let mut options = BTreeMap::new();
        options.insert(
            "db".to_string(),
            Term::new(
                TermType::Db,
                vec![Term::datum(self.default_database.as_str())],
            ),
        );
        if self.durability != Durability::Hard {
            options.insert(
                DurabilitySetting::NAME.to_string(),
                Term::datum(self.durability.as_str()),
            );
        }
        if self.profile {
            options.insert(Profile::NAME.to_string(), Term::datum(true));
        }
        if self.max_batch_rows != 0 {
            options.insert(
                MaxBatchRows::NAME.to_string(),
                Term::datum(self.max_batch_rows),
            );
        }
        options
    }
}

struct SettingFunctions {
    set: fn(value: &Datum, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> Datum,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_datum as _,
            get: S::get_as_datum as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<DefaultDatabase>(&mut map);
    insert_setting::<DurabilitySetting>(&mut map);
    insert_setting::<Profile>(&mut map);
    insert_setting::<MaxBatchRows>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_datum(conf: &SessionConfig) -> Datum;
}

fn type_mismatch(name: &str, expected: &str, value: &Datum) -> DocQlError {
    DocQlError::Build(format!(
        "Setting '{name}' expects a {expected}, got {}",
        value.type_name()
    ))
}

pub struct DefaultDatabase;

impl SessionSetting for DefaultDatabase {
    const NAME: &'static str = "default_database";
    const DESCRIPTION: &'static str = "Database used for tables referenced without one";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        let name = value
            .as_str()
            .ok_or_else(|| type_mismatch(Self::NAME, "string", value))?;
        crate::expr::relation::validate_name("database", name)?;
        conf.default_database = name.to_string();
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        conf.default_database.as_str().into()
    }
}

pub struct DurabilitySetting;

impl SessionSetting for DurabilitySetting {
    const NAME: &'static str = "durability";
    const DESCRIPTION: &'static str = "Write acknowledgement mode, 'hard' or 'soft'";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        conf.durability = match value.as_str() {
            Some("hard") => Durability::Hard,
            Some("soft") => Durability::Soft,
            Some(other) => {
                return Err(DocQlError::Build(format!(
                    "Invalid durability '{other}', expected 'hard' or 'soft'"
                )));
            }
            None => return Err(type_mismatch(Self::NAME, "string", value)),
        };
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        conf.durability.as_str().into()
    }
}

pub struct Profile;

impl SessionSetting for Profile {
    const NAME: &'static str = "profile";
    const DESCRIPTION: &'static str = "Ask the server to return profiling information";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        conf.profile = value
            .as_bool()
            .ok_or_else(|| type_mismatch(Self::NAME, "bool", value))?;
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        conf.profile.into()
    }
}

const MAX_BATCH_ROWS_LIMIT: u64 = 1_000_000;

pub struct MaxBatchRows;

impl MaxBatchRows {
    pub fn validate_value(val: u64) -> Result<()> {
        if val > MAX_BATCH_ROWS_LIMIT {
            return Err(DocQlError::Build(format!(
                "Max batch rows cannot be greater than {MAX_BATCH_ROWS_LIMIT}"
            )));
        }
        Ok(())
    }
}

impl SessionSetting for MaxBatchRows {
    const NAME: &'static str = "max_batch_rows";
    const DESCRIPTION: &'static str = "Maximum number of rows per batch, 0 for server default";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        let val = value
            .as_u64()
            .ok_or_else(|| type_mismatch(Self::NAME, "non-negative integer", value))?;
        Self::validate_value(val)?;
        conf.max_batch_rows = val;
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        conf.max_batch_rows.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut conf = SessionConfig::default();
        conf.set_from_datum("durability", &Datum::from("soft")).unwrap();
        conf.set_from_datum("max_batch_rows", &Datum::from(100)).unwrap();
        assert_eq!(Durability::Soft, conf.durability);
        assert_eq!(Datum::from(100), conf.get_as_datum("max_batch_rows").unwrap());

        conf.reset("durability").unwrap();
        assert_eq!(Durability::Hard, conf.durability);
    }

    #[test]
    fn invalid_values() {
        let mut conf = SessionConfig::default();
        conf.set_from_datum("durability", &Datum::from("fast")).unwrap_err();
        conf.set_from_datum("profile", &Datum::from(1)).unwrap_err();
        conf.set_from_datum("max_batch_rows", &Datum::from(1.5)).unwrap_err();
        conf.set_from_datum("max_batch_rows", &Datum::from(2_000_000)).unwrap_err();
        conf.set_from_datum("default_database", &Datum::from("a b")).unwrap_err();
        conf.set_from_datum("missing", &Datum::Null).unwrap_err();
        assert_eq!(SessionConfig::default(), conf);
    }

    #[test]
    fn start_options_skip_defaults() {
        let conf = SessionConfig::default();
        let opts = conf.start_options();
        assert_eq!(vec!["db"], opts.keys().collect::<Vec<_>>());
        assert_eq!(r#"DB("test")"#, opts["db"].to_string());

        let conf = SessionConfig {
            durability: Durability::Soft,
            profile: true,
            max_batch_rows: 10,
            ..Default::default()
        };
        let opts = conf.start_options();
        assert_eq!(
            vec!["db", "durability", "max_batch_rows", "profile"],
            opts.keys().collect::<Vec<_>>()
        );
    }
}
