use std::fmt;

use docql_error::{Result, decode_err};
use docql_proto::Datum;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::atomicity::classify_row;

/// Kind of write a result belongs to. Decides how aliased counters are
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Insert,
    Update,
    Replace,
    Delete,
    /// A for-each or any other write whose kind isn't known up front.
    Mixed,
}

/// Counter a row is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeField {
    Inserted,
    Updated,
    Modified,
    Deleted,
    Skipped,
    Errors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub message: String,
}

/// Normalized summary of a write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub modified: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Message of the first failed row, if any.
    pub first_error: Option<String>,
    /// Keys the server generated for inserted documents without one.
    pub generated_keys: Vec<Datum>,
    /// Errors reported for individual rows.
    pub row_errors: Vec<RowError>,
}

const COUNT_FIELDS: &[&str] = &[
    "inserted",
    "updated",
    "modified",
    "deleted",
    "skipped",
    "errors",
    "replaced",
    "unchanged",
];

fn read_count(name: &str, value: &Datum) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| decode_err!("write result field '{name}' must be a count, got {value}"))
}

impl WriteOutcome {
    /// Normalize a write result returned by the server.
    ///
    /// Counters may be reported under aliases: `replaced` means an update for
    /// insert and update and a modification for replace, `unchanged` means
    /// skipped. If no counters are present they are derived from the per-row
    /// `changes` list.
    pub fn from_datum(kind: WriteKind, datum: &Datum) -> Result<Self> {
        let obj = datum.as_object().ok_or_else(|| {
            decode_err!("write result must be an object, got {}", datum.type_name())
        })?;

        let mut outcome = WriteOutcome::default();
        let has_counts = obj.keys().any(|k| COUNT_FIELDS.contains(&k.as_str()));

        for (name, value) in obj {
            match name.as_str() {
                "inserted" => outcome.inserted += read_count(name, value)?,
                "updated" => outcome.updated += read_count(name, value)?,
                "modified" => outcome.modified += read_count(name, value)?,
                "deleted" => outcome.deleted += read_count(name, value)?,
                "skipped" | "unchanged" => outcome.skipped += read_count(name, value)?,
                "errors" => outcome.errors += read_count(name, value)?,
                "replaced" => {
                    let n = read_count(name, value)?;
                    match kind {
                        WriteKind::Replace => outcome.modified += n,
                        _ => outcome.updated += n,
                    }
                }
                "first_error" => {
                    outcome.first_error = match value {
                        Datum::Null => None,
                        Datum::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    }
                }
                "generated_keys" => {
                    let keys = value.as_array().ok_or_else(|| {
                        decode_err!("generated_keys must be an array, got {}", value.type_name())
                    })?;
                    outcome.generated_keys = keys.to_vec();
                }
                "changes" => outcome.apply_changes(kind, value, !has_counts)?,
                _ => trace!(%name, "ignoring unknown write result field"),
            }
        }

        if outcome.first_error.is_none() {
            outcome.first_error = outcome.row_errors.first().map(|e| e.message.clone());
        }

        Ok(outcome)
    }

    fn apply_changes(&mut self, kind: WriteKind, changes: &Datum, count_rows: bool) -> Result<()> {
        let changes = changes.as_array().ok_or_else(|| {
            decode_err!("changes must be an array, got {}", changes.type_name())
        })?;

        for change in changes {
            if let Some(message) = change.get("error") {
                let message = match message {
                    Datum::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.row_errors.push(RowError { message });
                if count_rows {
                    self.errors += 1;
                }
                continue;
            }
            if !count_rows {
                continue;
            }
            let field = classify_row(kind, change.get("old_val"), change.get("new_val"));
            self.increment(field);
        }
        Ok(())
    }

    pub fn increment(&mut self, field: OutcomeField) {
        match field {
            OutcomeField::Inserted => self.inserted += 1,
            OutcomeField::Updated => self.updated += 1,
            OutcomeField::Modified => self.modified += 1,
            OutcomeField::Deleted => self.deleted += 1,
            OutcomeField::Skipped => self.skipped += 1,
            OutcomeField::Errors => self.errors += 1,
        }
    }

    /// Total number of rows the write touched or tried to touch.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.modified + self.deleted + self.skipped + self.errors
    }

    /// Point writes affect at most one row, so every counter is zero or one.
    pub fn validate_point(&self) -> Result<()> {
        for (name, value) in [
            ("inserted", self.inserted),
            ("updated", self.updated),
            ("modified", self.modified),
            ("deleted", self.deleted),
            ("skipped", self.skipped),
            ("errors", self.errors),
        ] {
            if value > 1 {
                return Err(decode_err!(
                    "point write reported {value} {name} rows, expected at most one"
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted={} updated={} modified={} deleted={} skipped={} errors={}",
            self.inserted, self.updated, self.modified, self.deleted, self.skipped, self.errors
        )?;
        if let Some(err) = &self.first_error {
            write!(f, " first_error={err:?}")?;
        }
        Ok(())
    }
}
