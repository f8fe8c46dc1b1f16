//! Column identities and their stable text form.
//!
//! Every logical column is named by a [`ColumnIdentity`]: a numeric id that
//! is unique within a frame, the source-table name, a key, an optional
//! variable type, and a unit string. Simple variables omit the type
//! (4-tuple); full variables carry it (5-tuple). A frame is homogeneous in
//! this regard, which `Table` validates on construction.
//!
//! Physical column headers must be homogeneous text, so an identity
//! round-trips through a JSON-array header string (the numeric id is
//! stringified on the way out and parsed back on the way in). Using a JSON
//! array rather than a hand-rolled delimiter keeps keys containing
//! arbitrary punctuation safe.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Numeric identifier of a logical column, unique within a frame.
///
/// A newtype so ids cannot be mixed up with row counts or positions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ColumnId(pub i64);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The full identity tuple naming one logical column.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ColumnIdentity {
    /// Numeric id, unique within the owning frame.
    pub id: ColumnId,
    /// Name of the source table this column came from.
    pub table: String,
    /// Variable key within the source table.
    pub key: String,
    /// Variable type; `None` for simple variables.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Unit string, for example `SM3/DAY`.
    pub units: String,
}

impl ColumnIdentity {
    /// Create a simple (4-tuple) identity.
    pub fn simple(
        id: i64,
        table: impl Into<String>,
        key: impl Into<String>,
        units: impl Into<String>,
    ) -> Self {
        Self {
            id: ColumnId(id),
            table: table.into(),
            key: key.into(),
            kind: None,
            units: units.into(),
        }
    }

    /// Create a full (5-tuple) identity carrying a variable type.
    pub fn full(
        id: i64,
        table: impl Into<String>,
        key: impl Into<String>,
        kind: impl Into<String>,
        units: impl Into<String>,
    ) -> Self {
        Self {
            id: ColumnId(id),
            table: table.into(),
            key: key.into(),
            kind: Some(kind.into()),
            units: units.into(),
        }
    }

    /// Whether this identity carries a variable type (5-tuple form).
    pub fn is_full(&self) -> bool {
        self.kind.is_some()
    }

    /// Serialize to the stable text header used for physical column names.
    ///
    /// The header is a JSON array of 4 or 5 strings with the id stringified:
    /// `["7","SUMMARY","WOPR","rate","SM3/DAY"]`.
    pub fn to_header(&self) -> String {
        let mut parts = vec![self.id.0.to_string(), self.table.clone(), self.key.clone()];
        if let Some(kind) = &self.kind {
            parts.push(kind.clone());
        }
        parts.push(self.units.clone());
        // Serializing a Vec<String> cannot fail.
        serde_json::to_string(&parts).unwrap_or_default()
    }

    /// Parse an identity back from its stable text header.
    pub fn from_header(header: &str) -> Result<Self, IdentityError> {
        let parts: Vec<String> =
            serde_json::from_str(header).ok().context(InvalidHeaderSnafu { header })?;

        let (id_text, table, key, kind, units) = match parts.as_slice() {
            [id, table, key, units] => (id, table, key, None, units),
            [id, table, key, kind, units] => (id, table, key, Some(kind.clone()), units),
            _ => return InvalidHeaderSnafu { header }.fail(),
        };

        let id = id_text
            .parse::<i64>()
            .ok()
            .context(InvalidIdSnafu { text: id_text.clone() })?;

        Ok(Self {
            id: ColumnId(id),
            table: table.clone(),
            key: key.clone(),
            kind,
            units: units.clone(),
        })
    }
}

impl fmt::Display for ColumnIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(
                f,
                "({}, {}, {}, {}, {})",
                self.id, self.table, self.key, kind, self.units
            ),
            None => write!(f, "({}, {}, {}, {})", self.id, self.table, self.key, self.units),
        }
    }
}

/// One named field of a [`ColumnIdentity`], used by field-level drop
/// selectors. Being an enum, an invalid level name is unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityField {
    /// The numeric id (matched against its decimal string form).
    Id,
    /// The source-table name.
    Table,
    /// The variable key.
    Key,
    /// The variable type; absent types match nothing.
    Type,
    /// The unit string.
    Units,
}

impl IdentityField {
    /// Whether `identity`'s value for this field equals `value`.
    pub fn matches(&self, identity: &ColumnIdentity, value: &str) -> bool {
        match self {
            IdentityField::Id => identity.id.0.to_string() == value,
            IdentityField::Table => identity.table == value,
            IdentityField::Key => identity.key == value,
            IdentityField::Type => identity.kind.as_deref() == Some(value),
            IdentityField::Units => identity.units == value,
        }
    }
}

/// Errors from parsing identity headers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IdentityError {
    /// The header is not a JSON array of 4 or 5 strings.
    #[snafu(display("Invalid column header: {header:?}"))]
    InvalidHeader {
        /// The offending header text.
        header: String,
    },

    /// The id slot of the header does not parse as an integer.
    #[snafu(display("Invalid column id in header: {text:?}"))]
    InvalidId {
        /// The text that failed to parse.
        text: String,
    },
}
