//! Pure data model: identities, row indexes, tables, selectors.
//!
//! Nothing in this module performs IO; storage-facing code lives in
//! `storage`, `codec` and `frame`.

pub mod identity;
pub mod selectors;
pub mod table;

pub use identity::{ColumnId, ColumnIdentity, IdentityError, IdentityField};
pub use selectors::{ColumnSelector, DropSelector, RowSelector, SelectorError};
pub use table::{Column, RowIndex, Table, TableShapeError};
