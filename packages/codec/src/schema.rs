//! Column layout of the live worksheet and its reconciliation policy.
//!
//! [`reconcile`] compares the live header with the canonical column set and
//! returns the structural edits needed to reach it: deprecated columns are
//! dropped (highest index first, so earlier drops never shift later ones)
//! and missing canonical columns are appended at the end. Columns that are
//! neither deprecated nor canonical are left where they are. Applying the
//! edits and reconciling again yields no further edits.

use serde::{Deserialize, Serialize};

use crate::fields::{CANONICAL_COLUMNS, DEPRECATED_COLUMNS};

/// The ordered header row of the worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    columns: Vec<String>,
}

impl ColumnLayout {
    /// Creates a layout from header cells. Names are trimmed.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .collect(),
        }
    }

    /// Returns the canonical layout written to brand-new worksheets.
    #[must_use]
    pub fn canonical() -> Self {
        Self::new(CANONICAL_COLUMNS)
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the header row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(String::is_empty)
    }

    /// Returns the 0-based position of the first column with this name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns the 1-based spreadsheet column number of this name.
    #[must_use]
    pub fn column_number(&self, name: &str) -> Option<u32> {
        self.position(name).and_then(|i| u32::try_from(i + 1).ok())
    }

    /// Returns `true` if a column with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Applies one edit to this in-memory layout, mirroring what the store
    /// does for the same edit.
    pub fn apply(&mut self, edit: &SchemaEdit) {
        match edit {
            SchemaEdit::DropColumn { index, .. } => {
                let i = (*index as usize).saturating_sub(1);
                if i < self.columns.len() {
                    self.columns.remove(i);
                }
            }
            SchemaEdit::AppendColumn { name } => self.columns.push(name.clone()),
        }
    }
}

/// A single structural change to the worksheet header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaEdit {
    /// Delete the column at this 1-based index.
    DropColumn {
        /// 1-based column index at the time the edit is applied.
        index: u32,
        /// Name of the dropped column (informational).
        name: String,
    },
    /// Add a column with this name after the last column.
    AppendColumn {
        /// Header name of the new column.
        name: String,
    },
}

impl std::fmt::Display for SchemaEdit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DropColumn { index, name } => write!(f, "drop column {index} ({name})"),
            Self::AppendColumn { name } => write!(f, "append column {name}"),
        }
    }
}

/// Computes the edits that bring `layout` to the canonical column set.
///
/// Drops come first, in descending index order; appends follow in
/// canonical order. An already-reconciled layout yields an empty list.
#[must_use]
pub fn reconcile(layout: &ColumnLayout) -> Vec<SchemaEdit> {
    let mut drops: Vec<SchemaEdit> = layout
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| DEPRECATED_COLUMNS.contains(&name.as_str()))
        .filter_map(|(i, name)| {
            u32::try_from(i + 1).ok().map(|index| SchemaEdit::DropColumn {
                index,
                name: name.clone(),
            })
        })
        .collect();
    drops.reverse();

    let appends = CANONICAL_COLUMNS
        .iter()
        .filter(|column| !layout.contains(column))
        .map(|column| SchemaEdit::AppendColumn {
            name: (*column).to_string(),
        });

    drops.into_iter().chain(appends).collect()
}

/// Returns the layout that results from applying `edits` in order.
#[must_use]
pub fn apply_all(layout: &ColumnLayout, edits: &[SchemaEdit]) -> ColumnLayout {
    let mut next = layout.clone();
    for edit in edits {
        next.apply(edit);
    }
    next
}
