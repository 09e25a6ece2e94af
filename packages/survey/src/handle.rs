//! Store handle with one-time schema reconciliation.
//!
//! The first operation through a [`SheetHandle`] opens the worksheet
//! (creating it if needed), writes the canonical header into an empty
//! sheet, or reconciles an existing header. The resulting layout is kept
//! for the life of the handle so structural edits happen at most once per
//! acquisition.
//!
//! Rows that only carry raw `lat`/`lng` values get a map link written
//! before those columns are dropped. In that case the appends run first so
//! the link column exists; appending past the last column never shifts the
//! indices of the drops that follow.

use std::sync::Arc;

use survey_map_codec::fields::MAP_LINK;
use survey_map_codec::record;
use survey_map_codec::schema::{self, ColumnLayout, SchemaEdit};
use survey_map_store::{StoreError, Worksheet};
use tokio::sync::OnceCell;

/// Layout of the worksheet after the handle was prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// Live header after reconciliation.
    pub layout: ColumnLayout,
    /// Edits applied while preparing (empty if none were needed).
    pub applied: Vec<SchemaEdit>,
    /// Whether the header was written from scratch.
    pub bootstrapped: bool,
}

/// A worksheet plus its lazily reconciled layout.
pub struct SheetHandle {
    worksheet: Arc<dyn Worksheet>,
    prepared: OnceCell<Prepared>,
}

impl std::fmt::Debug for SheetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetHandle")
            .field("prepared", &self.prepared.get())
            .finish_non_exhaustive()
    }
}

impl SheetHandle {
    /// Wraps a worksheet. Nothing is read until the first operation.
    #[must_use]
    pub fn new(worksheet: Arc<dyn Worksheet>) -> Self {
        Self {
            worksheet,
            prepared: OnceCell::new(),
        }
    }

    /// Returns the underlying worksheet without preparing it.
    #[must_use]
    pub fn worksheet(&self) -> &dyn Worksheet {
        self.worksheet.as_ref()
    }

    /// Prepares the worksheet on first call and returns the result.
    ///
    /// A failed preparation is not cached; the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any store call fails.
    pub async fn prepared(&self) -> Result<&Prepared, StoreError> {
        self.prepared
            .get_or_try_init(|| prepare(self.worksheet.as_ref()))
            .await
    }

    /// Returns the live layout, preparing the worksheet first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if preparation fails.
    pub async fn layout(&self) -> Result<&ColumnLayout, StoreError> {
        Ok(&self.prepared().await?.layout)
    }
}

async fn prepare(worksheet: &dyn Worksheet) -> Result<Prepared, StoreError> {
    worksheet.ensure_worksheet().await?;

    let live = ColumnLayout::new(worksheet.header().await?);
    if live.is_empty() {
        let layout = ColumnLayout::canonical();
        log::info!("Writing canonical header: {}", layout.columns().join(", "));
        worksheet.write_header(layout.columns()).await?;
        return Ok(Prepared {
            layout,
            applied: Vec::new(),
            bootstrapped: true,
        });
    }

    let edits = schema::reconcile(&live);
    let drops_columns = edits
        .iter()
        .any(|e| matches!(e, SchemaEdit::DropColumn { .. }));
    let backfill = if drops_columns {
        record::legacy_link_backfill(&live, &worksheet.fetch_all_raw().await?)
    } else {
        Vec::new()
    };

    let ordered = if backfill.is_empty() {
        edits
    } else {
        let (mut appends, drops): (Vec<_>, Vec<_>) = edits
            .into_iter()
            .partition(|e| matches!(e, SchemaEdit::AppendColumn { .. }));
        appends.extend(drops);
        appends
    };

    let mut layout = live;
    let mut pending = Some(backfill).filter(|b| !b.is_empty());
    for edit in &ordered {
        if matches!(edit, SchemaEdit::DropColumn { .. })
            && let Some(cells) = pending.take()
        {
            write_links(worksheet, &layout, &cells).await?;
        }
        log::info!("Reconciling header: {edit}");
        match edit {
            SchemaEdit::DropColumn { index, .. } => worksheet.delete_column(*index).await?,
            SchemaEdit::AppendColumn { name } => worksheet.insert_column(name).await?,
        }
        layout.apply(edit);
    }

    Ok(Prepared {
        layout,
        applied: ordered,
        bootstrapped: false,
    })
}

async fn write_links(
    worksheet: &dyn Worksheet,
    layout: &ColumnLayout,
    cells: &[(u32, String)],
) -> Result<(), StoreError> {
    let Some(column) = layout.column_number(MAP_LINK) else {
        log::warn!("No {MAP_LINK} column; {} legacy locations not carried over", cells.len());
        return Ok(());
    };
    log::info!("Writing {} map links derived from legacy coordinates", cells.len());
    worksheet.write_cells(column, cells).await
}
