//! In-process worksheet.
//!
//! Behaves like a Sheets worksheet closely enough for the survey service:
//! formulas entered with [`ValueInput::UserEntered`] are kept as formulas,
//! a leading `'` in that mode marks literal text and is not stored, and the
//! rendered view shows a `HYPERLINK` formula as its label. Every
//! trait call is counted so callers can assert that nothing touched the
//! store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{CellColor, FIRST_DATA_ROW, StoreError, ValueInput, Worksheet, validate_data_rows};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cell {
    Text(String),
    Formula(String),
}

impl Cell {
    fn new(value: &str, input: ValueInput) -> Self {
        match input {
            ValueInput::UserEntered if value.trim_start().starts_with('=') => {
                Self::Formula(value.to_string())
            }
            ValueInput::UserEntered => {
                Self::Text(value.strip_prefix('\'').unwrap_or(value).to_string())
            }
            ValueInput::Raw => Self::Text(value.to_string()),
        }
    }

    fn raw(&self) -> String {
        match self {
            Self::Text(s) | Self::Formula(s) => s.clone(),
        }
    }

    fn rendered(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Formula(f) => render_formula(f),
        }
    }
}

/// Evaluates the only formula the survey writes: `HYPERLINK(url, label)`
/// shows `label`. Anything else renders as its source text.
fn render_formula(formula: &str) -> String {
    let body = formula.trim_start().trim_start_matches('=').trim_start();
    if !body.to_ascii_uppercase().starts_with("HYPERLINK") {
        return formula.to_string();
    }
    let quoted: Vec<&str> = body.split('"').skip(1).step_by(2).collect();
    match quoted.as_slice() {
        [_, label, ..] => (*label).to_string(),
        [url] => (*url).to_string(),
        [] => formula.to_string(),
    }
}

#[derive(Debug, Default)]
struct State {
    exists: bool,
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
    backgrounds: BTreeMap<(u32, u32), CellColor>,
    calls: usize,
    fail_formatting: bool,
    offline: bool,
}

impl State {
    fn check(&mut self) -> Result<(), StoreError> {
        self.calls += 1;
        if self.offline {
            return Err(StoreError::Http {
                status: 503,
                message: "store offline".to_string(),
            });
        }
        if !self.exists {
            return Err(StoreError::NotFound {
                what: "worksheet".to_string(),
            });
        }
        Ok(())
    }

    fn last_row(&self) -> u32 {
        u32::try_from(self.rows.len()).unwrap_or(u32::MAX - 1) + 1
    }
}

/// A worksheet held in memory.
#[derive(Debug, Default)]
pub struct MemoryWorksheet {
    state: Mutex<State>,
}

impl MemoryWorksheet {
    /// Creates a store whose worksheet does not exist yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an existing worksheet with the given header and raw rows.
    #[must_use]
    pub fn with_rows<H, R>(header: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = Vec<String>>,
    {
        let state = State {
            exists: true,
            header: header.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|row| {
                    row.iter()
                        .map(|v| Cell::new(v, ValueInput::UserEntered))
                        .collect()
                })
                .collect(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of trait calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Makes [`Worksheet::format_cell`] fail until turned off again.
    pub fn set_fail_formatting(&self, fail: bool) {
        self.lock().fail_formatting = fail;
    }

    /// Makes every operation fail with HTTP 503 until turned off again.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Returns the background color of a cell, if one was set.
    #[must_use]
    pub fn background(&self, row: u32, column: u32) -> Option<CellColor> {
        self.lock().backgrounds.get(&(row, column)).copied()
    }

    /// Returns the current header without counting a call.
    #[must_use]
    pub fn snapshot_header(&self) -> Vec<String> {
        self.lock().header.clone()
    }

    /// Returns the raw data rows without counting a call.
    #[must_use]
    pub fn snapshot_rows(&self) -> Vec<Vec<String>> {
        self.lock()
            .rows
            .iter()
            .map(|row| row.iter().map(Cell::raw).collect())
            .collect()
    }
}

#[async_trait]
impl Worksheet for MemoryWorksheet {
    async fn ensure_worksheet(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls += 1;
        if !state.exists {
            log::info!("Creating in-memory worksheet");
            state.exists = true;
        }
        Ok(())
    }

    async fn header(&self) -> Result<Vec<String>, StoreError> {
        let mut state = self.lock();
        state.check()?;
        Ok(state.header.clone())
    }

    async fn write_header(&self, columns: &[String]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        state.header = columns.to_vec();
        Ok(())
    }

    async fn append(&self, values: &[String], input: ValueInput) -> Result<u32, StoreError> {
        let mut state = self.lock();
        state.check()?;
        state
            .rows
            .push(values.iter().map(|v| Cell::new(v, input)).collect());
        Ok(state.last_row())
    }

    async fn fetch_all_rendered(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let mut state = self.lock();
        state.check()?;
        Ok(state
            .rows
            .iter()
            .map(|row| row.iter().map(Cell::rendered).collect())
            .collect())
    }

    async fn fetch_all_raw(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let mut state = self.lock();
        state.check()?;
        Ok(state
            .rows
            .iter()
            .map(|row| row.iter().map(Cell::raw).collect())
            .collect())
    }

    async fn format_cell(
        &self,
        row: u32,
        column: u32,
        color: CellColor,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        if state.fail_formatting {
            return Err(StoreError::Http {
                status: 500,
                message: "formatting failed".to_string(),
            });
        }
        if row == 0 || row > state.last_row() {
            return Err(StoreError::InvalidRow { row });
        }
        if column == 0 {
            return Err(StoreError::InvalidColumn { column });
        }
        state.backgrounds.insert((row, column), color);
        Ok(())
    }

    async fn write_cells(&self, column: u32, cells: &[(u32, String)]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        let index = usize::try_from(column)
            .ok()
            .and_then(|c| c.checked_sub(1))
            .ok_or(StoreError::InvalidColumn { column })?;
        let last = state.last_row();
        if let Some((row, _)) = cells
            .iter()
            .find(|(row, _)| *row < FIRST_DATA_ROW || *row > last)
        {
            return Err(StoreError::InvalidRow { row: *row });
        }

        for (row, value) in cells {
            let target = &mut state.rows[(row - FIRST_DATA_ROW) as usize];
            if target.len() <= index {
                target.resize(index + 1, Cell::Text(String::new()));
            }
            target[index] = Cell::Text(value.clone());
        }
        Ok(())
    }

    async fn insert_column(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        let width = state.header.len();
        state.header.push(name.to_string());
        for row in &mut state.rows {
            if row.len() > width {
                row.insert(width, Cell::Text(String::new()));
            }
        }
        Ok(())
    }

    async fn delete_column(&self, column: u32) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        let index = usize::try_from(column)
            .ok()
            .and_then(|c| c.checked_sub(1))
            .filter(|i| *i < state.header.len())
            .ok_or(StoreError::InvalidColumn { column })?;

        state.header.remove(index);
        for row in &mut state.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
        state.backgrounds = std::mem::take(&mut state.backgrounds)
            .into_iter()
            .filter(|((_, c), _)| *c != column)
            .map(|((r, c), color)| ((r, if c > column { c - 1 } else { c }), color))
            .collect();
        Ok(())
    }

    async fn delete_rows(&self, rows: &BTreeSet<u32>) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        validate_data_rows(rows)?;
        let last = state.last_row();
        if let Some(row) = rows.iter().find(|r| **r > last) {
            return Err(StoreError::InvalidRow { row: *row });
        }

        for row in rows.iter().rev() {
            state.rows.remove((row - FIRST_DATA_ROW) as usize);
        }
        state.backgrounds = std::mem::take(&mut state.backgrounds)
            .into_iter()
            .filter(|((r, _), _)| !rows.contains(r))
            .map(|((r, c), color)| {
                let shift = u32::try_from(rows.range(..r).count()).unwrap_or(0);
                ((r - shift, c), color)
            })
            .collect();
        Ok(())
    }

    async fn clear_all_data_rows(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        state.rows.clear();
        state.backgrounds.retain(|(r, _), _| *r < FIRST_DATA_ROW);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn red() -> CellColor {
        CellColor::from_hex("#ff0000").unwrap()
    }

    #[tokio::test]
    async fn missing_worksheet_is_not_found_until_ensured() {
        let ws = MemoryWorksheet::new();
        assert!(matches!(ws.header().await, Err(StoreError::NotFound { .. })));
        ws.ensure_worksheet().await.unwrap();
        assert!(ws.header().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_returns_physical_row() {
        let ws = MemoryWorksheet::with_rows(["a", "b"], Vec::new());
        let first = ws.append(&strings(&["1", "2"]), ValueInput::Raw).await.unwrap();
        let second = ws.append(&strings(&["3", "4"]), ValueInput::Raw).await.unwrap();
        assert_eq!((first, second), (2, 3));
    }

    #[tokio::test]
    async fn hyperlink_formulas_render_as_label() {
        let ws = MemoryWorksheet::with_rows(["maps_link"], Vec::new());
        let formula = r#"=HYPERLINK("https://www.google.com/maps?q=1,2","Abrir en Maps")"#;
        ws.append(&strings(&[formula]), ValueInput::UserEntered)
            .await
            .unwrap();
        assert_eq!(
            ws.fetch_all_rendered().await.unwrap(),
            vec![strings(&["Abrir en Maps"])]
        );
        assert_eq!(ws.fetch_all_raw().await.unwrap(), vec![strings(&[formula])]);
    }

    #[tokio::test]
    async fn raw_input_keeps_formula_text_visible() {
        let ws = MemoryWorksheet::with_rows(["x"], Vec::new());
        ws.append(&strings(&["=HYPERLINK(\"u\",\"l\")"]), ValueInput::Raw)
            .await
            .unwrap();
        assert_eq!(
            ws.fetch_all_rendered().await.unwrap(),
            vec![strings(&["=HYPERLINK(\"u\",\"l\")"])]
        );
    }

    #[tokio::test]
    async fn literal_prefix_keeps_user_entered_text() {
        let ws = MemoryWorksheet::with_rows(["a", "b"], Vec::new());
        ws.append(
            &strings(&["'=HYPERLINK(\"u\",\"l\")", "''quoted"]),
            ValueInput::UserEntered,
        )
        .await
        .unwrap();
        let expected = vec![strings(&["=HYPERLINK(\"u\",\"l\")", "'quoted"])];
        assert_eq!(ws.fetch_all_rendered().await.unwrap(), expected);
        assert_eq!(ws.fetch_all_raw().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn write_cells_touches_only_targets() {
        let ws = MemoryWorksheet::with_rows(
            ["a", "b"],
            vec![strings(&["1"]), strings(&["2", "keep"]), strings(&["3"])],
        );
        ws.write_cells(2, &[(2, "x".to_string()), (4, "z".to_string())])
            .await
            .unwrap();
        assert_eq!(
            ws.snapshot_rows(),
            vec![strings(&["1", "x"]), strings(&["2", "keep"]), strings(&["3", "z"])]
        );
        assert!(matches!(
            ws.write_cells(2, &[(5, "y".to_string())]).await,
            Err(StoreError::InvalidRow { row: 5 })
        ));
        assert!(matches!(
            ws.write_cells(2, &[(1, "y".to_string())]).await,
            Err(StoreError::InvalidRow { row: 1 })
        ));
        assert!(matches!(
            ws.write_cells(0, &[]).await,
            Err(StoreError::InvalidColumn { column: 0 })
        ));
    }

    #[tokio::test]
    async fn delete_rows_removes_exactly_those_rows() {
        let rows = (1..=5).map(|i| strings(&[i.to_string().as_str()])).collect::<Vec<_>>();
        let ws = MemoryWorksheet::with_rows(["n"], rows);
        ws.format_cell(6, 1, red()).await.unwrap();

        let targets: BTreeSet<u32> = [3, 5].into_iter().collect();
        ws.delete_rows(&targets).await.unwrap();

        assert_eq!(
            ws.fetch_all_raw().await.unwrap(),
            vec![strings(&["1"]), strings(&["3"]), strings(&["5"])]
        );
        // Row 6 moved up by two.
        assert_eq!(ws.background(4, 1), Some(red()));
        assert_eq!(ws.background(6, 1), None);
    }

    #[tokio::test]
    async fn delete_rows_rejects_header_and_out_of_range() {
        let ws = MemoryWorksheet::with_rows(["n"], vec![strings(&["1"])]);
        let header: BTreeSet<u32> = [1].into_iter().collect();
        assert!(matches!(
            ws.delete_rows(&header).await,
            Err(StoreError::InvalidRow { row: 1 })
        ));
        let past: BTreeSet<u32> = [2, 9].into_iter().collect();
        assert!(matches!(
            ws.delete_rows(&past).await,
            Err(StoreError::InvalidRow { row: 9 })
        ));
        assert_eq!(ws.snapshot_rows().len(), 1);
    }

    #[tokio::test]
    async fn column_edits_shift_cells() {
        let ws = MemoryWorksheet::with_rows(
            ["a", "lat", "b"],
            vec![strings(&["1", "9.9", "2"])],
        );
        ws.delete_column(2).await.unwrap();
        ws.insert_column("c").await.unwrap();
        assert_eq!(ws.header().await.unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(ws.fetch_all_raw().await.unwrap(), vec![strings(&["1", "2"])]);
        assert!(matches!(
            ws.delete_column(0).await,
            Err(StoreError::InvalidColumn { column: 0 })
        ));
        assert!(matches!(
            ws.delete_column(4).await,
            Err(StoreError::InvalidColumn { column: 4 })
        ));
    }

    #[tokio::test]
    async fn clear_keeps_header() {
        let ws = MemoryWorksheet::with_rows(["a"], vec![strings(&["1"]), strings(&["2"])]);
        ws.clear_all_data_rows().await.unwrap();
        assert!(ws.fetch_all_raw().await.unwrap().is_empty());
        assert_eq!(ws.header().await.unwrap(), strings(&["a"]));
    }

    #[tokio::test]
    async fn injected_failures_and_call_counting() {
        let ws = MemoryWorksheet::with_rows(["a"], vec![strings(&["1"])]);
        assert_eq!(ws.call_count(), 0);

        ws.set_fail_formatting(true);
        assert!(ws.format_cell(2, 1, red()).await.is_err());
        ws.set_fail_formatting(false);
        ws.format_cell(2, 1, red()).await.unwrap();

        ws.set_offline(true);
        assert!(matches!(
            ws.fetch_all_raw().await,
            Err(StoreError::Http { status: 503, .. })
        ));
        assert_eq!(ws.call_count(), 3);
    }

    #[test]
    fn renders_hyperlink_variants() {
        assert_eq!(render_formula(r#"=HYPERLINK("u";"Abrir")"#), "Abrir");
        assert_eq!(render_formula(r#"=hyperlink("u")"#), "u");
        assert_eq!(render_formula("=SUM(A1:A2)"), "=SUM(A1:A2)");
    }
}
