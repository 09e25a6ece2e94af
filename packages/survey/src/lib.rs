#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record lifecycle of the Pavas risk-factor survey.
//!
//! [`SurveyService`] is the only entry point callers need: it validates and
//! appends submissions, serves the normalized dataset through a short-lived
//! cache, deletes rows, clears the sheet, exports CSV and builds map data.
//! Every store access goes through a [`handle::SheetHandle`], which
//! reconciles the worksheet header once before the first operation.

pub mod cache;
pub mod config;
pub mod export;
pub mod handle;
pub mod validation;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use survey_map_codec::fields::Field;
use survey_map_codec::record;
use survey_map_codec::schema::{ColumnLayout, SchemaEdit};
use survey_map_store::{CellColor, StoreError, ValueInput, Worksheet};
use survey_map_styling::{LegendEntry, MapMarker};
use survey_map_survey_models::SurveyRecord;
use thiserror::Error;

pub use config::SurveyConfig;
pub use validation::{SubmitRequest, ValidationErrors};

use crate::cache::TtlCache;
use crate::handle::SheetHandle;

/// Timestamp format of `submitted_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from survey operations.
#[derive(Debug, Error)]
pub enum SurveyError {
    /// The submission was rejected before touching the store.
    #[error("Invalid submission:\n{0}")]
    Validation(#[from] ValidationErrors),

    /// A store call failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A setting could not be parsed.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    /// Physical row the record was written to.
    pub row_number: u32,
    /// Whether the category cell was colored. A `false` here never undoes
    /// the append.
    pub styled: bool,
}

/// Everything the map view needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    /// Initial center latitude.
    pub center_latitude: f64,
    /// Initial center longitude.
    pub center_longitude: f64,
    /// Initial zoom level.
    pub zoom: u8,
    /// Markers to draw.
    pub markers: Vec<MapMarker>,
    /// Categories present in the data, in catalog order.
    pub legend: Vec<LegendEntry>,
    /// Records that could not be placed on the map.
    pub unplaced: usize,
}

/// The survey's record operations over one worksheet.
#[derive(Debug)]
pub struct SurveyService {
    handle: SheetHandle,
    cache: TtlCache<Vec<SurveyRecord>>,
    config: SurveyConfig,
}

impl SurveyService {
    /// Creates a service over `worksheet`.
    #[must_use]
    pub fn new(worksheet: Arc<dyn Worksheet>, config: SurveyConfig) -> Self {
        Self {
            handle: SheetHandle::new(worksheet),
            cache: TtlCache::new(config.cache_ttl),
            config,
        }
    }

    /// Opens the configured store and reads settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError`] if the store or the settings are
    /// misconfigured.
    pub fn from_env() -> Result<Self, SurveyError> {
        let config = SurveyConfig::from_env()?;
        let worksheet = survey_map_store::open_from_env()?;
        Ok(Self::new(worksheet, config))
    }

    /// Returns the service settings.
    #[must_use]
    pub const fn config(&self) -> &SurveyConfig {
        &self.config
    }

    fn now(&self) -> String {
        Utc::now()
            .with_timezone(&self.config.utc_offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Validates and appends a submission, then colors its category cell.
    ///
    /// Validation failures return before any store call. Coloring is best
    /// effort: a failure is logged and reported through
    /// [`SubmitOutcome::styled`].
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Validation`] for invalid input, or
    /// [`SurveyError::Store`] if preparing the sheet or appending fails.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, SurveyError> {
        let new_record = validation::validate(request, self.now())?;

        let layout = self.handle.layout().await?;
        let mut values = record::encode(&new_record, layout, self.config.link_style);
        let input = if record::literalize_for_formula_link(&mut values, layout) {
            ValueInput::UserEntered
        } else {
            ValueInput::Raw
        };

        let row_number = match self.handle.worksheet().append(&values, input).await {
            Ok(row) => row,
            Err(e) => {
                log::error!("Failed to append survey record: {e}");
                return Err(e.into());
            }
        };
        self.cache.invalidate();
        log::info!(
            "Appended survey record for '{}' at row {row_number}",
            new_record.neighborhood
        );

        let primary = new_record.risk_factors.first().map_or("", |f| f.label());
        let styled = self.style_category_cell(layout, row_number, primary).await;

        Ok(SubmitOutcome { row_number, styled })
    }

    async fn style_category_cell(&self, layout: &ColumnLayout, row: u32, label: &str) -> bool {
        let Some(column) = factor_column(layout) else {
            log::warn!("No risk-factor column in header; row {row} left unstyled");
            return false;
        };
        let Some(color) = CellColor::from_hex(survey_map_styling::color_of(label)) else {
            return false;
        };

        match self
            .handle
            .worksheet()
            .format_cell(row, column, color)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Row {row} saved but could not be colored: {e}");
                false
            }
        }
    }

    /// Returns every record, served from cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Store`] if reading fails.
    pub async fn fetch_all(&self) -> Result<Arc<Vec<SurveyRecord>>, SurveyError> {
        if let Some(records) = self.cache.get() {
            log::debug!("Serving {} records from cache", records.len());
            return Ok(records);
        }
        log::debug!("Record cache miss, reading worksheet");

        let generation = self.cache.generation();
        let layout = self.handle.layout().await?;
        let worksheet = self.handle.worksheet();
        let rendered = worksheet.fetch_all_rendered().await?;
        let raw = worksheet.fetch_all_raw().await?;

        let records = record::decode_rows(layout, &rendered, &raw);
        let unplaced = records.iter().filter(|r| r.location.is_none()).count();
        if unplaced > 0 {
            log::warn!("{unplaced} of {} records have no decodable location", records.len());
        }

        Ok(self.cache.put(generation, records))
    }

    /// Deletes the given physical rows in one store call.
    ///
    /// Row numbers are those carried by [`SurveyRecord::row_number`]. An
    /// empty set is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Store`] if a row is invalid or deletion
    /// fails.
    pub async fn delete(&self, rows: &BTreeSet<u32>) -> Result<usize, SurveyError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.handle.prepared().await?;
        let result = self.handle.worksheet().delete_rows(rows).await;
        self.cache.invalidate();
        if let Err(e) = result {
            log::error!("Failed to delete rows {rows:?}: {e}");
            return Err(e.into());
        }
        log::info!("Deleted {} rows", rows.len());
        Ok(rows.len())
    }

    /// Deletes every data row, keeping the header.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Store`] if deletion fails.
    pub async fn clear_all(&self) -> Result<(), SurveyError> {
        self.handle.prepared().await?;
        let result = self.handle.worksheet().clear_all_data_rows().await;
        self.cache.invalidate();
        if let Err(e) = result {
            log::error!("Failed to clear survey records: {e}");
            return Err(e.into());
        }
        log::info!("Cleared all survey records");
        Ok(())
    }

    /// Returns the header edits applied when this service first touched
    /// the worksheet, preparing it now if that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Store`] if preparation fails.
    pub async fn reconcile(&self) -> Result<Vec<SchemaEdit>, SurveyError> {
        Ok(self.handle.prepared().await?.applied.clone())
    }

    /// Returns every record as CSV bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError`] if reading or serialization fails.
    pub async fn export_csv(&self) -> Result<Vec<u8>, SurveyError> {
        let records = self.fetch_all().await?;
        export::to_csv_bytes(&records)
    }

    /// Writes every record as CSV to `path` and returns the record count.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError`] if reading, serialization or file I/O fails.
    pub async fn export_csv_file(&self, path: &Path) -> Result<usize, SurveyError> {
        let records = self.fetch_all().await?;
        let file = std::fs::File::create(path)?;
        export::write_csv(&records, std::io::BufWriter::new(file))?;
        Ok(records.len())
    }

    /// Builds markers and legend for every record.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Store`] if reading fails.
    pub async fn map_view(&self) -> Result<MapView, SurveyError> {
        let records = self.fetch_all().await?;
        let (center_latitude, center_longitude) = survey_map_styling::DEFAULT_CENTER;
        Ok(MapView {
            center_latitude,
            center_longitude,
            zoom: survey_map_styling::DEFAULT_ZOOM,
            markers: survey_map_styling::markers(&records),
            legend: survey_map_styling::legend(&records),
            unplaced: records.iter().filter(|r| r.location.is_none()).count(),
        })
    }
}

/// Returns the 1-based column holding risk factors, canonical name first.
fn factor_column(layout: &ColumnLayout) -> Option<u32> {
    Field::RiskFactors
        .read_columns()
        .find_map(|name| layout.column_number(name))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use survey_map_codec::fields::CANONICAL_COLUMNS;
    use survey_map_codec::map_link::LinkStyle;
    use survey_map_store::memory::MemoryWorksheet;
    use survey_map_survey_models::{Coordinate, RiskFactor};

    fn service(ws: &Arc<MemoryWorksheet>) -> SurveyService {
        SurveyService::new(ws.clone(), SurveyConfig::default())
    }

    fn request() -> SubmitRequest {
        SubmitRequest {
            neighborhood: "Pavas Centro".to_string(),
            risk_factors: vec!["Falta de cámaras de seguridad en la zona.".to_string()],
            related_crimes: "robos".to_string(),
            linked_to_structure: "No".to_string(),
            structure_name: String::new(),
            notes: String::new(),
            latitude: Some(9.948),
            longitude: Some(-84.144),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn submit_then_fetch_round_trips() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);

        let outcome = svc.submit(&request()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome { row_number: 2, styled: true });

        let records = svc.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.row_number, 2);
        assert_eq!(r.neighborhood, "Pavas Centro");
        assert_eq!(
            r.risk_factors,
            vec!["Falta de cámaras de seguridad en la zona.".to_string()]
        );
        assert_eq!(r.related_crimes, "robos");
        assert_eq!(r.linked_to_structure, "No");
        assert_eq!(r.location, Some(Coordinate::new(9.948, -84.144).unwrap()));
        assert!(r.map_link.contains("q=9.948,-84.144"), "{}", r.map_link);
        assert_eq!(r.submitted_at.len(), "2025-08-30 10:15:00".len());
    }

    #[tokio::test]
    async fn submit_colors_the_category_cell() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        svc.submit(&request()).await.unwrap();

        let column = factor_column(&ColumnLayout::canonical()).unwrap();
        assert_eq!(column, 3);
        assert_eq!(
            ws.background(2, column).map(CellColor::to_hex),
            Some(RiskFactor::NoSecurityCameras.color().to_ascii_lowercase())
        );
    }

    #[tokio::test]
    async fn invalid_submission_never_touches_the_store() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        let mut req = request();
        req.linked_to_structure = "Sí".to_string();

        let err = svc.submit(&req).await.unwrap_err();
        assert!(matches!(err, SurveyError::Validation(_)));
        assert_eq!(ws.call_count(), 0);
    }

    #[tokio::test]
    async fn styling_failure_keeps_the_row() {
        let ws = Arc::new(MemoryWorksheet::new());
        ws.set_fail_formatting(true);
        let svc = service(&ws);

        let outcome = svc.submit(&request()).await.unwrap();
        assert!(!outcome.styled);
        assert_eq!(svc.fetch_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reads_are_cached_until_a_write() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        svc.submit(&request()).await.unwrap();

        svc.fetch_all().await.unwrap();
        let calls = ws.call_count();
        svc.fetch_all().await.unwrap();
        assert_eq!(ws.call_count(), calls);

        svc.submit(&request()).await.unwrap();
        assert_eq!(svc.fetch_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expired_cache_reads_again() {
        let ws = Arc::new(MemoryWorksheet::new());
        let config = SurveyConfig {
            cache_ttl: Duration::ZERO,
            ..SurveyConfig::default()
        };
        let svc = SurveyService::new(ws.clone(), config);
        svc.fetch_all().await.unwrap();
        let calls = ws.call_count();
        svc.fetch_all().await.unwrap();
        assert!(ws.call_count() > calls);
    }

    #[tokio::test]
    async fn delete_removes_selected_rows() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        for name in ["a", "b", "c"] {
            let mut req = request();
            req.neighborhood = name.to_string();
            svc.submit(&req).await.unwrap();
        }

        let rows: BTreeSet<u32> = [2, 4].into_iter().collect();
        assert_eq!(svc.delete(&rows).await.unwrap(), 2);

        let records = svc.fetch_all().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.neighborhood.as_str()).collect();
        assert_eq!(names, vec!["b"]);
        assert_eq!(records[0].row_number, 2);
    }

    #[tokio::test]
    async fn delete_rejects_the_header_row() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        svc.submit(&request()).await.unwrap();
        let rows: BTreeSet<u32> = [1].into_iter().collect();
        assert!(matches!(
            svc.delete(&rows).await,
            Err(SurveyError::Store(StoreError::InvalidRow { row: 1 }))
        ));
        assert_eq!(svc.fetch_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_all_keeps_header() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        svc.submit(&request()).await.unwrap();
        svc.fetch_all().await.unwrap();

        svc.clear_all().await.unwrap();
        assert!(svc.fetch_all().await.unwrap().is_empty());
        assert_eq!(ws.snapshot_header(), CANONICAL_COLUMNS);
    }

    #[tokio::test]
    async fn legacy_sheet_is_reconciled_and_readable() {
        let ws = Arc::new(MemoryWorksheet::with_rows(
            [
                "timestamp",
                "barrio",
                "factor_riesgo",
                "delitos_relacionados",
                "ligado_estructura",
                "nombre_estructura",
                "observaciones",
                "lat",
                "lng",
            ],
            vec![strings(&[
                "2024-01-05 08:00:00",
                "Rincón Grande",
                "Pandillas en la zona",
                "asaltos",
                "No",
                "",
                "",
                "9.95",
                "-84.15",
            ])],
        ));
        let svc = service(&ws);

        let edits = svc.reconcile().await.unwrap();
        assert_eq!(edits.len(), 5);

        let records = svc.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].submitted_at, "2024-01-05 08:00:00");
        assert_eq!(records[0].risk_factors, vec!["Pandillas en la zona".to_string()]);
        assert_eq!(records[0].location, Some(Coordinate::new(9.95, -84.15).unwrap()));
        assert!(!ws.snapshot_header().contains(&"lat".to_string()));

        // A fresh service reads the carried-over link, not the dropped columns.
        let again = service(&ws).fetch_all().await.unwrap();
        assert_eq!(again[0].location, Some(Coordinate::new(9.95, -84.15).unwrap()));
    }

    #[tokio::test]
    async fn formula_links_decode_through_raw_view() {
        let ws = Arc::new(MemoryWorksheet::new());
        let config = SurveyConfig {
            link_style: LinkStyle::Formula,
            ..SurveyConfig::default()
        };
        let svc = SurveyService::new(ws.clone(), config);
        svc.submit(&request()).await.unwrap();

        let raw = ws.snapshot_rows();
        assert!(raw[0][7].starts_with("=HYPERLINK("));

        let records = svc.fetch_all().await.unwrap();
        assert_eq!(
            records[0].location,
            Some(Coordinate::new(9.948, -84.144).unwrap())
        );
        assert!(records[0].map_link.contains("q=9.948,-84.144"));
    }

    #[tokio::test]
    async fn submitted_text_is_never_evaluated() {
        let injected = r#"=HYPERLINK("https://evil.example","ok")"#;
        for link_style in [LinkStyle::Url, LinkStyle::Formula] {
            let ws = Arc::new(MemoryWorksheet::new());
            let config = SurveyConfig {
                link_style,
                ..SurveyConfig::default()
            };
            let svc = SurveyService::new(ws.clone(), config);
            let mut req = request();
            req.notes = injected.to_string();
            req.related_crimes = "+1".to_string();
            svc.submit(&req).await.unwrap();

            let records = svc.fetch_all().await.unwrap();
            assert_eq!(records[0].notes, injected, "{link_style:?}");
            assert_eq!(records[0].related_crimes, "+1", "{link_style:?}");
            assert_eq!(
                records[0].location,
                Some(Coordinate::new(9.948, -84.144).unwrap())
            );
        }
    }

    #[tokio::test]
    async fn store_failures_surface() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        svc.submit(&request()).await.unwrap();
        ws.set_offline(true);
        assert!(matches!(
            svc.submit(&request()).await,
            Err(SurveyError::Store(StoreError::Http { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn map_view_places_located_records() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        let mut req = request();
        req.risk_factors.push(RiskFactor::Gangs.label().to_string());
        svc.submit(&req).await.unwrap();

        let view = svc.map_view().await.unwrap();
        assert_eq!(view.markers.len(), 2);
        assert_eq!(view.legend.len(), 2);
        assert_eq!(view.unplaced, 0);
        assert_eq!(view.zoom, 13);
    }

    #[tokio::test]
    async fn exports_csv_with_canonical_header() {
        let ws = Arc::new(MemoryWorksheet::new());
        let svc = service(&ws);
        svc.submit(&request()).await.unwrap();
        let text = String::from_utf8(svc.export_csv().await.unwrap()).unwrap();
        assert!(text.starts_with("date,barrio,factores,"));
        assert!(text.contains("Pavas Centro"));
    }
}
