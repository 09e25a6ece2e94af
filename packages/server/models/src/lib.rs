#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the survey server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the stored record types to allow independent evolution of the API
//! contract.

use serde::{Deserialize, Serialize};
use survey_map_styling::{LegendEntry, MapMarker};
use survey_map_survey_models::{RiskFactor, SurveyRecord};

/// A survey record as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
    /// Physical spreadsheet row; pass it back to delete the record.
    pub row_number: u32,
    /// Submission time.
    pub submitted_at: String,
    /// Neighborhood.
    pub neighborhood: String,
    /// Risk-factor labels.
    pub risk_factors: Vec<String>,
    /// Related crimes.
    pub related_crimes: String,
    /// `Sí` or `No`.
    pub linked_to_structure: String,
    /// Structure name.
    pub structure_name: String,
    /// Notes.
    pub notes: String,
    /// Map link.
    pub map_link: String,
    /// Latitude, if the map link could be decoded.
    pub latitude: Option<f64>,
    /// Longitude, if the map link could be decoded.
    pub longitude: Option<f64>,
    /// Color of the first risk factor.
    pub color: String,
}

impl From<&SurveyRecord> for ApiRecord {
    fn from(record: &SurveyRecord) -> Self {
        Self {
            row_number: record.row_number,
            submitted_at: record.submitted_at.clone(),
            neighborhood: record.neighborhood.clone(),
            risk_factors: record.risk_factors.clone(),
            related_crimes: record.related_crimes.clone(),
            linked_to_structure: record.linked_to_structure.clone(),
            structure_name: record.structure_name.clone(),
            notes: record.notes.clone(),
            map_link: record.map_link.clone(),
            latitude: record.location.map(|c| c.latitude),
            longitude: record.location.map(|c| c.longitude),
            color: survey_map_styling::color_of(
                record.risk_factors.first().map_or("", String::as_str),
            )
            .to_string(),
        }
    }
}

/// A catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCategory {
    /// Stable identifier.
    pub id: RiskFactor,
    /// Label shown to users and stored in the sheet.
    pub label: String,
    /// Display color.
    pub color: String,
}

impl From<RiskFactor> for ApiCategory {
    fn from(factor: RiskFactor) -> Self {
        Self {
            id: factor,
            label: factor.label().to_string(),
            color: factor.color().to_string(),
        }
    }
}

/// Response to a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSubmitResponse {
    /// Row the record was written to.
    pub row_number: u32,
    /// Whether the category cell was colored.
    pub styled: bool,
}

/// Body of `DELETE /api/records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordsRequest {
    /// Physical row numbers to delete.
    pub rows: Vec<u32>,
}

/// Response to a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeleteResponse {
    /// Number of rows deleted.
    pub deleted: usize,
}

/// Data for the map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMapView {
    /// Initial center `[lat, lng]`.
    pub center: [f64; 2],
    /// Initial zoom.
    pub zoom: u8,
    /// Markers to draw.
    pub markers: Vec<MapMarker>,
    /// Legend entries in catalog order.
    pub legend: Vec<LegendEntry>,
    /// Records without a decodable location.
    pub unplaced: usize,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Summary.
    pub error: String,
    /// Itemized problems (validation failures).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl ApiError {
    /// Creates an error without itemized messages.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            messages: Vec::new(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}
