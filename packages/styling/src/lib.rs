#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Category colors, reproducible marker jitter, and the map legend.
//!
//! Everything here is display-only. Stored coordinates are never touched:
//! jitter offsets are applied to marker positions when a single record is
//! split into one marker per category, and they are derived solely from
//! `(sequence_index, salt)` so identical data renders identically.

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use serde::{Deserialize, Serialize};
use survey_map_survey_models::{FALLBACK_COLOR, RiskFactor, SurveyRecord};

/// Maximum jitter in degrees on each axis (about 16 m at the equator).
pub const JITTER_RANGE: f64 = 0.000_15;

/// Salt step between catalog categories.
pub const SALT_STEP: u64 = 101;

/// Default map center (Pavas, San José).
pub const DEFAULT_CENTER: (f64, f64) = (9.948, -84.144);

/// Default map zoom level.
pub const DEFAULT_ZOOM: u8 = 13;

/// Returns the color for a category label, or [`FALLBACK_COLOR`] for
/// labels outside the catalog.
#[must_use]
pub fn color_of(label: &str) -> &'static str {
    RiskFactor::from_label(label).map_or(FALLBACK_COLOR, RiskFactor::color)
}

/// A display offset in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offset {
    /// Latitude delta.
    pub d_lat: f64,
    /// Longitude delta.
    pub d_lng: f64,
}

/// Returns a deterministic offset within `±JITTER_RANGE` on each axis.
///
/// The generator is reseeded on every call from `(sequence_index, salt)`,
/// so the same inputs always give the same offset. Different records that
/// share an index and salt also share an offset.
#[must_use]
pub fn jitter(sequence_index: usize, salt: u64) -> Offset {
    let seed = (sequence_index as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(salt);
    let mut rng = StdRng::seed_from_u64(seed);
    Offset {
        d_lat: rng.gen_range(-JITTER_RANGE..=JITTER_RANGE),
        d_lng: rng.gen_range(-JITTER_RANGE..=JITTER_RANGE),
    }
}

/// Returns the jitter salt for the `position`-th label of a record.
///
/// Catalog labels use their catalog index; free-text labels are placed
/// after the catalog so they never collide with it.
fn salt_for(label: &str, position: usize) -> u64 {
    let slot = RiskFactor::from_label(label)
        .map_or(RiskFactor::all().len() + position, RiskFactor::index);
    slot as u64 * SALT_STEP
}

/// Popup metadata shown for a marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPopup {
    /// Neighborhood.
    pub neighborhood: String,
    /// All risk-factor labels of the record, `; `-joined.
    pub risk_factors: String,
    /// Related crimes.
    pub related_crimes: String,
    /// Structure link and name, e.g. `Sí Los del Sur`.
    pub structure: String,
    /// Notes.
    pub notes: String,
    /// Submission date.
    pub submitted_at: String,
}

impl From<&SurveyRecord> for MarkerPopup {
    fn from(record: &SurveyRecord) -> Self {
        let structure = if record.structure_name.is_empty() {
            record.linked_to_structure.clone()
        } else {
            format!("{} {}", record.linked_to_structure, record.structure_name)
        };
        Self {
            neighborhood: record.neighborhood.clone(),
            risk_factors: record.risk_factors.join("; "),
            related_crimes: record.related_crimes.clone(),
            structure,
            notes: record.notes.clone(),
            submitted_at: record.submitted_at.clone(),
        }
    }
}

/// One point to draw on the clustered map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMarker {
    /// Physical row of the source record.
    pub row_number: u32,
    /// Display latitude (stored latitude plus jitter).
    pub latitude: f64,
    /// Display longitude (stored longitude plus jitter).
    pub longitude: f64,
    /// Category label this marker represents (empty if the record has none).
    pub category: String,
    /// Marker color.
    pub color: String,
    /// Popup metadata.
    pub popup: MarkerPopup,
}

/// Builds map markers for every record that has a location.
///
/// A record with several categories gets one marker per category, each
/// nudged by [`jitter`] so they stay distinguishable. Records without a
/// location are skipped.
#[must_use]
pub fn markers(records: &[SurveyRecord]) -> Vec<MapMarker> {
    let mut out = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let Some(location) = record.location else {
            continue;
        };
        let popup = MarkerPopup::from(record);

        if record.risk_factors.len() <= 1 {
            let category = record.risk_factors.first().cloned().unwrap_or_default();
            out.push(MapMarker {
                row_number: record.row_number,
                latitude: location.latitude,
                longitude: location.longitude,
                color: color_of(&category).to_string(),
                category,
                popup,
            });
            continue;
        }

        for (position, label) in record.risk_factors.iter().enumerate() {
            let offset = jitter(index, salt_for(label, position));
            out.push(MapMarker {
                row_number: record.row_number,
                latitude: location.latitude + offset.d_lat,
                longitude: location.longitude + offset.d_lng,
                category: label.clone(),
                color: color_of(label).to_string(),
                popup: popup.clone(),
            });
        }
    }

    out
}

/// One legend row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    /// Category.
    pub factor: RiskFactor,
    /// Category label.
    pub label: String,
    /// Category color.
    pub color: String,
    /// Number of records mentioning this category.
    pub count: usize,
}

impl LegendEntry {
    fn new(factor: RiskFactor, count: usize) -> Self {
        Self {
            factor,
            label: factor.label().to_string(),
            color: factor.color().to_string(),
            count,
        }
    }
}

/// Returns the catalog categories present in `records`, in catalog order,
/// with the number of records mentioning each.
#[must_use]
pub fn legend(records: &[SurveyRecord]) -> Vec<LegendEntry> {
    let mut counts = vec![0usize; RiskFactor::all().len()];
    for record in records {
        let mut seen = vec![false; counts.len()];
        for factor in record
            .risk_factors
            .iter()
            .filter_map(|l| RiskFactor::from_label(l))
        {
            let i = factor.index();
            if !seen[i] {
                seen[i] = true;
                counts[i] += 1;
            }
        }
    }

    RiskFactor::all()
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(factor, count)| LegendEntry::new(*factor, count))
        .collect()
}
