//! Column names of the survey worksheet and their semantic fields.
//!
//! The header row is matched by name, never by position. Each semantic
//! [`Field`] owns one canonical column name plus any legacy aliases that
//! older worksheets may still carry; both resolve to the same field when
//! writing, and the canonical name wins over aliases when reading.

use serde::{Deserialize, Serialize};

/// Canonical column: submission date.
pub const DATE: &str = "date";
/// Canonical column: neighborhood.
pub const NEIGHBORHOOD: &str = "barrio";
/// Canonical column: risk-factor labels.
pub const RISK_FACTORS: &str = "factores";
/// Canonical column: related crimes.
pub const RELATED_CRIMES: &str = "delitos_relacionados";
/// Canonical column: linked to a criminal structure.
pub const LINKED_TO_STRUCTURE: &str = "ligado_estructura";
/// Canonical column: structure name.
pub const STRUCTURE_NAME: &str = "nombre_estructura";
/// Canonical column: free-text notes.
pub const NOTES: &str = "observaciones";
/// Canonical column: map link carrying the coordinate pair.
pub const MAP_LINK: &str = "maps_link";

/// Legacy alias of [`DATE`].
pub const LEGACY_TIMESTAMP: &str = "timestamp";
/// Legacy alias of [`RISK_FACTORS`] (single free-text factor).
pub const LEGACY_RISK_FACTOR: &str = "factor_riesgo";
/// Legacy raw latitude column, dropped by reconciliation.
pub const LEGACY_LAT: &str = "lat";
/// Legacy raw longitude column, dropped by reconciliation.
pub const LEGACY_LNG: &str = "lng";

/// The current header, in canonical order.
pub const CANONICAL_COLUMNS: &[&str] = &[
    DATE,
    NEIGHBORHOOD,
    RISK_FACTORS,
    RELATED_CRIMES,
    LINKED_TO_STRUCTURE,
    STRUCTURE_NAME,
    NOTES,
    MAP_LINK,
];

/// Columns removed from any live header during reconciliation.
pub const DEPRECATED_COLUMNS: &[&str] = &[LEGACY_LAT, LEGACY_LNG];

/// A semantic field of a survey record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Submission date.
    SubmittedAt,
    /// Neighborhood.
    Neighborhood,
    /// Risk-factor labels.
    RiskFactors,
    /// Related crimes.
    RelatedCrimes,
    /// Structure link.
    LinkedToStructure,
    /// Structure name.
    StructureName,
    /// Notes.
    Notes,
    /// Map link.
    MapLink,
}

impl Field {
    /// All fields in canonical column order.
    pub const ALL: &[Self] = &[
        Self::SubmittedAt,
        Self::Neighborhood,
        Self::RiskFactors,
        Self::RelatedCrimes,
        Self::LinkedToStructure,
        Self::StructureName,
        Self::Notes,
        Self::MapLink,
    ];

    /// Returns the canonical column name.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::SubmittedAt => DATE,
            Self::Neighborhood => NEIGHBORHOOD,
            Self::RiskFactors => RISK_FACTORS,
            Self::RelatedCrimes => RELATED_CRIMES,
            Self::LinkedToStructure => LINKED_TO_STRUCTURE,
            Self::StructureName => STRUCTURE_NAME,
            Self::Notes => NOTES,
            Self::MapLink => MAP_LINK,
        }
    }

    /// Returns the legacy column names still accepted for this field.
    #[must_use]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::SubmittedAt => &[LEGACY_TIMESTAMP],
            Self::RiskFactors => &[LEGACY_RISK_FACTOR],
            Self::Neighborhood
            | Self::RelatedCrimes
            | Self::LinkedToStructure
            | Self::StructureName
            | Self::Notes
            | Self::MapLink => &[],
        }
    }

    /// Returns the canonical name followed by the aliases, in read
    /// preference order.
    pub fn read_columns(self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.column()).chain(self.aliases().iter().copied())
    }

    /// Resolves a header cell to the field it carries.
    ///
    /// Matches canonical names and legacy aliases; surrounding whitespace is
    /// ignored. Unknown and deprecated columns resolve to `None`.
    #[must_use]
    pub fn for_column(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.read_columns().any(|column| column == name))
    }
}
