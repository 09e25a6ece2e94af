#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk-factor catalog, coordinate, and survey record types.
//!
//! This crate defines the fixed, ordered risk-factor catalog used across
//! the whole survey-map system, together with the record shapes that flow
//! between the codec, the store gateway, and the HTTP/CLI surfaces.
//! Catalog order is significant: it is the legend order and the canonical
//! order whenever categories present in stored data are listed.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of fractional digits kept for captured coordinates.
pub const COORDINATE_PRECISION: i32 = 6;

/// Color used for any label that is not in the catalog.
pub const FALLBACK_COLOR: &str = "#808080";

/// A risk-factor category from the fixed survey catalog.
///
/// Each variant maps 1:1 to a human-readable label (the text stored in the
/// spreadsheet) and a distinct display color.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFactor {
    /// Drug use in public spaces
    DrugUse,
    /// Drug sales point or bunker
    DrugSales,
    /// Carrying or using firearms
    Firearms,
    /// Missing or broken street lighting
    PoorLighting,
    /// No security cameras covering the area
    NoSecurityCameras,
    /// Vacant lots or abandoned property
    VacantLots,
    /// Alcohol consumption in public spaces
    PublicDrinking,
    /// Gangs or organized groups present
    Gangs,
    /// People living on the street
    Homelessness,
    /// Students leaving school
    SchoolDropout,
    /// Unemployment
    Unemployment,
    /// Domestic violence
    DomesticViolence,
    /// Little or no police presence
    NoPolicePresence,
    /// Deteriorated public infrastructure
    PoorInfrastructure,
    /// Informal or illegal street vending
    IllegalVending,
    /// Disputes between neighbors
    NeighborDisputes,
    /// Informal settlements
    InformalSettlements,
    /// Unsafe public transport stops or routes
    UnsafeTransport,
    /// No recreational spaces
    NoRecreation,
    /// Noise pollution
    Noise,
    /// Commercial sexual exploitation
    SexualExploitation,
    /// Free-text "other" entry; an ordinary catalog member, not a wildcard
    Other,
}

impl RiskFactor {
    /// Returns the label stored in the spreadsheet for this category.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DrugUse => "Consumo de drogas en vía pública.",
            Self::DrugSales => "Venta de drogas (búnker o punto de venta).",
            Self::Firearms => "Portación o uso de armas de fuego.",
            Self::PoorLighting => "Falta de iluminación pública.",
            Self::NoSecurityCameras => "Falta de cámaras de seguridad en la zona.",
            Self::VacantLots => "Lotes baldíos o propiedades abandonadas.",
            Self::PublicDrinking => "Consumo de alcohol en vía pública.",
            Self::Gangs => "Presencia de pandillas o grupos delictivos.",
            Self::Homelessness => "Personas en situación de calle.",
            Self::SchoolDropout => "Deserción escolar.",
            Self::Unemployment => "Desempleo.",
            Self::DomesticViolence => "Violencia intrafamiliar.",
            Self::NoPolicePresence => "Falta de presencia policial.",
            Self::PoorInfrastructure => "Infraestructura deteriorada.",
            Self::IllegalVending => "Ventas informales o ilegales.",
            Self::NeighborDisputes => "Conflictos vecinales.",
            Self::InformalSettlements => "Asentamientos informales.",
            Self::UnsafeTransport => "Paradas o rutas de transporte inseguras.",
            Self::NoRecreation => "Falta de espacios recreativos.",
            Self::Noise => "Contaminación sónica (ruido).",
            Self::SexualExploitation => "Explotación sexual comercial.",
            Self::Other => "Otro: especifique",
        }
    }

    /// Returns the display color (`#rrggbb`) assigned to this category.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::DrugUse => "#e6194b",
            Self::DrugSales => "#3cb44b",
            Self::Firearms => "#ffe119",
            Self::PoorLighting => "#4363d8",
            Self::NoSecurityCameras => "#f58231",
            Self::VacantLots => "#911eb4",
            Self::PublicDrinking => "#46f0f0",
            Self::Gangs => "#f032e6",
            Self::Homelessness => "#bcf60c",
            Self::SchoolDropout => "#fabebe",
            Self::Unemployment => "#008080",
            Self::DomesticViolence => "#e6beff",
            Self::NoPolicePresence => "#9a6324",
            Self::PoorInfrastructure => "#fffac8",
            Self::IllegalVending => "#800000",
            Self::NeighborDisputes => "#aaffc3",
            Self::InformalSettlements => "#808000",
            Self::UnsafeTransport => "#ffd8b1",
            Self::NoRecreation => "#000075",
            Self::Noise => "#a9a9a9",
            Self::SexualExploitation => "#000000",
            Self::Other => "#ff69b4",
        }
    }

    /// Returns this category's position in the catalog.
    #[must_use]
    pub fn index(self) -> usize {
        Self::all()
            .iter()
            .position(|factor| *factor == self)
            .unwrap_or_default()
    }

    /// Looks up a category by its stored label.
    ///
    /// Surrounding whitespace is ignored; the comparison is otherwise exact.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::all()
            .iter()
            .copied()
            .find(|factor| factor.label() == label)
    }

    /// Returns all catalog entries in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::DrugUse,
            Self::DrugSales,
            Self::Firearms,
            Self::PoorLighting,
            Self::NoSecurityCameras,
            Self::VacantLots,
            Self::PublicDrinking,
            Self::Gangs,
            Self::Homelessness,
            Self::SchoolDropout,
            Self::Unemployment,
            Self::DomesticViolence,
            Self::NoPolicePresence,
            Self::PoorInfrastructure,
            Self::IllegalVending,
            Self::NeighborDisputes,
            Self::InformalSettlements,
            Self::UnsafeTransport,
            Self::NoRecreation,
            Self::Noise,
            Self::SexualExploitation,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the reported risk factor is tied to a criminal structure.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum StructureLink {
    /// Linked; a structure name is required.
    #[strum(to_string = "Sí", serialize = "sí", serialize = "Si", serialize = "Yes")]
    #[serde(rename = "Sí", alias = "Si", alias = "yes", alias = "Yes")]
    Yes,
    /// Not linked.
    #[strum(to_string = "No")]
    #[serde(rename = "No", alias = "no")]
    No,
}

impl StructureLink {
    /// Returns the text stored in the spreadsheet for this value.
    #[must_use]
    pub const fn stored(self) -> &'static str {
        match self {
            Self::Yes => "Sí",
            Self::No => "No",
        }
    }

    /// Parses user input, ignoring surrounding whitespace.
    #[must_use]
    pub fn parse_input(input: &str) -> Option<Self> {
        input.trim().parse().ok()
    }
}

/// Error returned when a latitude/longitude pair is outside valid
/// geographic bounds or not finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinateError {
    /// The rejected latitude.
    pub latitude: f64,
    /// The rejected longitude.
    pub longitude: f64,
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinate ({}, {}): expected latitude in -90..=90 and longitude in -180..=180",
            self.latitude, self.longitude
        )
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate after checking it is finite and in bounds.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either component is not finite
    /// or lies outside the valid geographic range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinateError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if valid {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(InvalidCoordinateError {
                latitude,
                longitude,
            })
        }
    }

    /// Returns this coordinate rounded to [`COORDINATE_PRECISION`] digits.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            latitude: round_to_precision(self.latitude),
            longitude: round_to_precision(self.longitude),
        }
    }
}

/// Rounds a degree value to [`COORDINATE_PRECISION`] fractional digits.
#[must_use]
pub fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_PRECISION);
    (value * scale).round() / scale
}

/// A validated observation, ready to be encoded and appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    /// Submission time, already formatted in the survey's time zone.
    pub submitted_at: String,
    /// Neighborhood name.
    pub neighborhood: String,
    /// Selected categories, in selection order. Never empty.
    pub risk_factors: Vec<RiskFactor>,
    /// Crimes related to the risk factor.
    pub related_crimes: String,
    /// Whether the factor is tied to a criminal structure.
    pub linked_to_structure: StructureLink,
    /// Structure name; empty unless `linked_to_structure` is `Yes`.
    pub structure_name: String,
    /// Optional free-text notes.
    pub notes: String,
    /// Captured location, rounded to capture precision.
    pub location: Coordinate,
}

/// A record as read back from the store, normalized across every
/// historical column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRecord {
    /// Physical 1-based spreadsheet row (the header is row 1).
    pub row_number: u32,
    /// Submission time as stored.
    pub submitted_at: String,
    /// Neighborhood name.
    pub neighborhood: String,
    /// Category labels in stored order. Labels outside the catalog are
    /// kept verbatim (legacy free text).
    pub risk_factors: Vec<String>,
    /// Crimes related to the risk factor.
    pub related_crimes: String,
    /// Stored structure-link text (`Sí`/`No`, or legacy variants).
    pub linked_to_structure: String,
    /// Structure name.
    pub structure_name: String,
    /// Free-text notes.
    pub notes: String,
    /// Map-link cell as rendered by the store.
    pub map_link: String,
    /// Location recovered from the map link, `None` if undecodable.
    pub location: Option<Coordinate>,
}

impl SurveyRecord {
    /// Returns the first risk-factor label that is in the catalog.
    #[must_use]
    pub fn primary_factor(&self) -> Option<RiskFactor> {
        self.risk_factors
            .iter()
            .find_map(|label| RiskFactor::from_label(label))
    }
}
