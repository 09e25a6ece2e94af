//! Submission input and its validation.
//!
//! Validation runs before any store access. Every problem is collected, so
//! the caller can show the full list at once. Messages are user-facing and
//! written in Spanish.

use serde::{Deserialize, Serialize};
use survey_map_survey_models::{Coordinate, NewRecord, RiskFactor, StructureLink};

/// Raw submission fields as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Neighborhood.
    #[serde(default)]
    pub neighborhood: String,
    /// Selected category labels.
    #[serde(default)]
    pub risk_factors: Vec<String>,
    /// Related crimes.
    #[serde(default)]
    pub related_crimes: String,
    /// `Sí` or `No` (see [`StructureLink::parse_input`]).
    #[serde(default)]
    pub linked_to_structure: String,
    /// Structure name.
    #[serde(default)]
    pub structure_name: String,
    /// Notes.
    #[serde(default)]
    pub notes: String,
    /// Picked latitude.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Picked longitude.
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Every validation problem found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    /// Returns the messages.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if no problem was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, message) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "• {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validates and normalizes a submission.
///
/// Text fields are trimmed. Category labels must be catalog labels;
/// duplicates keep their first position. The structure name is dropped
/// when the record is not linked to a structure. The location is rounded
/// to capture precision.
///
/// # Errors
///
/// Returns every problem found as [`ValidationErrors`].
pub fn validate(
    request: &SubmitRequest,
    submitted_at: String,
) -> Result<NewRecord, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let neighborhood = request.neighborhood.trim();
    if neighborhood.is_empty() {
        errors.push("Indica el barrio.");
    }

    let mut risk_factors: Vec<RiskFactor> = Vec::new();
    let mut unknown_factor = false;
    for label in request
        .risk_factors
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
    {
        match RiskFactor::from_label(label) {
            Some(factor) if !risk_factors.contains(&factor) => risk_factors.push(factor),
            Some(_) => {}
            None => {
                unknown_factor = true;
                errors.push(format!("Factor de riesgo desconocido: {label}"));
            }
        }
    }
    if risk_factors.is_empty() && !unknown_factor {
        errors.push("Indica el factor de riesgo.");
    }

    let related_crimes = request.related_crimes.trim();
    if related_crimes.is_empty() {
        errors.push("Indica los delitos relacionados.");
    }

    let linked_to_structure = StructureLink::parse_input(&request.linked_to_structure);
    if linked_to_structure.is_none() {
        errors.push("Indica si está ligado a una estructura criminal (Sí/No).");
    }

    let structure_name = request.structure_name.trim();
    if linked_to_structure == Some(StructureLink::Yes) && structure_name.is_empty() {
        errors.push("Debes indicar el nombre de la estructura si elegiste 'Sí'.");
    }

    let location = match (request.latitude, request.longitude) {
        (Some(latitude), Some(longitude)) => match Coordinate::new(latitude, longitude) {
            Ok(c) => Some(c.rounded()),
            Err(e) => {
                errors.push(format!(
                    "El punto seleccionado está fuera de rango ({}, {}).",
                    e.latitude, e.longitude
                ));
                None
            }
        },
        _ => {
            errors.push("Selecciona un punto en el mapa (lat/lng).");
            None
        }
    };

    match (linked_to_structure, location) {
        (Some(linked_to_structure), Some(location)) if errors.is_empty() => Ok(NewRecord {
            submitted_at,
            neighborhood: neighborhood.to_string(),
            risk_factors,
            related_crimes: related_crimes.to_string(),
            linked_to_structure,
            structure_name: match linked_to_structure {
                StructureLink::Yes => structure_name.to_string(),
                StructureLink::No => String::new(),
            },
            notes: request.notes.trim().to_string(),
            location,
        }),
        _ => Err(errors),
    }
}
