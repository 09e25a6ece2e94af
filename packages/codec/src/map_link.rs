//! Map-link encoding of a record's coordinate pair.
//!
//! Coordinates are never stored as their own columns. The only stored form
//! is a map link such as `https://www.google.com/maps?q=9.948,-84.144`,
//! written either as plain text or (on older rows) wrapped in a
//! `=HYPERLINK("<url>","Abrir en Maps")` formula. Decoding is pattern
//! extraction over both shapes, not URL parsing, so partially malformed
//! legacy cells still yield a coordinate whenever the `q=lat,lng` pattern
//! survives.

use std::sync::LazyLock;

use regex::Regex;
use survey_map_survey_models::Coordinate;

/// Base of every generated map link.
pub const MAP_LINK_BASE: &str = "https://www.google.com/maps";

/// Display label used by formula-wrapped links.
pub const FORMULA_LABEL: &str = "Abrir en Maps";

/// Matches a `HYPERLINK` formula and captures its first (URL) argument.
static FORMULA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*=\s*HYPERLINK\s*\(\s*"([^"]*)""#).expect("valid regex")
});

/// Matches the `q=<lat>,<lng>` query pattern (comma may be percent-encoded).
static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&]q=\s*([-+]?[0-9]+(?:\.[0-9]+)?)\s*(?:,|%2C)\s*([-+]?[0-9]+(?:\.[0-9]+)?)")
        .expect("valid regex")
});

/// How new map links are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkStyle {
    /// Plain URL text.
    #[default]
    Url,
    /// `HYPERLINK` formula showing [`FORMULA_LABEL`].
    Formula,
}

impl std::str::FromStr for LinkStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" | "plain" => Ok(Self::Url),
            "formula" | "hyperlink" => Ok(Self::Formula),
            other => Err(format!("unknown link style '{other}': expected url or formula")),
        }
    }
}

/// Encodes a coordinate as a plain map-link URL.
///
/// Components are rounded to capture precision and printed in their
/// shortest exact form, so `(9.948, -84.144)` becomes `q=9.948,-84.144`.
#[must_use]
pub fn encode(coordinate: Coordinate) -> String {
    let rounded = coordinate.rounded();
    format!("{MAP_LINK_BASE}?q={},{}", rounded.latitude, rounded.longitude)
}

/// Encodes a coordinate as a legacy `HYPERLINK` formula.
#[must_use]
pub fn encode_formula(coordinate: Coordinate) -> String {
    format!("=HYPERLINK(\"{}\",\"{FORMULA_LABEL}\")", encode(coordinate))
}

/// Encodes a coordinate in the requested style.
#[must_use]
pub fn encode_with(coordinate: Coordinate, style: LinkStyle) -> String {
    match style {
        LinkStyle::Url => encode(coordinate),
        LinkStyle::Formula => encode_formula(coordinate),
    }
}

/// Returns `true` if the cell text is a spreadsheet formula.
#[must_use]
pub fn is_formula(text: &str) -> bool {
    text.trim_start().starts_with('=')
}

/// Recovers the coordinate from a plain map link or a `HYPERLINK` formula.
///
/// Returns `None` when no `q=lat,lng` pattern is found or when the numbers
/// fall outside geographic bounds. Never substitutes a placeholder
/// coordinate.
#[must_use]
pub fn decode(text: &str) -> Option<Coordinate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let url = FORMULA_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());

    let caps = QUERY_RE.captures(url)?;
    let latitude = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let longitude = caps.get(2)?.as_str().parse::<f64>().ok()?;

    Coordinate::new(latitude, longitude).ok()
}
