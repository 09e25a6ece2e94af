//! Record ⇄ row conversion against whatever header row is live.
//!
//! Writing looks up every live column in the field table, so a worksheet
//! that still carries `timestamp` or `factor_riesgo` receives the same
//! value as `date` or `factores`. Unmapped columns get an empty cell.
//!
//! Reading never fails. Missing columns degrade to empty strings,
//! unrecognized categories are kept verbatim, and an undecodable map link
//! leaves the record's location as `None`.

use survey_map_survey_models::{Coordinate, NewRecord, RiskFactor, SurveyRecord};

use crate::fields::{Field, LEGACY_LAT, LEGACY_LNG, MAP_LINK};
use crate::map_link::{self, LinkStyle};
use crate::schema::ColumnLayout;

/// Separator written between risk-factor labels in one cell.
pub const FACTOR_DELIMITER: &str = "; ";

/// Physical row number of the first data row (the header is row 1).
pub const FIRST_DATA_ROW: u32 = 2;

/// Leading character that makes a spreadsheet keep user-entered input as
/// literal text. The prefix itself is not stored.
pub const LITERAL_PREFIX: char = '\'';

/// Joins risk-factor labels into a single cell value.
#[must_use]
pub fn join_factors(factors: &[RiskFactor]) -> String {
    factors
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(FACTOR_DELIMITER)
}

/// Splits a risk-factor cell into trimmed labels.
///
/// Entries are separated by `;`. An entry containing commas is split on
/// commas as well, but only when every comma-separated part is a catalog
/// label; otherwise it is kept whole as legacy free text.
#[must_use]
pub fn split_factors(cell: &str) -> Vec<String> {
    let mut labels = Vec::new();
    for entry in cell.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.len() > 1 && parts.iter().all(|p| RiskFactor::from_label(p).is_some()) {
            labels.extend(parts.into_iter().map(String::from));
        } else {
            labels.push(entry.to_string());
        }
    }
    labels
}

/// Returns the cell value for `field` in a new record.
fn field_value(record: &NewRecord, field: Field, style: LinkStyle) -> String {
    match field {
        Field::SubmittedAt => record.submitted_at.clone(),
        Field::Neighborhood => record.neighborhood.clone(),
        Field::RiskFactors => join_factors(&record.risk_factors),
        Field::RelatedCrimes => record.related_crimes.clone(),
        Field::LinkedToStructure => record.linked_to_structure.stored().to_string(),
        Field::StructureName => record.structure_name.clone(),
        Field::Notes => record.notes.clone(),
        Field::MapLink => map_link::encode_with(record.location, style),
    }
}

/// Encodes a record as one row positioned by the live header.
///
/// The result has exactly one value per layout column.
#[must_use]
pub fn encode(record: &NewRecord, layout: &ColumnLayout, style: LinkStyle) -> Vec<String> {
    layout
        .columns()
        .iter()
        .map(|name| {
            Field::for_column(name)
                .map_or_else(String::new, |field| field_value(record, field, style))
        })
        .collect()
}

/// Prepares an encoded row whose map link is a formula for user-entered
/// input.
///
/// Returns `false` and leaves `values` untouched when the map-link cell is
/// plain text, in which case the row must be written raw. Otherwise every
/// other non-empty cell gets [`LITERAL_PREFIX`], so submitted text is never
/// evaluated or coerced, and `true` is returned.
pub fn literalize_for_formula_link(values: &mut [String], layout: &ColumnLayout) -> bool {
    let Some(link) = layout.position(MAP_LINK) else {
        return false;
    };
    if !values.get(link).is_some_and(|v| map_link::is_formula(v)) {
        return false;
    }
    for (i, value) in values.iter_mut().enumerate() {
        if i != link && !value.is_empty() {
            value.insert(0, LITERAL_PREFIX);
        }
    }
    true
}

/// Reads a column by name from a row, treating blanks as absent.
fn column<'a>(row: &'a [String], layout: &ColumnLayout, name: &str) -> Option<&'a str> {
    let i = layout.position(name)?;
    row.get(i).map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Reads a field, preferring the canonical column and falling back to
/// legacy aliases in order.
fn field<'a>(row: &'a [String], layout: &ColumnLayout, field: Field) -> Option<&'a str> {
    field
        .read_columns()
        .find_map(|name| column(row, layout, name))
}

fn text(row: &[String], layout: &ColumnLayout, f: Field) -> String {
    field(row, layout, f).unwrap_or_default().to_string()
}

/// Recovers a coordinate from raw `lat`/`lng` columns on layouts that have
/// not been reconciled yet.
fn legacy_coordinate(row: &[String], layout: &ColumnLayout) -> Option<Coordinate> {
    let lat = column(row, layout, LEGACY_LAT)?.parse::<f64>().ok()?;
    let lng = column(row, layout, LEGACY_LNG)?.parse::<f64>().ok()?;
    Coordinate::new(lat, lng).ok()
}

/// Derives map links for rows that carry raw `lat`/`lng` values but no
/// map link, keyed by physical row number.
///
/// `rows` are raw data rows under `layout`, header excluded. Run this
/// before the coordinate columns are dropped.
#[must_use]
pub fn legacy_link_backfill(layout: &ColumnLayout, rows: &[Vec<String>]) -> Vec<(u32, String)> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| field(row, layout, Field::MapLink).is_none())
        .filter_map(|(i, row)| {
            let coordinate = legacy_coordinate(row, layout)?;
            let row_number = u32::try_from(i).ok()?.checked_add(FIRST_DATA_ROW)?;
            Some((row_number, map_link::encode(coordinate)))
        })
        .collect()
}

/// Decodes one data row.
///
/// `raw` is the same row with formula source text preserved; it is only
/// consulted for the map-link column.
#[must_use]
pub fn decode_row(
    row_number: u32,
    rendered: &[String],
    raw: Option<&[String]>,
    layout: &ColumnLayout,
) -> SurveyRecord {
    let rendered_link = text(rendered, layout, Field::MapLink);

    let from_rendered = map_link::decode(&rendered_link);
    let location = from_rendered
        .or_else(|| {
            raw.and_then(|raw| field(raw, layout, Field::MapLink))
                .and_then(map_link::decode)
        })
        .or_else(|| legacy_coordinate(rendered, layout));

    if location.is_none() {
        log::debug!("Row {row_number}: no decodable map link, location left empty");
    }

    // Expose a usable link when the rendered cell only shows a label.
    let map_link = match (from_rendered, location) {
        (None, Some(coordinate)) => map_link::encode(coordinate),
        _ => rendered_link,
    };

    SurveyRecord {
        row_number,
        submitted_at: text(rendered, layout, Field::SubmittedAt),
        neighborhood: text(rendered, layout, Field::Neighborhood),
        risk_factors: field(rendered, layout, Field::RiskFactors)
            .map(split_factors)
            .unwrap_or_default(),
        related_crimes: text(rendered, layout, Field::RelatedCrimes),
        linked_to_structure: text(rendered, layout, Field::LinkedToStructure),
        structure_name: text(rendered, layout, Field::StructureName),
        notes: text(rendered, layout, Field::Notes),
        map_link,
        location,
    }
}

/// Decodes every data row (header excluded) into normalized records.
///
/// `rendered[i]` and `raw[i]` describe physical row `i + 2`. Rows whose
/// cells are all blank are skipped; row numbers of the remaining records
/// stay physical.
#[must_use]
pub fn decode_rows(
    layout: &ColumnLayout,
    rendered: &[Vec<String>],
    raw: &[Vec<String>],
) -> Vec<SurveyRecord> {
    rendered
        .iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
        .filter_map(|(i, row)| {
            let row_number = u32::try_from(i).ok()?.checked_add(FIRST_DATA_ROW)?;
            Some(decode_row(
                row_number,
                row,
                raw.get(i).map(Vec::as_slice),
                layout,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_map_survey_models::StructureLink;

    use crate::fields::CANONICAL_COLUMNS;

    fn sample_record() -> NewRecord {
        NewRecord {
            submitted_at: "2025-08-30 10:15:00".to_string(),
            neighborhood: "Pavas Centro".to_string(),
            risk_factors: vec![RiskFactor::NoSecurityCameras, RiskFactor::DrugSales],
            related_crimes: "robos".to_string(),
            linked_to_structure: StructureLink::Yes,
            structure_name: "Los del Sur".to_string(),
            notes: String::new(),
            location: Coordinate::new(9.948, -84.144).unwrap(),
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn encodes_in_canonical_order() {
        let layout = ColumnLayout::canonical();
        let values = encode(&sample_record(), &layout, LinkStyle::Url);
        assert_eq!(values.len(), CANONICAL_COLUMNS.len());
        assert_eq!(values[0], "2025-08-30 10:15:00");
        assert_eq!(values[1], "Pavas Centro");
        assert_eq!(
            values[2],
            "Falta de cámaras de seguridad en la zona.; Venta de drogas (búnker o punto de venta)."
        );
        assert_eq!(values[4], "Sí");
        assert_eq!(values[7], "https://www.google.com/maps?q=9.948,-84.144");
    }

    #[test]
    fn encode_follows_live_order_and_fills_aliases() {
        let layout = ColumnLayout::new([
            "maps_link",
            "extra",
            "timestamp",
            "barrio",
            "factor_riesgo",
            "date",
            "factores",
        ]);
        let values = encode(&sample_record(), &layout, LinkStyle::Url);
        assert_eq!(values.len(), 7);
        assert!(values[0].contains("q=9.948,-84.144"));
        assert_eq!(values[1], "");
        assert_eq!(values[2], values[5]);
        assert_eq!(values[4], values[6]);
        assert_eq!(values[3], "Pavas Centro");
    }

    #[test]
    fn encode_formula_style() {
        let values = encode(&sample_record(), &ColumnLayout::canonical(), LinkStyle::Formula);
        assert!(map_link::is_formula(&values[7]));
    }

    #[test]
    fn decodes_round_trip_through_canonical_layout() {
        let layout = ColumnLayout::canonical();
        let values = encode(&sample_record(), &layout, LinkStyle::Url);
        let records = decode_rows(&layout, &[values.clone()], &[values]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.row_number, 2);
        assert_eq!(r.neighborhood, "Pavas Centro");
        assert_eq!(
            r.risk_factors,
            vec![
                RiskFactor::NoSecurityCameras.label().to_string(),
                RiskFactor::DrugSales.label().to_string()
            ]
        );
        assert_eq!(r.linked_to_structure, "Sí");
        assert_eq!(r.location, Some(Coordinate::new(9.948, -84.144).unwrap()));
    }

    #[test]
    fn legacy_alias_fallback_for_factor_and_date() {
        let layout = ColumnLayout::new(["timestamp", "barrio", "factor_riesgo", "maps_link"]);
        let rendered = vec![row(&[
            "2024-05-01 08:00:00",
            "Rincón Grande",
            "consumo de drogas, portación de armas",
            "https://www.google.com/maps?q=9.95,-84.15",
        ])];
        let records = decode_rows(&layout, &rendered, &[]);
        let r = &records[0];
        assert_eq!(r.submitted_at, "2024-05-01 08:00:00");
        assert_eq!(
            r.risk_factors,
            vec!["consumo de drogas, portación de armas".to_string()]
        );
        assert_eq!(r.related_crimes, "");
    }

    #[test]
    fn canonical_wins_over_alias_unless_blank() {
        let layout = ColumnLayout::new(["timestamp", "date", "barrio"]);
        let rendered = vec![
            row(&["old", "new", "A"]),
            row(&["only-old", "", "B"]),
        ];
        let records = decode_rows(&layout, &rendered, &[]);
        assert_eq!(records[0].submitted_at, "new");
        assert_eq!(records[1].submitted_at, "only-old");
    }

    #[test]
    fn falls_back_to_raw_formula_when_rendered_is_label() {
        let layout = ColumnLayout::canonical();
        let mut rendered = encode(&sample_record(), &layout, LinkStyle::Url);
        rendered[7] = "Abrir en Maps".to_string();
        let mut raw = rendered.clone();
        raw[7] = r#"=HYPERLINK("https://www.google.com/maps?q=9.948,-84.144","Abrir en Maps")"#
            .to_string();

        let records = decode_rows(&layout, &[rendered], &[raw]);
        let r = &records[0];
        assert_eq!(r.location, Some(Coordinate::new(9.948, -84.144).unwrap()));
        assert!(r.map_link.contains("q=9.948,-84.144"));
    }

    #[test]
    fn unparseable_link_keeps_other_fields() {
        let layout = ColumnLayout::canonical();
        let mut rendered = encode(&sample_record(), &layout, LinkStyle::Url);
        rendered[7] = "https://www.google.com/maps?q=norte,sur".to_string();
        let records = decode_rows(&layout, &[rendered.clone()], &[rendered]);
        let r = &records[0];
        assert_eq!(r.location, None);
        assert_eq!(r.neighborhood, "Pavas Centro");
        assert_eq!(r.related_crimes, "robos");
        assert_eq!(r.map_link, "https://www.google.com/maps?q=norte,sur");
    }

    #[test]
    fn missing_columns_degrade_to_empty() {
        let layout = ColumnLayout::new(["barrio"]);
        let records = decode_rows(&layout, &[row(&["Lomas del Río"])], &[]);
        let r = &records[0];
        assert_eq!(r.neighborhood, "Lomas del Río");
        assert!(r.risk_factors.is_empty());
        assert_eq!(r.map_link, "");
        assert_eq!(r.location, None);
    }

    #[test]
    fn short_rows_do_not_panic() {
        let layout = ColumnLayout::canonical();
        let records = decode_rows(&layout, &[row(&["2025-01-01", "Pavas"])], &[]);
        assert_eq!(records[0].neighborhood, "Pavas");
        assert_eq!(records[0].notes, "");
    }

    #[test]
    fn unreconciled_layout_uses_raw_coordinate_columns() {
        let layout = ColumnLayout::new(["barrio", "lat", "lng"]);
        let records = decode_rows(&layout, &[row(&["Pavas", "9.94", "-84.13"])], &[]);
        assert_eq!(
            records[0].location,
            Some(Coordinate::new(9.94, -84.13).unwrap())
        );
        assert!(records[0].map_link.contains("q=9.94,-84.13"));
    }

    #[test]
    fn url_links_leave_text_untouched() {
        let layout = ColumnLayout::canonical();
        let mut record = sample_record();
        record.notes = r#"=HYPERLINK("https://evil.example","ok")"#.to_string();
        let mut values = encode(&record, &layout, LinkStyle::Url);
        let before = values.clone();
        assert!(!literalize_for_formula_link(&mut values, &layout));
        assert_eq!(values, before);
    }

    #[test]
    fn formula_links_quote_every_other_cell() {
        let layout = ColumnLayout::canonical();
        let mut record = sample_record();
        record.notes = "=IMPORTXML(\"https://evil.example\",\"//a\")".to_string();
        record.related_crimes = "+50".to_string();
        let mut values = encode(&record, &layout, LinkStyle::Formula);
        assert!(literalize_for_formula_link(&mut values, &layout));
        assert!(values[7].starts_with("=HYPERLINK("));
        assert_eq!(values[6], "'=IMPORTXML(\"https://evil.example\",\"//a\")");
        assert_eq!(values[3], "'+50");
        assert_eq!(values[0], "'2025-08-30 10:15:00");
    }

    #[test]
    fn formula_link_detection_ignores_other_columns() {
        let layout = ColumnLayout::new(["observaciones"]);
        let mut values = vec!["=1+1".to_string()];
        assert!(!literalize_for_formula_link(&mut values, &layout));
        assert_eq!(values, vec!["=1+1".to_string()]);
    }

    #[test]
    fn backfills_links_only_where_missing() {
        let layout = ColumnLayout::new(["barrio", "maps_link", "lat", "lng"]);
        let rows = vec![
            row(&["A", "", "9.95", "-84.15"]),
            row(&["B", "https://www.google.com/maps?q=1,2", "9.9", "-84.1"]),
            row(&["C", "", "norte", "-84.1"]),
            row(&[]),
            row(&["E", "", "9.94", "-84.13"]),
        ];
        assert_eq!(
            legacy_link_backfill(&layout, &rows),
            vec![
                (2, "https://www.google.com/maps?q=9.95,-84.15".to_string()),
                (6, "https://www.google.com/maps?q=9.94,-84.13".to_string()),
            ]
        );
    }

    #[test]
    fn nothing_to_backfill_without_coordinate_columns() {
        let layout = ColumnLayout::canonical();
        assert!(legacy_link_backfill(&layout, &[row(&["2025-01-01", "Pavas"])]).is_empty());
    }

    #[test]
    fn blank_rows_are_skipped_but_numbering_is_physical() {
        let layout = ColumnLayout::new(["barrio"]);
        let rendered = vec![row(&["A"]), row(&[]), row(&["  "]), row(&["B"])];
        let records = decode_rows(&layout, &rendered, &[]);
        let numbers: Vec<u32> = records.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, vec![2, 5]);
    }

    #[test]
    fn splits_factor_lists() {
        let cameras = RiskFactor::NoSecurityCameras.label();
        let lighting = RiskFactor::PoorLighting.label();
        assert_eq!(split_factors(cameras), vec![cameras.to_string()]);
        assert_eq!(
            split_factors(&format!("{cameras};  {lighting} ;")),
            vec![cameras.to_string(), lighting.to_string()]
        );
        assert_eq!(
            split_factors(&format!("{cameras}, {lighting}")),
            vec![cameras.to_string(), lighting.to_string()]
        );
        assert!(split_factors("  ").is_empty());
    }
}
