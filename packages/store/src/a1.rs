//! A1 notation helpers.

/// Converts a 1-based column number to its letters (`1` → `A`, `27` → `AA`).
///
/// Column 0 has no letters and yields an empty string.
#[must_use]
pub fn column_letters(column: u32) -> String {
    let mut n = column;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + u8::try_from(rem).unwrap_or(0)));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Quotes a worksheet title for use in a range (`Hoja 1` → `'Hoja 1'`).
#[must_use]
pub fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Builds a range such as `'Respuestas'!A1:H1`.
#[must_use]
pub fn range(title: &str, cells: &str) -> String {
    format!("{}!{cells}", quote_title(title))
}

/// Extracts the first row number of a range such as `'Respuestas'!A5:H5`.
#[must_use]
pub fn first_row_of_range(range: &str) -> Option<u32> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let start = cells.split(':').next()?;
    let digits: String = start
        .chars()
        .skip_while(char::is_ascii_alphabetic)
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
