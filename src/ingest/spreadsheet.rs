use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

use super::RawRow;
use crate::error::InputError;

/// Decode the first worksheet into header-keyed rows.
///
/// The first row supplies headers. Blank cells are omitted from a row and
/// rows with no values at all are skipped.
pub fn decode_spreadsheet(bytes: &[u8]) -> Result<Vec<RawRow>, InputError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| InputError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(InputError::EmptySheet)?
        .map_err(|e| InputError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_text).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), cell_text(cell)))
                .filter(|(_, value)| !value.is_empty())
                .collect::<RawRow>()
        })
        .filter(|row| !row.is_empty())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}
