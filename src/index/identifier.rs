use crate::error::HexbinError;
use h3o::CellIndex;
use std::str::FromStr;

/// Parses a cell identifier in its canonical 15-digit hexadecimal form.
///
/// Surrounding whitespace is ignored and upper-case digits are accepted, so
/// `"832830fffffffff"` and `" 832830FFFFFFFFF "` denote the same cell.
///
/// # Example
/// ```
/// use hexbin_rs::index::parse_cell_id;
///
/// # fn main() -> Result<(), hexbin_rs::HexbinError> {
/// let cell = parse_cell_id("832830fffffffff")?;
/// assert_eq!(u8::from(cell.resolution()), 3);
/// # Ok(())
/// # }
/// ```
pub fn parse_cell_id(id: &str) -> Result<CellIndex, HexbinError> {
    let trimmed = id.trim();
    CellIndex::from_str(&trimmed.to_ascii_lowercase())
        .map_err(|_| HexbinError::InvalidCellId(trimmed.to_string()))
}

/// Formats a cell as its canonical lower-case hexadecimal identifier.
pub fn format_cell_id(cell: CellIndex) -> String {
    cell.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_identifier() -> Result<(), HexbinError> {
        let cell = parse_cell_id("832830fffffffff")?;
        assert_eq!(format_cell_id(cell), "832830fffffffff");

        let upper = parse_cell_id("  832830FFFFFFFFF ")?;
        assert_eq!(cell, upper);
        Ok(())
    }

    #[test]
    fn test_invalid_identifier() {
        let result = parse_cell_id("invalid");
        assert!(matches!(result, Err(HexbinError::InvalidCellId(_))));
    }
}
