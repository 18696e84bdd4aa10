//! Cell identity for dependency graph and evaluation.
//!
//! A `CellId` uniquely identifies a cell across all sheets in a workbook.

use serde::{Deserialize, Serialize};

/// Stable sheet identifier (a string UID).
///
/// Never reused after deletion unless an undo recreates the same sheet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(String);

impl SheetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SheetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a cell in a workbook.
///
/// Combines sheet identity with row/column coordinates.
/// Used as graph nodes in the dependency graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    /// The sheet this cell belongs to
    pub sheet: SheetId,
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
}

impl CellId {
    /// Create a new CellId.
    #[inline]
    pub fn new(sheet: SheetId, row: usize, col: usize) -> Self {
        Self { sheet, row, col }
    }

    /// Compact `sheetId:col:row` key.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.sheet, self.col, self.row)
    }

    /// A1-style address without the sheet.
    pub fn xc(&self) -> String {
        format!("{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.sheet, self.xc())
    }
}

/// Convert 0-based column index to letter(s): 0=A, 25=Z, 26=AA.
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert column letters (any case) to a 0-based index.
///
/// Returns `None` for empty or non-alphabetic input, or for columns past
/// `ZZZ`.
pub fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col = 0usize;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u8 - b'A' + 1) as usize;
    }
    Some(col - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_equality() {
        let a = CellId::new("s1".into(), 0, 0);
        let b = CellId::new("s1".into(), 0, 0);
        let c = CellId::new("s2".into(), 0, 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cell_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(CellId::new("s1".into(), 0, 0));
        set.insert(CellId::new("s1".into(), 0, 0)); // duplicate
        set.insert(CellId::new("s1".into(), 1, 0));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_key_and_display() {
        let id = CellId::new("abc".into(), 4, 2);
        assert_eq!(id.key(), "abc:2:4");
        assert_eq!(id.to_string(), "abc!C5");
    }

    #[test]
    fn test_col_to_letters() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(1), "B");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
    }

    #[test]
    fn test_letters_to_col() {
        assert_eq!(letters_to_col("A"), Some(0));
        assert_eq!(letters_to_col("z"), Some(25));
        assert_eq!(letters_to_col("AA"), Some(26));
        assert_eq!(letters_to_col("aaa"), Some(702));
        assert_eq!(letters_to_col(""), None);
        assert_eq!(letters_to_col("A1"), None);
        assert_eq!(letters_to_col("ABCD"), None);
    }
}
