//! Reference resolution.
//!
//! A [`RangeRef`] is the parsed form of one REFERENCE token. Sheet names stay
//! unresolved until evaluation so that a reference to a sheet that does not
//! exist (yet, or any more) turns into `#REF` at evaluation time and heals
//! when the sheet comes back.

use crate::cell_id::{col_to_letters, letters_to_col, SheetId};
use crate::zone::{insert_into_span, remove_from_span, Dimension, Zone, UNBOUNDED};

use super::tokenizer::INVALID_REFERENCE;
use super::value::CellError;

/// Which sheet a reference points at, before binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SheetTarget {
    /// The sheet holding the formula
    Current,
    /// Explicit `Name!` prefix, unquoted
    Named(String),
}

/// `$` flags of one corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CornerAnchors {
    pub col: bool,
    pub row: bool,
}

/// Parsed reference, independent of current sheet dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeRef {
    pub sheet: SheetTarget,
    pub zone: Zone,
    pub is_full_row: bool,
    pub is_full_col: bool,
    /// Top-left and bottom-right anchors
    pub anchors: [CornerAnchors; 2],
    /// Whether the range was written with a colon (`A1:A1` stays a range)
    pub is_range: bool,
    /// The target no longer exists; renders as `#REF`
    pub invalid: bool,
}

/// A reference bound to a sheet and clamped to its dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedRange {
    pub sheet: SheetId,
    pub zone: Zone,
}

/// Sheet lookups needed to bind references.
pub trait SheetResolver {
    fn sheet_id_by_name(&self, name: &str) -> Option<SheetId>;
    /// `(rows, cols)` of a sheet
    fn sheet_size(&self, sheet: &SheetId) -> Option<(usize, usize)>;
}

impl RangeRef {
    pub fn invalid() -> Self {
        Self {
            sheet: SheetTarget::Current,
            zone: Zone::single(0, 0),
            is_full_row: false,
            is_full_col: false,
            anchors: [CornerAnchors::default(); 2],
            is_range: false,
            invalid: true,
        }
    }

    pub fn cell(sheet: SheetTarget, row: usize, col: usize) -> Self {
        Self {
            sheet,
            zone: Zone::single(row, col),
            is_full_row: false,
            is_full_col: false,
            anchors: [CornerAnchors::default(); 2],
            is_range: false,
            invalid: false,
        }
    }

    /// Parse reference text. Malformed text yields an invalid reference
    /// rather than an error.
    pub fn parse(text: &str) -> Self {
        Self::try_parse(text).unwrap_or_else(Self::invalid)
    }

    fn try_parse(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case(INVALID_REFERENCE) {
            return None;
        }
        let (sheet, body) = split_sheet_prefix(text)?;
        let mut parts = body.split(':');
        let first = parts.next()?;
        let second = parts.next();
        if parts.next().is_some() {
            return None;
        }

        let Some(second) = second else {
            let (col, row, anchors) = parse_cell(first)?;
            return Some(Self {
                sheet,
                zone: Zone::single(row, col),
                is_full_row: false,
                is_full_col: false,
                anchors: [anchors, anchors],
                is_range: false,
                invalid: false,
            });
        };

        if let (Some((c1, a1)), Some((c2, a2))) = (parse_col(first), parse_col(second)) {
            let (left, right, la, ra) = ordered(c1, c2, a1, a2);
            return Some(Self {
                sheet,
                zone: Zone { top: 0, bottom: UNBOUNDED, left, right },
                is_full_row: false,
                is_full_col: true,
                anchors: [
                    CornerAnchors { col: la, row: false },
                    CornerAnchors { col: ra, row: false },
                ],
                is_range: true,
                invalid: false,
            });
        }
        if let (Some((r1, a1)), Some((r2, a2))) = (parse_row(first), parse_row(second)) {
            let (top, bottom, ta, ba) = ordered(r1, r2, a1, a2);
            return Some(Self {
                sheet,
                zone: Zone { top, bottom, left: 0, right: UNBOUNDED },
                is_full_row: true,
                is_full_col: false,
                anchors: [
                    CornerAnchors { col: false, row: ta },
                    CornerAnchors { col: false, row: ba },
                ],
                is_range: true,
                invalid: false,
            });
        }

        let (c1, r1, a1) = parse_cell(first)?;
        let (c2, r2, a2) = parse_cell(second)?;
        // Inverted corners (B1:A2) are canonicalized; anchors follow their axis
        let (left, right, lca, rca) = ordered(c1, c2, a1.col, a2.col);
        let (top, bottom, tra, bra) = ordered(r1, r2, a1.row, a2.row);
        Some(Self {
            sheet,
            zone: Zone { top, bottom, left, right },
            is_full_row: false,
            is_full_col: false,
            anchors: [
                CornerAnchors { col: lca, row: tra },
                CornerAnchors { col: rca, row: bra },
            ],
            is_range: true,
            invalid: false,
        })
    }

    /// Bind to a sheet and clamp to its dimensions.
    ///
    /// Unknown sheets and zones outside the sheet are `#REF`.
    pub fn resolve(
        &self,
        current: &SheetId,
        sheets: &impl SheetResolver,
    ) -> Result<ResolvedRange, CellError> {
        if self.invalid {
            return Err(CellError::reference("Invalid reference"));
        }
        let sheet = match &self.sheet {
            SheetTarget::Current => current.clone(),
            SheetTarget::Named(name) => sheets.sheet_id_by_name(name).ok_or_else(|| {
                CellError::reference(format!("Invalid sheet name: {}", name))
            })?,
        };
        let (rows, cols) = sheets
            .sheet_size(&sheet)
            .ok_or_else(|| CellError::reference("Invalid sheet"))?;
        if !self.zone.fits(rows, cols) {
            return Err(CellError::reference("Reference out of sheet bounds"));
        }
        let zone = self
            .zone
            .clip_to_sheet(rows, cols)
            .ok_or_else(|| CellError::reference("Reference out of sheet bounds"))?;
        Ok(ResolvedRange { sheet, zone })
    }

    /// The sheet this reference points to, without bounds checking.
    pub fn target_sheet(&self, current: &SheetId, sheets: &impl SheetResolver) -> Option<SheetId> {
        if self.invalid {
            return None;
        }
        match &self.sheet {
            SheetTarget::Current => Some(current.clone()),
            SheetTarget::Named(name) => sheets.sheet_id_by_name(name),
        }
    }

    /// True for a single-cell reference written without a colon.
    pub fn is_single_cell(&self) -> bool {
        !self.is_range && self.zone.is_single_cell()
    }

    /// Render back to XC notation, keeping anchors and the sheet prefix.
    pub fn to_xc(&self) -> String {
        if self.invalid {
            return INVALID_REFERENCE.to_string();
        }
        let mut out = String::new();
        if let SheetTarget::Named(name) = &self.sheet {
            out.push_str(&format_sheet_name(name));
            out.push('!');
        }
        let [a, b] = self.anchors;
        let z = &self.zone;
        let dollar = |on: bool| if on { "$" } else { "" };
        if self.is_full_col {
            out.push_str(&format!(
                "{}{}:{}{}",
                dollar(a.col),
                col_to_letters(z.left),
                dollar(b.col),
                col_to_letters(z.right)
            ));
        } else if self.is_full_row {
            out.push_str(&format!(
                "{}{}:{}{}",
                dollar(a.row),
                z.top + 1,
                dollar(b.row),
                z.bottom + 1
            ));
        } else {
            out.push_str(&format_cell_addr(z.left, z.top, a));
            if self.is_range {
                out.push(':');
                out.push_str(&format_cell_addr(z.right, z.bottom, b));
            }
        }
        out
    }

    /// Adapt to `quantity` rows/columns inserted before index `at`.
    pub fn insert(&mut self, dimension: Dimension, at: usize, quantity: usize) {
        if self.invalid || self.is_unbounded_along(dimension) {
            return;
        }
        let (start, end) = self.zone.span(dimension);
        let (start, end) = insert_into_span(start, end, at, quantity);
        self.zone = self.zone.with_span(dimension, start, end);
    }

    /// Adapt to removed rows/columns (`removed` sorted ascending). The
    /// reference becomes invalid when every row/column it covers is gone.
    pub fn remove(&mut self, dimension: Dimension, removed: &[usize]) {
        if self.invalid || self.is_unbounded_along(dimension) {
            return;
        }
        let (start, end) = self.zone.span(dimension);
        match remove_from_span(start, end, removed) {
            Some((start, end)) => self.zone = self.zone.with_span(dimension, start, end),
            None => self.invalid = true,
        }
    }

    /// Follow a sheet rename.
    pub fn rename_sheet(&mut self, old: &str, new: &str) {
        if let SheetTarget::Named(name) = &self.sheet {
            if name.eq_ignore_ascii_case(old) {
                self.sheet = SheetTarget::Named(new.to_string());
            }
        }
    }

    fn is_unbounded_along(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Row => self.is_full_col,
            Dimension::Col => self.is_full_row,
        }
    }
}

/// Quote a sheet name when it is not a plain identifier.
pub fn format_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        // Escape single quotes by doubling them
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn format_cell_addr(col: usize, row: usize, anchors: CornerAnchors) -> String {
    format!(
        "{}{}{}{}",
        if anchors.col { "$" } else { "" },
        col_to_letters(col),
        if anchors.row { "$" } else { "" },
        row + 1
    )
}

fn ordered(a: usize, b: usize, fa: bool, fb: bool) -> (usize, usize, bool, bool) {
    if a <= b {
        (a, b, fa, fb)
    } else {
        (b, a, fb, fa)
    }
}

/// Split `Sheet!A1` / `'My Sheet'!A1` into target and body.
fn split_sheet_prefix(text: &str) -> Option<(SheetTarget, &str)> {
    if let Some(rest) = text.strip_prefix('\'') {
        // Find the closing quote, skipping doubled quotes
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                let name = rest[..i].replace("''", "'");
                let body = rest[i + 1..].strip_prefix('!')?;
                return Some((SheetTarget::Named(name), body));
            }
            i += 1;
        }
        return None;
    }
    match text.rsplit_once('!') {
        Some((name, body)) if !name.is_empty() => Some((SheetTarget::Named(name.to_string()), body)),
        Some(_) => None,
        None => Some((SheetTarget::Current, text)),
    }
}

fn parse_col(s: &str) -> Option<(usize, bool)> {
    let (anchored, letters) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    letters_to_col(letters).map(|c| (c, anchored))
}

fn parse_row(s: &str) -> Option<(usize, bool)> {
    let (anchored, digits) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<usize>() {
        Ok(n) if n > 0 => Some((n - 1, anchored)),
        _ => None,
    }
}

fn parse_cell(s: &str) -> Option<(usize, usize, CornerAnchors)> {
    let (col_abs, rest) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let letters_end = rest.find(|c: char| !c.is_ascii_alphabetic())?;
    let (letters, row_part) = rest.split_at(letters_end);
    let col = letters_to_col(letters)?;
    let (row, row_abs) = parse_row(row_part)?;
    Some((col, row, CornerAnchors { col: col_abs, row: row_abs }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    struct Sheets(FxHashMap<String, (SheetId, usize, usize)>);

    impl Sheets {
        fn new(entries: &[(&str, &str, usize, usize)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(name, id, r, c)| (name.to_lowercase(), (SheetId::new(*id), *r, *c)))
                    .collect(),
            )
        }
    }

    impl SheetResolver for Sheets {
        fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
            self.0.get(&name.to_lowercase()).map(|(id, _, _)| id.clone())
        }
        fn sheet_size(&self, sheet: &SheetId) -> Option<(usize, usize)> {
            self.0.values().find(|(id, _, _)| id == sheet).map(|(_, r, c)| (*r, *c))
        }
    }

    #[test]
    fn test_parse_single_cell() {
        let r = RangeRef::parse("b3");
        assert_eq!(r.zone, Zone::single(2, 1));
        assert_eq!(r.sheet, SheetTarget::Current);
        assert!(r.is_single_cell());
        assert_eq!(r.to_xc(), "B3");
    }

    #[test]
    fn test_anchors_preserved() {
        let r = RangeRef::parse("$A1:B$2");
        assert_eq!(r.anchors[0], CornerAnchors { col: true, row: false });
        assert_eq!(r.anchors[1], CornerAnchors { col: false, row: true });
        assert_eq!(r.to_xc(), "$A1:B$2");
        assert_eq!(RangeRef::parse("$C$3").to_xc(), "$C$3");
    }

    #[test]
    fn test_inverted_range_canonicalized() {
        let r = RangeRef::parse("B1:A2");
        assert_eq!(r.zone, Zone::new(0, 0, 1, 1));
        assert_eq!(r.to_xc(), "A1:B2");
    }

    #[test]
    fn test_full_column_and_row() {
        let c = RangeRef::parse("Sheet2!$A:C");
        assert!(c.is_full_col);
        assert_eq!(c.zone.bottom, UNBOUNDED);
        assert_eq!(c.to_xc(), "Sheet2!$A:C");
        let r = RangeRef::parse("3:1");
        assert!(r.is_full_row);
        assert_eq!((r.zone.top, r.zone.bottom), (0, 2));
        assert_eq!(r.to_xc(), "1:3");
    }

    #[test]
    fn test_quoted_sheet_name() {
        let r = RangeRef::parse("'Bob''s Sheet'!A1");
        assert_eq!(r.sheet, SheetTarget::Named("Bob's Sheet".into()));
        assert_eq!(r.to_xc(), "'Bob''s Sheet'!A1");
    }

    #[test]
    fn test_invalid_text() {
        assert!(RangeRef::parse("#REF").invalid);
        assert!(RangeRef::parse("A0").invalid);
        assert_eq!(RangeRef::parse("#REF").to_xc(), "#REF");
    }

    #[test]
    fn test_resolve_deferred_sheet() {
        let r = RangeRef::parse("Data!A1:A3");
        let current = SheetId::new("s1");
        let without = Sheets::new(&[("Sheet1", "s1", 10, 10)]);
        let err = r.resolve(&current, &without).unwrap_err();
        assert_eq!(err.code(), "#REF");

        let with = Sheets::new(&[("Sheet1", "s1", 10, 10), ("data", "s2", 10, 10)]);
        let resolved = r.resolve(&current, &with).unwrap();
        assert_eq!(resolved.sheet, SheetId::new("s2"));
    }

    #[test]
    fn test_resolve_clamps_full_column() {
        let sheets = Sheets::new(&[("Sheet1", "s1", 20, 5)]);
        let r = RangeRef::parse("B:B").resolve(&SheetId::new("s1"), &sheets).unwrap();
        assert_eq!(r.zone, Zone::new(0, 1, 19, 1));
    }

    #[test]
    fn test_resolve_out_of_bounds() {
        let sheets = Sheets::new(&[("Sheet1", "s1", 5, 5)]);
        let err = RangeRef::parse("A10").resolve(&SheetId::new("s1"), &sheets).unwrap_err();
        assert_eq!(err.code(), "#REF");
    }

    #[test]
    fn test_insert_rows() {
        let mut r = RangeRef::parse("A2:A5");
        r.insert(Dimension::Row, 3, 2);
        assert_eq!(r.to_xc(), "A2:A7");
        let mut full = RangeRef::parse("A:A");
        full.insert(Dimension::Row, 0, 2);
        assert_eq!(full.to_xc(), "A:A");
    }

    #[test]
    fn test_remove_rows() {
        let mut r = RangeRef::parse("A2");
        r.remove(Dimension::Row, &[0]);
        assert_eq!(r.to_xc(), "A1");
        let mut gone = RangeRef::parse("A2");
        gone.remove(Dimension::Row, &[1]);
        assert!(gone.invalid);
        assert_eq!(gone.to_xc(), "#REF");
    }

    #[test]
    fn test_remove_columns_shrinks_range() {
        let mut r = RangeRef::parse("A1:D1");
        r.remove(Dimension::Col, &[1, 2]);
        assert_eq!(r.to_xc(), "A1:B1");
    }

    #[test]
    fn test_rename_sheet() {
        let mut r = RangeRef::parse("old!A1");
        r.rename_sheet("OLD", "New Name");
        assert_eq!(r.to_xc(), "'New Name'!A1");
    }
}
