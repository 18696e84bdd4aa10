//! Rectangular zones and XC (A1-style) address conversion.
//!
//! Zones are inclusive. Full columns and full rows use [`UNBOUNDED`] as their
//! open bound so a zone never depends on the current sheet dimensions.

use serde::{Deserialize, Serialize};

use crate::cell_id::{col_to_letters, letters_to_col};
use crate::error::{EngineError, Result};

/// Sentinel bound for entire rows/columns.
pub const UNBOUNDED: usize = usize::MAX;

/// Axis of a structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dimension {
    Col,
    Row,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Zone {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Zone {
    /// Build a zone from two corners in any order.
    pub fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top: top.min(bottom),
            bottom: top.max(bottom),
            left: left.min(right),
            right: left.max(right),
        }
    }

    pub fn single(row: usize, col: usize) -> Self {
        Self {
            top: row,
            bottom: row,
            left: col,
            right: col,
        }
    }

    pub fn is_single_cell(&self) -> bool {
        self.top == self.bottom && self.left == self.right
    }

    pub fn is_full_col(&self) -> bool {
        self.bottom == UNBOUNDED
    }

    pub fn is_full_row(&self) -> bool {
        self.right == UNBOUNDED
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.top && row <= self.bottom && col >= self.left && col <= self.right
    }

    pub fn contains_zone(&self, other: &Zone) -> bool {
        self.contains(other.top, other.left) && self.contains(other.bottom, other.right)
    }

    pub fn intersects(&self, other: &Zone) -> bool {
        self.top <= other.bottom
            && other.top <= self.bottom
            && self.left <= other.right
            && other.left <= self.right
    }

    /// Smallest zone containing both.
    pub fn union(&self, other: &Zone) -> Zone {
        Zone {
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
            left: self.left.min(other.left),
            right: self.right.max(other.right),
        }
    }

    /// Restrict unbounded edges to a sheet of `rows` x `cols`.
    ///
    /// Returns `None` when the zone lies entirely outside the sheet.
    pub fn clip_to_sheet(&self, rows: usize, cols: usize) -> Option<Zone> {
        if rows == 0 || cols == 0 || self.top >= rows || self.left >= cols {
            return None;
        }
        Some(Zone {
            top: self.top,
            bottom: self.bottom.min(rows - 1),
            left: self.left,
            right: self.right.min(cols - 1),
        })
    }

    /// True if the zone fits inside a sheet of the given size. Unbounded
    /// edges always fit.
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        (self.bottom == UNBOUNDED || self.bottom < rows)
            && (self.right == UNBOUNDED || self.right < cols)
            && self.top < rows
            && self.left < cols
    }

    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top).saturating_add(1)
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left).saturating_add(1)
    }

    /// Positions in row-major order. Call on a clamped zone.
    pub fn positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.top..=self.bottom).flat_map(move |r| (self.left..=self.right).map(move |c| (r, c)))
    }

    /// Start/end along one axis.
    pub fn span(&self, dimension: Dimension) -> (usize, usize) {
        match dimension {
            Dimension::Col => (self.left, self.right),
            Dimension::Row => (self.top, self.bottom),
        }
    }

    pub fn with_span(&self, dimension: Dimension, start: usize, end: usize) -> Zone {
        let mut z = *self;
        match dimension {
            Dimension::Col => {
                z.left = start;
                z.right = end;
            }
            Dimension::Row => {
                z.top = start;
                z.bottom = end;
            }
        }
        z
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&zone_to_xc(self))
    }
}

/// `(col, row)` to `"B3"`.
pub fn to_xc(col: usize, row: usize) -> String {
    format!("{}{}", col_to_letters(col), row + 1)
}

/// `"B3"` (any case, `$` anchors ignored) to `(col, row)`.
pub fn to_cartesian(xc: &str) -> Result<(usize, usize)> {
    let cleaned: String = xc.chars().filter(|c| *c != '$').collect();
    let split = cleaned
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| EngineError::InvalidAddress(xc.to_string()))?;
    let (letters, digits) = cleaned.split_at(split);
    let col = letters_to_col(letters).ok_or_else(|| EngineError::InvalidAddress(xc.to_string()))?;
    let row: usize = digits
        .parse()
        .map_err(|_| EngineError::InvalidAddress(xc.to_string()))?;
    if row == 0 {
        return Err(EngineError::InvalidAddress(xc.to_string()));
    }
    Ok((col, row - 1))
}

/// Parse `"A1"`, `"B2:A1"`, `"A:C"` or `"2:4"` into a canonical zone.
pub fn to_zone(xc: &str) -> Result<Zone> {
    let invalid = || EngineError::InvalidAddress(xc.to_string());
    let mut parts = xc.split(':');
    let first = parts.next().ok_or_else(invalid)?;
    let second = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }
    let Some(second) = second else {
        let (col, row) = to_cartesian(first)?;
        return Ok(Zone::single(row, col));
    };
    let a = first.trim_start_matches('$');
    let b = second.trim_start_matches('$');
    if !a.is_empty() && a.chars().all(|c| c.is_ascii_alphabetic())
        && !b.is_empty() && b.chars().all(|c| c.is_ascii_alphabetic())
    {
        let l = letters_to_col(a).ok_or_else(invalid)?;
        let r = letters_to_col(b).ok_or_else(invalid)?;
        return Ok(Zone::new(0, l, UNBOUNDED, r));
    }
    if !a.is_empty() && a.chars().all(|c| c.is_ascii_digit())
        && !b.is_empty() && b.chars().all(|c| c.is_ascii_digit())
    {
        let t: usize = a.parse().map_err(|_| invalid())?;
        let btm: usize = b.parse().map_err(|_| invalid())?;
        if t == 0 || btm == 0 {
            return Err(invalid());
        }
        return Ok(Zone::new(t - 1, 0, btm - 1, UNBOUNDED));
    }
    let (c1, r1) = to_cartesian(first)?;
    let (c2, r2) = to_cartesian(second)?;
    Ok(Zone::new(r1, c1, r2, c2))
}

/// Inverse of [`to_zone`]. Single cells render without a colon.
pub fn zone_to_xc(zone: &Zone) -> String {
    if zone.is_full_col() {
        return format!("{}:{}", col_to_letters(zone.left), col_to_letters(zone.right));
    }
    if zone.is_full_row() {
        return format!("{}:{}", zone.top + 1, zone.bottom + 1);
    }
    if zone.is_single_cell() {
        return to_xc(zone.left, zone.top);
    }
    format!("{}:{}", to_xc(zone.left, zone.top), to_xc(zone.right, zone.bottom))
}

/// Shift a span for `quantity` elements inserted before index `at`.
///
/// A span that straddles the insertion point grows. Unbounded ends stay
/// unbounded.
pub fn insert_into_span(start: usize, end: usize, at: usize, quantity: usize) -> (usize, usize) {
    let shift = |i: usize| {
        if i == UNBOUNDED || i < at {
            i
        } else {
            i + quantity
        }
    };
    (shift(start), shift(end))
}

/// Shrink/shift a span for removed elements (`removed` sorted ascending).
///
/// Returns `None` if every element of the span was removed.
pub fn remove_from_span(start: usize, end: usize, removed: &[usize]) -> Option<(usize, usize)> {
    let inside = removed.iter().filter(|&&r| r >= start && r <= end).count();
    if end != UNBOUNDED && inside == end - start + 1 {
        return None;
    }
    let before = removed.iter().filter(|&&r| r < start).count();
    let new_start = start - before;
    let new_end = if end == UNBOUNDED {
        UNBOUNDED
    } else {
        end - before - inside
    };
    Some((new_start, new_end))
}

/// New index of `index` after removal, or `None` if it was removed.
pub fn remove_from_index(index: usize, removed: &[usize]) -> Option<usize> {
    if removed.binary_search(&index).is_ok() {
        return None;
    }
    Some(index - removed.iter().filter(|&&r| r < index).count())
}
