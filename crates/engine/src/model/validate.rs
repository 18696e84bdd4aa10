//! Command validation. Runs against the current state and never mutates.

use rustc_hash::FxHashSet;

use super::Model;
use crate::cell_id::SheetId;
use crate::commands::{CancelledReason, Command};
use crate::sheet::Sheet;
use crate::workbook::is_valid_sheet_name;
use crate::zone::{Dimension, Zone};

impl Model {
    /// Reasons the command cannot be applied now; empty if it can.
    pub fn allow_dispatch(&self, command: &Command) -> Vec<CancelledReason> {
        let mut reasons = Vec::new();
        match command {
            Command::UpdateCell { sheet_id, col, row, .. } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    if !sheet.contains(*row, *col) {
                        reasons.push(CancelledReason::TargetOutOfSheet);
                    }
                }
            }
            Command::ClearCells { sheet_id, target } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    check_zones(sheet, target, &mut reasons);
                }
            }
            Command::AddColumnsRows {
                sheet_id,
                dimension,
                base,
                quantity,
                ..
            } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    if *quantity == 0 {
                        reasons.push(CancelledReason::InvalidQuantity);
                    }
                    if *base >= size_of(sheet, *dimension) {
                        reasons.push(CancelledReason::TargetOutOfSheet);
                    }
                }
            }
            Command::RemoveColumnsRows {
                sheet_id,
                dimension,
                elements,
            } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    let size = size_of(sheet, *dimension);
                    let distinct: FxHashSet<usize> = elements.iter().copied().collect();
                    if distinct.is_empty() {
                        reasons.push(CancelledReason::InvalidQuantity);
                    } else if distinct.iter().any(|&e| e >= size) {
                        reasons.push(CancelledReason::TargetOutOfSheet);
                    } else if distinct.len() >= size {
                        reasons.push(CancelledReason::NotEnoughElements);
                    }
                }
            }
            Command::AddMerge {
                sheet_id,
                target,
                force,
            } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    check_zones(sheet, target, &mut reasons);
                    if reasons.is_empty() {
                        check_new_merges(sheet, target, *force, &mut reasons);
                    }
                }
            }
            Command::RemoveMerge { sheet_id, target } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    if target.is_empty() || target.iter().any(|z| !sheet.merges().contains(z)) {
                        reasons.push(CancelledReason::InvalidMerge);
                    }
                }
            }
            Command::SetMerges { sheet_id, merges } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    if merges.iter().any(|z| !z.fits(sheet.rows, sheet.cols)) {
                        reasons.push(CancelledReason::TargetOutOfSheet);
                    }
                }
            }
            Command::CreateSheet {
                sheet_id,
                name,
                rows,
                cols,
                ..
            } => {
                if self.workbook.sheet(sheet_id).is_some() {
                    reasons.push(CancelledReason::DuplicatedSheetId);
                }
                self.check_sheet_name(name, None, &mut reasons);
                if *rows == Some(0) || *cols == Some(0) {
                    reasons.push(CancelledReason::InvalidQuantity);
                }
            }
            Command::DeleteSheet { sheet_id } => {
                if self.sheet_or(sheet_id, &mut reasons).is_some() && self.workbook.sheet_count() <= 1 {
                    reasons.push(CancelledReason::NotEnoughSheets);
                }
            }
            Command::DuplicateSheet {
                sheet_id,
                sheet_id_to,
                name,
            } => {
                self.sheet_or(sheet_id, &mut reasons);
                if self.workbook.sheet(sheet_id_to).is_some() {
                    reasons.push(CancelledReason::DuplicatedSheetId);
                }
                if let Some(name) = name {
                    self.check_sheet_name(name, None, &mut reasons);
                }
            }
            Command::RenameSheet { sheet_id, name } => {
                if self.sheet_or(sheet_id, &mut reasons).is_some() {
                    self.check_sheet_name(name, Some(sheet_id), &mut reasons);
                }
            }
            Command::RemoveDuplicates {
                sheet_id,
                target,
                columns,
                ..
            } => {
                if let Some(sheet) = self.sheet_or(sheet_id, &mut reasons) {
                    if columns.is_empty() {
                        reasons.push(CancelledReason::NoDuplicateColumns);
                    } else if columns.iter().any(|&c| c < target.left || c > target.right) {
                        reasons.push(CancelledReason::InvalidZone);
                    }
                    if !target.fits(sheet.rows, sheet.cols) {
                        reasons.push(CancelledReason::TargetOutOfSheet);
                    }
                }
            }
            Command::RequestUndo => {
                if !self.history.can_undo() {
                    reasons.push(CancelledReason::EmptyUndoStack);
                }
            }
            Command::RequestRedo => {
                if !self.history.can_redo() {
                    reasons.push(CancelledReason::EmptyRedoStack);
                }
            }
        }
        reasons
    }

    fn sheet_or(&self, sheet_id: &SheetId, reasons: &mut Vec<CancelledReason>) -> Option<&Sheet> {
        let sheet = self.workbook.sheet(sheet_id);
        if sheet.is_none() {
            reasons.push(CancelledReason::InvalidSheetId);
        }
        sheet
    }

    fn check_sheet_name(&self, name: &str, exclude: Option<&SheetId>, reasons: &mut Vec<CancelledReason>) {
        if !is_valid_sheet_name(name) {
            reasons.push(CancelledReason::InvalidSheetName);
        } else if !self.workbook.is_name_available(name, exclude) {
            reasons.push(CancelledReason::DuplicatedSheetName);
        }
    }
}

fn size_of(sheet: &Sheet, dimension: Dimension) -> usize {
    match dimension {
        Dimension::Row => sheet.rows,
        Dimension::Col => sheet.cols,
    }
}

fn check_zones(sheet: &Sheet, zones: &[Zone], reasons: &mut Vec<CancelledReason>) {
    if zones.is_empty() {
        reasons.push(CancelledReason::InvalidZone);
    } else if zones.iter().any(|z| !z.fits(sheet.rows, sheet.cols)) {
        reasons.push(CancelledReason::TargetOutOfSheet);
    }
}

fn check_new_merges(sheet: &Sheet, zones: &[Zone], force: bool, reasons: &mut Vec<CancelledReason>) {
    if zones.iter().any(|z| z.is_single_cell() || z.is_full_col() || z.is_full_row()) {
        reasons.push(CancelledReason::InvalidMerge);
        return;
    }
    let overlaps_existing = zones
        .iter()
        .any(|z| sheet.merges().iter().any(|m| m.intersects(z)));
    let overlaps_each_other = zones
        .iter()
        .enumerate()
        .any(|(i, a)| zones[i + 1..].iter().any(|b| a.intersects(b)));
    if overlaps_existing || overlaps_each_other {
        reasons.push(CancelledReason::MergeOverlap);
        return;
    }
    let destructive = zones.iter().any(|z| {
        sheet
            .cells_in_zone(z)
            .into_iter()
            .any(|(row, col)| (row, col) != (z.top, z.left) && sheet.cell(row, col).is_some_and(|c| !c.text().is_empty()))
    });
    if destructive && !force {
        reasons.push(CancelledReason::MergeIsDestructive);
    }
}
