//! Commands accepted by [`crate::model::Model::dispatch`].
//!
//! Commands serialize as JSON objects tagged by `type`
//! (`{"type": "UPDATE_CELL", "sheetId": "...", ...}`); the same encoding
//! travels over the collaboration transport.

use serde::{Deserialize, Serialize};

use crate::cell::Style;
use crate::cell_id::SheetId;
use crate::zone::{Dimension, Zone};

/// Side of the base index where new rows/columns go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Set any of content, style and format of one cell. An empty content
    /// string clears the content, a default style or an empty format clears
    /// those.
    #[serde(rename_all = "camelCase")]
    UpdateCell {
        sheet_id: SheetId,
        col: usize,
        row: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<Style>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    /// Remove every cell (content, style, format) of the zones.
    #[serde(rename_all = "camelCase")]
    ClearCells { sheet_id: SheetId, target: Vec<Zone> },
    #[serde(rename_all = "camelCase")]
    AddColumnsRows {
        sheet_id: SheetId,
        dimension: Dimension,
        base: usize,
        quantity: usize,
        position: InsertPosition,
    },
    #[serde(rename_all = "camelCase")]
    RemoveColumnsRows {
        sheet_id: SheetId,
        dimension: Dimension,
        elements: Vec<usize>,
    },
    /// Merge zones. `force` accepts dropping content outside the top-left
    /// cell of each zone.
    #[serde(rename_all = "camelCase")]
    AddMerge {
        sheet_id: SheetId,
        target: Vec<Zone>,
        #[serde(default)]
        force: bool,
    },
    #[serde(rename_all = "camelCase")]
    RemoveMerge { sheet_id: SheetId, target: Vec<Zone> },
    /// Replace all merges of a sheet. Produced by undo of structural changes.
    #[serde(rename_all = "camelCase")]
    SetMerges { sheet_id: SheetId, merges: Vec<Zone> },
    #[serde(rename_all = "camelCase")]
    CreateSheet {
        sheet_id: SheetId,
        name: String,
        #[serde(default)]
        position: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteSheet { sheet_id: SheetId },
    /// Copy `sheet_id` as `sheet_id_to`. Without a name the copy is called
    /// `Copy of <name>`.
    #[serde(rename_all = "camelCase")]
    DuplicateSheet {
        sheet_id: SheetId,
        sheet_id_to: SheetId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RenameSheet { sheet_id: SheetId, name: String },
    /// Drop rows of `target` repeating the values of an earlier row in
    /// `columns`, moving the remaining rows up.
    #[serde(rename_all = "camelCase")]
    RemoveDuplicates {
        sheet_id: SheetId,
        target: Zone,
        columns: Vec<usize>,
        #[serde(default)]
        has_header: bool,
    },
    RequestUndo,
    RequestRedo,
}

/// Discriminant of a [`Command`], used to key inverse generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    UpdateCell,
    ClearCells,
    AddColumnsRows,
    RemoveColumnsRows,
    AddMerge,
    RemoveMerge,
    SetMerges,
    CreateSheet,
    DeleteSheet,
    DuplicateSheet,
    RenameSheet,
    RemoveDuplicates,
    RequestUndo,
    RequestRedo,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::UpdateCell { .. } => CommandKind::UpdateCell,
            Command::ClearCells { .. } => CommandKind::ClearCells,
            Command::AddColumnsRows { .. } => CommandKind::AddColumnsRows,
            Command::RemoveColumnsRows { .. } => CommandKind::RemoveColumnsRows,
            Command::AddMerge { .. } => CommandKind::AddMerge,
            Command::RemoveMerge { .. } => CommandKind::RemoveMerge,
            Command::SetMerges { .. } => CommandKind::SetMerges,
            Command::CreateSheet { .. } => CommandKind::CreateSheet,
            Command::DeleteSheet { .. } => CommandKind::DeleteSheet,
            Command::DuplicateSheet { .. } => CommandKind::DuplicateSheet,
            Command::RenameSheet { .. } => CommandKind::RenameSheet,
            Command::RemoveDuplicates { .. } => CommandKind::RemoveDuplicates,
            Command::RequestUndo => CommandKind::RequestUndo,
            Command::RequestRedo => CommandKind::RequestRedo,
        }
    }

    /// Undo/redo requests act on history instead of the workbook.
    pub fn is_history_request(&self) -> bool {
        matches!(self, Command::RequestUndo | Command::RequestRedo)
    }

    /// Shorthand for a content-only cell update.
    pub fn update_content(sheet_id: SheetId, row: usize, col: usize, content: impl Into<String>) -> Self {
        Command::UpdateCell {
            sheet_id,
            col,
            row,
            content: Some(content.into()),
            style: None,
            format: None,
        }
    }
}

/// Why a command was refused. Nothing is mutated when any reason is
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelledReason {
    InvalidSheetId,
    TargetOutOfSheet,
    InvalidZone,
    MergeIsDestructive,
    MergeOverlap,
    InvalidMerge,
    DuplicatedSheetName,
    DuplicatedSheetId,
    InvalidSheetName,
    NotEnoughSheets,
    NotEnoughElements,
    InvalidQuantity,
    EmptyUndoStack,
    EmptyRedoStack,
    NoDuplicateColumns,
    /// Undo/redo requests cannot be part of a batch
    NotBatchable,
}

/// Outcome of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub is_successful: bool,
    pub reasons: Vec<CancelledReason>,
}

impl DispatchResult {
    pub fn success() -> Self {
        Self {
            is_successful: true,
            reasons: Vec::new(),
        }
    }

    pub fn cancelled(reasons: Vec<CancelledReason>) -> Self {
        Self {
            is_successful: false,
            reasons,
        }
    }

    /// True if the command was refused for `reason`.
    pub fn is_cancelled_because(&self, reason: CancelledReason) -> bool {
        !self.is_successful && self.reasons.contains(&reason)
    }
}
