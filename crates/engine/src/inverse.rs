//! Inverse commands for undo.
//!
//! A generator reads the workbook *before* its command is applied and
//! returns the commands that bring it back. Generators never mutate.

use rustc_hash::FxHashMap;

use crate::cell::{Cell, Style};
use crate::cell_id::{CellId, SheetId};
use crate::commands::{Command, CommandKind, InsertPosition};
use crate::formula::references::SheetTarget;
use crate::workbook::Workbook;
use crate::zone::{Dimension, Zone};

pub type InverseFn = fn(&Command, &Workbook) -> Vec<Command>;

/// Inverse generators keyed by command kind.
pub struct InverseRegistry {
    generators: FxHashMap<CommandKind, InverseFn>,
}

impl Default for InverseRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl InverseRegistry {
    /// Registry without any generator.
    pub fn new() -> Self {
        Self {
            generators: FxHashMap::default(),
        }
    }

    /// Registry covering every workbook command.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CommandKind::UpdateCell, inverse_update_cell);
        registry.register(CommandKind::ClearCells, inverse_clear_cells);
        registry.register(CommandKind::AddColumnsRows, inverse_add_columns_rows);
        registry.register(CommandKind::RemoveColumnsRows, inverse_remove_columns_rows);
        registry.register(CommandKind::AddMerge, inverse_add_merge);
        registry.register(CommandKind::RemoveMerge, inverse_remove_merge);
        registry.register(CommandKind::SetMerges, inverse_set_merges);
        registry.register(CommandKind::CreateSheet, inverse_create_sheet);
        registry.register(CommandKind::DeleteSheet, inverse_delete_sheet);
        registry.register(CommandKind::DuplicateSheet, inverse_duplicate_sheet);
        registry.register(CommandKind::RenameSheet, inverse_rename_sheet);
        registry.register(CommandKind::RemoveDuplicates, inverse_remove_duplicates);
        registry
    }

    pub fn register(&mut self, kind: CommandKind, generator: InverseFn) {
        self.generators.insert(kind, generator);
    }

    pub fn is_registered(&self, kind: CommandKind) -> bool {
        self.generators.contains_key(&kind)
    }

    /// Commands undoing `command` against the current (pre-command) state.
    ///
    /// A kind without a generator is treated as its own inverse, which only
    /// holds for self-inverse commands; the fallback is logged.
    pub fn inverse_of(&self, command: &Command, workbook: &Workbook) -> Vec<Command> {
        match self.generators.get(&command.kind()) {
            Some(generator) => generator(command, workbook),
            None => {
                log::warn!(
                    "no inverse registered for {:?}, using the command itself",
                    command.kind()
                );
                vec![command.clone()]
            }
        }
    }
}

/// Full restore of one position: content, style and format.
fn restore_cell(sheet_id: &SheetId, row: usize, col: usize, cell: Option<&Cell>) -> Command {
    Command::UpdateCell {
        sheet_id: sheet_id.clone(),
        col,
        row,
        content: Some(cell.map(|c| c.text().to_string()).unwrap_or_default()),
        style: Some(cell.and_then(|c| c.style.clone()).unwrap_or_default()),
        format: Some(cell.and_then(|c| c.format.clone()).unwrap_or_default()),
    }
}

fn restore_zone(workbook: &Workbook, sheet_id: &SheetId, zone: &Zone) -> Vec<Command> {
    let Some(sheet) = workbook.sheet(sheet_id) else {
        return Vec::new();
    };
    sheet
        .cells_in_zone(zone)
        .into_iter()
        .map(|(row, col)| restore_cell(sheet_id, row, col, sheet.cell(row, col)))
        .collect()
}

/// Content restore of every formula that references `sheet_id`, undoing
/// the reference rewrites of a structural change.
fn restore_referencing_formulas(workbook: &Workbook, sheet_id: &SheetId) -> Vec<Command> {
    let Some(target_name) = workbook.sheet(sheet_id).map(|s| s.name.as_str()) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for sheet in workbook.sheets() {
        let mut positions: Vec<(usize, usize)> = sheet
            .cells_iter()
            .filter(|(_, cell)| {
                cell.formula().is_some_and(|f| {
                    f.dependencies.iter().any(|dep| match &dep.sheet {
                        SheetTarget::Current => &sheet.id == sheet_id,
                        SheetTarget::Named(name) => name.eq_ignore_ascii_case(target_name),
                    })
                })
            })
            .map(|(pos, _)| *pos)
            .collect();
        positions.sort_unstable();
        for (row, col) in positions {
            let text = sheet.cell(row, col).map(|c| c.text().to_string()).unwrap_or_default();
            out.push(Command::update_content(sheet.id.clone(), row, col, text));
        }
    }
    out
}

fn inverse_update_cell(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::UpdateCell {
        sheet_id,
        col,
        row,
        content,
        style,
        format,
    } = command
    else {
        return Vec::new();
    };
    let cell = workbook.cell(&CellId::new(sheet_id.clone(), *row, *col));
    vec![Command::UpdateCell {
        sheet_id: sheet_id.clone(),
        col: *col,
        row: *row,
        content: content
            .as_ref()
            .map(|_| cell.map(|c| c.text().to_string()).unwrap_or_default()),
        style: style
            .as_ref()
            .map(|_| cell.and_then(|c| c.style.clone()).unwrap_or_else(Style::default)),
        format: format
            .as_ref()
            .map(|_| cell.and_then(|c| c.format.clone()).unwrap_or_default()),
    }]
}

fn inverse_clear_cells(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::ClearCells { sheet_id, target } = command else {
        return Vec::new();
    };
    target
        .iter()
        .flat_map(|zone| restore_zone(workbook, sheet_id, zone))
        .collect()
}

fn inverse_add_columns_rows(command: &Command, _: &Workbook) -> Vec<Command> {
    let Command::AddColumnsRows {
        sheet_id,
        dimension,
        base,
        quantity,
        position,
    } = command
    else {
        return Vec::new();
    };
    let at = match position {
        InsertPosition::Before => *base,
        InsertPosition::After => base + 1,
    };
    vec![Command::RemoveColumnsRows {
        sheet_id: sheet_id.clone(),
        dimension: *dimension,
        elements: (at..at + quantity).collect(),
    }]
}

fn inverse_remove_columns_rows(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::RemoveColumnsRows {
        sheet_id,
        dimension,
        elements,
    } = command
    else {
        return Vec::new();
    };
    let Some(sheet) = workbook.sheet(sheet_id) else {
        return Vec::new();
    };
    let mut elements = elements.clone();
    elements.sort_unstable();
    elements.dedup();

    // Re-insert each run of consecutive elements, lowest first
    let mut out = Vec::new();
    let mut i = 0;
    while i < elements.len() {
        let start = elements[i];
        let mut len = 1;
        while i + len < elements.len() && elements[i + len] == start + len {
            len += 1;
        }
        let (base, position) = if start > 0 {
            (start - 1, InsertPosition::After)
        } else {
            (0, InsertPosition::Before)
        };
        out.push(Command::AddColumnsRows {
            sheet_id: sheet_id.clone(),
            dimension: *dimension,
            base,
            quantity: len,
            position,
        });
        i += len;
    }

    out.push(Command::SetMerges {
        sheet_id: sheet_id.clone(),
        merges: sheet.merges().to_vec(),
    });
    for &index in &elements {
        let zone = match dimension {
            Dimension::Row => Zone::new(index, 0, index, sheet.cols.saturating_sub(1)),
            Dimension::Col => Zone::new(0, index, sheet.rows.saturating_sub(1), index),
        };
        out.extend(restore_zone(workbook, sheet_id, &zone));
    }
    out.extend(restore_referencing_formulas(workbook, sheet_id));
    out
}

fn inverse_add_merge(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::AddMerge { sheet_id, target, .. } = command else {
        return Vec::new();
    };
    let mut out = vec![Command::RemoveMerge {
        sheet_id: sheet_id.clone(),
        target: target.clone(),
    }];
    for zone in target {
        out.extend(
            restore_zone(workbook, sheet_id, zone)
                .into_iter()
                .filter(|c| !matches!(c, Command::UpdateCell { row, col, .. } if (*row, *col) == (zone.top, zone.left))),
        );
    }
    out
}

fn inverse_remove_merge(command: &Command, _: &Workbook) -> Vec<Command> {
    let Command::RemoveMerge { sheet_id, target } = command else {
        return Vec::new();
    };
    vec![Command::AddMerge {
        sheet_id: sheet_id.clone(),
        target: target.clone(),
        force: true,
    }]
}

fn inverse_set_merges(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::SetMerges { sheet_id, .. } = command else {
        return Vec::new();
    };
    let merges = workbook
        .sheet(sheet_id)
        .map(|s| s.merges().to_vec())
        .unwrap_or_default();
    vec![Command::SetMerges {
        sheet_id: sheet_id.clone(),
        merges,
    }]
}

fn inverse_create_sheet(command: &Command, _: &Workbook) -> Vec<Command> {
    let Command::CreateSheet { sheet_id, .. } = command else {
        return Vec::new();
    };
    vec![Command::DeleteSheet {
        sheet_id: sheet_id.clone(),
    }]
}

fn inverse_delete_sheet(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::DeleteSheet { sheet_id } = command else {
        return Vec::new();
    };
    let (Some(sheet), Some(position)) = (workbook.sheet(sheet_id), workbook.sheet_index(sheet_id)) else {
        return Vec::new();
    };
    let mut out = vec![
        Command::CreateSheet {
            sheet_id: sheet_id.clone(),
            name: sheet.name.clone(),
            position,
            rows: Some(sheet.rows),
            cols: Some(sheet.cols),
        },
        Command::SetMerges {
            sheet_id: sheet_id.clone(),
            merges: sheet.merges().to_vec(),
        },
    ];
    let mut positions: Vec<&(usize, usize)> = sheet.cells_iter().map(|(pos, _)| pos).collect();
    positions.sort_unstable();
    out.extend(
        positions
            .into_iter()
            .map(|&(row, col)| restore_cell(sheet_id, row, col, sheet.cell(row, col))),
    );
    out
}

fn inverse_duplicate_sheet(command: &Command, _: &Workbook) -> Vec<Command> {
    let Command::DuplicateSheet { sheet_id_to, .. } = command else {
        return Vec::new();
    };
    vec![Command::DeleteSheet {
        sheet_id: sheet_id_to.clone(),
    }]
}

fn inverse_rename_sheet(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::RenameSheet { sheet_id, .. } = command else {
        return Vec::new();
    };
    match workbook.sheet(sheet_id) {
        Some(sheet) => vec![Command::RenameSheet {
            sheet_id: sheet_id.clone(),
            name: sheet.name.clone(),
        }],
        None => Vec::new(),
    }
}

fn inverse_remove_duplicates(command: &Command, workbook: &Workbook) -> Vec<Command> {
    let Command::RemoveDuplicates { sheet_id, target, .. } = command else {
        return Vec::new();
    };
    let mut out = vec![Command::ClearCells {
        sheet_id: sheet_id.clone(),
        target: vec![*target],
    }];
    out.extend(restore_zone(workbook, sheet_id, target));
    out.extend(restore_referencing_formulas(workbook, sheet_id));
    out
}
