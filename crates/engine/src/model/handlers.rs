//! Applying validated commands to the workbook.

use rustc_hash::FxHashMap;

use super::{Effect, Model};
use crate::cell_id::CellId;
use crate::commands::{Command, InsertPosition};
use crate::formula::value::Value;

impl Model {
    /// Apply a command without validation, recording what must be
    /// re-evaluated. History requests are not handled here.
    pub(crate) fn apply(&mut self, command: &Command, effect: &mut Effect) {
        self.events.push(crate::events::ModelEvent::CommandApplied { kind: command.kind() });
        match command {
            Command::UpdateCell {
                sheet_id,
                col,
                row,
                content,
                style,
                format,
            } => {
                let id = CellId::new(sheet_id.clone(), *row, *col);
                if let Some(content) = content {
                    self.workbook.set_cell_content(&id, content);
                }
                if let Some(style) = style {
                    self.workbook.set_cell_style(&id, Some(style.clone()));
                }
                if let Some(format) = format {
                    self.workbook.set_cell_format(&id, Some(format.clone()));
                }
                effect.changed.push(id);
            }
            Command::ClearCells { sheet_id, target } => {
                let Some((rows, cols)) = self.workbook.sheet(sheet_id).map(|s| (s.rows, s.cols)) else {
                    return;
                };
                for zone in target.iter().filter_map(|z| z.clip_to_sheet(rows, cols)) {
                    let positions = self
                        .workbook
                        .sheet(sheet_id)
                        .map(|s| s.cells_in_zone(&zone))
                        .unwrap_or_default();
                    for (row, col) in positions {
                        let id = CellId::new(sheet_id.clone(), row, col);
                        self.workbook.clear_cell(&id);
                        effect.changed.push(id);
                    }
                }
            }
            Command::AddColumnsRows {
                sheet_id,
                dimension,
                base,
                quantity,
                position,
            } => {
                let at = match position {
                    InsertPosition::Before => *base,
                    InsertPosition::After => base + 1,
                };
                self.workbook.insert_dimension(sheet_id, *dimension, at, *quantity);
                effect.structural = true;
            }
            Command::RemoveColumnsRows {
                sheet_id,
                dimension,
                elements,
            } => {
                let mut elements = elements.clone();
                elements.sort_unstable();
                elements.dedup();
                self.workbook.remove_dimension(sheet_id, *dimension, &elements);
                effect.structural = true;
            }
            Command::AddMerge { sheet_id, target, .. } => {
                for zone in target {
                    self.workbook.add_merge(sheet_id, *zone);
                }
                effect.structural = true;
            }
            Command::RemoveMerge { sheet_id, target } => {
                for zone in target {
                    self.workbook.remove_merge(sheet_id, zone);
                }
                effect.structural = true;
            }
            Command::SetMerges { sheet_id, merges } => {
                self.workbook.set_merges(sheet_id, merges.clone());
                effect.structural = true;
            }
            Command::CreateSheet {
                sheet_id,
                name,
                position,
                rows,
                cols,
            } => {
                let rows = rows.unwrap_or(self.settings.default_rows);
                let cols = cols.unwrap_or(self.settings.default_cols);
                let index = self.workbook.create_sheet(sheet_id.clone(), name, *position, rows, cols);
                log::info!("created sheet {} ({}) at {}", name, sheet_id, index);
                effect.structural = true;
            }
            Command::DeleteSheet { sheet_id } => {
                if let Some(sheet) = self.workbook.delete_sheet(sheet_id) {
                    log::info!("deleted sheet {} ({})", sheet.name, sheet_id);
                }
                effect.structural = true;
            }
            Command::DuplicateSheet {
                sheet_id,
                sheet_id_to,
                name,
            } => {
                let Some(source_name) = self.workbook.sheet(sheet_id).map(|s| s.name.clone()) else {
                    return;
                };
                let name = match name {
                    Some(name) => name.clone(),
                    None => self.workbook.unique_sheet_name(&format!("Copy of {}", source_name)),
                };
                if self
                    .workbook
                    .duplicate_sheet(sheet_id, sheet_id_to.clone(), &name)
                    .is_some()
                {
                    log::info!("duplicated sheet {} as {} ({})", source_name, name, sheet_id_to);
                }
                effect.structural = true;
            }
            Command::RenameSheet { sheet_id, name } => {
                self.workbook.rename_sheet(sheet_id, name);
                effect.structural = true;
            }
            Command::RemoveDuplicates {
                sheet_id,
                target,
                columns,
                has_header,
            } => {
                // Duplicate detection reads evaluated values
                self.refresh(std::mem::take(effect));
                let Some(zone) = self
                    .workbook
                    .sheet(sheet_id)
                    .and_then(|s| target.clip_to_sheet(s.rows, s.cols))
                else {
                    return;
                };
                let mut values: FxHashMap<(usize, usize), Value> = FxHashMap::default();
                for row in zone.top..=zone.bottom {
                    for &col in columns {
                        let id = CellId::new(sheet_id.clone(), row, col);
                        values.insert((row, col), self.evaluator.value(&self.workbook, &id));
                    }
                }
                let removed = self.workbook.remove_duplicates(sheet_id, zone, columns, *has_header, |row, col| {
                    values.get(&(row, col)).cloned().unwrap_or_default()
                });
                log::debug!("removed {} duplicate rows from {}", removed, sheet_id);
                effect.structural = true;
            }
            Command::RequestUndo | Command::RequestRedo => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Style;
    use crate::cell_id::SheetId;
    use crate::commands::CancelledReason;
    use crate::services::{SequentialUidGenerator, Services};
    use crate::settings::EngineSettings;
    use crate::zone::{Dimension, Zone};

    fn model() -> (Model, SheetId) {
        let model = Model::with_settings(
            EngineSettings::default(),
            Services::new(Box::new(SequentialUidGenerator::new("id"))),
        );
        let sheet = model.get_sheet_ids()[0].clone();
        (model, sheet)
    }

    fn set(model: &mut Model, sheet: &SheetId, row: usize, col: usize, text: &str) {
        assert!(model
            .dispatch(Command::update_content(sheet.clone(), row, col, text))
            .is_successful);
    }

    fn number(model: &Model, sheet: &SheetId, row: usize, col: usize) -> Value {
        model.get_evaluated_cell(sheet, row, col).value
    }

    #[test]
    fn test_style_and_format_update() {
        let (mut model, s) = model();
        let style = Style {
            bold: true,
            ..Style::default()
        };
        model.dispatch(Command::UpdateCell {
            sheet_id: s.clone(),
            col: 0,
            row: 0,
            content: Some("0.5".into()),
            style: Some(style.clone()),
            format: Some("0.00%".into()),
        });
        let cell = model.get_cell(&s, 0, 0).unwrap();
        assert_eq!(cell.style.as_ref(), Some(&style));
        assert_eq!(model.get_evaluated_cell(&s, 0, 0).formatted_value, "50.00%");

        model.dispatch(Command::RequestUndo);
        assert!(model.get_cell(&s, 0, 0).is_none());
    }

    #[test]
    fn test_clear_cells_and_undo() {
        let (mut model, s) = model();
        set(&mut model, &s, 0, 0, "3");
        set(&mut model, &s, 1, 0, "=A1*2");
        model.dispatch(Command::ClearCells {
            sheet_id: s.clone(),
            target: vec![Zone::new(0, 0, 0, 0)],
        });
        assert_eq!(number(&model, &s, 1, 0), Value::Number(0.0));
        model.dispatch(Command::RequestUndo);
        assert_eq!(number(&model, &s, 1, 0), Value::Number(6.0));
    }

    #[test]
    fn test_insert_rows_then_undo_restores_references() {
        let (mut model, s) = model();
        set(&mut model, &s, 2, 0, "7");
        set(&mut model, &s, 0, 1, "=A3");
        model.dispatch(Command::AddColumnsRows {
            sheet_id: s.clone(),
            dimension: Dimension::Row,
            base: 0,
            quantity: 2,
            position: InsertPosition::After,
        });
        assert_eq!(model.get_cell_content(&s, 0, 1), "=A5");
        assert_eq!(number(&model, &s, 0, 1), Value::Number(7.0));

        model.dispatch(Command::RequestUndo);
        assert_eq!(model.get_cell_content(&s, 0, 1), "=A3");
        assert_eq!(number(&model, &s, 0, 1), Value::Number(7.0));
    }

    #[test]
    fn test_remove_rows_then_undo_restores_ref_errors() {
        let (mut model, s) = model();
        set(&mut model, &s, 3, 0, "4");
        set(&mut model, &s, 0, 1, "=A4*2");
        model.dispatch(Command::RemoveColumnsRows {
            sheet_id: s.clone(),
            dimension: Dimension::Row,
            elements: vec![3],
        });
        assert_eq!(model.get_cell_content(&s, 0, 1), "=#REF*2");
        assert!(number(&model, &s, 0, 1).is_error());

        model.dispatch(Command::RequestUndo);
        assert_eq!(model.get_cell_content(&s, 0, 1), "=A4*2");
        assert_eq!(number(&model, &s, 0, 1), Value::Number(8.0));
        assert_eq!(model.workbook().sheet(&s).map(|sh| sh.rows), Some(100));
    }

    #[test]
    fn test_forced_merge_undo_restores_content() {
        let (mut model, s) = model();
        set(&mut model, &s, 0, 1, "lost");
        model.dispatch(Command::AddMerge {
            sheet_id: s.clone(),
            target: vec![Zone::new(0, 0, 1, 1)],
            force: true,
        });
        assert!(model.get_cell(&s, 0, 1).is_none());
        assert_eq!(model.get_merges(&s), vec![Zone::new(0, 0, 1, 1)]);

        model.dispatch(Command::RequestUndo);
        assert_eq!(model.get_cell_content(&s, 0, 1), "lost");
        assert!(model.get_merges(&s).is_empty());
    }

    #[test]
    fn test_sheet_lifecycle_heals_references() {
        let (mut model, s) = model();
        set(&mut model, &s, 0, 0, "=Data!A1+1");
        assert!(number(&model, &s, 0, 0).is_error());

        let data = SheetId::new("data");
        model.dispatch(Command::CreateSheet {
            sheet_id: data.clone(),
            name: "Data".into(),
            position: 1,
            rows: None,
            cols: None,
        });
        set(&mut model, &data, 0, 0, "41");
        assert_eq!(number(&model, &s, 0, 0), Value::Number(42.0));

        model.dispatch(Command::DeleteSheet { sheet_id: data.clone() });
        assert!(number(&model, &s, 0, 0).is_error());

        model.dispatch(Command::RequestUndo);
        assert_eq!(number(&model, &s, 0, 0), Value::Number(42.0));
        assert_eq!(model.get_sheet_name(&data), Some("Data"));
    }

    #[test]
    fn test_duplicate_and_rename_sheet() {
        let (mut model, s) = model();
        set(&mut model, &s, 0, 0, "5");
        let copy = SheetId::new("copy");
        model.dispatch(Command::DuplicateSheet {
            sheet_id: s.clone(),
            sheet_id_to: copy.clone(),
            name: None,
        });
        assert_eq!(model.get_sheet_name(&copy), Some("Copy of Sheet1"));
        assert_eq!(number(&model, &copy, 0, 0), Value::Number(5.0));

        set(&mut model, &s, 1, 0, "='Copy of Sheet1'!A1*2");
        model.dispatch(Command::RenameSheet {
            sheet_id: copy.clone(),
            name: "Backup".into(),
        });
        assert_eq!(model.get_cell_content(&s, 1, 0), "=Backup!A1*2");
        assert_eq!(number(&model, &s, 1, 0), Value::Number(10.0));

        let result = model.dispatch(Command::RenameSheet {
            sheet_id: copy,
            name: "sheet1".into(),
        });
        assert!(result.is_cancelled_because(CancelledReason::DuplicatedSheetName));
    }
}
