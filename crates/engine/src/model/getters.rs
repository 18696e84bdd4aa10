//! Read access to the model.

use rustc_hash::FxHashSet;

use super::Model;
use crate::cell::{Cell, EvaluatedCell};
use crate::cell_id::{CellId, SheetId};
use crate::error::Result;
use crate::format::format_value;
use crate::formula::references::RangeRef;
use crate::formula::tokenizer::{canonicalize_formula, localize_formula, Token};
use crate::formula::value::Value;
use crate::zone::{to_cartesian, Zone};

impl Model {
    pub fn get_sheet_ids(&self) -> Vec<SheetId> {
        self.workbook.sheet_ids()
    }

    pub fn get_sheet_name(&self, sheet: &SheetId) -> Option<&str> {
        self.workbook.sheet(sheet).map(|s| s.name.as_str())
    }

    pub fn get_merges(&self, sheet: &SheetId) -> Vec<Zone> {
        self.workbook
            .sheet(sheet)
            .map(|s| s.merges().to_vec())
            .unwrap_or_default()
    }

    pub fn get_cell(&self, sheet: &SheetId, row: usize, col: usize) -> Option<&Cell> {
        self.workbook.sheet(sheet)?.cell(row, col)
    }

    /// Content as the user would edit it, formulas in the display locale.
    pub fn get_cell_content(&self, sheet: &SheetId, row: usize, col: usize) -> String {
        self.get_cell(sheet, row, col)
            .map(|c| localize_formula(c.text(), &self.settings.locale))
            .unwrap_or_default()
    }

    /// Value and display text of a position. Positions covered by a spread
    /// use the number format of the spreading formula unless they have
    /// their own.
    pub fn get_evaluated_cell(&self, sheet: &SheetId, row: usize, col: usize) -> EvaluatedCell {
        let id = CellId::new(sheet.clone(), row, col);
        let value = self.evaluator.value(&self.workbook, &id);
        let format = self
            .workbook
            .cell(&id)
            .and_then(|c| c.format.clone())
            .or_else(|| {
                let source = self.evaluator.spread_source(&id)?;
                self.workbook.cell(&source).and_then(|c| c.format.clone())
            });
        let formatted = format_value(&value, format.as_deref(), &self.settings.locale);
        EvaluatedCell::new(value, formatted)
    }

    /// [`Model::get_evaluated_cell`] addressed in XC notation (`B3`).
    pub fn get_evaluated_cell_at(&self, sheet: &SheetId, xc: &str) -> Result<EvaluatedCell> {
        let (col, row) = to_cartesian(xc)?;
        Ok(self.get_evaluated_cell(sheet, row, col))
    }

    /// Evaluate formula text typed in the display locale without storing
    /// it. References are relative to `sheet`.
    pub fn evaluate_formula(&mut self, sheet: &SheetId, text: &str) -> Value {
        let text = if text.starts_with('=') {
            text.to_string()
        } else {
            format!("={}", text)
        };
        let canonical = canonicalize_formula(&text, &self.settings.locale);
        let formula = self.workbook.compile(&canonical);
        self.evaluator.evaluate_formula(self.env(), sheet, &formula)
    }

    /// Every position covered by the ranges, in order and without
    /// repetition. Ranges are XC text relative to `sheet`; ranges that do
    /// not resolve are skipped.
    pub fn get_cell_positions_in_ranges(&self, sheet: &SheetId, ranges: &[&str]) -> Vec<CellId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for text in ranges {
            let Ok(resolved) = RangeRef::parse(text).resolve(sheet, &self.workbook) else {
                continue;
            };
            for (row, col) in resolved.zone.positions() {
                let id = CellId::new(resolved.sheet.clone(), row, col);
                if seen.insert(id.clone()) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Tokens of a formula cell, for highlighting.
    pub fn get_cell_tokens(&self, sheet: &SheetId, row: usize, col: usize) -> Vec<Token> {
        self.get_cell(sheet, row, col)
            .and_then(Cell::formula)
            .map(|f| f.tokens.clone())
            .unwrap_or_default()
    }

    /// References read by a formula cell, in formula order.
    pub fn get_cell_dependencies(&self, sheet: &SheetId, row: usize, col: usize) -> Vec<RangeRef> {
        self.get_cell(sheet, row, col)
            .and_then(Cell::formula)
            .map(|f| f.dependencies.clone())
            .unwrap_or_default()
    }

    /// Formula cells that read a position directly, sorted.
    pub fn get_cell_dependents(&self, sheet: &SheetId, row: usize, col: usize) -> Vec<CellId> {
        let mut dependents = self
            .workbook
            .dep_graph()
            .dependents(&CellId::new(sheet.clone(), row, col));
        dependents.sort();
        dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::formula::tokenizer::TokenKind;
    use crate::services::{SequentialUidGenerator, Services};
    use crate::settings::{EngineSettings, Locale};

    fn model_with(locale: Locale) -> (Model, SheetId) {
        let settings = EngineSettings {
            locale,
            ..EngineSettings::default()
        };
        let model = Model::with_settings(settings, Services::new(Box::new(SequentialUidGenerator::new("id"))));
        let sheet = model.get_sheet_ids()[0].clone();
        (model, sheet)
    }

    #[test]
    fn test_positions_in_ranges() {
        let (model, s) = model_with(Locale::default());
        let positions = model.get_cell_positions_in_ranges(&s, &["A1:B2", "B2", "Nope!A1"]);
        let xcs: Vec<String> = positions.iter().map(|p| p.xc()).collect();
        assert_eq!(xcs, vec!["A1", "B1", "A2", "B2"]);
    }

    #[test]
    fn test_tokens_dependencies_dependents() {
        let (mut model, s) = model_with(Locale::default());
        model.dispatch(Command::update_content(s.clone(), 0, 2, "=SUM(A1:A3)+B1"));

        let tokens = model.get_cell_tokens(&s, 0, 2);
        assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::Reference).count(),
            2
        );
        let deps: Vec<String> = model
            .get_cell_dependencies(&s, 0, 2)
            .iter()
            .map(|r| r.to_xc())
            .collect();
        assert_eq!(deps, vec!["A1:A3", "B1"]);
        assert_eq!(
            model.get_cell_dependents(&s, 1, 0),
            vec![CellId::new(s.clone(), 0, 2)]
        );
    }

    #[test]
    fn test_evaluate_formula_without_storing() {
        let (mut model, s) = model_with(Locale::default());
        model.dispatch(Command::update_content(s.clone(), 0, 0, "4"));
        assert_eq!(model.evaluate_formula(&s, "=A1*2"), Value::Number(8.0));
        assert_eq!(model.evaluate_formula(&s, "A1+1"), Value::Number(5.0));
        assert!(model.get_cell(&s, 0, 1).is_none());
    }

    #[test]
    fn test_localized_content() {
        let (mut model, s) = model_with(Locale::comma_decimal());
        assert!(model.update_cell_localized(&s, 0, 0, "=ROUND(1,25;1)").is_successful);
        assert_eq!(model.get_cell(&s, 0, 0).map(|c| c.text()), Some("=ROUND(1.25,1)"));
        assert_eq!(model.get_cell_content(&s, 0, 0), "=ROUND(1,25;1)");
        assert_eq!(model.get_evaluated_cell(&s, 0, 0).value, Value::Number(1.3));
    }

    #[test]
    fn test_evaluated_cell_by_xc() {
        let (mut model, s) = model_with(Locale::default());
        model.dispatch(Command::update_content(s.clone(), 2, 1, "=1/0"));
        let cell = model.get_evaluated_cell_at(&s, "B3").unwrap();
        assert_eq!(cell.formatted_value, "#DIV/0");
        assert!(model.get_evaluated_cell_at(&s, "3B").is_err());
    }
}
