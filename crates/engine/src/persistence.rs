//! JSON workbook format.
//!
//! Cells are keyed by XC address (`"B3"`) and merges written as XC ranges;
//! styles and number formats are stored once in workbook-level tables and
//! referenced by id. Everything is zero-based once loaded.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::Style;
use crate::cell_id::{CellId, SheetId};
use crate::error::{EngineError, Result};
use crate::model::Model;
use crate::services::Services;
use crate::settings::EngineSettings;
use crate::sheet::Sheet;
use crate::zone::{to_cartesian, to_xc, to_zone, zone_to_xc};

/// Current format version. Newer files are refused.
pub const WORKBOOK_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookData {
    pub version: u32,
    pub sheets: Vec<SheetData>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<u32, Style>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub formats: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetData {
    pub id: String,
    pub name: String,
    pub col_number: usize,
    pub row_number: usize,
    #[serde(default)]
    pub cells: BTreeMap<String, CellData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<u32>,
}

/// Assigns ids to distinct values in first-seen order.
struct Interner<T> {
    ids: FxHashMap<T, u32>,
    table: BTreeMap<u32, T>,
}

impl<T: Clone + Eq + std::hash::Hash> Interner<T> {
    fn new() -> Self {
        Self {
            ids: FxHashMap::default(),
            table: BTreeMap::new(),
        }
    }

    fn intern(&mut self, value: &T) -> u32 {
        if let Some(&id) = self.ids.get(value) {
            return id;
        }
        let id = self.table.len() as u32 + 1;
        self.ids.insert(value.clone(), id);
        self.table.insert(id, value.clone());
        id
    }
}

impl WorkbookData {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Model {
    /// Load a model from its JSON export and evaluate every formula.
    pub fn from_json(text: &str, settings: EngineSettings, services: Services) -> Result<Self> {
        let data = WorkbookData::from_json(text)?;
        Self::from_data(data, settings, services)
    }

    pub fn from_data(data: WorkbookData, settings: EngineSettings, services: Services) -> Result<Self> {
        if data.version > WORKBOOK_VERSION {
            return Err(EngineError::UnsupportedVersion {
                found: data.version,
                supported: WORKBOOK_VERSION,
            });
        }
        if data.sheets.is_empty() {
            return Err(EngineError::InvalidWorkbook("no sheets".to_string()));
        }
        let mut model = Model::empty(settings, services);
        for sheet in &data.sheets {
            model.load_sheet(sheet, &data)?;
        }
        log::info!("loaded workbook with {} sheets", data.sheets.len());
        model.recompute();
        Ok(model)
    }

    fn load_sheet(&mut self, data: &SheetData, workbook: &WorkbookData) -> Result<()> {
        let id = SheetId::new(data.id.clone());
        if self.workbook().sheet(&id).is_some() {
            return Err(EngineError::InvalidWorkbook(format!("duplicate sheet id {}", data.id)));
        }
        if !self.workbook().is_name_available(&data.name, None) {
            return Err(EngineError::InvalidWorkbook(format!("duplicate sheet name {}", data.name)));
        }
        if data.row_number == 0 || data.col_number == 0 {
            return Err(EngineError::InvalidWorkbook(format!("sheet {} has no cells", data.name)));
        }
        let mut sheet = Sheet::new(id.clone(), data.name.clone(), data.row_number, data.col_number);
        let mut merges = Vec::with_capacity(data.merges.len());
        for xc in &data.merges {
            merges.push(to_zone(xc)?);
        }
        sheet.set_merges(merges);
        self.workbook_mut().push_sheet(sheet);

        for (xc, cell) in &data.cells {
            let (col, row) = to_cartesian(xc)?;
            if row >= data.row_number || col >= data.col_number {
                return Err(EngineError::InvalidWorkbook(format!(
                    "cell {} outside sheet {}",
                    xc, data.name
                )));
            }
            let position = CellId::new(id.clone(), row, col);
            if !cell.content.is_empty() {
                self.workbook_mut().set_cell_content(&position, &cell.content);
            }
            if let Some(style_id) = cell.style {
                let style = workbook.styles.get(&style_id).ok_or_else(|| {
                    EngineError::InvalidWorkbook(format!("unknown style {} in {}", style_id, xc))
                })?;
                self.workbook_mut().set_cell_style(&position, Some(style.clone()));
            }
            if let Some(format_id) = cell.format {
                let format = workbook.formats.get(&format_id).ok_or_else(|| {
                    EngineError::InvalidWorkbook(format!("unknown format {} in {}", format_id, xc))
                })?;
                self.workbook_mut().set_cell_format(&position, Some(format.clone()));
            }
        }
        Ok(())
    }

    /// Snapshot of the workbook in the persisted format.
    pub fn export_data(&self) -> WorkbookData {
        let mut styles = Interner::new();
        let mut formats = Interner::new();
        let sheets = self
            .workbook()
            .sheets()
            .iter()
            .map(|sheet| {
                let mut positions: Vec<&(usize, usize)> = sheet.cells_iter().map(|(p, _)| p).collect();
                positions.sort_unstable();
                let cells = positions
                    .into_iter()
                    .filter_map(|&(row, col)| {
                        let cell = sheet.cell(row, col)?;
                        Some((
                            to_xc(col, row),
                            CellData {
                                content: cell.text().to_string(),
                                style: cell.style.as_ref().map(|s| styles.intern(s)),
                                format: cell.format.as_ref().map(|f| formats.intern(f)),
                            },
                        ))
                    })
                    .collect();
                SheetData {
                    id: sheet.id.as_str().to_string(),
                    name: sheet.name.clone(),
                    col_number: sheet.cols,
                    row_number: sheet.rows,
                    cells,
                    merges: sheet.merges().iter().map(zone_to_xc).collect(),
                }
            })
            .collect();
        WorkbookData {
            version: WORKBOOK_VERSION,
            sheets,
            styles: styles.table,
            formats: formats.table,
        }
    }

    pub fn export_json(&self) -> Result<String> {
        self.export_data().to_json()
    }
}
