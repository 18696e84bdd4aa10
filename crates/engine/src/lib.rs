pub mod cell;
pub mod cell_id;
pub mod collaboration;
pub mod commands;
pub mod dep_graph;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod format;
pub mod formula;
pub mod history;
pub mod inverse;
pub mod jobs;
pub mod model;
pub mod persistence;
pub mod recalc;
pub mod services;
pub mod settings;
pub mod sheet;
pub mod spreading;
pub mod workbook;
pub mod zone;

pub use cell::{EvaluatedCell, Style};
pub use cell_id::{CellId, SheetId};
pub use commands::{CancelledReason, Command, DispatchResult, InsertPosition};
pub use error::{EngineError, Result};
pub use formula::value::{CellError, ErrorKind, Value};
pub use model::Model;
pub use services::Services;
pub use settings::{EngineSettings, Locale};
pub use zone::{Dimension, Zone};
