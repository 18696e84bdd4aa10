// Formula tokenizing, parsing, compilation and the function table

pub mod compiler;
pub mod functions;
pub mod parser;
pub mod references;
pub mod tokenizer;
pub mod value;

pub use compiler::{CompiledFormula, FormulaCompiler, FormulaCell, FormulaContext};
pub use functions::{FunctionDefinition, FunctionRegistry, ParamType};
pub use references::{RangeRef, SheetResolver};
pub use value::{CellError, ErrorKind, EvalResult, Value};
