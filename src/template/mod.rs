mod exec;
pub mod funcs;
mod lexer;
pub mod parse;
pub mod set;
mod value;
pub mod vars;

pub use funcs::FuncRegistry;
pub use set::TemplateSet;
pub use vars::{extract_variables, Kind, VariableDescriptor};
