//! Coze: counter ids with reserved start and end ids, positional branch
//! ports, loop bodies nested inside the loop node. Exports may be zipped.

pub mod archive;
mod generator;
mod parser;
pub mod wire;

pub use generator::CozeGenerator;
pub use parser::CozeParser;
