//! Dify: timestamp ids, flat iteration bodies with one `iteration-start`
//! node, branches named by their own case and class ids.

mod generator;
mod parser;
pub mod wire;

pub use generator::DifyGenerator;
pub use parser::DifyParser;
