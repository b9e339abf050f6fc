//! iFlytek Spark agents: `<prefix>::<uuid>` ids, flat iteration bodies with
//! explicit loop start and end nodes, generated branch and intent ports.

mod generator;
mod parser;
pub mod wire;

pub use generator::IFlytekGenerator;
pub use parser::IFlytekParser;
