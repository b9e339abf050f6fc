//! The unified intermediate representation every conversion routes through.

pub mod config;
pub mod dsl;
pub mod invariants;
pub mod node;
pub mod template;
pub mod visit;

pub use config::*;
pub use dsl::*;
pub use node::*;
