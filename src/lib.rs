//! # Kakehashi - Workflow DSL Converter
//!
//! **Kakehashi** converts AI-agent workflow definitions between iFlytek Spark,
//! Dify and Coze. Every conversion routes through one unified graph IR, so
//! each platform only needs a parser into the IR and a generator out of it.
//!
//! ## Core Workflow
//!
//! 1.  **Parse**: a platform parser reads the export into a checked
//!     [`UnifiedDsl`](ir::UnifiedDsl). Branch edges carry case and class ids,
//!     and platform loop boundary nodes are folded away.
//! 2.  **Annotate**: the generation orchestrator reconciles every node id
//!     for the target, maps branch and intent ports and lays out iteration
//!     bodies.
//! 3.  **Emit**: nodes and edges are emitted once from the IR plus those
//!     annotations, then classifier default edges are filled in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kakehashi::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = std::fs::read("agent.yml")?;
//!
//!     let converter = Converter::builder(Platform::Dify, Platform::Coze)
//!         .with_seed(7)
//!         .with_counter_base(100002)
//!         .build();
//!
//!     let coze = converter.convert(&source)?;
//!     std::fs::write("agent.coze.yaml", coze)?;
//!     Ok(())
//! }
//! ```
//!
//! The same seed (and, for Dify, the same timestamp base) reproduces the
//! same document byte for byte.

pub mod branch;
pub mod convert;
pub mod error;
pub mod generate;
pub mod ir;
pub mod iteration;
pub mod platform;
pub mod platforms;
pub mod prelude;
pub mod reconcile;
