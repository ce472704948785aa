//! # smap
//!
//! Source maps (SMAP, JSR-045) record which source file and line each line of
//! a generated class came from. Inlining copies a callee's body into the
//! caller, so the caller's SMAP has to absorb the callee's mappings at fresh
//! destination lines.
//!
//! ## Core Components
//!
//! - **Models**: range mappings, per-file mappings and whole SMAPs
//! - **Parser / Writer**: the textual SMAP encoding in both directions
//! - **Composition**: building a class SMAP while inlining callees
//! - **Binder**: pairing a method's line-number markers with their intervals
//! - **Retrace**: rewriting stack traces through a class SMAP

/// Line-number binding for generated method bodies
pub mod binder;
/// Command-line interface definitions
pub mod cli;
/// SMAP composition across inlining
pub mod compose;
/// Environment-driven configuration
pub mod config;
/// Error handling with context
pub mod error;
/// Data models for line mappings
pub mod models;
/// Textual SMAP parsing
pub mod parser;
/// Stack-trace remapping
pub mod retrace;
/// Interval search helpers
pub mod utils;
/// Textual SMAP output
pub mod writer;

pub use compose::SmapBuilder;
pub use error::{Result, SmapError};
pub use models::{FileMapping, RangeMapping, Smap, SourcePosition};
pub use parser::{SmapParser, parse};
pub use writer::{SmapWriter, serialize};
