//! MET loader library
//!
//! Loads the text output of the MET verification tools into a METviewer
//! MySQL schema.
//!
//! This library provides tools for:
//! - Classifying and parsing stat, VSDB, MODE, MTD and TCST files
//! - Rewriting VSDB records and MTD revisions into the canonical row shapes
//! - De-duplicating data files and header records with dense ids
//! - Writing line data and variable-length companion tables in one transaction
//! - Reshaping stat line types into long form

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod parser;
pub mod postprocess;
pub mod processor;
pub mod reformat;
pub mod schema;
pub mod store;
pub mod timestamp;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

pub use config::LoadSpec;
pub use error::{LoadError, Result};
pub use models::LoadStats;
pub use processor::LoadProcessor;
pub use store::{MemoryDatabase, MySqlDatabase};
