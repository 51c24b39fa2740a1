//! Error handling for MET load operations.
//!
//! Fatal conditions are `LoadError` values grouped by category: configuration,
//! input file, parse, header lookup, write and index. Row-level problems are
//! not errors; parsers report them as warnings and drop the row.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Input file {path}: {reason}")]
    InputFile { path: PathBuf, reason: String },

    #[error("Parse failed for file {path} at line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Header lookup failed in {table}: {reason}")]
    HeaderLookup { table: String, reason: String },

    #[error("Write to {table} failed: {reason}")]
    Write { table: String, reason: String },

    #[error("Index {index} on {table}: {reason}")]
    Index {
        table: String,
        index: String,
        reason: String,
    },

    #[error("Load cancelled: {reason}")]
    Cancelled { reason: String },
}

impl LoadError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn input_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InputFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn header_lookup(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HeaderLookup {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn write(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Category name used in the single user-visible failure line
    pub fn category(&self) -> &'static str {
        match self {
            LoadError::Configuration { .. } | LoadError::Xml(_) => "configuration",
            LoadError::InputFile { .. } => "input-file",
            LoadError::Parse { .. } | LoadError::Io(_) => "parse",
            LoadError::HeaderLookup { .. } => "header-lookup",
            LoadError::Write { .. } | LoadError::Polars(_) | LoadError::Sql(_) => "write",
            LoadError::Index { .. } => "index",
            LoadError::Cancelled { .. } => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
