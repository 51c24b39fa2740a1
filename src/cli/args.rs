//! Command-line argument definitions for the MET loader
//!
//! The legacy interface spells long flags with a single dash (`-index`,
//! `-tmpdir`, `-loglevel`, `-reformat`); those are rewritten to `--` before
//! clap sees them.

use crate::error::{LoadError, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Long flags accepted with a single leading dash
const LEGACY_FLAGS: &[&str] = &["index", "tmpdir", "loglevel", "reformat", "quiet"];

/// Load MET verification output into a METviewer database
#[derive(Debug, Clone, Parser)]
#[command(
    name = "met_dbload",
    version,
    about = "Load MET stat, VSDB, MODE, MTD and TCST output into a METviewer database",
    long_about = "Reads an XML load specification naming the database connection and the \
                  input files, parses every file, de-duplicates header records and writes \
                  the line data tables in one transaction."
)]
pub struct Args {
    /// XML load specification
    #[arg(value_name = "XMLFILE")]
    pub xmlfile: PathBuf,

    /// Only drop and/or apply indexes as the specification asks, then exit
    #[arg(long)]
    pub index: bool,

    /// Directory for bulk-load temporary files
    #[arg(long, value_name = "PATH")]
    pub tmpdir: Option<PathBuf>,

    /// Log verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Write long-form text files per line type into PATH instead of loading
    #[arg(long, value_name = "PATH")]
    pub reformat: Option<PathBuf>,

    /// Suppress the progress bar and the summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Rewrite `-index` style flags to `--index`; everything else passes through
pub fn normalize_legacy_flags<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let bare = arg.strip_prefix('-').filter(|rest| !rest.starts_with('-'));
            let name = bare.map(|rest| rest.split('=').next().unwrap_or(rest));
            match name {
                Some(name) if LEGACY_FLAGS.contains(&name) => format!("-{}", arg),
                _ => arg,
            }
        })
        .collect()
}

impl Args {
    /// Parse the process arguments, accepting the legacy flag spelling
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args()))
    }

    /// Validate argument combinations before anything is loaded
    pub fn validate(&self) -> Result<()> {
        if let Some(tmpdir) = &self.tmpdir {
            if !tmpdir.is_dir() {
                return Err(LoadError::configuration(format!(
                    "tmpdir is not a directory: {}",
                    tmpdir.display()
                )));
            }
        }
        if self.index && self.reformat.is_some() {
            return Err(LoadError::configuration(
                "-index and -reformat cannot be combined",
            ));
        }
        Ok(())
    }

    pub fn tmpdir(&self) -> PathBuf {
        self.tmpdir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(normalize_legacy_flags(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_legacy_flags_are_normalized() {
        let args = parse(&["met_dbload", "-index", "-loglevel", "warning", "load.xml"]);
        assert!(args.index);
        assert_eq!(args.loglevel, LogLevel::Warning);
        assert_eq!(args.xmlfile, PathBuf::from("load.xml"));

        let args = parse(&["met_dbload", "-tmpdir=/var/tmp", "--reformat", "out", "load.xml"]);
        assert_eq!(args.tmpdir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(args.reformat, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_short_flags_and_values_untouched() {
        let normalized = normalize_legacy_flags(["met_dbload", "-q", "-1", "--index"]);
        assert_eq!(normalized, vec!["met_dbload", "-q", "-1", "--index"]);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["met_dbload", "load.xml"]);
        assert!(!args.index);
        assert_eq!(args.loglevel.directive(), "info");
        assert_eq!(args.tmpdir(), std::env::temp_dir());
        assert!(args.show_progress());
    }

    #[test]
    fn test_validate_rejects_missing_tmpdir() {
        let args = parse(&["met_dbload", "-tmpdir", "/definitely/not/here", "load.xml"]);
        assert_eq!(args.validate().unwrap_err().category(), "configuration");
        let args = parse(&["met_dbload", "-index", "-reformat", "out", "load.xml"]);
        assert!(args.validate().is_err());
    }
}
