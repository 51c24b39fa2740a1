//! Load specification parsing and validation.
//!
//! The XML load specification is deserialized into raw structs, then
//! validated into a typed `LoadSpec`. Every problem found here is a
//! configuration error raised before any data file is touched.

use crate::error::{LoadError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_PORT: u16 = 3306;

/// Database flavour named by `connection/management_system`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagementSystem {
    #[default]
    Mysql,
    Mariadb,
    Aurora,
}

impl ManagementSystem {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "mariadb" => Ok(Self::Mariadb),
            "aurora" => Ok(Self::Aurora),
            other => Err(LoadError::configuration(format!(
                "unsupported management_system '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub management_system: ManagementSystem,
    /// Client side advertises LOCAL INFILE support
    pub local_infile: bool,
}

impl ConnectionSpec {
    pub fn new(host: &str, database: &str, user: &str, password: &str) -> Result<Self> {
        let (host, port) = split_host(host)?;
        Ok(Self {
            host,
            port,
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            management_system: ManagementSystem::default(),
            local_infile: false,
        })
    }
}

fn split_host(raw: &str) -> Result<(String, u16)> {
    let raw = raw.trim();
    match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                LoadError::configuration(format!("invalid port in host '{}'", raw))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((raw.to_string(), DEFAULT_PORT)),
    }
}

/// Boolean switches of a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFlags {
    pub load_stat: bool,
    pub load_mode: bool,
    pub load_mtd: bool,
    pub load_xml: bool,
    pub stat_header_db_check: bool,
    pub mode_header_db_check: bool,
    pub mtd_header_db_check: bool,
    pub tcst_header_db_check: bool,
    pub verbose: bool,
    pub drop_indexes: bool,
    pub apply_indexes: bool,
    pub load_mpr: bool,
    pub load_orank: bool,
    pub force_dup_file: bool,
}

impl Default for LoadFlags {
    fn default() -> Self {
        Self {
            load_stat: true,
            load_mode: true,
            load_mtd: true,
            load_xml: true,
            stat_header_db_check: true,
            mode_header_db_check: true,
            mtd_header_db_check: true,
            tcst_header_db_check: true,
            verbose: false,
            drop_indexes: false,
            apply_indexes: false,
            load_mpr: false,
            load_orank: false,
            force_dup_file: false,
        }
    }
}

/// Inclusive range of dates rendered with a Java-style pattern
#[derive(Debug, Clone, PartialEq)]
pub struct DateList {
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub inc_seconds: i64,
    /// strftime equivalent of the configured pattern
    pub format: String,
}

impl DateList {
    pub fn new(name: &str, format: &str, start: &str, end: &str, inc: &str) -> Result<Self> {
        let format = convert_date_format(format)?;
        let start = parse_with_format(start, &format)?;
        let end = parse_with_format(end, &format)?;
        let inc_seconds = inc.trim().parse::<i64>().map_err(|_| {
            LoadError::configuration(format!("date_list {} inc '{}' is not an integer", name, inc))
        })?;
        if inc_seconds <= 0 {
            return Err(LoadError::configuration(format!(
                "date_list {} inc must be positive",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            start,
            end,
            inc_seconds,
            format,
        })
    }

    /// Every date from start to end inclusive, formatted
    pub fn values(&self) -> Vec<String> {
        let mut values = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            values.push(current.format(&self.format).to_string());
            current += Duration::seconds(self.inc_seconds);
        }
        values
    }
}

/// Convert a `yyyy/MM/dd/HH/mm/ss` style pattern into strftime syntax
pub fn convert_date_format(pattern: &str) -> Result<String> {
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "%Y"),
        ("SSS", "%3f"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("z", "%Z"),
        ("D", "%j"),
    ];

    let mut out = String::new();
    let mut rest = pattern;
    'outer: while let Some(c) = rest.chars().next() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        if c.is_ascii_alphabetic() {
            return Err(LoadError::configuration(format!(
                "date format '{}' contains unsupported pattern letter '{}'",
                pattern, c
            )));
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    Ok(out)
}

fn parse_with_format(raw: &str, format: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, format)
        .or_else(|_| {
            NaiveDateTime::parse_from_str(&format!("{}|00|00", raw), &format!("{}|%M|%S", format))
        })
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, format)
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|e| {
            LoadError::configuration(format!("cannot parse date '{}' with '{}': {}", raw, format, e))
        })
}

/// Path template with `{name}` slots and the values for each slot
#[derive(Debug, Clone, PartialEq)]
pub struct FolderTemplate {
    pub template: String,
    pub fields: Vec<(String, Vec<String>)>,
}

impl FolderTemplate {
    pub fn new(template: &str, fields: Vec<(String, Vec<String>)>) -> Result<Self> {
        let slots = template_slots(template)?;
        for slot in &slots {
            if !fields.iter().any(|(name, _)| name == slot) {
                return Err(LoadError::configuration(format!(
                    "folder_tmpl slot {{{}}} has no load_val field",
                    slot
                )));
            }
        }
        Ok(Self {
            template: template.to_string(),
            fields,
        })
    }

    /// Every directory obtained by substituting each combination of values
    pub fn expand(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.template.clone()];
        for (name, values) in &self.fields {
            let slot = format!("{{{}}}", name);
            if !self.template.contains(&slot) {
                continue;
            }
            let slot = slot.as_str();
            paths = paths
                .iter()
                .flat_map(|path| values.iter().map(move |v| path.replace(slot, v)))
                .collect();
        }
        paths.into_iter().map(PathBuf::from).collect()
    }
}

/// Slot names of a template, failing on unbalanced braces
fn template_slots(template: &str) -> Result<Vec<String>> {
    let mut slots = Vec::new();
    let mut current: Option<String> = None;
    for c in template.chars() {
        match (c, current.as_mut()) {
            ('{', None) => current = Some(String::new()),
            ('}', Some(name)) => {
                slots.push(std::mem::take(name));
                current = None;
            }
            ('{', Some(_)) | ('}', None) => {
                return Err(LoadError::configuration(format!(
                    "folder_tmpl '{}' has mismatched braces",
                    template
                )));
            }
            (c, Some(name)) => name.push(c),
            _ => {}
        }
    }
    if current.is_some() {
        return Err(LoadError::configuration(format!(
            "folder_tmpl '{}' has mismatched braces",
            template
        )));
    }
    Ok(slots)
}

/// Validated load specification
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub connection: ConnectionSpec,
    pub flags: LoadFlags,
    pub insert_size: usize,
    pub load_files: Vec<PathBuf>,
    pub folder_template: Option<FolderTemplate>,
    pub line_types: Vec<String>,
    pub group: Option<String>,
    pub description: Option<String>,
    pub load_note: Option<String>,
    /// Source document, kept for `instance_info.load_xml`
    pub raw_xml: String,
}

impl LoadSpec {
    pub fn new(connection: ConnectionSpec) -> Self {
        Self {
            connection,
            flags: LoadFlags::default(),
            insert_size: 1,
            load_files: Vec::new(),
            folder_template: None,
            line_types: Vec::new(),
            group: None,
            description: None,
            load_note: None,
            raw_xml: String::new(),
        }
    }

    pub fn with_flags(mut self, flags: LoadFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.load_files = files;
        self
    }

    pub fn with_insert_size(mut self, insert_size: usize) -> Self {
        self.insert_size = insert_size;
        self
    }

    pub fn with_line_types(mut self, line_types: Vec<String>) -> Self {
        self.line_types = line_types;
        self
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| {
            LoadError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let raw: RawLoadSpec = quick_xml::de::from_str(xml)?;

        let connection = raw
            .connection
            .ok_or_else(|| LoadError::configuration("missing <connection>"))?;
        let mut connection_spec = ConnectionSpec::new(
            &required(connection.host, "connection/host")?,
            &required(connection.database, "connection/database")?,
            &required(connection.user, "connection/user")?,
            &required(connection.password, "connection/password")?,
        )?;
        if let Some(system) = connection.management_system {
            connection_spec.management_system = ManagementSystem::parse(&system)?;
        }
        connection_spec.local_infile = flag(connection.local_infile, "local_infile", false)?;

        let defaults = LoadFlags::default();
        let flags = LoadFlags {
            load_stat: flag(raw.load_stat, "load_stat", defaults.load_stat)?,
            load_mode: flag(raw.load_mode, "load_mode", defaults.load_mode)?,
            load_mtd: flag(raw.load_mtd, "load_mtd", defaults.load_mtd)?,
            load_xml: flag(raw.load_xml, "load_xml", defaults.load_xml)?,
            stat_header_db_check: flag(
                raw.stat_header_db_check,
                "stat_header_db_check",
                defaults.stat_header_db_check,
            )?,
            mode_header_db_check: flag(
                raw.mode_header_db_check,
                "mode_header_db_check",
                defaults.mode_header_db_check,
            )?,
            mtd_header_db_check: flag(
                raw.mtd_header_db_check,
                "mtd_header_db_check",
                defaults.mtd_header_db_check,
            )?,
            tcst_header_db_check: flag(
                raw.tcst_header_db_check,
                "tcst_header_db_check",
                defaults.tcst_header_db_check,
            )?,
            verbose: flag(raw.verbose, "verbose", defaults.verbose)?,
            drop_indexes: flag(raw.drop_indexes, "drop_indexes", defaults.drop_indexes)?,
            apply_indexes: flag(raw.apply_indexes, "apply_indexes", defaults.apply_indexes)?,
            load_mpr: flag(raw.load_mpr, "load_mpr", defaults.load_mpr)?,
            load_orank: flag(raw.load_orank, "load_orank", defaults.load_orank)?,
            force_dup_file: flag(raw.force_dup_file, "force_dup_file", defaults.force_dup_file)?,
        };

        let insert_size = match raw.insert_size {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(LoadError::configuration(format!(
                        "insert_size '{}' is not a positive integer",
                        value
                    )));
                }
            },
            None => 1,
        };

        let date_lists = raw
            .date_list
            .iter()
            .map(|d| DateList::new(&d.name, &d.format, &d.start, &d.end, &d.inc))
            .collect::<Result<Vec<_>>>()?;

        let folder_template = match raw.folder_tmpl {
            Some(template) => {
                let mut fields = Vec::new();
                for field in raw.load_val.map(|v| v.field).unwrap_or_default() {
                    let values = match field.date_list {
                        Some(reference) => date_lists
                            .iter()
                            .find(|d| d.name == reference.name)
                            .ok_or_else(|| {
                                LoadError::configuration(format!(
                                    "load_val field {} references unknown date_list {}",
                                    field.name, reference.name
                                ))
                            })?
                            .values(),
                        None => field.val,
                    };
                    fields.push((field.name, values));
                }
                Some(FolderTemplate::new(&template, fields)?)
            }
            None => None,
        };

        let spec = Self {
            connection: connection_spec,
            flags,
            insert_size,
            load_files: raw
                .load_files
                .map(|f| f.val.into_iter().map(PathBuf::from).collect())
                .unwrap_or_default(),
            folder_template,
            line_types: raw
                .line_type
                .map(|l| l.val.into_iter().map(|v| v.trim().to_uppercase()).collect())
                .unwrap_or_default(),
            group: raw.group,
            description: raw.description,
            load_note: raw.load_note,
            raw_xml: xml.to_string(),
        };

        if !spec.connection.database.starts_with("mv_") {
            debug!(
                "Database name {} does not follow the mv_ convention",
                spec.connection.database
            );
        }

        Ok(spec)
    }
}

fn required(value: Option<String>, tag: &str) -> Result<String> {
    value.ok_or_else(|| LoadError::configuration(format!("missing <{}>", tag)))
}

fn flag(value: Option<String>, tag: &str, default: bool) -> Result<bool> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.trim().eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(LoadError::configuration(format!(
            "<{}> must be true or false, found '{}'",
            tag, v
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct RawLoadSpec {
    connection: Option<RawConnection>,
    load_files: Option<RawValues>,
    folder_tmpl: Option<String>,
    load_val: Option<RawLoadVal>,
    #[serde(default)]
    date_list: Vec<RawDateList>,
    line_type: Option<RawValues>,
    load_stat: Option<String>,
    load_mode: Option<String>,
    load_mtd: Option<String>,
    load_xml: Option<String>,
    stat_header_db_check: Option<String>,
    mode_header_db_check: Option<String>,
    mtd_header_db_check: Option<String>,
    tcst_header_db_check: Option<String>,
    verbose: Option<String>,
    drop_indexes: Option<String>,
    apply_indexes: Option<String>,
    load_mpr: Option<String>,
    load_orank: Option<String>,
    force_dup_file: Option<String>,
    insert_size: Option<String>,
    group: Option<String>,
    description: Option<String>,
    load_note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    host: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    management_system: Option<String>,
    local_infile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawValues {
    #[serde(default)]
    val: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawLoadVal {
    #[serde(default)]
    field: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default)]
    val: Vec<String>,
    date_list: Option<RawDateRef>,
}

#[derive(Debug, Deserialize)]
struct RawDateRef {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawDateList {
    #[serde(rename = "@name")]
    name: String,
    start: String,
    end: String,
    inc: String,
    format: String,
}
