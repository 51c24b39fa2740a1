//! End-to-end tests driven by an XML load specification
//!
//! Fixture directories are laid out the way a folder template expects and
//! loaded into the in-memory store.

use met_dbload::reformat::reformat_files;
use met_dbload::{LoadProcessor, LoadSpec, MemoryDatabase};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const STAT_HEADER: &str = "VERSION MODEL DESC FCST_LEAD FCST_VALID_BEG FCST_VALID_END \
    OBS_LEAD OBS_VALID_BEG OBS_VALID_END FCST_VAR FCST_UNITS FCST_LEV OBS_VAR OBS_UNITS OBS_LEV \
    OBTYPE VX_MASK INTERP_MTHD INTERP_PNTS FCST_THRESH OBS_THRESH COV_THRESH ALPHA LINE_TYPE";

fn stat_file(model: &str, valid: &str) -> String {
    let line = |line_type: &str, data: &str| {
        format!(
            "V12.0 {} NA 120000 {} {} 000000 {} {} TMP K Z2 TMP K Z2 ADPSFC FULL BILIN 4 \
             >=273.0(50) >=273.0(50) NA NA {} {}",
            model, valid, valid, valid, valid, line_type, data
        )
    };
    [
        STAT_HEADER.to_string(),
        line("FHO", "10 0.5 0.4 0.6"),
        line("CTC", "2 2 0 0 0 NA"),
    ]
    .join("\n")
        + "\n"
}

/// Two model directories with one file per valid time
fn fixture_tree(root: &Path) {
    for model in ["arw", "nmm"] {
        for valid in ["2012040912", "2012041012"] {
            let dir = root.join(model).join(valid);
            fs::create_dir_all(&dir).unwrap();
            let stamp = format!("{}_{}0000", &valid[..8], &valid[8..]);
            fs::write(
                dir.join(format!("point_stat_120000L_{}V.stat", stamp)),
                stat_file(&model.to_uppercase(), &stamp),
            )
            .unwrap();
        }
    }
}

fn spec_xml(root: &Path, extra: &str) -> String {
    format!(
        r#"<load_spec>
            <connection>
                <host>localhost</host>
                <database>mv_integration</database>
                <user>loader</user>
                <password>secret</password>
            </connection>
            <date_list name="valid">
                <start>2012040912</start>
                <end>2012041012</end>
                <inc>86400</inc>
                <format>yyyyMMddHH</format>
            </date_list>
            <folder_tmpl>{}/{{model}}/{{valid}}</folder_tmpl>
            <load_val>
                <field name="model"><val>arw</val><val>nmm</val></field>
                <field name="valid"><date_list name="valid"/></field>
            </load_val>
            <insert_size>10</insert_size>
            {}
        </load_spec>"#,
        root.display(),
        extra
    )
}

#[tokio::test]
async fn test_load_from_folder_template() {
    let temp_dir = TempDir::new().unwrap();
    fixture_tree(temp_dir.path());
    let xml = spec_xml(temp_dir.path(), "<load_note>integration</load_note>");
    let spec = LoadSpec::from_xml(&xml).unwrap();
    let db = MemoryDatabase::new();

    let stats = LoadProcessor::new(db.clone(), spec)
        .with_progress(false)
        .process()
        .await
        .unwrap();

    assert_eq!(stats.files_loaded, 4);
    assert_eq!(db.row_count("data_file"), 4);
    assert_eq!(db.row_count("line_data_fho"), 4);
    assert_eq!(db.row_count("line_data_ctc"), 4);
    // one header per model; valid times are line data
    assert_eq!(db.row_count("stat_header"), 2);

    let header = &db.rows("stat_header")[0];
    assert_eq!(header["fcst_thresh"].as_deref(), Some(">=273.0"));
    let fho = &db.rows("line_data_fho")[0];
    assert_eq!(fho["fcst_perc"].as_deref(), Some("50"));

    let info = db.rows("instance_info");
    assert_eq!(info.len(), 1);
    assert_eq!(info[0]["update_detail"].as_deref(), Some("integration"));
    assert!(
        info[0]["load_xml"]
            .as_deref()
            .is_some_and(|xml| xml.contains("mv_integration"))
    );
}

#[tokio::test]
async fn test_reload_from_xml_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    fixture_tree(temp_dir.path());
    let xml = spec_xml(temp_dir.path(), "");
    let db = MemoryDatabase::new();

    for _ in 0..2 {
        LoadProcessor::new(db.clone(), LoadSpec::from_xml(&xml).unwrap())
            .with_progress(false)
            .process()
            .await
            .unwrap();
    }

    assert_eq!(db.row_count("data_file"), 4);
    assert_eq!(db.row_count("line_data_fho"), 4);
    assert_eq!(db.row_count("instance_info"), 1);
}

#[tokio::test]
async fn test_flags_exclude_stat_files() {
    let temp_dir = TempDir::new().unwrap();
    fixture_tree(temp_dir.path());
    let xml = spec_xml(temp_dir.path(), "<load_stat>false</load_stat>");
    let db = MemoryDatabase::new();

    let stats = LoadProcessor::new(db.clone(), LoadSpec::from_xml(&xml).unwrap())
        .with_progress(false)
        .process()
        .await
        .unwrap();

    assert_eq!(stats.files_loaded, 0);
    assert_eq!(db.row_count("data_file"), 0);
}

#[tokio::test]
async fn test_reformat_writes_long_form_files() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    fixture_tree(temp_dir.path());
    let spec = LoadSpec::from_xml(&spec_xml(temp_dir.path(), "")).unwrap();

    let exported = reformat_files(&spec, out_dir.path(), CancellationToken::new(), false)
        .await
        .unwrap();

    let ctc = exported.iter().find(|e| e.line_type == "CTC").unwrap();
    // four files, one CTC line each, four statistics per line
    assert_eq!(ctc.rows, 16);
    let text = fs::read_to_string(out_dir.path().join("CTC.txt")).unwrap();
    assert!(text.lines().any(|l| l.contains("FY_OY\t2\t")));
    assert!(out_dir.path().join("FHO.txt").exists());
}
