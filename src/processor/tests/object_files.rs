//! MODE, MTD and TCST loading tests

use super::{ids, load, spec_for, write_file};
use crate::store::MemoryDatabase;
use tempfile::TempDir;

const MODE_OBJ_HEADER: &str = "VERSION MODEL N_VALID GRID_RES DESC FCST_LEAD FCST_VALID \
    FCST_ACCUM OBS_LEAD OBS_VALID OBS_ACCUM FCST_RAD FCST_THR OBS_RAD OBS_THR FCST_VAR \
    FCST_UNITS FCST_LEV OBS_VAR OBS_UNITS OBS_LEV OBTYPE OBJECT_ID OBJECT_CAT CENTROID_X \
    AREA INTENSITY_90 INTENSITY_50 INTEREST";

const MTD_HEADER: &str = "VERSION MODEL DESC FCST_LEAD FCST_VALID OBS_LEAD OBS_VALID T_DELTA \
    FCST_RAD FCST_THR OBS_RAD OBS_THR FCST_VAR FCST_UNITS FCST_LEV OBS_VAR OBS_UNITS OBS_LEV \
    OBJECT_ID OBJECT_CAT TIME_INDEX AREA CENTROID_X CENTROID_Y CENTROID_LAT CENTROID_LON \
    AXIS_ANG INTENSITY_10 INTENSITY_25 INTENSITY_50 INTENSITY_75 INTENSITY_90 INTENSITY_99";

const TCST_HEADER: &str = "VERSION AMODEL BMODEL DESC STORM_ID BASIN CYCLONE STORM_NAME INIT \
    LEAD VALID INIT_MASK VALID_MASK LINE_TYPE TOTAL INDEX LEVEL WATCH_WARN INITIALS ALAT ALON";

fn mode_line(object_id: &str, object_cat: &str, area: &str, interest: &str) -> String {
    format!(
        "V12.0 WRF 1000 4 NA 120000 20120409_120000 03 000000 20120409_120000 03 5 >=5.0 \
         5 >=5.0 APCP_03 kg/m^2 A3 APCP_03 kg/m^2 A3 MC_PCP {} {} 10.5 {} 8.1 9.9 {}",
        object_id, object_cat, area, interest
    )
}

fn mtd_line(object_id: &str, area: u32) -> String {
    format!(
        "V12.0 WRF NA 060000 20120409_120000 000000 20120409_120000 0 2 >=2.0 2 >=2.0 \
         APCP_01 kg/m^2 A1 APCP_01 kg/m^2 A1 {} CF001 0 {} 10.0 20.0 40.0 -100.0 30.0 \
         1 2 3 4 5 6",
        object_id, area
    )
}

#[tokio::test]
async fn test_mode_pairs_reference_their_single_objects() {
    let temp_dir = TempDir::new().unwrap();
    let contents = [
        MODE_OBJ_HEADER.to_string(),
        mode_line("F001", "CF001", "120", "NA"),
        mode_line("O001", "CO001", "96", "NA"),
        mode_line("F001_O001", "CF001_CO001", "NA", "0.92"),
        mode_line("F002_O001", "CF000_CO001", "NA", "0.40"),
    ]
    .join("\n");
    let file = write_file(&temp_dir, "mode_120000L_20120409_120000V_obj.txt", &contents);
    let db = MemoryDatabase::new();

    let stats = load(&db, spec_for(vec![file])).await;

    assert_eq!(db.row_count("mode_header"), 1);
    assert_eq!(db.row_count("mode_obj_single"), 2);
    assert_eq!(db.row_count("mode_obj_pair"), 1);
    // F002 has no single object row
    assert_eq!(stats.rows_skipped, 1);

    let singles = db.rows("mode_obj_single");
    let id_of = |object: &str| {
        singles
            .iter()
            .find(|r| r["object_id"].as_deref() == Some(object))
            .and_then(|r| r["mode_obj_id"].clone())
    };
    let pair = &db.rows("mode_obj_pair")[0];
    assert_eq!(pair["mode_obj_fcst_id"], id_of("F001"));
    assert_eq!(pair["mode_obj_obs_id"], id_of("O001"));
    assert_eq!(pair["interest"].as_deref(), Some("0.92"));
    assert_eq!(pair["simple_flag"].as_deref(), Some("1"));
    assert_eq!(pair["matched_flag"].as_deref(), Some("1"));

    let header = &db.rows("mode_header")[0];
    assert_eq!(header["linenumber"].as_deref(), Some("2"));
    assert_eq!(header["data_file_id"].as_deref(), Some("1"));
}

#[tokio::test]
async fn test_mtd_revision_rows_are_loaded() {
    let temp_dir = TempDir::new().unwrap();
    let mut lines = vec![MTD_HEADER.to_string(), mtd_line("F001", 10)];
    for area in [11, 12, 13, 14, 15] {
        lines.push(mtd_line("new", area));
    }
    let file = write_file(
        &temp_dir,
        "mtd_20120409_120000V_2d.txt",
        &lines.join("\n"),
    );
    let db = MemoryDatabase::new();

    let stats = load(&db, spec_for(vec![file])).await;

    assert_eq!(stats.revision_rows, 4);
    assert_eq!(db.row_count("mtd_2d_obj"), 10);
    // the revision rows carry their own REV_ context
    assert_eq!(db.row_count("mtd_header"), 2);
    let revision_ids: Vec<_> = db
        .column_values("mtd_header", "revision_id")
        .into_iter()
        .collect();
    assert!(revision_ids.contains(&None));
    assert!(revision_ids.contains(&Some("1".to_string())));

    let header_ids = ids(&db, "mtd_header", "mtd_header_id");
    for row in db.rows("mtd_2d_obj") {
        assert!(header_ids.contains(row["mtd_header_id"].as_ref().unwrap()));
    }
}

#[tokio::test]
async fn test_tcst_lines_share_one_header() {
    let temp_dir = TempDir::new().unwrap();
    let line = |lead: &str, valid: &str| {
        format!(
            "V12.0 HWRF BEST NA AL092021 AL 09 IDA 20210827_000000 {} {} NA NA TCMPR 2 1 \
             HU NA X 23.1 -81.2",
            lead, valid
        )
    };
    let contents = [
        TCST_HEADER.to_string(),
        line("000000", "20210827_000000"),
        line("060000", "20210827_060000"),
    ]
    .join("\n");
    let file = write_file(&temp_dir, "tc_pairs_ida.tcst", &contents);
    let db = MemoryDatabase::new();

    load(&db, spec_for(vec![file])).await;

    assert_eq!(db.row_count("tcst_header"), 1);
    assert_eq!(db.row_count("line_data_tcmpr"), 2);
    let leads: Vec<_> = db
        .column_values("line_data_tcmpr", "fcst_lead")
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(leads, vec!["0", "60000"]);
    let data_file = &db.rows("data_file")[0];
    assert_eq!(data_file["data_file_lu_id"].as_deref(), Some("14"));
}
