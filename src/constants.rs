//! Application constants for the MET loader
//!
//! Lookup codes, sentinels, fixed column sets of the header tables and the
//! line-type groupings used while parsing and post-processing.

// =============================================================================
// Sentinels
// =============================================================================

/// Literal used by MET for a missing value in any text column
pub const NA: &str = "NA";

/// Numeric sentinel written for missing values
pub const MISSING_NUMERIC: &str = "-9999";

/// Bulk-load literal that the server reads as SQL NULL
pub const SQL_NULL: &str = "\\N";

/// Field separator of the bulk-load temporary files
pub const BULK_SEPARATOR: u8 = b'$';

/// Timestamp layout used by MET for stat/TCST/MODE/MTD date fields
pub const MET_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp layout written to the store
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Valid time stored for diagnostic rows whose date field begins with `F` or `O`
pub const DIAGNOSTIC_DATE: (i32, u32, u32) = (2000, 1, 1);

/// Number of reserved trailing numeric fields in a wide stat row
pub const MAX_COL: usize = 125;

// =============================================================================
// data_file_lu codes
// =============================================================================

pub mod data_file_lu {
    pub const POINT_STAT: i32 = 0;
    pub const GRID_STAT: i32 = 1;
    pub const MODE_CTS: i32 = 2;
    pub const MODE_OBJ: i32 = 3;
    pub const WAVELET_STAT: i32 = 4;
    pub const ENSEMBLE_STAT: i32 = 5;
    pub const VSDB_POINT_STAT: i32 = 6;
    pub const VSDB_GRID_STAT: i32 = 7;
    pub const STAT: i32 = 8;
    pub const MTD_2D: i32 = 9;
    pub const MTD_3D_PC: i32 = 10;
    pub const MTD_3D_PS: i32 = 11;
    pub const MTD_3D_SC: i32 = 12;
    pub const MTD_3D_SS: i32 = 13;
    pub const TCST: i32 = 14;
}

/// line_type_lu codes stored on MODE and MTD header rows
pub mod line_type_lu {
    pub const MODE_SINGLE: i32 = 17;
    pub const MODE_PAIR: i32 = 18;
    pub const MODE_CTS: i32 = 19;
    pub const MTD_2D: i32 = 20;
    pub const MTD_3D_SINGLE: i32 = 21;
    pub const MTD_3D_PAIR: i32 = 22;
}

// =============================================================================
// Line-type groupings
// =============================================================================

/// Line types whose rows must carry an ALPHA value
pub const ALPHA_LINE_TYPES: &[&str] = &[
    "CTS", "NBRCTS", "NBRCNT", "MCTS", "SSVAR", "VCNT", "DMAP", "RPS", "SSIDX",
];

/// Line types whose stored counter is one less than the file counter
pub const DECREMENTED_COUNTER_LINE_TYPES: &[&str] = &["PCT", "PJC", "PRC"];

/// Reformatter family emitting bare statistics without confidence limits
pub const SIMPLE_REFORMAT_LINE_TYPES: &[&str] =
    &["FHO", "CTC", "SL1L2", "SAL1L2", "VL1L2", "VAL1L2", "NBRCTC"];

/// Reformatter family emitting statistics with NCL/NCU/BCL/BCU companions
pub const CONFIDENCE_REFORMAT_LINE_TYPES: &[&str] = &[
    "CNT", "CTS", "MCTS", "VCNT", "ECNT", "NBRCTS", "NBRCNT", "PSTD", "SSVAR", "RPS", "DMAP",
    "GRAD", "SEEPS",
];

/// Suffixes of confidence-limit companion columns, in output order
pub const CONFIDENCE_SUFFIXES: [&str; 4] = ["_ncl", "_ncu", "_bcl", "_bcu"];

// =============================================================================
// Stat header layout
// =============================================================================

/// Header fields of the long `.stat` header form, in file order
pub const STAT_LONG_HEADER: &[&str] = &[
    "version",
    "model",
    "descr",
    "fcst_lead",
    "fcst_valid_beg",
    "fcst_valid_end",
    "obs_lead",
    "obs_valid_beg",
    "obs_valid_end",
    "fcst_var",
    "fcst_units",
    "fcst_lev",
    "obs_var",
    "obs_units",
    "obs_lev",
    "obtype",
    "vx_mask",
    "interp_mthd",
    "interp_pnts",
    "fcst_thresh",
    "obs_thresh",
    "cov_thresh",
    "alpha",
    "line_type",
];

/// Columns that identify a stat_header row
pub const STAT_HEADER_KEY_COLUMNS: &[&str] = &[
    "version",
    "model",
    "descr",
    "fcst_var",
    "fcst_units",
    "fcst_lev",
    "obs_var",
    "obs_units",
    "obs_lev",
    "obtype",
    "vx_mask",
    "interp_mthd",
    "interp_pnts",
    "fcst_thresh",
    "obs_thresh",
];

/// Columns every stat line-data table starts with, after `line_data_id`
pub const STAT_COMMON_COLUMNS: &[&str] = &[
    "stat_header_id",
    "data_file_id",
    "line_num",
    "fcst_lead",
    "fcst_valid_beg",
    "fcst_valid_end",
    "fcst_init_beg",
    "obs_lead",
    "obs_valid_beg",
    "obs_valid_end",
    "fcst_perc",
    "obs_perc",
];

/// Columns every TCST line-data table starts with, after `line_data_id`
pub const TCST_COMMON_COLUMNS: &[&str] = &[
    "tcst_header_id",
    "data_file_id",
    "line_num",
    "fcst_lead",
    "fcst_valid",
    "fcst_init",
];

/// Columns that identify a tcst_header row
pub const TCST_HEADER_KEY_COLUMNS: &[&str] = &[
    "version",
    "amodel",
    "bmodel",
    "descr",
    "storm_id",
    "basin",
    "cyclone",
    "storm_name",
    "init_mask",
    "valid_mask",
];

/// Columns that identify a mode_header row
pub const MODE_HEADER_KEY_COLUMNS: &[&str] = &[
    "version",
    "model",
    "n_valid",
    "grid_res",
    "descr",
    "fcst_lead",
    "fcst_valid",
    "fcst_accum",
    "fcst_init",
    "obs_lead",
    "obs_valid",
    "obs_accum",
    "fcst_rad",
    "fcst_thr",
    "obs_rad",
    "obs_thr",
    "fcst_var",
    "fcst_units",
    "fcst_lev",
    "obs_var",
    "obs_units",
    "obs_lev",
];

/// Columns that identify an mtd_header row
pub const MTD_HEADER_KEY_COLUMNS: &[&str] = &[
    "version",
    "model",
    "descr",
    "fcst_lead",
    "fcst_valid",
    "fcst_init",
    "obs_lead",
    "obs_valid",
    "t_delta",
    "fcst_t_beg",
    "fcst_t_end",
    "fcst_rad",
    "fcst_thr",
    "obs_t_beg",
    "obs_t_end",
    "obs_rad",
    "obs_thr",
    "fcst_var",
    "fcst_units",
    "fcst_lev",
    "obs_var",
    "obs_units",
    "obs_lev",
];

/// Fields that must be constant over an MTD 2D file for revision detection
pub const MTD_REVISION_CONTEXT: &[&str] = &[
    "model",
    "descr",
    "fcst_valid",
    "obs_valid",
    "fcst_rad",
    "fcst_thr",
    "obs_rad",
    "obs_thr",
    "fcst_lev",
    "obs_lev",
];

/// Numeric MTD 2D fields differenced in a synthesized revision row
pub const MTD_REVISION_DIFF_FIELDS: &[&str] = &[
    "area",
    "centroid_x",
    "centroid_y",
    "centroid_lat",
    "centroid_lon",
    "intensity_10",
    "intensity_25",
    "intensity_50",
    "intensity_75",
    "intensity_90",
];

// =============================================================================
// VSDB
// =============================================================================

/// Leading VSDB columns before the numeric payload
pub const VSDB_HEADER: &[&str] = &[
    "version",
    "model",
    "fcst_lead",
    "fcst_valid_beg",
    "obtype",
    "vx_mask",
    "line_type",
    "fcst_var",
    "fcst_lev",
];

/// VSDB line types whose model may be annotated with the directory suffix
pub const VSDB_ENSEMBLE_LINE_TYPES: &[&str] = &["BSS", "ECON", "HIST", "RELI", "RELP", "RMSE", "RPS"];

/// VSDB to MET line-type names
pub const VSDB_RENAMES: &[(&str, &str)] = &[
    ("BSS", "PSTD"),
    ("RELI", "PCT"),
    ("HIST", "RHIST"),
    ("ECON", "ECLV"),
    ("RMSE", "CNT"),
    ("FSS", "NBRCNT"),
    ("FHO", "CTC"),
    ("RPS", "ENSCNT"),
];

/// Number of ECLV points carried by a VSDB ECON record
pub const ECON_POINTS: usize = 18;

/// Cost/loss ratios of the ECLV points produced from VSDB ECON records
pub const X_POINTS_ECON: [f64; ECON_POINTS] = [
    0.952380952,
    0.909090909,
    0.800000000,
    0.666666667,
    0.500000000,
    0.333333333,
    0.200000000,
    0.125000000,
    0.100000000,
    0.055555556,
    0.037037037,
    0.025000000,
    0.016666667,
    0.011111111,
    0.007142857,
    0.004761905,
    0.002857143,
    0.002000000,
];

// =============================================================================
// MODE / MTD
// =============================================================================

/// MODE columns filled with SQL NULL when a file predates them
pub const MODE_NULLABLE_OPTIONAL: &[&str] = &["n_valid", "grid_res", "aspect_diff", "curvature_ratio"];

/// MODE text columns filled with `NA` when a file predates them
pub const MODE_TEXT_OPTIONAL: &[&str] = &["descr", "fcst_units", "obs_units"];

/// MTD time-span columns filled with SQL NULL when a file predates them
pub const MTD_NULLABLE_OPTIONAL: &[&str] = &["fcst_t_beg", "fcst_t_end", "obs_t_beg", "obs_t_end"];

/// Prefix given to variables of synthesized MTD revision rows
pub const REVISION_PREFIX: &str = "REV_";

/// Axis angle stored on synthesized MTD revision rows
pub const REVISION_AXIS_ANG: &str = "-9999";

/// Statistic columns of `mode_cts` after `mode_header_id`
pub const MODE_CTS_COLUMNS: &[&str] = &[
    "field", "total", "fy_oy", "fy_on", "fn_oy", "fn_on", "base_rate", "fmean", "acc", "fbias",
    "pody", "podn", "pofd", "far", "csi", "gss", "hk", "hss", "odds",
];

/// Attribute columns of `mode_obj_single` after the ids
pub const MODE_SINGLE_COLUMNS: &[&str] = &[
    "object_id", "object_cat", "centroid_x", "centroid_y", "centroid_lat", "centroid_lon",
    "axis_ang", "length", "width", "area", "area_thresh", "curvature", "curvature_x",
    "curvature_y", "complexity", "intensity_10", "intensity_25", "intensity_50", "intensity_75",
    "intensity_90", "intensity_nn", "intensity_sum",
];

/// Attribute columns of `mode_obj_pair` after the ids
pub const MODE_PAIR_COLUMNS: &[&str] = &[
    "object_id", "object_cat", "centroid_dist", "boundary_dist", "convex_hull_dist",
    "angle_diff", "aspect_diff", "area_ratio", "intersection_area", "union_area",
    "symmetric_diff", "intersection_over_area", "curvature_ratio", "complexity_ratio",
    "percentile_intensity_ratio", "interest",
];

/// Attribute columns of `mtd_2d_obj` after `mtd_header_id`
pub const MTD_2D_COLUMNS: &[&str] = &[
    "object_id", "object_cat", "time_index", "area", "centroid_x", "centroid_y", "centroid_lat",
    "centroid_lon", "axis_ang", "intensity_10", "intensity_25", "intensity_50", "intensity_75",
    "intensity_90", "intensity_nn",
];

/// Attribute columns of `mtd_3d_obj_single` after `mtd_header_id`
pub const MTD_3D_SINGLE_COLUMNS: &[&str] = &[
    "object_id", "object_cat", "centroid_x", "centroid_y", "centroid_t", "centroid_lat",
    "centroid_lon", "x_dot", "y_dot", "axis_ang", "volume", "start_time", "end_time",
    "cdist_travelled", "intensity_10", "intensity_25", "intensity_50", "intensity_75",
    "intensity_90", "intensity_nn",
];

/// Attribute columns of `mtd_3d_obj_pair` after `mtd_header_id`
pub const MTD_3D_PAIR_COLUMNS: &[&str] = &[
    "object_id", "object_cat", "space_centroid_dist", "time_centroid_delta", "axis_diff",
    "speed_delta", "direction_diff", "volume_ratio", "start_time_delta", "end_time_delta",
    "intersection_volume", "duration_diff", "interest",
];

/// Text columns of object tables written verbatim
pub const OBJECT_TEXT_COLUMNS: &[&str] = &["object_id", "object_cat", "field"];

// =============================================================================
// Load bookkeeping
// =============================================================================

/// Upper bound on bind parameters in one parametric insert
pub const MAX_BIND_PARAMETERS: usize = 60_000;
