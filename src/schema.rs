//! Line-type schemas for stat and TCST line data.
//!
//! Each `LineTypeSchema` maps the positional data fields that follow
//! `LINE_TYPE` to named columns of its line-data table, and optionally
//! describes the variable-length block whose length is given by a counter
//! field earlier in the row.

use crate::models::RowIssue;

/// Shape of a variable-length block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    /// `count` repetitions, indexed by `i_value`
    Linear,
    /// `count * count` repetitions, indexed by `(i_value, j_value)`
    Square,
}

/// Variable-length block stored in a companion table
#[derive(Debug, Clone, Copy)]
pub struct VarBlock {
    pub table: &'static str,
    /// Data index of the counter field
    pub counter: usize,
    /// Data index where the first repetition begins
    pub start: usize,
    /// Columns of one repetition
    pub columns: &'static [&'static str],
    pub shape: BlockShape,
}

impl VarBlock {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of repetitions for a counter value, `None` on overflow
    pub fn repetitions(&self, counter: usize) -> Option<usize> {
        match self.shape {
            BlockShape::Linear => Some(counter),
            BlockShape::Square => counter.checked_mul(counter),
        }
    }
}

#[derive(Debug)]
pub struct LineTypeSchema {
    pub line_type: &'static str,
    pub table: &'static str,
    /// Named data columns in file order, the block spliced out at `block.start`
    pub fixed: &'static [&'static str],
    pub block: Option<VarBlock>,
    pub has_alpha: bool,
    pub has_cov_thresh: bool,
}

/// Data of one row split into fixed columns and block repetitions
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRow {
    pub fixed: Vec<Option<String>>,
    pub counter: usize,
    pub block: Vec<Vec<Option<String>>>,
}

impl LineTypeSchema {
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.fixed.iter().position(|c| *c == column)
    }

    /// Split the positional data of a row according to this schema
    pub fn split(&self, data: &[Option<String>]) -> std::result::Result<SplitRow, RowIssue> {
        let Some(block) = self.block else {
            let fixed = (0..self.fixed.len())
                .map(|i| data.get(i).cloned().flatten())
                .collect();
            return Ok(SplitRow {
                fixed,
                counter: 0,
                block: Vec::new(),
            });
        };

        let counter = match data.get(block.counter).cloned().flatten() {
            Some(raw) => parse_counter(&raw).ok_or_else(|| {
                RowIssue::new(format!(
                    "{} counter '{}' is not a non-negative integer",
                    self.line_type, raw
                ))
            })?,
            None => 0,
        };

        let oversized = || {
            RowIssue::new(format!(
                "{} counter {} exceeds the {} data fields of the row",
                self.line_type,
                counter,
                data.len()
            ))
        };
        let repetitions = block.repetitions(counter).ok_or_else(oversized)?;
        let block_len = repetitions
            .checked_mul(block.width())
            .ok_or_else(oversized)?;
        let block_end = block.start.checked_add(block_len).ok_or_else(oversized)?;
        if data.len() < block_end {
            return Err(RowIssue::new(format!(
                "{} row declares {} repetitions but carries only {} data fields",
                self.line_type,
                repetitions,
                data.len()
            )));
        }

        let values = data[block.start..block_end]
            .chunks(block.width())
            .map(|chunk| chunk.to_vec())
            .collect();

        let fixed = (0..self.fixed.len())
            .map(|i| {
                let position = if i < block.start { i } else { i + block_len };
                data.get(position).cloned().flatten()
            })
            .collect();

        Ok(SplitRow {
            fixed,
            counter,
            block: values,
        })
    }
}

/// Counters are written as integers, occasionally with a `.0` suffix
fn parse_counter(raw: &str) -> Option<usize> {
    if let Ok(value) = raw.parse::<usize>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    if value < 0.0 || value.fract() != 0.0 || value > MAX_FLOAT_COUNTER {
        return None;
    }
    Some(value as usize)
}

const MAX_FLOAT_COUNTER: f64 = u32::MAX as f64;

/// Look up a stat line type (upper case)
pub fn stat_schema(line_type: &str) -> Option<&'static LineTypeSchema> {
    STAT_LINE_TYPES.iter().find(|s| s.line_type == line_type)
}

/// Look up a TCST line type (upper case)
pub fn tcst_schema(line_type: &str) -> Option<&'static LineTypeSchema> {
    TCST_LINE_TYPES.iter().find(|s| s.line_type == line_type)
}

macro_rules! cts_columns {
    ($($extra:literal),*) => {
        &[
            "total",
            "baser", "baser_ncl", "baser_ncu", "baser_bcl", "baser_bcu",
            "fmean", "fmean_ncl", "fmean_ncu", "fmean_bcl", "fmean_bcu",
            "acc", "acc_ncl", "acc_ncu", "acc_bcl", "acc_bcu",
            "fbias", "fbias_bcl", "fbias_bcu",
            "pody", "pody_ncl", "pody_ncu", "pody_bcl", "pody_bcu",
            "podn", "podn_ncl", "podn_ncu", "podn_bcl", "podn_bcu",
            "pofd", "pofd_ncl", "pofd_ncu", "pofd_bcl", "pofd_bcu",
            "far", "far_ncl", "far_ncu", "far_bcl", "far_bcu",
            "csi", "csi_ncl", "csi_ncu", "csi_bcl", "csi_bcu",
            "gss", "gss_bcl", "gss_bcu",
            "hk", "hk_ncl", "hk_ncu", "hk_bcl", "hk_bcu",
            "hss", "hss_bcl", "hss_bcu",
            "odds", "odds_ncl", "odds_ncu", "odds_bcl", "odds_bcu",
            "lodds", "lodds_ncl", "lodds_ncu", "lodds_bcl", "lodds_bcu",
            "orss", "orss_ncl", "orss_ncu", "orss_bcl", "orss_bcu",
            "eds", "eds_ncl", "eds_ncu", "eds_bcl", "eds_bcu",
            "seds", "seds_ncl", "seds_ncu", "seds_bcl", "seds_bcu",
            "edi", "edi_ncl", "edi_ncu", "edi_bcl", "edi_bcu",
            "sedi", "sedi_ncl", "sedi_ncu", "sedi_bcl", "sedi_bcu",
            "bagss", "bagss_bcl", "bagss_bcu"
            $(, $extra)*
        ]
    };
}

const CNT_COLUMNS: &[&str] = &[
    "total",
    "fbar", "fbar_ncl", "fbar_ncu", "fbar_bcl", "fbar_bcu",
    "fstdev", "fstdev_ncl", "fstdev_ncu", "fstdev_bcl", "fstdev_bcu",
    "obar", "obar_ncl", "obar_ncu", "obar_bcl", "obar_bcu",
    "ostdev", "ostdev_ncl", "ostdev_ncu", "ostdev_bcl", "ostdev_bcu",
    "pr_corr", "pr_corr_ncl", "pr_corr_ncu", "pr_corr_bcl", "pr_corr_bcu",
    "sp_corr", "kt_corr", "ranks", "frank_ties", "orank_ties",
    "me", "me_ncl", "me_ncu", "me_bcl", "me_bcu",
    "estdev", "estdev_ncl", "estdev_ncu", "estdev_bcl", "estdev_bcu",
    "mbias", "mbias_bcl", "mbias_bcu",
    "mae", "mae_bcl", "mae_bcu",
    "mse", "mse_bcl", "mse_bcu",
    "bcmse", "bcmse_bcl", "bcmse_bcu",
    "rmse", "rmse_bcl", "rmse_bcu",
    "e10", "e10_bcl", "e10_bcu",
    "e25", "e25_bcl", "e25_bcu",
    "e50", "e50_bcl", "e50_bcu",
    "e75", "e75_bcl", "e75_bcu",
    "e90", "e90_bcl", "e90_bcu",
    "eiqr", "eiqr_bcl", "eiqr_bcu",
    "mad", "mad_bcl", "mad_bcu",
    "anom_corr", "anom_corr_ncl", "anom_corr_ncu", "anom_corr_bcl", "anom_corr_bcu",
    "me2", "me2_bcl", "me2_bcu",
    "msess", "msess_bcl", "msess_bcu",
    "rmsfa", "rmsfa_bcl", "rmsfa_bcu",
    "rmsoa", "rmsoa_bcl", "rmsoa_bcu",
    "anom_corr_uncntr", "anom_corr_uncntr_ncl", "anom_corr_uncntr_ncu",
    "anom_corr_uncntr_bcl", "anom_corr_uncntr_bcu",
    "si", "si_bcl", "si_bcu",
];

const VCNT_COLUMNS: &[&str] = &[
    "total",
    "fbar", "fbar_bcl", "fbar_bcu",
    "obar", "obar_bcl", "obar_bcu",
    "fs_rms", "fs_rms_bcl", "fs_rms_bcu",
    "os_rms", "os_rms_bcl", "os_rms_bcu",
    "msve", "msve_bcl", "msve_bcu",
    "rmsve", "rmsve_bcl", "rmsve_bcu",
    "fstdev", "fstdev_bcl", "fstdev_bcu",
    "ostdev", "ostdev_bcl", "ostdev_bcu",
    "fdir", "fdir_bcl", "fdir_bcu",
    "odir", "odir_bcl", "odir_bcu",
    "fbar_speed", "fbar_speed_bcl", "fbar_speed_bcu",
    "obar_speed", "obar_speed_bcl", "obar_speed_bcu",
    "vdiff_speed", "vdiff_speed_bcl", "vdiff_speed_bcu",
    "vdiff_dir", "vdiff_dir_bcl", "vdiff_dir_bcu",
    "speed_err", "speed_err_bcl", "speed_err_bcu",
    "speed_abserr", "speed_abserr_bcl", "speed_abserr_bcu",
    "dir_err", "dir_err_bcl", "dir_err_bcu",
    "dir_abserr", "dir_abserr_bcl", "dir_abserr_bcu",
    "anom_corr", "anom_corr_ncl", "anom_corr_ncu", "anom_corr_bcl", "anom_corr_bcu",
    "anom_corr_uncntr", "anom_corr_uncntr_bcl", "anom_corr_uncntr_bcu",
    "total_dir",
];

const ENSCNT_COLUMNS: &[&str] = &[
    "rpsf", "rpsf_ncl", "rpsf_ncu", "rpsf_bcl", "rpsf_bcu",
    "rpscl", "rpscl_ncl", "rpscl_ncu", "rpscl_bcl", "rpscl_bcu",
    "rpss", "rpss_ncl", "rpss_ncu", "rpss_bcl", "rpss_bcu",
    "crpsf", "crpsf_ncl", "crpsf_ncu", "crpsf_bcl", "crpsf_bcu",
    "crpscl", "crpscl_ncl", "crpscl_ncu", "crpscl_bcl", "crpscl_bcu",
    "crpss", "crpss_ncl", "crpss_ncu", "crpss_bcl", "crpss_bcu",
];

const SSVAR_COLUMNS: &[&str] = &[
    "total", "n_bin", "bin_i", "bin_n", "var_min", "var_max", "var_mean",
    "fbar", "obar", "fobar", "ffbar", "oobar",
    "fbar_ncl", "fbar_ncu",
    "fstdev", "fstdev_ncl", "fstdev_ncu",
    "obar_ncl", "obar_ncu",
    "ostdev", "ostdev_ncl", "ostdev_ncu",
    "pr_corr", "pr_corr_ncl", "pr_corr_ncu",
    "me", "me_ncl", "me_ncu",
    "estdev", "estdev_ncl", "estdev_ncu",
    "mbias", "mse", "bcmse", "rmse",
];

const fn plain(
    line_type: &'static str,
    table: &'static str,
    fixed: &'static [&'static str],
) -> LineTypeSchema {
    LineTypeSchema {
        line_type,
        table,
        fixed,
        block: None,
        has_alpha: false,
        has_cov_thresh: false,
    }
}

const fn with_alpha(mut schema: LineTypeSchema) -> LineTypeSchema {
    schema.has_alpha = true;
    schema
}

const fn with_cov_thresh(mut schema: LineTypeSchema) -> LineTypeSchema {
    schema.has_cov_thresh = true;
    schema
}

const fn with_block(mut schema: LineTypeSchema, block: VarBlock) -> LineTypeSchema {
    schema.block = Some(block);
    schema
}

/// Catalogue of supported stat line types
pub static STAT_LINE_TYPES: &[LineTypeSchema] = &[
    plain("FHO", "line_data_fho", &["total", "f_rate", "h_rate", "o_rate"]),
    plain(
        "CTC",
        "line_data_ctc",
        &["total", "fy_oy", "fy_on", "fn_oy", "fn_on", "ec_value"],
    ),
    with_alpha(plain("CTS", "line_data_cts", cts_columns!("ec_value"))),
    with_block(
        plain("MCTC", "line_data_mctc", &["total", "n_cat", "ec_value"]),
        VarBlock {
            table: "line_data_mctc_cnt",
            counter: 1,
            start: 2,
            columns: &["fi_oj"],
            shape: BlockShape::Square,
        },
    ),
    with_alpha(plain(
        "MCTS",
        "line_data_mcts",
        &[
            "total", "n_cat",
            "acc", "acc_ncl", "acc_ncu", "acc_bcl", "acc_bcu",
            "hk", "hk_bcl", "hk_bcu",
            "hss", "hss_bcl", "hss_bcu",
            "ger", "ger_bcl", "ger_bcu",
            "hss_ec", "hss_ec_bcl", "hss_ec_bcu",
            "ec_value",
        ],
    )),
    with_alpha(plain("CNT", "line_data_cnt", CNT_COLUMNS)),
    plain(
        "SL1L2",
        "line_data_sl1l2",
        &["total", "fbar", "obar", "fobar", "ffbar", "oobar", "mae"],
    ),
    plain(
        "SAL1L2",
        "line_data_sal1l2",
        &["total", "fabar", "oabar", "foabar", "ffabar", "ooabar", "mae"],
    ),
    plain(
        "VL1L2",
        "line_data_vl1l2",
        &[
            "total", "ufbar", "vfbar", "uobar", "vobar", "uvfobar", "uvffbar", "uvoobar",
            "f_speed_bar", "o_speed_bar",
        ],
    ),
    plain(
        "VAL1L2",
        "line_data_val1l2",
        &[
            "total", "ufabar", "vfabar", "uoabar", "voabar", "uvfoabar", "uvffabar", "uvooabar",
        ],
    ),
    plain(
        "GRAD",
        "line_data_grad",
        &[
            "total", "fgbar", "ogbar", "mgbar", "egbar", "s1", "s1_og", "fgog_ratio", "dx", "dy",
        ],
    ),
    with_cov_thresh(with_block(
        plain("PCT", "line_data_pct", &["total", "n_thresh"]),
        VarBlock {
            table: "line_data_pct_thresh",
            counter: 1,
            start: 2,
            columns: &["thresh_i", "oy_i", "on_i"],
            shape: BlockShape::Linear,
        },
    )),
    with_alpha(with_cov_thresh(with_block(
        plain(
            "PSTD",
            "line_data_pstd",
            &[
                "total", "n_thresh", "baser", "baser_ncl", "baser_ncu", "reliability",
                "resolution", "uncertainty", "roc_auc", "brier", "brier_ncl", "brier_ncu",
                "briercl", "briercl_ncl", "briercl_ncu", "bss", "bss_smpl",
            ],
        ),
        VarBlock {
            table: "line_data_pstd_thresh",
            counter: 1,
            start: 17,
            columns: &["thresh_i"],
            shape: BlockShape::Linear,
        },
    ))),
    with_cov_thresh(with_block(
        plain("PJC", "line_data_pjc", &["total", "n_thresh"]),
        VarBlock {
            table: "line_data_pjc_thresh",
            counter: 1,
            start: 2,
            columns: &[
                "thresh_i", "oy_tp_i", "on_tp_i", "calibration_i", "refinement_i",
                "likelihood_i", "baser_i",
            ],
            shape: BlockShape::Linear,
        },
    )),
    with_cov_thresh(with_block(
        plain("PRC", "line_data_prc", &["total", "n_thresh"]),
        VarBlock {
            table: "line_data_prc_thresh",
            counter: 1,
            start: 2,
            columns: &["thresh_i", "pody_i", "pofd_i"],
            shape: BlockShape::Linear,
        },
    )),
    with_block(
        plain("ECLV", "line_data_eclv", &["total", "baser", "value_baser", "n_pnt"]),
        VarBlock {
            table: "line_data_eclv_pnt",
            counter: 3,
            start: 4,
            columns: &["x_pnt_i", "y_pnt_i"],
            shape: BlockShape::Linear,
        },
    ),
    plain(
        "ECNT",
        "line_data_ecnt",
        &[
            "total", "n_ens", "crps", "crpss", "ign", "me", "rmse", "spread", "me_oerr",
            "rmse_oerr", "spread_oerr", "spread_plus_oerr", "crpscl", "crps_emp",
            "crps_emp_fair", "spread_md", "mae", "mae_oerr", "bias_ratio", "n_ge_obs",
            "me_ge_obs", "n_lt_obs", "me_lt_obs",
        ],
    ),
    with_alpha(plain(
        "RPS",
        "line_data_rps",
        &[
            "total", "n_prob", "rps_rel", "rps_res", "rps_unc", "rps", "rpss", "rpss_smpl",
            "rps_comp",
        ],
    )),
    with_block(
        plain("RHIST", "line_data_rhist", &["total", "n_rank"]),
        VarBlock {
            table: "line_data_rhist_rank",
            counter: 1,
            start: 2,
            columns: &["rank_i"],
            shape: BlockShape::Linear,
        },
    ),
    with_block(
        plain("PHIST", "line_data_phist", &["total", "bin_size", "n_bin"]),
        VarBlock {
            table: "line_data_phist_bin",
            counter: 2,
            start: 3,
            columns: &["bin_i"],
            shape: BlockShape::Linear,
        },
    ),
    with_block(
        plain("RELP", "line_data_relp", &["total", "n_ens"]),
        VarBlock {
            table: "line_data_relp_ens",
            counter: 1,
            start: 2,
            columns: &["ens_i"],
            shape: BlockShape::Linear,
        },
    ),
    with_block(
        plain(
            "ORANK",
            "line_data_orank",
            &[
                "total", "orank_index", "obs_sid", "obs_lat", "obs_lon", "obs_lvl", "obs_elv",
                "obs", "pit", "rank", "n_ens_vld", "n_ens", "obs_qc", "ens_mean",
                "climo_mean", "spread", "ens_mean_oerr", "spread_oerr", "spread_plus_oerr",
                "climo_stdev",
            ],
        ),
        VarBlock {
            table: "line_data_orank_ens",
            counter: 11,
            start: 12,
            columns: &["ens_i"],
            shape: BlockShape::Linear,
        },
    ),
    with_alpha(plain("SSVAR", "line_data_ssvar", SSVAR_COLUMNS)),
    with_alpha(plain("VCNT", "line_data_vcnt", VCNT_COLUMNS)),
    plain(
        "NBRCTC",
        "line_data_nbrctc",
        &["total", "fy_oy", "fy_on", "fn_oy", "fn_on"],
    ),
    with_alpha(plain("NBRCTS", "line_data_nbrcts", cts_columns!())),
    with_alpha(plain(
        "NBRCNT",
        "line_data_nbrcnt",
        &[
            "total", "fbs", "fbs_bcl", "fbs_bcu", "fss", "fss_bcl", "fss_bcu", "afss",
            "afss_bcl", "afss_bcu", "ufss", "ufss_bcl", "ufss_bcu", "f_rate", "f_rate_bcl",
            "f_rate_bcu", "o_rate", "o_rate_bcl", "o_rate_bcu",
        ],
    )),
    plain("ENSCNT", "line_data_enscnt", ENSCNT_COLUMNS),
    with_alpha(plain(
        "DMAP",
        "line_data_dmap",
        &[
            "total", "fy", "oy", "fbias", "baddeley", "hausdorff", "med_fo", "med_of",
            "med_min", "med_max", "med_mean", "fom_fo", "fom_of", "fom_min", "fom_max",
            "fom_mean", "zhu_fo", "zhu_of", "zhu_min", "zhu_max", "zhu_mean", "g", "gbeta",
            "beta_value",
        ],
    )),
    plain(
        "MPR",
        "line_data_mpr",
        &[
            "total", "mp_index", "obs_sid", "obs_lat", "obs_lon", "obs_lvl", "obs_elv",
            "mpr_fcst", "mpr_obs", "mpr_climo", "obs_qc", "climo_mean", "climo_stdev",
            "climo_cdf",
        ],
    ),
    plain(
        "SEEPS",
        "line_data_seeps",
        &[
            "total", "s12", "s13", "s21", "s23", "s31", "s32", "pf1", "pf2", "pf3", "pv1",
            "pv2", "pv3", "mean_fcst", "mean_obs", "seeps",
        ],
    ),
    with_alpha(plain(
        "SSIDX",
        "line_data_ssidx",
        &["fcst_model", "ref_model", "n_init", "n_term", "n_vld", "ss_index"],
    )),
];

/// Catalogue of supported TCST line types
pub static TCST_LINE_TYPES: &[LineTypeSchema] = &[
    plain(
        "TCMPR",
        "line_data_tcmpr",
        &[
            "total", "index_pair", "level", "watch_warn", "initials", "alat", "alon", "blat",
            "blon", "tk_err", "x_err", "y_err", "altk_err", "crtk_err", "adland", "bdland",
            "amslp", "bmslp", "amax_wind", "bmax_wind",
            "aal_wind_34", "bal_wind_34", "ane_wind_34", "bne_wind_34", "ase_wind_34",
            "bse_wind_34", "asw_wind_34", "bsw_wind_34", "anw_wind_34", "bnw_wind_34",
            "aal_wind_50", "bal_wind_50", "ane_wind_50", "bne_wind_50", "ase_wind_50",
            "bse_wind_50", "asw_wind_50", "bsw_wind_50", "anw_wind_50", "bnw_wind_50",
            "aal_wind_64", "bal_wind_64", "ane_wind_64", "bne_wind_64", "ase_wind_64",
            "bse_wind_64", "asw_wind_64", "bsw_wind_64", "anw_wind_64", "bnw_wind_64",
            "aradp", "bradp", "arrp", "brrp", "amrd", "bmrd", "agusts", "bgusts", "aeye",
            "beye", "adir", "bdir", "aspeed", "bspeed", "adepth", "bdepth",
        ],
    ),
    with_block(
        plain(
            "PROBRIRW",
            "line_data_probrirw",
            &[
                "total", "index_pair", "alat", "alon", "blat", "blon", "initials", "tk_err",
                "x_err", "y_err", "adland", "bdland", "ri_beg", "ri_end", "ri_window",
                "awind_end", "bwind_beg", "bwind_end", "bdelta", "bdelta_max", "blevel_beg",
                "blevel_end", "n_thresh",
            ],
        ),
        VarBlock {
            table: "line_data_probrirw_thresh",
            counter: 22,
            start: 23,
            columns: &["thresh_i", "prob_i"],
            shape: BlockShape::Linear,
        },
    ),
];
