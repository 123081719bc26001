//! Stateless helper utilities shared by the layout engines and the writer.

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::error::{MergeHeadError, Result};
use crate::spec::SpecMergeRegion;

////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    // Excel rejects a leading or trailing apostrophe.
    c_name = c_name.trim().trim_matches('\'').trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Create suffixed sheet name (`base__2`, `base__3`, ...), respecting length cap.
pub fn create_sheet_identifier(base_name: &str, part_idx: usize) -> String {
    let c_sheet_name_suffix = format!("__{part_idx}");
    let n_len_base_name_max = N_LEN_EXCEL_SHEET_NAME_MAX.saturating_sub(c_sheet_name_suffix.len());

    let c_sheet_name_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_name_max))
        .collect();

    format!("{c_sheet_name_base}{c_sheet_name_suffix}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetBounds

/// Convert a sheet row index, rejecting rows past the Excel limit.
pub fn cast_row_num(value: usize) -> Result<u32> {
    if value >= N_NROWS_EXCEL_MAX {
        return Err(MergeHeadError::Configuration(format!(
            "row index {value} exceeds Excel limit ({N_NROWS_EXCEL_MAX} rows)."
        )));
    }
    u32::try_from(value)
        .map_err(|_| MergeHeadError::Configuration(format!("row index overflow: {value}")))
}

/// Convert a sheet column index, rejecting columns past the Excel limit.
pub fn cast_col_num(value: usize) -> Result<u16> {
    if value >= N_NCOLS_EXCEL_MAX {
        return Err(MergeHeadError::Configuration(format!(
            "column index {value} exceeds Excel limit ({N_NCOLS_EXCEL_MAX} columns)."
        )));
    }
    u16::try_from(value)
        .map_err(|_| MergeHeadError::Configuration(format!("column index overflow: {value}")))
}

/// Check that a `height` x `width` block anchored at `row_start` fits on one sheet.
pub fn validate_block_bounds(row_start: usize, height: usize, width: usize) -> Result<()> {
    if height > 0 {
        cast_row_num(row_start + height - 1)?;
    }
    if width > 0 {
        cast_col_num(width - 1)?;
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region BlockMergeUtils

/// One labelled run of columns inside a block row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecGridRun {
    /// Identity used for merge detection (label, field key, ...).
    pub key: String,
    /// First column of the run.
    pub col_start: usize,
    /// Number of columns (>= 1).
    pub span: usize,
    /// Whether the run may continue vertically into a matching run.
    pub if_mergeable: bool,
}

impl SpecGridRun {
    /// Mergeable run.
    pub fn new(key: impl Into<String>, col_start: usize, span: usize) -> Self {
        Self {
            key: key.into(),
            col_start,
            span,
            if_mergeable: true,
        }
    }

    /// Run that never merges vertically.
    pub fn isolated(key: impl Into<String>, col_start: usize, span: usize) -> Self {
        Self {
            if_mergeable: false,
            ..Self::new(key, col_start, span)
        }
    }

    fn continues(&self, other: &SpecGridRun) -> bool {
        self.if_mergeable
            && other.if_mergeable
            && self.col_start == other.col_start
            && self.span == other.span
            && self.key == other.key
    }
}

/// Visible cell planned by [`plan_block_merges`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecBlockAnchor {
    /// Block-local row index.
    pub row: usize,
    /// Index of the run within its row.
    pub idx_run: usize,
    /// Merge region (absolute rows) when the cell spans more than one cell.
    pub merge: Option<SpecMergeRegion>,
}

fn find_run_at(row_runs: &[SpecGridRun], col_start: usize) -> Option<&SpecGridRun> {
    row_runs.iter().find(|run| run.col_start == col_start)
}

/// Plan visible cells and merge regions for a block of labelled runs.
///
/// A run whose row above holds an identical mergeable run (same key, same
/// column extent) is covered by the merge from above and gets no anchor.
/// Otherwise it becomes an anchor whose region extends right over its span
/// and down while the rows below repeat it.
pub fn plan_block_merges(rows: &[Vec<SpecGridRun>], row_start: usize) -> Vec<SpecBlockAnchor> {
    let n_rows = rows.len();
    let mut l_anchors = Vec::new();

    for (n_idx_row, v_row_runs) in rows.iter().enumerate() {
        for (n_idx_run, run) in v_row_runs.iter().enumerate() {
            if n_idx_row > 0
                && find_run_at(&rows[n_idx_row - 1], run.col_start)
                    .is_some_and(|run_above| run_above.continues(run))
            {
                continue;
            }

            let mut n_row_idx_end = n_idx_row;
            while n_row_idx_end + 1 < n_rows
                && find_run_at(&rows[n_row_idx_end + 1], run.col_start)
                    .is_some_and(|run_below| run.continues(run_below))
            {
                n_row_idx_end += 1;
            }

            let merge = if run.span > 1 || n_row_idx_end > n_idx_row {
                Some(SpecMergeRegion {
                    row_start: row_start + n_idx_row,
                    row_end: row_start + n_row_idx_end,
                    col_start: run.col_start,
                    col_end: run.col_start + run.span - 1,
                })
            } else {
                None
            };

            l_anchors.push(SpecBlockAnchor {
                row: n_idx_row,
                idx_run: n_idx_run,
                merge,
            });
        }
    }

    l_anchors
}

/// Check that no two regions share a cell.
pub fn validate_disjoint_merges(merges: &[SpecMergeRegion]) -> Result<()> {
    for (n_idx, region) in merges.iter().enumerate() {
        if let Some(region_other) = merges[n_idx + 1..].iter().find(|r| r.overlaps(region)) {
            return Err(MergeHeadError::Configuration(format!(
                "merge regions overlap: {region:?} and {region_other:?}"
            )));
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
