//! Shared export specification models.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::conf::{
    C_FMT_DATE_DEFAULT, C_FMT_DATETIME_DEFAULT, N_NCOLS_SHEET_TITLE, N_NROWS_SHEET_TITLE,
    N_WIDTH_COL_MIN_DEFAULT,
};
use crate::error::{MergeHeadError, Result};

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification for the canned title/header/body styles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ValueSpecification

/// Raw value read off a record by field name.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumFieldValue {
    /// Missing/null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Binary floating-point value.
    Float(f64),
    /// Exact decimal, kept in its textual form (e.g. `"12.50"`).
    Decimal(String),
    /// Text value.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time of day.
    DateTime(NaiveDateTime),
}

impl From<&str> for EnumFieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EnumFieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for EnumFieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for EnumFieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<i64> for EnumFieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for EnumFieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for EnumFieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for EnumFieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<EnumFieldValue>> From<Option<T>> for EnumFieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Cell value after coercion, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Text cell.
    String(String),
    /// Numeric cell, with the text used for width measurement.
    Number(f64, String),
}

impl EnumCellValue {
    /// Rendered string form of the cell.
    pub fn as_text(&self) -> &str {
        match self {
            Self::String(val) => val,
            Self::Number(_, val) => val,
        }
    }

    /// Blank text cell.
    pub fn empty() -> Self {
        Self::String(String::new())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderSpecification

/// Declarative header description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumHeaderSpec {
    /// One header row: field name -> display name.
    Flat(IndexMap<String, String>),
    /// Two header rows: group label -> (field name -> display name).
    Tree(IndexMap<String, IndexMap<String, String>>),
    /// N header rows: `levels` map label -> span; `leaves` is the bottom row.
    Grid {
        /// Upper levels, top first.
        levels: Vec<IndexMap<String, usize>>,
        /// Bottom level: field name -> display name.
        leaves: IndexMap<String, String>,
    },
}

/// One header label in the normalized grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHeaderNode {
    /// Display text.
    pub label: String,
    /// Number of grid columns under this label (always 1 for leaves).
    pub span: usize,
    /// Bound source field, set on leaves only.
    pub field: Option<String>,
}

impl SpecHeaderNode {
    /// Non-leaf label over `span` columns.
    pub fn group(label: impl Into<String>, span: usize) -> Self {
        Self {
            label: label.into(),
            span,
            field: None,
        }
    }

    /// Leaf label bound to `field`.
    pub fn leaf(field: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            span: 1,
            field: Some(field.into()),
        }
    }
}

/// Canonical header form: one row of nodes per level, top first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHeaderGrid {
    /// Nodes per level; the last level holds the leaves.
    pub levels: Vec<Vec<SpecHeaderNode>>,
}

/// Inclusive rectangular merge region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecMergeRegion {
    /// First row.
    pub row_start: usize,
    /// Last row.
    pub row_end: usize,
    /// First column.
    pub col_start: usize,
    /// Last column.
    pub col_end: usize,
}

impl SpecMergeRegion {
    /// Number of rows covered.
    pub fn height(&self) -> usize {
        self.row_end - self.row_start + 1
    }

    /// Number of columns covered.
    pub fn width(&self) -> usize {
        self.col_end - self.col_start + 1
    }

    /// Whether `(row, col)` lies inside the region.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_start..=self.row_end).contains(&row)
            && (self.col_start..=self.col_end).contains(&col)
    }

    /// Whether two regions share at least one cell.
    pub fn overlaps(&self, other: &SpecMergeRegion) -> bool {
        self.row_start <= other.row_end
            && other.row_start <= self.row_end
            && self.col_start <= other.col_end
            && other.col_start <= self.col_end
    }
}

/// One visible (anchor) cell with absolute sheet coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecGridCell {
    /// Sheet row.
    pub row: usize,
    /// Sheet column.
    pub col: usize,
    /// Cell content.
    pub value: EnumCellValue,
}

/// Result of laying out one header.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecHeaderLayout {
    /// Leaf field names, one per column.
    pub fields: Vec<String>,
    /// Leaf display labels, one per column.
    pub labels: Vec<String>,
    /// Visible header cells (merge anchors included).
    pub cells: Vec<SpecGridCell>,
    /// Merge regions, absolute sheet coordinates.
    pub merges: Vec<SpecMergeRegion>,
    /// Column count.
    pub width: usize,
    /// Header row count.
    pub height: usize,
    /// First header row.
    pub row_start: usize,
    /// First row after the header.
    pub row_next: usize,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region BodySpecification

/// Projected table body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecProjection {
    /// One row of cells per record.
    pub rows: Vec<Vec<EnumCellValue>>,
    /// Final column widths in characters.
    pub widths: Vec<usize>,
}

/// Placement of one object-template key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumObjectSpan {
    /// Key (field value or literal label) over `n` columns.
    Span(usize),
    /// List-valued field; one element per row, one column per sub-field.
    Records(Vec<String>),
}

/// Free-form layout for rendering one record as a form-like block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecObjectTemplate {
    /// Template rows, top first; an empty row is a blank spacer row.
    pub rows: Vec<IndexMap<String, EnumObjectSpan>>,
}

/// Rendered object table.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecObjectLayout {
    /// Visible cells (merge anchors included).
    pub cells: Vec<SpecGridCell>,
    /// Merge regions, absolute sheet coordinates.
    pub merges: Vec<SpecMergeRegion>,
    /// Final column widths in characters.
    pub widths: Vec<usize>,
    /// Column count.
    pub width: usize,
    /// First row.
    pub row_start: usize,
    /// First row after the block.
    pub row_next: usize,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Export-wide settings passed explicitly into layout and projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExportOptions {
    /// Minimum final column width.
    pub width_col_min: usize,
    /// `chrono` strftime pattern for dates.
    pub fmt_date: String,
    /// `chrono` strftime pattern for date-times.
    pub fmt_datetime: String,
    /// Columns covered by a sheet title.
    pub ncols_sheet_title: usize,
    /// Rows covered by a sheet title.
    pub nrows_sheet_title: usize,
}

impl Default for SpecExportOptions {
    fn default() -> Self {
        Self {
            width_col_min: N_WIDTH_COL_MIN_DEFAULT,
            fmt_date: C_FMT_DATE_DEFAULT.to_string(),
            fmt_datetime: C_FMT_DATETIME_DEFAULT.to_string(),
            ncols_sheet_title: N_NCOLS_SHEET_TITLE,
            nrows_sheet_title: N_NROWS_SHEET_TITLE,
        }
    }
}

impl SpecExportOptions {
    /// Reject settings that would fail later at write time.
    pub fn validate(&self) -> Result<()> {
        if self.width_col_min > 255 {
            return Err(MergeHeadError::Configuration(format!(
                "width_col_min must be <= 255, got {}.",
                self.width_col_min
            )));
        }
        if self.ncols_sheet_title == 0 || self.nrows_sheet_title == 0 {
            return Err(MergeHeadError::Configuration(
                "sheet title block must cover >= 1 row and >= 1 column.".to_string(),
            ));
        }
        for (c_name, c_pattern) in [
            ("fmt_date", &self.fmt_date),
            ("fmt_datetime", &self.fmt_datetime),
        ] {
            if StrftimeItems::new(c_pattern).any(|item| matches!(item, Item::Error)) {
                return Err(MergeHeadError::Configuration(format!(
                    "{c_name} is not a valid strftime pattern: {c_pattern:?}"
                )));
            }
        }

        // A pattern can parse yet still need fields the value lacks (`%H` on a date).
        let mut c_sample = String::new();
        if write!(c_sample, "{}", NaiveDate::default().format(&self.fmt_date)).is_err() {
            return Err(MergeHeadError::Configuration(format!(
                "fmt_date pattern {:?} needs fields a date does not carry.",
                self.fmt_date
            )));
        }
        if write!(
            c_sample,
            "{}",
            NaiveDateTime::default().format(&self.fmt_datetime)
        )
        .is_err()
        {
            return Err(MergeHeadError::Configuration(format!(
                "fmt_datetime pattern {:?} needs fields a date-time does not carry.",
                self.fmt_datetime
            )));
        }
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// One written table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecTableReport {
    /// Sheet the table was written to.
    pub sheet_name: String,
    /// First row (title or header).
    pub row_start_inclusive: usize,
    /// Row after the last body row.
    pub row_end_exclusive: usize,
    /// Column count.
    pub width: usize,
    /// Records projected.
    pub n_records: usize,
    /// Merge regions registered (titles included).
    pub n_merges: usize,
}

/// Whole-export report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecExportReport {
    /// Tables in write order.
    pub tables: Vec<SpecTableReport>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecExportReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        log::warn!("{}", msg.as_ref());
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_region_overlap_and_contains() {
        let region_a = SpecMergeRegion {
            row_start: 0,
            row_end: 1,
            col_start: 0,
            col_end: 0,
        };
        let region_b = SpecMergeRegion {
            row_start: 0,
            row_end: 0,
            col_start: 1,
            col_end: 3,
        };
        assert!(!region_a.overlaps(&region_b));
        assert!(region_a.overlaps(&region_a));
        assert!(region_b.contains(0, 2));
        assert!(!region_b.contains(1, 2));
        assert_eq!((region_a.height(), region_a.width()), (2, 1));
        assert_eq!((region_b.height(), region_b.width()), (1, 3));
    }

    #[test]
    fn test_options_validate_rejects_bad_pattern() {
        let options = SpecExportOptions {
            fmt_date: "%Y-%Q".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(MergeHeadError::Configuration(_))
        ));
        assert!(SpecExportOptions::default().validate().is_ok());
    }

    #[test]
    fn test_options_validate_rejects_pattern_the_value_cannot_fill() {
        let options_date = SpecExportOptions {
            fmt_date: "%Y-%m-%d %H:%M:%S".to_string(),
            ..Default::default()
        };
        let options_datetime = SpecExportOptions {
            fmt_datetime: "%Y-%m-%d %H:%M:%S %z".to_string(),
            ..Default::default()
        };
        let options_date_ok = SpecExportOptions {
            fmt_date: "%Y年%m月%d日".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            options_date.validate(),
            Err(MergeHeadError::Configuration(ref msg)) if msg.contains("fmt_date")
        ));
        assert!(matches!(
            options_datetime.validate(),
            Err(MergeHeadError::Configuration(ref msg)) if msg.contains("fmt_datetime")
        ));
        assert!(options_date_ok.validate().is_ok());
    }

    #[test]
    fn test_field_value_from_option() {
        assert_eq!(EnumFieldValue::from(None::<i64>), EnumFieldValue::Null);
        assert_eq!(EnumFieldValue::from(Some("a")), EnumFieldValue::Text("a".into()));
        assert_eq!(EnumFieldValue::from(7), EnumFieldValue::Integer(7));
    }
}
