//! `mergehead_xlsx`:
//! tabular XLSX export with merged multi-level headers.
//!
//! Modules:
//! - `conf`      : constants and default presets
//! - `spec`      : specs/models/options
//! - `error`     : crate error type
//! - `util`      : sheet naming, bounds and merge planning helpers
//! - `record`    : field access by name
//! - `header`    : header layout engine (flat / two-level / N-level)
//! - `projector` : record -> cell coercion and column widths
//! - `object`    : single-record form layouts
//! - `source`    : Polars DataFrame record source
//! - `writer`    : `rust_xlsxwriter` materializer
pub mod conf;
pub mod error;
pub mod header;
pub mod object;
pub mod projector;
pub mod record;
pub mod source;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    C_FMT_DATE_DEFAULT, C_FMT_DATETIME_DEFAULT, EnumFmtKey, N_NCOLS_EXCEL_MAX,
    N_NCOLS_SHEET_TITLE, N_NROWS_EXCEL_MAX, N_NROWS_SHEET_TITLE, N_NROWS_TABLE_GAP,
    N_WIDTH_COL_MIN_DEFAULT, derive_default_export_formats, derive_default_export_options,
};
pub use error::{MergeHeadError, Result};
pub use header::{layout_header, layout_header_grid, normalize_header, validate_header_grid};
pub use object::layout_object_table;
pub use projector::{ColumnWidthTracker, convert_field_value, project_field, project_rows};
pub use record::{FieldAccessor, SpecRecord};
pub use source::{DataFrameRecords, DataFrameRow, convert_any_value};
pub use spec::{
    EnumCellValue, EnumFieldValue, EnumHeaderSpec, EnumObjectSpan, SpecCellFormat,
    SpecExportOptions, SpecExportReport, SpecGridCell, SpecHeaderGrid, SpecHeaderLayout,
    SpecHeaderNode, SpecMergeRegion, SpecObjectLayout, SpecObjectTemplate, SpecProjection,
    SpecTableReport,
};
pub use util::{sanitize_sheet_name, validate_disjoint_merges};
pub use writer::{XlsxExporter, export_table};
