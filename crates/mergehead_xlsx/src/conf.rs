//! Export constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecCellFormat, SpecExportOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Minimum body column width, in characters.
pub const N_WIDTH_COL_MIN_DEFAULT: usize = 10;
/// Columns covered by a sheet title block.
pub const N_NCOLS_SHEET_TITLE: usize = 23;
/// Rows covered by a sheet title block.
pub const N_NROWS_SHEET_TITLE: usize = 2;
/// Blank rows left after each table body.
pub const N_NROWS_TABLE_GAP: usize = 1;

/// Default `chrono` pattern for date-only values.
pub const C_FMT_DATE_DEFAULT: &str = "%Y-%m-%d";
/// Default `chrono` pattern for date-time values.
pub const C_FMT_DATETIME_DEFAULT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical format preset keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnumFmtKey {
    /// Sheet title block.
    SheetTitle,
    /// Table title row.
    TableTitle,
    /// Header cell.
    Header,
    /// Body cell.
    Body,
}

impl EnumFmtKey {
    /// Preset lookup key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SheetTitle => "sheet_title",
            Self::TableTitle => "table_title",
            Self::Header => "header",
            Self::Body => "body",
        }
    }
}

/// Build default named format presets used by [`crate::writer::XlsxExporter`].
pub fn derive_default_export_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_centered_fmt_spec = SpecCellFormat {
        bold: Some(true),
        align: Some("center".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(
        EnumFmtKey::SheetTitle.as_str().to_string(),
        cfg_centered_fmt_spec.with_(SpecCellFormat {
            font_size: Some(14),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::TableTitle.as_str().to_string(),
        cfg_centered_fmt_spec.with_(SpecCellFormat {
            font_size: Some(12),
            // Excel "Grey 25%".
            bg_color: Some("#C0C0C0".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Header.as_str().to_string(),
        cfg_centered_fmt_spec.with_(SpecCellFormat {
            text_wrap: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Body.as_str().to_string(),
        SpecCellFormat::default(),
    );

    dict_fmt
}

/// Build default export options.
pub fn derive_default_export_options() -> SpecExportOptions {
    SpecExportOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formats_cover_every_key() {
        let dict_fmt = derive_default_export_formats();
        for key in [
            EnumFmtKey::SheetTitle,
            EnumFmtKey::TableTitle,
            EnumFmtKey::Header,
            EnumFmtKey::Body,
        ] {
            assert!(dict_fmt.contains_key(key.as_str()), "missing {key:?}");
        }
        assert_eq!(dict_fmt["sheet_title"].font_size, Some(14));
        assert_eq!(dict_fmt["table_title"].bg_color.as_deref(), Some("#C0C0C0"));
        assert_eq!(dict_fmt["header"].text_wrap, Some(true));
        assert_eq!(dict_fmt["body"], SpecCellFormat::default());
    }
}
