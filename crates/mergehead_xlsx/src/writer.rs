//! Workbook materializer: writes planned layouts through `rust_xlsxwriter`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::conf::{EnumFmtKey, N_NROWS_TABLE_GAP, derive_default_export_formats};
use crate::error::{MergeHeadError, Result};
use crate::header::layout_header;
use crate::object::layout_object_table;
use crate::projector::project_rows;
use crate::record::FieldAccessor;
use crate::spec::{
    EnumCellValue, EnumHeaderSpec, SpecCellFormat, SpecExportOptions, SpecExportReport,
    SpecGridCell, SpecMergeRegion, SpecObjectTemplate, SpecTableReport,
};
use crate::util::{
    cast_col_num, cast_row_num, create_sheet_identifier, sanitize_sheet_name,
    validate_block_bounds,
};

////////////////////////////////////////////////////////////////////////////////
// #region ExporterFormats

/// Resolved `rust_xlsxwriter` formats, one per canned style.
struct SpecExportFormats {
    sheet_title: Format,
    table_title: Format,
    header: Format,
    body: Format,
}

impl SpecExportFormats {
    fn new(dict_fmt: &BTreeMap<String, SpecCellFormat>) -> Self {
        let derive_format = |key: EnumFmtKey| {
            dict_fmt
                .get(key.as_str())
                .map(derive_rust_xlsx_format)
                .unwrap_or_else(Format::new)
        };
        Self {
            sheet_title: derive_format(EnumFmtKey::SheetTitle),
            table_title: derive_format(EnumFmtKey::TableTitle),
            header: derive_format(EnumFmtKey::Header),
            body: derive_format(EnumFmtKey::Body),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxExporter

/// Stateful workbook builder.
///
/// Tables are stacked on a sheet by threading the returned "next row" into
/// the following call. Everything stays in memory until one of the `save*`
/// methods serializes the workbook.
pub struct XlsxExporter {
    workbook: Workbook,
    options: SpecExportOptions,
    formats: SpecExportFormats,
    l_sheet_names: Vec<String>,
    set_sheet_names_existing: BTreeSet<String>,
    l_widths_by_sheet: Vec<Vec<usize>>,
    report: SpecExportReport,
}

impl XlsxExporter {
    /// Create an exporter with the default cell styles.
    pub fn new(options: SpecExportOptions) -> Result<Self> {
        Self::with_formats(options, BTreeMap::new())
    }

    /// Create an exporter, overlaying `dict_fmt_overrides` onto the default styles.
    ///
    /// Keys are `sheet_title`, `table_title`, `header` and `body`.
    pub fn with_formats(
        options: SpecExportOptions,
        dict_fmt_overrides: BTreeMap<String, SpecCellFormat>,
    ) -> Result<Self> {
        options.validate()?;

        let mut dict_fmt = derive_default_export_formats();
        for (c_key, fmt_patch) in dict_fmt_overrides {
            let Some(fmt_base) = dict_fmt.get_mut(&c_key) else {
                return Err(MergeHeadError::Configuration(format!(
                    "unknown format key {c_key:?}; expected one of sheet_title, table_title, header, body."
                )));
            };
            *fmt_base = fmt_base.merge(&fmt_patch);
        }

        Ok(Self {
            workbook: Workbook::new(),
            options,
            formats: SpecExportFormats::new(&dict_fmt),
            l_sheet_names: Vec::new(),
            set_sheet_names_existing: BTreeSet::new(),
            l_widths_by_sheet: Vec::new(),
            report: SpecExportReport::default(),
        })
    }

    /// Options in effect.
    pub fn options(&self) -> &SpecExportOptions {
        &self.options
    }

    /// Snapshot of everything written so far.
    pub fn report(&self) -> SpecExportReport {
        self.report.clone()
    }

    /// Final name of sheet `sheet`.
    pub fn sheet_name(&self, sheet: usize) -> Option<&str> {
        self.l_sheet_names.get(sheet).map(String::as_str)
    }

    /// Current column widths of sheet `sheet`.
    pub fn column_widths(&self, sheet: usize) -> Option<&[usize]> {
        self.l_widths_by_sheet.get(sheet).map(Vec::as_slice)
    }

    /// Append a worksheet and return its index.
    ///
    /// The name is sanitized and, when taken, suffixed (`name__2`, ...).
    /// A name the workbook rejects leaves the exporter unchanged.
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        let c_name_clean = sanitize_sheet_name(name, "_");
        let c_name_final = self.derive_unique_sheet_name(&c_name_clean);

        let mut worksheet = Worksheet::new();
        worksheet.set_name(c_name_final.as_str())?;
        self.workbook.push_worksheet(worksheet);
        self.set_sheet_names_existing
            .insert(c_name_final.to_lowercase());

        if c_name_final != name {
            self.report
                .warn(format!("sheet name {name:?} written as {c_name_final:?}."));
        }
        self.l_sheet_names.push(c_name_final);
        self.l_widths_by_sheet.push(Vec::new());
        Ok(self.l_sheet_names.len() - 1)
    }

    /// Write a sheet title block at `row`; returns the row after it.
    pub fn write_sheet_title(&mut self, sheet: usize, row: usize, title: &str) -> Result<usize> {
        self.validate_sheet(sheet)?;
        let region = SpecMergeRegion {
            row_start: row,
            row_end: row + self.options.nrows_sheet_title - 1,
            col_start: 0,
            col_end: self.options.ncols_sheet_title - 1,
        };
        validate_block_bounds(row, region.height(), region.width())?;

        let worksheet = self.workbook.worksheet_from_index(sheet)?;
        write_text_block(worksheet, &region, title, &self.formats.sheet_title)?;
        Ok(region.row_end + 1)
    }

    /// Write a table title over `width` columns at `row`; returns `row + 1`.
    pub fn write_table_title(
        &mut self,
        sheet: usize,
        row: usize,
        title: &str,
        width: usize,
    ) -> Result<usize> {
        self.validate_sheet(sheet)?;
        if width == 0 {
            return Err(MergeHeadError::Configuration(
                "table title needs a width of >= 1 column.".to_string(),
            ));
        }
        let region = SpecMergeRegion {
            row_start: row,
            row_end: row,
            col_start: 0,
            col_end: width - 1,
        };
        validate_block_bounds(row, 1, width)?;

        let worksheet = self.workbook.worksheet_from_index(sheet)?;
        write_text_block(worksheet, &region, title, &self.formats.table_title)?;
        Ok(row + 1)
    }

    /// Write an optional table title, the header and one body row per record.
    ///
    /// Returns the row to start the next table at, one blank row below the body.
    /// The header and body are fully planned before any cell is written.
    pub fn write_table<I>(
        &mut self,
        sheet: usize,
        row: usize,
        header: &EnumHeaderSpec,
        records: I,
        table_title: Option<&str>,
    ) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: FieldAccessor,
    {
        self.validate_sheet(sheet)?;

        let n_row_header = row + usize::from(table_title.is_some());
        let layout = layout_header(header, n_row_header)?;
        let projection = project_rows(&layout.fields, records, &self.options)?;
        let n_row_end = layout.row_next + projection.rows.len();
        validate_block_bounds(layout.row_next, projection.rows.len(), layout.width)?;

        let mut n_merges = layout.merges.len();
        if let Some(c_title) = table_title {
            self.write_table_title(sheet, row, c_title, layout.width)?;
            n_merges += usize::from(layout.width > 1);
        }

        let worksheet = self.workbook.worksheet_from_index(sheet)?;
        write_grid_cells(worksheet, &layout.cells, &layout.merges, &self.formats.header)?;
        for (n_idx_row, v_row) in projection.rows.iter().enumerate() {
            let n_row_sheet = layout.row_next + n_idx_row;
            for (n_idx_col, value) in v_row.iter().enumerate() {
                write_cell_with_format(worksheet, n_row_sheet, n_idx_col, value, &self.formats.body)?;
            }
        }
        apply_column_widths(
            worksheet,
            &mut self.l_widths_by_sheet[sheet],
            &projection.widths,
        )?;

        log::debug!(
            "table written to sheet #{sheet}: rows {row}..{n_row_end}, {} column(s), {} record(s)",
            layout.width,
            projection.rows.len()
        );
        self.report.tables.push(SpecTableReport {
            sheet_name: self.l_sheet_names[sheet].clone(),
            row_start_inclusive: row,
            row_end_exclusive: n_row_end,
            width: layout.width,
            n_records: projection.rows.len(),
            n_merges,
        });

        Ok(n_row_end + N_NROWS_TABLE_GAP)
    }

    /// Render one record through a free-form template at `row`.
    ///
    /// Returns the row to start the next table at, one blank row below the block.
    pub fn write_object_table(
        &mut self,
        sheet: usize,
        row: usize,
        template: &SpecObjectTemplate,
        record: &dyn FieldAccessor,
    ) -> Result<usize> {
        self.validate_sheet(sheet)?;

        let layout = layout_object_table(template, record, row, &self.options)?;
        let worksheet = self.workbook.worksheet_from_index(sheet)?;
        write_grid_cells(worksheet, &layout.cells, &layout.merges, &self.formats.body)?;
        apply_column_widths(worksheet, &mut self.l_widths_by_sheet[sheet], &layout.widths)?;

        self.report.tables.push(SpecTableReport {
            sheet_name: self.l_sheet_names[sheet].clone(),
            row_start_inclusive: row,
            row_end_exclusive: layout.row_next,
            width: layout.width,
            n_records: 1,
            n_merges: layout.merges.len(),
        });

        Ok(layout.row_next + N_NROWS_TABLE_GAP)
    }

    /// Serialize the workbook to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.validate_not_empty()?;
        self.workbook.save(path.as_ref())?;
        log::info!(
            "workbook saved to {}: {} sheet(s), {} table(s)",
            path.as_ref().display(),
            self.l_sheet_names.len(),
            self.report.tables.len()
        );
        Ok(())
    }

    /// Serialize the workbook into memory.
    pub fn save_to_buffer(&mut self) -> Result<Vec<u8>> {
        self.validate_not_empty()?;
        Ok(self.workbook.save_to_buffer()?)
    }

    /// Serialize the workbook, write every byte to `writer`, then flush it.
    pub fn save_to_writer<W: Write>(&mut self, mut writer: W) -> Result<()> {
        let v_bytes = self.save_to_buffer()?;
        writer.write_all(&v_bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn validate_sheet(&self, sheet: usize) -> Result<()> {
        if sheet >= self.l_sheet_names.len() {
            return Err(MergeHeadError::Configuration(format!(
                "sheet index {sheet} out of range ({} sheet(s) added).",
                self.l_sheet_names.len()
            )));
        }
        Ok(())
    }

    fn validate_not_empty(&self) -> Result<()> {
        if self.l_sheet_names.is_empty() {
            return Err(MergeHeadError::Configuration(
                "workbook has no sheets; call add_sheet() first.".to_string(),
            ));
        }
        Ok(())
    }

    /// Excel compares sheet names case-insensitively.
    fn derive_unique_sheet_name(&self, name: &str) -> String {
        let if_taken =
            |candidate: &str| self.set_sheet_names_existing.contains(&candidate.to_lowercase());
        if !if_taken(name) {
            return name.to_string();
        }

        let mut n_idx = 2usize;
        loop {
            let candidate = create_sheet_identifier(name, n_idx);
            if !if_taken(&candidate) {
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// One-shot export: a single sheet holding an optional sheet title and one table.
pub fn export_table<I>(
    sheet_name: &str,
    sheet_title: Option<&str>,
    table_title: Option<&str>,
    header: &EnumHeaderSpec,
    records: I,
    options: SpecExportOptions,
) -> Result<Vec<u8>>
where
    I: IntoIterator,
    I::Item: FieldAccessor,
{
    let mut exporter = XlsxExporter::new(options)?;
    let sheet = exporter.add_sheet(sheet_name)?;
    let mut n_row = 0;
    if let Some(c_title) = sheet_title {
        n_row = exporter.write_sheet_title(sheet, n_row, c_title)?;
    }
    exporter.write_table(sheet, n_row, header, records, table_title)?;
    exporter.save_to_buffer()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellWriting

fn write_text_block(
    worksheet: &mut Worksheet,
    region: &SpecMergeRegion,
    text: &str,
    format: &Format,
) -> Result<()> {
    if region.height() == 1 && region.width() == 1 {
        return write_cell_with_format(
            worksheet,
            region.row_start,
            region.col_start,
            &EnumCellValue::String(text.to_string()),
            format,
        );
    }
    worksheet.merge_range(
        cast_row_num(region.row_start)?,
        cast_col_num(region.col_start)?,
        cast_row_num(region.row_end)?,
        cast_col_num(region.col_end)?,
        text,
        format,
    )?;
    Ok(())
}

fn write_grid_cells(
    worksheet: &mut Worksheet,
    cells: &[SpecGridCell],
    merges: &[SpecMergeRegion],
    format: &Format,
) -> Result<()> {
    let dict_merge_by_anchor: BTreeMap<(usize, usize), &SpecMergeRegion> = merges
        .iter()
        .map(|region| ((region.row_start, region.col_start), region))
        .collect();

    for cell in cells {
        match dict_merge_by_anchor.get(&(cell.row, cell.col)) {
            Some(region) => match &cell.value {
                EnumCellValue::String(val) => write_text_block(worksheet, region, val, format)?,
                EnumCellValue::Number(val, _) => {
                    write_text_block(worksheet, region, "", format)?;
                    worksheet.write_number_with_format(
                        cast_row_num(cell.row)?,
                        cast_col_num(cell.col)?,
                        *val,
                        format,
                    )?;
                }
            },
            None => write_cell_with_format(worksheet, cell.row, cell.col, &cell.value, format)?,
        }
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<()> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::String(val) if val.is_empty() => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val, _) => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)?;
        }
    }
    Ok(())
}

/// Widen columns to `widths_new`; a column never shrinks.
fn apply_column_widths(
    worksheet: &mut Worksheet,
    widths_current: &mut Vec<usize>,
    widths_new: &[usize],
) -> Result<()> {
    if widths_current.len() < widths_new.len() {
        widths_current.resize(widths_new.len(), 0);
    }
    for (n_idx_col, n_width) in widths_new.iter().enumerate() {
        if *n_width > widths_current[n_idx_col] {
            worksheet.set_column_width(cast_col_num(n_idx_col)?, *n_width as f64)?;
            widths_current[n_idx_col] = *n_width;
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FormatConversion

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }

    for val in [&spec.align, &spec.valign].into_iter().flatten() {
        if let Some(align) = derive_format_align(val) {
            format = format.set_align(align);
        }
    }

    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::record::SpecRecord;

    fn derive_flat_header() -> EnumHeaderSpec {
        EnumHeaderSpec::Flat(
            [("name", "姓名"), ("birthday", "生日")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>(),
        )
    }

    fn derive_students() -> Vec<SpecRecord> {
        vec![
            SpecRecord::new()
                .with("name", "张三三三三三三三三三三三")
                .with("birthday", "1993-01-01"),
            SpecRecord::new().with("name", "李四").with("birthday", None::<String>),
        ]
    }

    fn derive_exporter() -> XlsxExporter {
        match XlsxExporter::new(SpecExportOptions::default()) {
            Ok(exporter) => exporter,
            Err(err) => panic!("exporter: {err}"),
        }
    }

    #[test]
    fn test_titles_return_next_rows() {
        let mut exporter = derive_exporter();
        let sheet = exporter.add_sheet("学生列表").unwrap_or_default();

        assert_eq!(exporter.write_sheet_title(sheet, 0, "学生信息").ok(), Some(2));
        assert_eq!(exporter.write_table_title(sheet, 2, "学生", 2).ok(), Some(3));
        assert_eq!(exporter.write_table_title(sheet, 3, "一列", 1).ok(), Some(4));
        assert!(exporter.write_table_title(sheet, 4, "空", 0).is_err());
        assert!(exporter.write_sheet_title(sheet + 1, 0, "x").is_err());
    }

    #[test]
    fn test_tables_stack_with_gap_and_widths_only_grow() {
        let mut exporter = derive_exporter();
        let sheet = exporter.add_sheet("学生列表").unwrap_or_default();
        let l_students = derive_students();

        let n_row = exporter
            .write_table(sheet, 0, &derive_flat_header(), &l_students, Some("学生"))
            .unwrap_or_default();
        // title + header + 2 body rows + gap
        assert_eq!(n_row, 5);
        assert_eq!(exporter.column_widths(sheet), Some(&[36usize, 10][..]));

        let l_short = vec![SpecRecord::new().with("name", "王五").with("birthday", "1995-05-05")];
        let n_row = exporter
            .write_table(sheet, n_row, &derive_flat_header(), &l_short, None)
            .unwrap_or_default();
        assert_eq!(n_row, 8);
        assert_eq!(exporter.column_widths(sheet), Some(&[36usize, 10][..]));

        let report = exporter.report();
        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.tables[0].row_end_exclusive, 4);
        assert_eq!(report.tables[0].n_merges, 1);
        assert_eq!(report.tables[1].row_start_inclusive, 5);
        assert_eq!(report.tables[1].n_records, 1);
    }

    #[test]
    fn test_write_table_missing_field_fails() {
        let mut exporter = derive_exporter();
        let sheet = exporter.add_sheet("s").unwrap_or_default();
        let l_records = vec![SpecRecord::new().with("name", "张三")];
        let err = exporter
            .write_table(sheet, 0, &derive_flat_header(), &l_records, None)
            .err();
        assert!(
            matches!(err, Some(MergeHeadError::FieldAccess { ref field, record_index: 0 }) if field == "birthday"),
            "{err:?}"
        );
    }

    #[test]
    fn test_sheet_names_are_sanitized_and_unique() {
        let mut exporter = derive_exporter();
        exporter.add_sheet("成绩/2020").unwrap_or_default();
        let sheet_dup = exporter.add_sheet("成绩_2020").unwrap_or_default();
        let sheet_case = exporter.add_sheet("Data").unwrap_or_default();
        let sheet_case_dup = exporter.add_sheet("DATA").unwrap_or_default();

        assert_eq!(exporter.sheet_name(0), Some("成绩_2020"));
        assert_eq!(exporter.sheet_name(sheet_dup), Some("成绩_2020__2"));
        assert_eq!(exporter.sheet_name(sheet_case), Some("Data"));
        assert_eq!(exporter.sheet_name(sheet_case_dup), Some("DATA__2"));
        assert_eq!(exporter.report().warnings.len(), 3);
    }

    #[test]
    fn test_rejected_sheet_name_keeps_indices_aligned() {
        let mut exporter = derive_exporter();
        assert!(matches!(
            exporter.add_sheet("History"),
            Err(MergeHeadError::Xlsx(_))
        ));

        let sheet_b = exporter.add_sheet("B").expect("sheet B");
        let sheet_quoted = exporter.add_sheet("'quoted'").expect("quoted sheet");
        assert_eq!((sheet_b, sheet_quoted), (0, 1));
        assert_eq!(exporter.sheet_name(sheet_quoted), Some("quoted"));
        for (sheet, c_name) in [(sheet_b, "B"), (sheet_quoted, "quoted")] {
            let worksheet = exporter
                .workbook
                .worksheet_from_index(sheet)
                .expect("worksheet");
            assert_eq!(worksheet.name(), c_name);
        }
        assert!(exporter.workbook.worksheet_from_index(2).is_err());

        let n_row = exporter
            .write_table(sheet_b, 0, &derive_flat_header(), &derive_students(), None)
            .expect("table");
        assert_eq!(n_row, 4);
        assert_eq!(exporter.report().tables[0].sheet_name, "B");
    }

    #[test]
    fn test_date_pattern_with_time_fields_is_a_configuration_error() {
        let options = SpecExportOptions {
            fmt_date: "%Y-%m-%d %H:%M:%S".to_string(),
            ..Default::default()
        };
        let l_records = vec![
            SpecRecord::new()
                .with("name", "张三")
                .with("birthday", chrono::NaiveDate::from_ymd_opt(1993, 1, 1)),
        ];

        assert!(matches!(
            export_table("s", None, None, &derive_flat_header(), &l_records, options.clone()),
            Err(MergeHeadError::Configuration(_))
        ));
        assert!(matches!(
            XlsxExporter::new(options),
            Err(MergeHeadError::Configuration(_))
        ));
    }

    #[test]
    fn test_save_to_buffer_requires_a_sheet() {
        let mut exporter = derive_exporter();
        assert!(matches!(
            exporter.save_to_buffer(),
            Err(MergeHeadError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_format_key_is_rejected() {
        let mut dict_fmt = BTreeMap::new();
        dict_fmt.insert("footer".to_string(), SpecCellFormat::default());
        assert!(matches!(
            XlsxExporter::with_formats(SpecExportOptions::default(), dict_fmt),
            Err(MergeHeadError::Configuration(_))
        ));
    }

    #[test]
    fn test_derive_format_align_accepts_aliases() {
        assert!(matches!(
            derive_format_align(" Center "),
            Some(FormatAlign::Center)
        ));
        assert!(matches!(
            derive_format_align("vertical_center"),
            Some(FormatAlign::VerticalCenter)
        ));
        assert!(derive_format_align("diagonal").is_none());
    }
}
