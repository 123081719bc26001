//! Row projection: records -> typed cell rows + column widths.

use std::fmt::{Display, Write};

use crate::error::{MergeHeadError, Result};
use crate::record::FieldAccessor;
use crate::spec::{EnumCellValue, EnumFieldValue, SpecExportOptions, SpecProjection};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Render a float the way `Double.toString` does: plain notation with at least
/// one fractional digit inside `[1e-3, 1e7)`, `1.0E15`-style outside it.
pub fn convert_float_to_str(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }

    let n_abs = x.abs();
    if n_abs == 0.0 || (1e-3..1e7).contains(&n_abs) {
        let c_text = x.to_string();
        return if c_text.contains('.') {
            c_text
        } else {
            format!("{c_text}.0")
        };
    }

    let c_sci = format!("{x:e}");
    let (c_mantissa, c_exp) = c_sci.split_once('e').unwrap_or((c_sci.as_str(), "0"));
    if c_mantissa.contains('.') {
        format!("{c_mantissa}E{c_exp}")
    } else {
        format!("{c_mantissa}.0E{c_exp}")
    }
}

/// Write `formatted`; a pattern the value cannot fill falls back to `fallback` (ISO text).
fn convert_temporal_to_str(formatted: impl Display, fallback: impl Display) -> String {
    let mut c_text = String::new();
    match write!(c_text, "{formatted}") {
        Ok(()) => c_text,
        Err(_) => {
            log::warn!("date pattern cannot format {fallback}; written as ISO text");
            fallback.to_string()
        }
    }
}

/// Coerce a raw field value into a cell value.
///
/// Precedence: null, temporal, decimal, float, everything else. Floats stay
/// text and decimals become numbers; integers are text as well.
pub fn convert_field_value(value: &EnumFieldValue, options: &SpecExportOptions) -> EnumCellValue {
    match value {
        EnumFieldValue::Null => EnumCellValue::empty(),
        EnumFieldValue::Date(val) => {
            EnumCellValue::String(convert_temporal_to_str(val.format(&options.fmt_date), val))
        }
        EnumFieldValue::DateTime(val) => EnumCellValue::String(convert_temporal_to_str(
            val.format(&options.fmt_datetime),
            val,
        )),
        EnumFieldValue::Decimal(val) => {
            let c_text = val.trim();
            match c_text.parse::<f64>() {
                Ok(n) if n.is_finite() => EnumCellValue::Number(n, c_text.to_string()),
                _ => {
                    log::warn!("decimal value {val:?} is not numeric; written as text");
                    EnumCellValue::String(val.clone())
                }
            }
        }
        EnumFieldValue::Float(val) => EnumCellValue::String(convert_float_to_str(*val)),
        EnumFieldValue::Integer(val) => EnumCellValue::String(val.to_string()),
        EnumFieldValue::Bool(val) => EnumCellValue::String(val.to_string()),
        EnumFieldValue::Text(val) => EnumCellValue::String(val.clone()),
    }
}

/// Read `field` off `record` and coerce it; a missing field is fatal.
pub fn project_field(
    record: &dyn FieldAccessor,
    field: &str,
    record_index: usize,
    options: &SpecExportOptions,
) -> Result<EnumCellValue> {
    let value = record
        .field(field)
        .ok_or_else(|| MergeHeadError::FieldAccess {
            field: field.to_string(),
            record_index,
        })?;
    Ok(convert_field_value(&value, options))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnWidths

/// Running maximum of rendered byte length per column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnWidthTracker {
    widths: Vec<usize>,
}

impl ColumnWidthTracker {
    /// Tracker for `width` columns, all at zero.
    pub fn new(width: usize) -> Self {
        Self {
            widths: vec![0; width],
        }
    }

    /// Record one rendered cell; columns past the current width are added.
    pub fn observe(&mut self, col: usize, text: &str) {
        if col >= self.widths.len() {
            self.widths.resize(col + 1, 0);
        }
        self.widths[col] = usize::max(self.widths[col], text.len());
    }

    /// Record a full row starting at column 0.
    pub fn observe_row(&mut self, row: &[EnumCellValue]) {
        for (n_idx_col, value) in row.iter().enumerate() {
            self.observe(n_idx_col, value.as_text());
        }
    }

    /// Raw observed maxima.
    pub fn observed(&self) -> &[usize] {
        &self.widths
    }

    /// Final widths with the `width_min` floor applied.
    pub fn finish(&self, width_min: usize) -> Vec<usize> {
        self.widths
            .iter()
            .map(|n_width| usize::max(*n_width, width_min))
            .collect()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowProjection

/// Project each record onto `fields`, in order, consuming `records` once.
pub fn project_rows<I>(
    fields: &[String],
    records: I,
    options: &SpecExportOptions,
) -> Result<SpecProjection>
where
    I: IntoIterator,
    I::Item: FieldAccessor,
{
    options.validate()?;

    let mut tracker = ColumnWidthTracker::new(fields.len());
    let mut l_rows = Vec::new();

    for (n_idx_record, record) in records.into_iter().enumerate() {
        let mut v_row = Vec::with_capacity(fields.len());
        for c_field in fields {
            v_row.push(project_field(&record, c_field, n_idx_record, options)?);
        }
        tracker.observe_row(&v_row);
        l_rows.push(v_row);
    }

    log::debug!(
        "projected {} record(s) onto {} column(s)",
        l_rows.len(),
        fields.len()
    );

    Ok(SpecProjection {
        rows: l_rows,
        widths: tracker.finish(options.width_col_min),
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
