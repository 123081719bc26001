//! Object tables: one record rendered as a form-like block.

use indexmap::IndexMap;

use crate::error::{MergeHeadError, Result};
use crate::projector::{ColumnWidthTracker, convert_field_value, project_field};
use crate::record::FieldAccessor;
use crate::spec::{
    EnumCellValue, EnumObjectSpan, SpecExportOptions, SpecGridCell, SpecObjectLayout,
    SpecObjectTemplate,
};
use crate::util::{SpecGridRun, plan_block_merges, validate_block_bounds};

/// Width of one template row and the position of its list entry, if any.
fn derive_template_row_shape(
    n_idx_row: usize,
    dict_row: &IndexMap<String, EnumObjectSpan>,
) -> Result<(usize, Option<&str>)> {
    let mut n_width = 0;
    let mut c_list_key = None;
    for (c_key, span) in dict_row {
        match span {
            EnumObjectSpan::Span(0) => {
                return Err(MergeHeadError::Configuration(format!(
                    "object template row {n_idx_row}: key {c_key:?} has span 0."
                )));
            }
            EnumObjectSpan::Span(n_span) => n_width += n_span,
            EnumObjectSpan::Records(l_fields) => {
                if c_list_key.is_some() {
                    return Err(MergeHeadError::Configuration(format!(
                        "object template row {n_idx_row}: more than one list field."
                    )));
                }
                if l_fields.is_empty() {
                    return Err(MergeHeadError::Configuration(format!(
                        "object template row {n_idx_row}: list field {c_key:?} names no sub-fields."
                    )));
                }
                n_width += l_fields.len();
                c_list_key = Some(c_key.as_str());
            }
        }
    }
    Ok((n_width, c_list_key))
}

/// Lay out `record` through `template`, starting at sheet row `row_start`.
///
/// A span key shows the record's value for that field when the field
/// exists, and the key itself otherwise. A list entry expands its template
/// row into one output row per element; the row's other keys repeat on
/// each expanded row and so merge vertically.
pub fn layout_object_table(
    template: &SpecObjectTemplate,
    record: &dyn FieldAccessor,
    row_start: usize,
    options: &SpecExportOptions,
) -> Result<SpecObjectLayout> {
    options.validate()?;

    let mut n_width = None;
    let mut l_runs: Vec<Vec<SpecGridRun>> = Vec::new();
    let mut l_values: Vec<Vec<EnumCellValue>> = Vec::new();

    for (n_idx_row, dict_row) in template.rows.iter().enumerate() {
        if dict_row.is_empty() {
            l_runs.push(Vec::new());
            l_values.push(Vec::new());
            continue;
        }

        let (n_width_row, c_list_key) = derive_template_row_shape(n_idx_row, dict_row)?;
        match n_width {
            None => n_width = Some(n_width_row),
            Some(n_width_prev) if n_width_prev != n_width_row => {
                return Err(MergeHeadError::Configuration(format!(
                    "object template row {n_idx_row} is {n_width_row} column(s) wide, expected {n_width_prev}."
                )));
            }
            Some(_) => {}
        }

        let l_elements = match c_list_key {
            Some(c_key) => Some(record.field_records(c_key).ok_or_else(|| {
                MergeHeadError::FieldAccess {
                    field: c_key.to_string(),
                    record_index: 0,
                }
            })?),
            None => None,
        };
        let n_rows_expanded = l_elements
            .as_ref()
            .map_or(1, |l_elements| usize::max(l_elements.len(), 1));

        for n_idx_expanded in 0..n_rows_expanded {
            let mut v_runs = Vec::new();
            let mut v_values = Vec::new();
            let mut n_col_cursor = 0;

            for (c_key, span) in dict_row {
                match span {
                    EnumObjectSpan::Span(n_span) => {
                        let value = match record.field(c_key) {
                            Some(value) => convert_field_value(&value, options),
                            None => EnumCellValue::String(c_key.clone()),
                        };
                        v_runs.push(SpecGridRun::new(c_key.clone(), n_col_cursor, *n_span));
                        v_values.push(value);
                        n_col_cursor += n_span;
                    }
                    EnumObjectSpan::Records(l_fields) => {
                        let element = l_elements
                            .as_ref()
                            .and_then(|l_elements| l_elements.get(n_idx_expanded));
                        for c_field in l_fields {
                            let value = match element {
                                Some(element) => {
                                    project_field(*element, c_field, n_idx_expanded, options)?
                                }
                                None => EnumCellValue::empty(),
                            };
                            v_runs.push(SpecGridRun::isolated(c_field.clone(), n_col_cursor, 1));
                            v_values.push(value);
                            n_col_cursor += 1;
                        }
                    }
                }
            }

            l_runs.push(v_runs);
            l_values.push(v_values);
        }
    }

    let n_width = n_width.unwrap_or(0);
    let n_height = l_runs.len();
    validate_block_bounds(row_start, n_height, n_width)?;

    let mut tracker = ColumnWidthTracker::new(n_width);
    let mut l_cells = Vec::new();
    let mut l_merges = Vec::new();
    for anchor in plan_block_merges(&l_runs, row_start) {
        let run = &l_runs[anchor.row][anchor.idx_run];
        let value = l_values[anchor.row][anchor.idx_run].clone();
        // Merged cells spread their text; only single-column cells size a column.
        if run.span == 1 {
            tracker.observe(run.col_start, value.as_text());
        }
        l_cells.push(SpecGridCell {
            row: row_start + anchor.row,
            col: run.col_start,
            value,
        });
        if let Some(region) = anchor.merge {
            l_merges.push(region);
        }
    }

    log::debug!(
        "object table layout: {n_height} row(s), {n_width} column(s), {} merge(s)",
        l_merges.len()
    );

    Ok(SpecObjectLayout {
        cells: l_cells,
        merges: l_merges,
        widths: tracker.finish(options.width_col_min),
        width: n_width,
        row_start,
        row_next: row_start + n_height,
    })
}
