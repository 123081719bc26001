//! Header layout engine.
//!
//! Flat, two-level and N-level header specs are first normalized into one
//! [`SpecHeaderGrid`]; a single pass over that grid then yields the leaf
//! field order, the visible header cells and the merge regions.

use crate::error::{MergeHeadError, Result};
use crate::spec::{
    EnumCellValue, EnumHeaderSpec, SpecGridCell, SpecHeaderGrid, SpecHeaderLayout,
    SpecHeaderNode,
};
use crate::util::{SpecGridRun, plan_block_merges, validate_block_bounds};

////////////////////////////////////////////////////////////////////////////////
// #region Normalization

/// Normalize any header shape into the canonical grid.
///
/// Zero-span labels and childless groups are dropped here, so they never
/// reserve a column. A tree group with a single child shows the group label
/// on both rows; the repeated label is what makes it merge vertically.
pub fn normalize_header(spec: &EnumHeaderSpec) -> SpecHeaderGrid {
    match spec {
        EnumHeaderSpec::Flat(dict_leaves) => SpecHeaderGrid {
            levels: vec![
                dict_leaves
                    .iter()
                    .map(|(c_field, c_label)| SpecHeaderNode::leaf(c_field, c_label))
                    .collect(),
            ],
        },
        EnumHeaderSpec::Tree(dict_groups) => {
            let mut l_level_groups = Vec::new();
            let mut l_level_leaves = Vec::new();
            for (c_group, dict_children) in dict_groups {
                if dict_children.is_empty() {
                    continue;
                }
                l_level_groups.push(SpecHeaderNode::group(c_group, dict_children.len()));
                for (c_field, c_label) in dict_children {
                    let c_label_leaf = if dict_children.len() == 1 {
                        c_group
                    } else {
                        c_label
                    };
                    l_level_leaves.push(SpecHeaderNode::leaf(c_field, c_label_leaf));
                }
            }
            SpecHeaderGrid {
                levels: vec![l_level_groups, l_level_leaves],
            }
        }
        EnumHeaderSpec::Grid { levels, leaves } => {
            let mut l_levels: Vec<Vec<SpecHeaderNode>> = levels
                .iter()
                .map(|dict_spans| {
                    dict_spans
                        .iter()
                        .filter(|(_, n_span)| **n_span > 0)
                        .map(|(c_label, n_span)| SpecHeaderNode::group(c_label, *n_span))
                        .collect()
                })
                .collect();
            l_levels.push(
                leaves
                    .iter()
                    .map(|(c_field, c_label)| SpecHeaderNode::leaf(c_field, c_label))
                    .collect(),
            );
            SpecHeaderGrid { levels: l_levels }
        }
    }
}

/// Validate grid consistency and return the leaf column count.
pub fn validate_header_grid(grid: &SpecHeaderGrid) -> Result<usize> {
    let Some(v_leaves) = grid.levels.last() else {
        return Err(MergeHeadError::Configuration(
            "header grid has no levels.".to_string(),
        ));
    };
    let n_width = v_leaves.len();
    if n_width == 0 {
        return Err(MergeHeadError::Configuration(
            "header has no leaf columns.".to_string(),
        ));
    }
    if let Some(node) = v_leaves
        .iter()
        .find(|node| node.field.is_none() || node.span != 1)
    {
        return Err(MergeHeadError::Configuration(format!(
            "bottom header level must hold single-column field leaves; got {:?}.",
            node.label
        )));
    }

    for (n_idx_level, v_nodes) in grid.levels[..grid.levels.len() - 1].iter().enumerate() {
        if let Some(node) = v_nodes.iter().find(|node| node.span == 0) {
            return Err(MergeHeadError::Configuration(format!(
                "header level {n_idx_level}: label {:?} has span 0.",
                node.label
            )));
        }
        let n_span_sum: usize = v_nodes.iter().map(|node| node.span).sum();
        if n_span_sum != n_width {
            return Err(MergeHeadError::Configuration(format!(
                "header level {n_idx_level}: spans sum to {n_span_sum}, expected {n_width} leaf column(s)."
            )));
        }
    }

    Ok(n_width)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Layout

/// Lay out a header spec starting at sheet row `row_start`.
pub fn layout_header(spec: &EnumHeaderSpec, row_start: usize) -> Result<SpecHeaderLayout> {
    layout_header_grid(&normalize_header(spec), row_start)
}

/// Lay out an already normalized grid starting at sheet row `row_start`.
pub fn layout_header_grid(grid: &SpecHeaderGrid, row_start: usize) -> Result<SpecHeaderLayout> {
    let n_width = validate_header_grid(grid)?;
    let n_height = grid.levels.len();
    validate_block_bounds(row_start, n_height, n_width)?;

    let l_runs: Vec<Vec<SpecGridRun>> = grid
        .levels
        .iter()
        .map(|v_nodes| {
            let mut n_col_cursor = 0;
            v_nodes
                .iter()
                .map(|node| {
                    let run = SpecGridRun::new(node.label.clone(), n_col_cursor, node.span);
                    n_col_cursor += node.span;
                    run
                })
                .collect()
        })
        .collect();

    let mut l_cells = Vec::new();
    let mut l_merges = Vec::new();
    for anchor in plan_block_merges(&l_runs, row_start) {
        let run = &l_runs[anchor.row][anchor.idx_run];
        l_cells.push(SpecGridCell {
            row: row_start + anchor.row,
            col: run.col_start,
            value: EnumCellValue::String(run.key.clone()),
        });
        if let Some(region) = anchor.merge {
            l_merges.push(region);
        }
    }

    let v_leaves = &grid.levels[n_height - 1];
    let l_fields = v_leaves
        .iter()
        .filter_map(|node| node.field.clone())
        .collect();
    let l_labels = v_leaves.iter().map(|node| node.label.clone()).collect();

    log::debug!(
        "header layout: {n_height} level(s), {n_width} column(s), {} merge(s)",
        l_merges.len()
    );

    Ok(SpecHeaderLayout {
        fields: l_fields,
        labels: l_labels,
        cells: l_cells,
        merges: l_merges,
        width: n_width,
        height: n_height,
        row_start,
        row_next: row_start + n_height,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::spec::SpecMergeRegion;
    use crate::util::validate_disjoint_merges;

    fn derive_str_map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn derive_span_map(pairs: &[(&str, usize)]) -> IndexMap<String, usize> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn region(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> SpecMergeRegion {
        SpecMergeRegion {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    fn derive_cell_texts(layout: &SpecHeaderLayout) -> Vec<(usize, usize, String)> {
        layout
            .cells
            .iter()
            .map(|cell| (cell.row, cell.col, cell.value.as_text().to_string()))
            .collect()
    }

    fn derive_student_grid() -> EnumHeaderSpec {
        EnumHeaderSpec::Grid {
            levels: vec![
                derive_span_map(&[("ID", 1), ("学生成绩", 3)]),
                derive_span_map(&[("ID", 1), ("姓名", 1), ("成绩", 2)]),
            ],
            leaves: derive_str_map(&[
                ("id", "ID"),
                ("name", "姓名"),
                ("chineseScore", "语文"),
                ("mathScore", "数学"),
            ]),
        }
    }

    #[test]
    fn test_flat_header_has_no_merges() {
        let spec = EnumHeaderSpec::Flat(derive_str_map(&[("name", "姓名"), ("birthday", "生日")]));
        let layout = layout_header(&spec, 0).expect("layout");

        assert_eq!(layout.fields, vec!["name", "birthday"]);
        assert_eq!(layout.labels, vec!["姓名", "生日"]);
        assert!(layout.merges.is_empty());
        assert_eq!(layout.row_next, 1);
        assert_eq!(
            derive_cell_texts(&layout),
            vec![(0, 0, "姓名".to_string()), (0, 1, "生日".to_string())]
        );
    }

    #[test]
    fn test_tree_header_with_one_group() {
        let mut dict_groups = IndexMap::new();
        dict_groups.insert(
            "成绩".to_string(),
            derive_str_map(&[("chineseScore", "语文"), ("mathScore", "数学")]),
        );
        let layout = layout_header(&EnumHeaderSpec::Tree(dict_groups), 0).expect("layout");

        assert_eq!(layout.merges, vec![region(0, 0, 0, 1)]);
        assert_eq!(layout.fields, vec!["chineseScore", "mathScore"]);
        assert_eq!(
            derive_cell_texts(&layout),
            vec![
                (0, 0, "成绩".to_string()),
                (1, 0, "语文".to_string()),
                (1, 1, "数学".to_string())
            ]
        );
        assert_eq!(layout.row_next, 2);
    }

    #[test]
    fn test_tree_header_single_child_merges_vertically() {
        let mut dict_groups = IndexMap::new();
        dict_groups.insert("序号".to_string(), derive_str_map(&[("id", "ID")]));
        dict_groups.insert("姓名".to_string(), derive_str_map(&[("name", "姓名")]));
        dict_groups.insert("空".to_string(), IndexMap::new());
        dict_groups.insert(
            "成绩".to_string(),
            derive_str_map(&[("chineseScore", "语文"), ("mathScore", "数学")]),
        );
        let layout = layout_header(&EnumHeaderSpec::Tree(dict_groups), 3).expect("layout");

        assert_eq!(layout.fields, vec!["id", "name", "chineseScore", "mathScore"]);
        assert_eq!(layout.labels, vec!["序号", "姓名", "语文", "数学"]);
        assert_eq!(
            layout.merges,
            vec![region(3, 4, 0, 0), region(3, 4, 1, 1), region(3, 3, 2, 3)]
        );
        assert_eq!(layout.width, 4);
        assert_eq!(layout.row_next, 5);
    }

    #[test]
    fn test_grid_header_three_levels() {
        let layout = layout_header(&derive_student_grid(), 0).expect("layout");

        assert_eq!(layout.fields, vec!["id", "name", "chineseScore", "mathScore"]);
        assert_eq!(
            layout.merges,
            vec![
                // "ID" repeats down every level, leaf row included.
                region(0, 2, 0, 0),
                region(0, 0, 1, 3),
                // "姓名" repeats from level 1 into the leaf row.
                region(1, 2, 1, 1),
                region(1, 1, 2, 3),
            ]
        );
        assert_eq!(
            derive_cell_texts(&layout),
            vec![
                (0, 0, "ID".to_string()),
                (0, 1, "学生成绩".to_string()),
                (1, 1, "姓名".to_string()),
                (1, 2, "成绩".to_string()),
                (2, 2, "语文".to_string()),
                (2, 3, "数学".to_string()),
            ]
        );
        assert_eq!(layout.row_next, 3);
        assert!(validate_disjoint_merges(&layout.merges).is_ok());
    }

    #[test]
    fn test_grid_header_span_mismatch_is_configuration_error() {
        let spec = EnumHeaderSpec::Grid {
            levels: vec![derive_span_map(&[("ID", 1), ("学生成绩", 2)])],
            leaves: derive_str_map(&[("id", "ID"), ("a", "A"), ("b", "B"), ("c", "C")]),
        };
        let err = layout_header(&spec, 0).err();
        assert!(matches!(err, Some(MergeHeadError::Configuration(_))), "{err:?}");
    }

    #[test]
    fn test_grid_header_zero_span_reserves_no_column() {
        let spec = EnumHeaderSpec::Grid {
            levels: vec![derive_span_map(&[("A", 2), ("Ghost", 0)])],
            leaves: derive_str_map(&[("a", "a"), ("b", "b")]),
        };
        let layout = layout_header(&spec, 0).expect("layout");

        assert_eq!(layout.width, 2);
        assert_eq!(layout.merges, vec![region(0, 0, 0, 1)]);
    }

    #[test]
    fn test_empty_headers_are_rejected() {
        let spec_flat = EnumHeaderSpec::Flat(IndexMap::new());
        assert!(matches!(
            layout_header(&spec_flat, 0),
            Err(MergeHeadError::Configuration(_))
        ));
        assert!(matches!(
            layout_header_grid(&SpecHeaderGrid { levels: vec![] }, 0),
            Err(MergeHeadError::Configuration(_))
        ));
    }

    #[test]
    fn test_layout_past_excel_limit_is_rejected() {
        let spec = EnumHeaderSpec::Flat(derive_str_map(&[("a", "A")]));
        assert!(layout_header(&spec, crate::conf::N_NROWS_EXCEL_MAX).is_err());
    }
}
