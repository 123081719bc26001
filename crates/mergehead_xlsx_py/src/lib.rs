use std::collections::BTreeMap;

use chrono::NaiveDate;
use indexmap::IndexMap;
use mergehead_xlsx::spec::{
    EnumFieldValue, EnumHeaderSpec, EnumObjectSpan, SpecCellFormat, SpecExportOptions,
    SpecObjectTemplate,
};
use mergehead_xlsx::{
    DataFrameRecords, MergeHeadError, SpecRecord, XlsxExporter as RsXlsxExporter, export_table,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBool, PyBytes, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "mergehead.xlsx.exporter.v1";
const C_BRIDGE_TRANSPORT: &str = "arrow_ipc";

#[pyclass(name = "XlsxExporter")]
struct PyXlsxExporter {
    #[pyo3(get)]
    file_out: Option<String>,
    inner: RsXlsxExporter,
    if_closed: bool,
}

#[pymethods]
impl PyXlsxExporter {
    #[new]
    #[pyo3(signature = (
        file_out = None,
        width_col_min = None,
        fmt_date = None,
        fmt_datetime = None,
        formats = None
    ))]
    fn new(
        file_out: Option<String>,
        width_col_min: Option<usize>,
        fmt_date: Option<String>,
        fmt_datetime: Option<String>,
        formats: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<Self> {
        let mut cfg_options = SpecExportOptions::default();
        if let Some(v) = width_col_min {
            cfg_options.width_col_min = v;
        }
        if let Some(v) = fmt_date {
            cfg_options.fmt_date = v;
        }
        if let Some(v) = fmt_datetime {
            cfg_options.fmt_datetime = v;
        }

        let mut dict_fmt = BTreeMap::new();
        if let Some(formats) = formats {
            for (key, value) in formats.iter() {
                if let Some(fmt_spec) = parse_spec_cell_format(&value)? {
                    dict_fmt.insert(key.extract::<String>()?, fmt_spec);
                }
            }
        }

        let inner = RsXlsxExporter::with_formats(cfg_options, dict_fmt).map_err(convert_error)?;
        Ok(Self {
            file_out,
            inner,
            if_closed: false,
        })
    }

    fn __enter__(slf: PyRefMut<'_, Self>) -> PyRefMut<'_, Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc=None, _tb=None))]
    fn __exit__(
        &mut self,
        _exc_type: Option<&Bound<'_, PyAny>>,
        _exc: Option<&Bound<'_, PyAny>>,
        _tb: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<()> {
        self.close()
    }

    /// Save to `file_out` (when set). Idempotent.
    fn close(&mut self) -> PyResult<()> {
        if self.if_closed {
            return Ok(());
        }
        if let Some(c_file_out) = &self.file_out {
            self.inner.save(c_file_out).map_err(convert_error)?;
        }
        self.if_closed = true;
        Ok(())
    }

    fn add_sheet(&mut self, name: &str) -> PyResult<usize> {
        self.validate_open()?;
        self.inner.add_sheet(name).map_err(convert_error)
    }

    fn write_sheet_title(&mut self, sheet: usize, row: usize, title: &str) -> PyResult<usize> {
        self.validate_open()?;
        self.inner
            .write_sheet_title(sheet, row, title)
            .map_err(convert_error)
    }

    fn write_table_title(
        &mut self,
        sheet: usize,
        row: usize,
        title: &str,
        width: usize,
    ) -> PyResult<usize> {
        self.validate_open()?;
        self.inner
            .write_table_title(sheet, row, title, width)
            .map_err(convert_error)
    }

    #[pyo3(signature = (sheet, row, header, records, table_title = None))]
    fn write_table(
        &mut self,
        py: Python<'_>,
        sheet: usize,
        row: usize,
        header: &Bound<'_, PyAny>,
        records: &Bound<'_, PyAny>,
        table_title: Option<&str>,
    ) -> PyResult<usize> {
        self.validate_open()?;
        let header_spec = parse_header_spec(header)?;

        if records.hasattr("write_ipc")? {
            let records_df = derive_records_from_polars(py, records)?;
            return self
                .inner
                .write_table(sheet, row, &header_spec, records_df.iter(), table_title)
                .map_err(convert_error);
        }

        let types = SpecPyTypes::new(py)?;
        let l_records = parse_records(records, &types)?;
        self.inner
            .write_table(sheet, row, &header_spec, &l_records, table_title)
            .map_err(convert_error)
    }

    fn write_object_table(
        &mut self,
        py: Python<'_>,
        sheet: usize,
        row: usize,
        template: &Bound<'_, PyAny>,
        record: &Bound<'_, PyDict>,
    ) -> PyResult<usize> {
        self.validate_open()?;
        let template_spec = parse_object_template(template)?;
        let types = SpecPyTypes::new(py)?;
        let record_spec = parse_record(record, &types)?;
        self.inner
            .write_object_table(sheet, row, &template_spec, &record_spec)
            .map_err(convert_error)
    }

    #[pyo3(signature = (file_out = None))]
    fn save(&mut self, file_out: Option<String>) -> PyResult<()> {
        let Some(c_file_out) = file_out.or_else(|| self.file_out.clone()) else {
            return Err(PyValueError::new_err(
                "save() needs a path: pass file_out here or to the constructor.",
            ));
        };
        self.inner.save(&c_file_out).map_err(convert_error)
    }

    fn to_bytes<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyBytes>> {
        let v_bytes = self.inner.save_to_buffer().map_err(convert_error)?;
        Ok(PyBytes::new(py, &v_bytes))
    }

    fn report<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let report = self.inner.report();

        let mut l_table_obj = Vec::with_capacity(report.tables.len());
        for table in report.tables {
            let dict_table = PyDict::new(py);
            dict_table.set_item("sheet_name", table.sheet_name)?;
            dict_table.set_item("row_start_inclusive", table.row_start_inclusive)?;
            dict_table.set_item("row_end_exclusive", table.row_end_exclusive)?;
            dict_table.set_item("width", table.width)?;
            dict_table.set_item("n_records", table.n_records)?;
            dict_table.set_item("n_merges", table.n_merges)?;
            l_table_obj.push(dict_table);
        }

        let dict_report = PyDict::new(py);
        dict_report.set_item("tables", PyTuple::new(py, l_table_obj)?)?;
        dict_report.set_item("warnings", PyList::new(py, report.warnings)?)?;
        Ok(dict_report)
    }
}

impl PyXlsxExporter {
    fn validate_open(&self) -> PyResult<()> {
        if self.if_closed {
            return Err(PyRuntimeError::new_err("Cannot write after close()."));
        }
        Ok(())
    }
}

/// One-shot export of a single table to XLSX bytes.
#[pyfunction]
#[pyo3(signature = (sheet_name, header, records, sheet_title = None, table_title = None))]
fn export_table_bytes<'py>(
    py: Python<'py>,
    sheet_name: &str,
    header: &Bound<'py, PyAny>,
    records: &Bound<'py, PyAny>,
    sheet_title: Option<&str>,
    table_title: Option<&str>,
) -> PyResult<Bound<'py, PyBytes>> {
    let header_spec = parse_header_spec(header)?;
    let res_bytes = if records.hasattr("write_ipc")? {
        let records_df = derive_records_from_polars(py, records)?;
        export_table(
            sheet_name,
            sheet_title,
            table_title,
            &header_spec,
            records_df.iter(),
            SpecExportOptions::default(),
        )
    } else {
        let l_records = parse_records(records, &SpecPyTypes::new(py)?)?;
        export_table(
            sheet_name,
            sheet_title,
            table_title,
            &header_spec,
            &l_records,
            SpecExportOptions::default(),
        )
    };
    let v_bytes = res_bytes.map_err(convert_error)?;
    Ok(PyBytes::new(py, &v_bytes))
}

fn convert_error(err: MergeHeadError) -> PyErr {
    match err {
        MergeHeadError::Configuration(_) | MergeHeadError::FieldAccess { .. } => {
            PyValueError::new_err(err.to_string())
        }
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region RecordParsing

/// Python classes checked with `isinstance` while converting values.
struct SpecPyTypes<'py> {
    cls_datetime: Bound<'py, PyAny>,
    cls_date: Bound<'py, PyAny>,
    cls_decimal: Bound<'py, PyAny>,
}

impl<'py> SpecPyTypes<'py> {
    fn new(py: Python<'py>) -> PyResult<Self> {
        let module_datetime = py.import("datetime")?;
        let module_decimal = py.import("decimal")?;
        Ok(Self {
            cls_datetime: module_datetime.getattr("datetime")?,
            cls_date: module_datetime.getattr("date")?,
            cls_decimal: module_decimal.getattr("Decimal")?,
        })
    }
}

fn derive_records_from_polars(
    py: Python<'_>,
    df: &Bound<'_, PyAny>,
) -> PyResult<DataFrameRecords> {
    let obj_buffer = df.call_method1("write_ipc", (py.None(),))?;
    let v_ipc_df: Vec<u8> = obj_buffer.call_method0("getvalue")?.extract()?;
    DataFrameRecords::from_ipc_bytes(&v_ipc_df).map_err(convert_error)
}

fn parse_records(records: &Bound<'_, PyAny>, types: &SpecPyTypes<'_>) -> PyResult<Vec<SpecRecord>> {
    let mut l_records = Vec::new();
    for (n_idx, item) in records.try_iter()?.enumerate() {
        let item = item?;
        let dict_item = item.downcast::<PyDict>().map_err(|_| {
            PyValueError::new_err(format!("record #{n_idx} must be a dict."))
        })?;
        l_records.push(parse_record(dict_item, types)?);
    }
    Ok(l_records)
}

fn parse_record(dict_record: &Bound<'_, PyDict>, types: &SpecPyTypes<'_>) -> PyResult<SpecRecord> {
    let mut record = SpecRecord::new();
    for (key, value) in dict_record.iter() {
        let c_key = key.extract::<String>()?;
        match value.downcast::<PyList>() {
            Ok(l_values) if l_values.iter().all(|item| item.is_instance_of::<PyDict>()) => {
                record.insert_records(c_key, parse_records(l_values.as_any(), types)?);
            }
            _ => record.insert(c_key, convert_py_value(&value, types)?),
        }
    }
    Ok(record)
}

fn convert_py_value(value: &Bound<'_, PyAny>, types: &SpecPyTypes<'_>) -> PyResult<EnumFieldValue> {
    if value.is_none() {
        return Ok(EnumFieldValue::Null);
    }
    if value.is_instance_of::<PyBool>() {
        return Ok(EnumFieldValue::Bool(value.extract()?));
    }
    if value.is_instance_of::<PyInt>() {
        return Ok(match value.extract::<i64>() {
            Ok(n) => EnumFieldValue::Integer(n),
            Err(_) => EnumFieldValue::Text(value.str()?.to_string()),
        });
    }
    if value.is_instance_of::<PyFloat>() {
        return Ok(EnumFieldValue::Float(value.extract()?));
    }
    if value.is_instance_of::<PyString>() {
        return Ok(EnumFieldValue::Text(value.extract()?));
    }
    // `datetime` subclasses `date`; check it first.
    if value.is_instance(&types.cls_datetime)? {
        let date = derive_naive_date(value)?;
        let datetime = date.and_hms_micro_opt(
            value.getattr("hour")?.extract()?,
            value.getattr("minute")?.extract()?,
            value.getattr("second")?.extract()?,
            value.getattr("microsecond")?.extract()?,
        );
        return datetime
            .map(EnumFieldValue::DateTime)
            .ok_or_else(|| PyValueError::new_err(format!("invalid datetime: {value}")));
    }
    if value.is_instance(&types.cls_date)? {
        return Ok(EnumFieldValue::Date(derive_naive_date(value)?));
    }
    if value.is_instance(&types.cls_decimal)? {
        return Ok(EnumFieldValue::Decimal(value.str()?.to_string()));
    }
    Ok(EnumFieldValue::Text(value.str()?.to_string()))
}

fn derive_naive_date(value: &Bound<'_, PyAny>) -> PyResult<NaiveDate> {
    NaiveDate::from_ymd_opt(
        value.getattr("year")?.extract()?,
        value.getattr("month")?.extract()?,
        value.getattr("day")?.extract()?,
    )
    .ok_or_else(|| PyValueError::new_err(format!("invalid date: {value}")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SpecParsing

/// `dict[str, str]` (flat), `dict[str, dict[str, str]]` (two-level) or
/// `list[dict]` (N-level: span rows, then the leaf row).
fn parse_header_spec(obj: &Bound<'_, PyAny>) -> PyResult<EnumHeaderSpec> {
    if let Ok(dict_header) = obj.downcast::<PyDict>() {
        let if_tree = dict_header
            .iter()
            .any(|(_, value)| value.is_instance_of::<PyDict>());
        if !if_tree {
            return Ok(EnumHeaderSpec::Flat(extract_ordered_map(dict_header.as_any())?));
        }
        let mut dict_groups = IndexMap::new();
        for (key, value) in dict_header.iter() {
            if !value.is_instance_of::<PyDict>() {
                return Err(PyValueError::new_err(
                    "two-level header values must all be dicts.",
                ));
            }
            dict_groups.insert(key.extract::<String>()?, extract_ordered_map(&value)?);
        }
        return Ok(EnumHeaderSpec::Tree(dict_groups));
    }

    if let Ok(l_levels) = obj.downcast::<PyList>() {
        let n_levels = l_levels.len();
        if n_levels == 0 {
            return Err(PyValueError::new_err("N-level header list is empty."));
        }
        let mut l_spans = Vec::with_capacity(n_levels - 1);
        for level in l_levels.iter().take(n_levels - 1) {
            l_spans.push(extract_ordered_map(&level)?);
        }
        let dict_leaves = extract_ordered_map(&l_levels.get_item(n_levels - 1)?)?;
        return Ok(EnumHeaderSpec::Grid {
            levels: l_spans,
            leaves: dict_leaves,
        });
    }

    Err(PyValueError::new_err(
        "header must be dict[str, str], dict[str, dict[str, str]] or list[dict].",
    ))
}

/// `list[dict[str, int | list[str]]]`; an empty dict is a spacer row.
fn parse_object_template(obj: &Bound<'_, PyAny>) -> PyResult<SpecObjectTemplate> {
    let mut l_rows = Vec::new();
    for item in obj.try_iter()? {
        let item = item?;
        let dict_row = item
            .downcast::<PyDict>()
            .map_err(|_| PyValueError::new_err("object template rows must be dicts."))?;
        let mut dict_spans = IndexMap::new();
        for (key, value) in dict_row.iter() {
            let span = if value.is_instance_of::<PyInt>() {
                EnumObjectSpan::Span(value.extract()?)
            } else {
                EnumObjectSpan::Records(value.extract::<Vec<String>>()?)
            };
            dict_spans.insert(key.extract::<String>()?, span);
        }
        l_rows.push(dict_spans);
    }
    Ok(SpecObjectTemplate { rows: l_rows })
}

fn parse_spec_cell_format(obj: &Bound<'_, PyAny>) -> PyResult<Option<SpecCellFormat>> {
    if obj.is_none() {
        return Ok(None);
    }

    Ok(Some(SpecCellFormat {
        font_name: extract_optional_attr::<String>(obj, "font_name")?,
        font_size: extract_optional_attr::<i64>(obj, "font_size")?,
        bold: extract_optional_attr::<bool>(obj, "bold")?,
        align: extract_optional_attr::<String>(obj, "align")?,
        valign: extract_optional_attr::<String>(obj, "valign")?,
        border: extract_optional_attr::<i64>(obj, "border")?,
        text_wrap: extract_optional_attr::<bool>(obj, "text_wrap")?,
        bg_color: extract_optional_attr::<String>(obj, "bg_color")?,
        font_color: extract_optional_attr::<String>(obj, "font_color")?,
    }))
}

/// Copy a `dict` into an insertion-ordered map.
fn extract_ordered_map<V>(obj: &Bound<'_, PyAny>) -> PyResult<IndexMap<String, V>>
where
    for<'a> V: FromPyObject<'a>,
{
    let dict_obj = obj
        .downcast::<PyDict>()
        .map_err(|_| PyValueError::new_err("header mappings must be dicts."))?;
    let mut dict_out = IndexMap::with_capacity(dict_obj.len());
    for (key, value) in dict_obj.iter() {
        dict_out.insert(key.extract::<String>()?, value.extract::<V>()?);
    }
    Ok(dict_out)
}

/// Read `attr` from a dict key or an object attribute; `None` when absent.
fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    let val = if let Ok(dict_obj) = obj.downcast::<PyDict>() {
        match dict_obj.get_item(attr)? {
            Some(val) => val,
            None => return Ok(None),
        }
    } else {
        if !obj.hasattr(attr)? {
            return Ok(None);
        }
        obj.getattr(attr)?
    };
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[pymodule]
fn _mergehead_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyXlsxExporter>()?;
    module.add_function(wrap_pyfunction!(export_table_bytes, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
