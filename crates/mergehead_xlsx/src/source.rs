//! Polars-backed record source.
//!
//! Each DataFrame row is a record; each column name is a field.

use std::io::Cursor;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use polars::prelude::{AnyValue, DataFrame, IpcReader, SerReader, TimeUnit};

use crate::error::{MergeHeadError, Result};
use crate::record::FieldAccessor;
use crate::spec::{EnumFieldValue, EnumHeaderSpec};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const N_DAYS_CE_TO_UNIX_EPOCH: i32 = 719_163;

/// Read-only record view over a DataFrame.
#[derive(Debug, Clone)]
pub struct DataFrameRecords {
    df: DataFrame,
}

impl DataFrameRecords {
    /// Wrap an in-memory DataFrame.
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    /// Decode a DataFrame serialized in Arrow IPC file format.
    pub fn from_ipc_bytes(v_ipc_df: &[u8]) -> Result<Self> {
        let df = IpcReader::new(Cursor::new(v_ipc_df))
            .finish()
            .map_err(|err| {
                MergeHeadError::DataFrame(format!("failed to read IPC DataFrame bytes: {err}"))
            })?;
        Ok(Self::new(df))
    }

    /// Underlying frame.
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Record count.
    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Column names in frame order.
    pub fn field_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Flat header that labels every column with its own name.
    pub fn derive_flat_header(&self) -> EnumHeaderSpec {
        EnumHeaderSpec::Flat(
            self.field_names()
                .into_iter()
                .map(|c_name| (c_name.clone(), c_name))
                .collect::<IndexMap<_, _>>(),
        )
    }

    /// Row `idx` as a record.
    pub fn row(&self, idx: usize) -> DataFrameRow<'_> {
        DataFrameRow { df: &self.df, idx }
    }

    /// All rows, top to bottom.
    pub fn iter(&self) -> impl Iterator<Item = DataFrameRow<'_>> {
        (0..self.df.height()).map(|idx| self.row(idx))
    }
}

impl From<DataFrame> for DataFrameRecords {
    fn from(df: DataFrame) -> Self {
        Self::new(df)
    }
}

/// One DataFrame row.
#[derive(Debug, Clone, Copy)]
pub struct DataFrameRow<'a> {
    df: &'a DataFrame,
    idx: usize,
}

impl FieldAccessor for DataFrameRow<'_> {
    fn field(&self, name: &str) -> Option<EnumFieldValue> {
        let col = self.df.column(name).ok()?;
        match col.get(self.idx) {
            Ok(value) => Some(convert_any_value(value)),
            Err(err) => {
                log::warn!("column {name:?} row {} unreadable: {err}", self.idx);
                None
            }
        }
    }
}

/// Map a polars scalar onto a field value.
///
/// `Date` and `Datetime` become chrono values so the export date patterns apply;
/// zoned timestamps keep their UTC wall time. Other dtypes fall back to their
/// display text.
pub fn convert_any_value(value: AnyValue<'_>) -> EnumFieldValue {
    match value {
        AnyValue::Date(n_days) => convert_epoch_days(n_days)
            .map_or_else(|| EnumFieldValue::Text(n_days.to_string()), EnumFieldValue::Date),
        AnyValue::Datetime(n_ts, time_unit, _) | AnyValue::DatetimeOwned(n_ts, time_unit, _) => {
            convert_epoch_timestamp(n_ts, time_unit)
                .map_or_else(|| EnumFieldValue::Text(n_ts.to_string()), EnumFieldValue::DateTime)
        }
        AnyValue::Null => EnumFieldValue::Null,
        AnyValue::String(val) => EnumFieldValue::Text(val.to_string()),
        AnyValue::StringOwned(val) => EnumFieldValue::Text(val.to_string()),
        AnyValue::Boolean(val) => EnumFieldValue::Bool(val),
        AnyValue::UInt8(val) => EnumFieldValue::Integer(val as i64),
        AnyValue::UInt16(val) => EnumFieldValue::Integer(val as i64),
        AnyValue::UInt32(val) => EnumFieldValue::Integer(val as i64),
        AnyValue::UInt64(val) => i64::try_from(val)
            .map_or_else(|_| EnumFieldValue::Text(val.to_string()), EnumFieldValue::Integer),
        AnyValue::Int8(val) => EnumFieldValue::Integer(val as i64),
        AnyValue::Int16(val) => EnumFieldValue::Integer(val as i64),
        AnyValue::Int32(val) => EnumFieldValue::Integer(val as i64),
        AnyValue::Int64(val) => EnumFieldValue::Integer(val),
        AnyValue::Int128(val) => i64::try_from(val)
            .map_or_else(|_| EnumFieldValue::Text(val.to_string()), EnumFieldValue::Integer),
        AnyValue::Float32(val) => EnumFieldValue::Float(val as f64),
        AnyValue::Float64(val) => EnumFieldValue::Float(val),
        _ => EnumFieldValue::Text(value.to_string()),
    }
}

fn convert_epoch_days(n_days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(n_days.checked_add(N_DAYS_CE_TO_UNIX_EPOCH)?)
}

fn convert_epoch_timestamp(n_ts: i64, time_unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match time_unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(n_ts)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(n_ts),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(n_ts),
    }?;
    Some(dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use polars::prelude::{Column, DataType, IpcWriter, SerWriter};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::projector::project_rows;
    use crate::spec::{EnumCellValue, SpecExportOptions};

    fn derive_scores_df() -> DataFrame {
        DataFrame::new(vec![
            Column::new("name".into(), ["张三", "李四"]),
            Column::new("chineseScore".into(), [Some(98.5), None]),
            Column::new("mathScore".into(), [100i64, 59]),
            Column::new("passed".into(), [true, false]),
        ])
        .expect("dataframe")
    }

    #[test]
    fn test_dataframe_row_field_access() {
        let records = DataFrameRecords::new(derive_scores_df());
        let row = records.row(1);

        assert_eq!(records.height(), 2);
        assert_eq!(row.field("name"), Some(EnumFieldValue::Text("李四".into())));
        assert_eq!(row.field("chineseScore"), Some(EnumFieldValue::Null));
        assert_eq!(row.field("mathScore"), Some(EnumFieldValue::Integer(59)));
        assert_eq!(row.field("passed"), Some(EnumFieldValue::Bool(false)));
        assert_eq!(row.field("missing"), None);
    }

    #[test]
    fn test_dataframe_records_project_and_header() {
        let records = DataFrameRecords::new(derive_scores_df());
        let EnumHeaderSpec::Flat(dict_leaves) = records.derive_flat_header() else {
            panic!("flat header expected");
        };
        assert_eq!(
            dict_leaves.keys().cloned().collect::<Vec<_>>(),
            records.field_names()
        );

        let l_fields = vec!["name".to_string(), "chineseScore".to_string()];
        let projection = project_rows(&l_fields, records.iter(), &SpecExportOptions::default())
            .unwrap_or_default();
        assert_eq!(
            projection.rows,
            vec![
                vec![
                    EnumCellValue::String("张三".into()),
                    EnumCellValue::String("98.5".into())
                ],
                vec![EnumCellValue::String("李四".into()), EnumCellValue::empty()],
            ]
        );
    }

    fn derive_dates_df() -> DataFrame {
        // 1993-01-01 and 1994-01-01 as days since the Unix epoch
        let col_date = Column::new("birthday".into(), [Some(8401i32), Some(8766), None])
            .cast(&DataType::Date)
            .expect("date column");
        // 2020-07-21 08:30:00 UTC in milliseconds
        let col_datetime = Column::new(
            "updatedAt".into(),
            [Some(1_595_320_200_000i64), None, Some(0)],
        )
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .expect("datetime column");
        DataFrame::new(vec![col_date, col_datetime]).expect("dataframe")
    }

    #[test]
    fn test_temporal_columns_become_chrono_values() {
        let records = DataFrameRecords::new(derive_dates_df());

        assert_eq!(
            records.row(0).field("birthday"),
            NaiveDate::from_ymd_opt(1993, 1, 1).map(EnumFieldValue::Date)
        );
        assert_eq!(records.row(2).field("birthday"), Some(EnumFieldValue::Null));
        assert_eq!(
            records.row(0).field("updatedAt"),
            NaiveDate::from_ymd_opt(2020, 7, 21)
                .and_then(|d| d.and_hms_opt(8, 30, 0))
                .map(EnumFieldValue::DateTime)
        );
        assert_eq!(
            records.row(2).field("updatedAt"),
            NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(EnumFieldValue::DateTime)
        );
    }

    #[test]
    fn test_temporal_columns_follow_export_patterns() {
        let mut df = derive_dates_df();
        let mut v_buf = Vec::new();
        IpcWriter::new(&mut v_buf).finish(&mut df).expect("ipc write");
        let records = DataFrameRecords::from_ipc_bytes(&v_buf).expect("decode");

        let options = SpecExportOptions {
            fmt_date: "%Y/%m/%d".to_string(),
            fmt_datetime: "%Y年%m月%d日 %H:%M".to_string(),
            ..Default::default()
        };
        let l_fields = vec!["birthday".to_string(), "updatedAt".to_string()];
        let projection = project_rows(&l_fields, records.iter(), &options).expect("projection");

        assert_eq!(
            projection.rows[0],
            vec![
                EnumCellValue::String("1993/01/01".into()),
                EnumCellValue::String("2020年07月21日 08:30".into()),
            ]
        );
        assert_eq!(
            projection.rows[1],
            vec![EnumCellValue::String("1994/01/01".into()), EnumCellValue::empty()]
        );
    }

    #[test]
    fn test_epoch_conversions_cover_every_time_unit() {
        let dt_expected = NaiveDate::from_ymd_opt(2020, 7, 21).and_then(|d| d.and_hms_opt(8, 30, 0));
        assert_eq!(
            convert_epoch_timestamp(1_595_320_200_000_000_000, TimeUnit::Nanoseconds),
            dt_expected
        );
        assert_eq!(
            convert_epoch_timestamp(1_595_320_200_000_000, TimeUnit::Microseconds),
            dt_expected
        );
        assert_eq!(convert_epoch_days(-1), NaiveDate::from_ymd_opt(1969, 12, 31));
        assert_eq!(convert_epoch_days(i32::MAX), None);
    }

    #[test]
    fn test_from_ipc_bytes() {
        let mut df = derive_scores_df();
        let mut v_buf = Vec::new();
        let if_written = IpcWriter::new(&mut v_buf).finish(&mut df).is_ok();
        assert!(if_written);

        let records = DataFrameRecords::from_ipc_bytes(&v_buf).expect("decode");
        assert_eq!(records.height(), 2);
        assert_eq!(
            records.row(0).field("mathScore"),
            Some(EnumFieldValue::Integer(100))
        );
    }

    #[test]
    fn test_from_ipc_bytes_rejects_garbage() {
        assert!(matches!(
            DataFrameRecords::from_ipc_bytes(b"not arrow"),
            Err(MergeHeadError::DataFrame(_))
        ));
    }
}
