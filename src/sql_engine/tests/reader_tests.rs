//! Tests for turning decoded rows into Arrow batches

use chrono::{NaiveDate, TimeZone, Utc};
use datafusion::arrow::array::{
    Array, Date32Array, Float64Array, Int32Array, StringArray, TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use pretty_assertions::assert_eq;

use crate::commands::config::ConnectionParams;
use crate::sql_engine::reader::{
    build_batch, check_declared_schema, connect_options, Cell, RawTable,
};
use crate::sql_engine::tables::{ColumnDef, SqlType, TableSchema};

fn column(name: &str, data_type: SqlType, nullable: bool) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        data_type,
        nullable,
    }
}

fn booking_schema() -> TableSchema {
    TableSchema {
        name: "table_raw".to_string(),
        columns: vec![
            column("hotel", SqlType::Text, false),
            column("lead_time", SqlType::Integer, true),
            column("adr", SqlType::Numeric, true),
            column("arrival_date", SqlType::Date, true),
            column("reservation_status_date", SqlType::TimestampTz, true),
        ],
    }
}

fn full_params() -> ConnectionParams {
    ConnectionParams {
        user: Some("analyst".to_string()),
        password: Some("secret".to_string()),
        host: Some("db.internal".to_string()),
        port: Some("5432".to_string()),
        db_name: Some("hotel_booking".to_string()),
    }
}

#[test]
fn test_build_batch_shape_and_values() {
    let schema = booking_schema();
    let arrow_schema = schema.to_arrow_schema();
    let booked_at = Utc.with_ymd_and_hms(2015, 7, 1, 12, 30, 0).unwrap();

    let rows = vec![
        vec![
            Cell::Text("Resort Hotel".to_string()),
            Cell::Int32(342),
            Cell::Float64(0.0),
            Cell::Date(NaiveDate::from_ymd_opt(2015, 7, 1).unwrap()),
            Cell::TimestampTz(booked_at),
        ],
        vec![
            Cell::Text("City Hotel".to_string()),
            Cell::Null,
            Cell::Float64(75.5),
            Cell::Null,
            Cell::Null,
        ],
    ];

    let batch = build_batch(&schema, arrow_schema.clone(), &rows).unwrap();
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(batch.num_columns(), 5);
    assert_eq!(batch.schema(), arrow_schema);

    let hotel = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(hotel.value(1), "City Hotel");

    let lead_time = batch.column(1).as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(lead_time.value(0), 342);
    assert!(lead_time.is_null(1));

    let adr = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
    assert_eq!(adr.value(1), 75.5);

    let arrival = batch.column(3).as_any().downcast_ref::<Date32Array>().unwrap();
    assert_eq!(arrival.value(0), 16617);
    assert!(arrival.is_null(1));

    let status = batch
        .column(4)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    assert_eq!(status.value(0), booked_at.timestamp_micros());
    assert_eq!(
        batch.schema().field(4).data_type(),
        &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
    );
}

#[test]
fn test_build_batch_without_rows() {
    let schema = booking_schema();
    let batch = build_batch(&schema, schema.to_arrow_schema(), &[]).unwrap();
    assert_eq!(batch.num_rows(), 0);
    assert_eq!(batch.num_columns(), 5);
}

#[test]
fn test_build_batch_rejects_zero_column_schema() {
    let schema = TableSchema {
        name: "table_raw".to_string(),
        columns: vec![],
    };
    let rows = vec![vec![], vec![]];

    let err = build_batch(&schema, schema.to_arrow_schema(), &rows).unwrap_err();
    assert!(err.to_string().contains("has no columns"), "{}", err);
}

#[test]
fn test_build_batch_rejects_mismatched_cell() {
    let schema = TableSchema {
        name: "t".to_string(),
        columns: vec![column("lead_time", SqlType::Integer, true)],
    };
    let rows = vec![vec![Cell::Text("342".to_string())]];

    let err = build_batch(&schema, schema.to_arrow_schema(), &rows).unwrap_err();
    assert!(format!("{:#}", err).contains("lead_time"), "{:#}", err);
}

#[test]
fn test_build_batch_rejects_null_in_required_column() {
    let schema = TableSchema {
        name: "t".to_string(),
        columns: vec![column("hotel", SqlType::Text, false)],
    };
    let rows = vec![vec![Cell::Null]];

    let err = build_batch(&schema, schema.to_arrow_schema(), &rows).unwrap_err();
    assert!(err.to_string().contains("non-nullable column 'hotel'"));
}

#[test]
fn test_build_batch_rejects_short_row() {
    let schema = booking_schema();
    let rows = vec![vec![Cell::Text("Resort Hotel".to_string())]];
    assert!(build_batch(&schema, schema.to_arrow_schema(), &rows).is_err());
}

#[test]
fn test_raw_table_shape_spans_batches() {
    let schema = booking_schema();
    let arrow_schema = schema.to_arrow_schema();
    let row = vec![
        Cell::Text("City Hotel".to_string()),
        Cell::Int32(1),
        Cell::Float64(1.0),
        Cell::Null,
        Cell::Null,
    ];
    let first = build_batch(&schema, arrow_schema.clone(), &vec![row.clone(); 3]).unwrap();
    let second = build_batch(&schema, arrow_schema.clone(), &vec![row; 2]).unwrap();

    let table = RawTable::try_new("table_raw", arrow_schema, vec![first, second]).unwrap();
    assert_eq!(table.shape(), (5, 5));
    assert_eq!(table.name(), "table_raw");
}

#[test]
fn test_raw_table_rejects_foreign_batch() {
    let schema = booking_schema();
    let other = TableSchema {
        name: "other".to_string(),
        columns: vec![column("id", SqlType::BigInt, false)],
    };
    let batch = build_batch(&other, other.to_arrow_schema(), &[vec![Cell::Int64(1)]]).unwrap();

    assert!(RawTable::try_new("table_raw", schema.to_arrow_schema(), vec![batch]).is_err());
}

#[test]
fn test_check_declared_schema() {
    let actual = booking_schema();

    let mut declared = actual.clone();
    declared.columns[1].data_type = SqlType::BigInt;
    assert!(check_declared_schema(&declared, &actual).is_ok());

    declared.columns.swap(0, 1);
    let err = check_declared_schema(&declared, &actual).unwrap_err();
    assert!(err.to_string().contains("does not match"));

    declared.columns.truncate(2);
    assert!(check_declared_schema(&declared, &actual).is_err());
}

#[test]
fn test_connect_options_with_all_parameters() {
    assert!(connect_options(&full_params()).is_ok());
}

#[test]
fn test_connect_options_fails_on_unset_parameters() {
    let mut params = full_params();
    params.host = None;
    params.db_name = None;

    let err = connect_options(&params).unwrap_err().to_string();
    assert!(err.contains("host"), "{}", err);
    assert!(err.contains("db_name"), "{}", err);
    assert!(!err.contains("secret"), "password leaked: {}", err);
}

#[test]
fn test_connect_options_fails_on_blank_parameters() {
    let mut params = full_params();
    params.db_name = Some(String::new());
    params.password = Some(String::new());

    let err = connect_options(&params).unwrap_err().to_string();
    assert!(err.contains("db_name"), "{}", err);
    assert!(!err.contains("password"), "{}", err);
}

#[test]
fn test_connect_options_fails_without_any_environment() {
    assert!(connect_options(&ConnectionParams::default()).is_err());
}

#[test]
fn test_connect_options_fails_on_invalid_port() {
    let mut params = full_params();
    params.port = Some("None".to_string());

    let err = format!("{:#}", connect_options(&params).unwrap_err());
    assert!(err.contains("invalid port 'None'"), "{}", err);
}
