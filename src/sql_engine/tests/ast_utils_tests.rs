//! Tests for table name parsing and read query building

use pretty_assertions::assert_eq;
use test_case::test_case;

use crate::sql_engine::ast_utils::{build_select_all, TableRef};
use crate::sql_engine::tables::{ColumnDef, SqlType, TableSchema};

#[test_case("table_raw", None, "table_raw"; "plain name")]
#[test_case("Table_Raw", None, "table_raw"; "unquoted names fold to lower case")]
#[test_case("public.table_raw", Some("public"), "table_raw"; "schema qualified")]
#[test_case("\"Bookings\"", None, "Bookings"; "quoted name keeps case")]
#[test_case("staging.\"Raw Data\"", Some("staging"), "Raw Data"; "quoted name with space")]
fn test_parse_table_ref(input: &str, schema: Option<&str>, table: &str) {
    let parsed = TableRef::parse(input).unwrap();
    assert_eq!(parsed.schema.as_deref(), schema);
    assert_eq!(parsed.table, table);
}

#[test_case(""; "empty")]
#[test_case("a.b.c"; "too many parts")]
#[test_case("table_raw; DROP TABLE x"; "trailing statement")]
#[test_case("table raw"; "trailing word")]
fn test_parse_table_ref_rejects(input: &str) {
    assert!(TableRef::parse(input).is_err(), "accepted '{}'", input);
}

#[test]
fn test_table_ref_display() {
    let table = TableRef::parse("public.table_raw").unwrap();
    assert_eq!(table.to_string(), "public.table_raw");
    assert_eq!(table.to_object_name().to_string(), "\"public\".\"table_raw\"");
}

#[test]
fn test_build_select_all_casts_every_column() {
    let table = TableRef::parse("table_raw").unwrap();
    let schema = TableSchema {
        name: "table_raw".to_string(),
        columns: vec![
            ColumnDef {
                name: "hotel".to_string(),
                data_type: SqlType::Text,
                nullable: true,
            },
            ColumnDef {
                name: "lead_time".to_string(),
                data_type: SqlType::Integer,
                nullable: false,
            },
            ColumnDef {
                name: "adr".to_string(),
                data_type: SqlType::Numeric,
                nullable: true,
            },
        ],
    };

    assert_eq!(
        build_select_all(&table, &schema),
        "SELECT CAST(\"hotel\" AS text) AS \"hotel\", \
         CAST(\"lead_time\" AS int4) AS \"lead_time\", \
         CAST(\"adr\" AS float8) AS \"adr\" FROM \"table_raw\""
    );
}

#[test]
fn test_build_select_all_escapes_quotes() {
    let table = TableRef::parse("\"odd\"\"name\"").unwrap();
    assert_eq!(table.table, "odd\"name");

    let schema = TableSchema {
        name: table.table.clone(),
        columns: vec![ColumnDef {
            name: "a\"b".to_string(),
            data_type: SqlType::Boolean,
            nullable: true,
        }],
    };
    assert_eq!(
        build_select_all(&table, &schema),
        "SELECT CAST(\"a\"\"b\" AS bool) AS \"a\"\"b\" FROM \"odd\"\"name\""
    );
}
