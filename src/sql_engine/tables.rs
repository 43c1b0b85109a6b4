use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};

/// Represents a SQL table schema
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// Represents a column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: SqlType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Represents SQL data types and their fixed Arrow counterpart.
///
/// `Numeric` is read as `float8` and anything the loader has no native
/// mapping for (`Other`) is read as `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Boolean,
    Date,
    Timestamp,
    TimestampTz,
    Other(String),
}

impl SqlType {
    /// Map a `information_schema.columns.data_type` value.
    ///
    /// Unknown names are kept as `Other` so introspection never fails on exotic
    /// column types.
    pub fn from_information_schema(data_type: &str) -> SqlType {
        match data_type.trim().to_lowercase().as_str() {
            "smallint" => SqlType::SmallInt,
            "integer" => SqlType::Integer,
            "bigint" => SqlType::BigInt,
            "real" => SqlType::Real,
            "double precision" => SqlType::Double,
            "numeric" | "decimal" => SqlType::Numeric,
            "text" | "character varying" | "character" | "name" => SqlType::Text,
            "boolean" => SqlType::Boolean,
            "date" => SqlType::Date,
            "timestamp without time zone" => SqlType::Timestamp,
            "timestamp with time zone" => SqlType::TimestampTz,
            other => SqlType::Other(other.to_string()),
        }
    }

    /// Parse a type name written in a declared schema.
    ///
    /// Accepts the short PostgreSQL aliases as well as the standard names.
    pub fn parse_declared(name: &str) -> Result<SqlType, String> {
        let normalized = name.trim().to_lowercase();
        let sql_type = match normalized.as_str() {
            "smallint" | "int2" => SqlType::SmallInt,
            "integer" | "int" | "int4" => SqlType::Integer,
            "bigint" | "int8" => SqlType::BigInt,
            "real" | "float4" => SqlType::Real,
            "double precision" | "double" | "float8" => SqlType::Double,
            "numeric" | "decimal" => SqlType::Numeric,
            "text" | "varchar" | "character varying" | "string" => SqlType::Text,
            "boolean" | "bool" => SqlType::Boolean,
            "date" => SqlType::Date,
            "timestamp" | "timestamp without time zone" => SqlType::Timestamp,
            "timestamptz" | "timestamp with time zone" => SqlType::TimestampTz,
            _ => return Err(format!("unsupported declared column type '{}'", name)),
        };
        Ok(sql_type)
    }

    /// The Arrow type values of this column are stored as
    pub fn arrow_type(&self) -> DataType {
        match self {
            SqlType::SmallInt => DataType::Int16,
            SqlType::Integer => DataType::Int32,
            SqlType::BigInt => DataType::Int64,
            SqlType::Real => DataType::Float32,
            SqlType::Double | SqlType::Numeric => DataType::Float64,
            SqlType::Text | SqlType::Other(_) => DataType::Utf8,
            SqlType::Boolean => DataType::Boolean,
            SqlType::Date => DataType::Date32,
            SqlType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            SqlType::TimestampTz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC")))
            }
        }
    }

    /// The PostgreSQL type the column is cast to when it is read
    pub fn cast_target(&self) -> &'static str {
        match self {
            SqlType::SmallInt => "int2",
            SqlType::Integer => "int4",
            SqlType::BigInt => "int8",
            SqlType::Real => "float4",
            SqlType::Double | SqlType::Numeric => "float8",
            SqlType::Text | SqlType::Other(_) => "text",
            SqlType::Boolean => "bool",
            SqlType::Date => "date",
            SqlType::Timestamp => "timestamp",
            SqlType::TimestampTz => "timestamptz",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Real => "real",
            SqlType::Double => "double precision",
            SqlType::Numeric => "numeric",
            SqlType::Text => "text",
            SqlType::Boolean => "boolean",
            SqlType::Date => "date",
            SqlType::Timestamp => "timestamp",
            SqlType::TimestampTz => "timestamptz",
            SqlType::Other(name) => name,
        };
        f.write_str(name)
    }
}

impl TryFrom<String> for SqlType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SqlType::parse_declared(&value)
    }
}

impl From<SqlType> for String {
    fn from(value: SqlType) -> Self {
        value.to_string()
    }
}

impl TableSchema {
    /// Build the Arrow schema the snapshot and the dataframe share
    pub fn to_arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|col| Field::new(&col.name, col.data_type.arrow_type(), col.nullable))
            .collect();
        Arc::new(Schema::new(fields))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }
}

/// Table manager holding the schemas declared in the project config
#[derive(Default)]
pub struct TableManager {
    schemas: HashMap<String, TableSchema>,
}

impl TableManager {
    /// Create a new empty table manager
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Build a manager from `table name -> declared columns`
    pub fn from_declarations(declarations: &HashMap<String, Vec<ColumnDef>>) -> Self {
        let mut manager = Self::new();
        for (name, columns) in declarations {
            manager.register_schema(TableSchema {
                name: name.clone(),
                columns: columns.clone(),
            });
        }
        manager
    }

    /// Add or update a table schema
    pub fn register_schema(&mut self, schema: TableSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Get a specific table schema by name
    pub fn get_schema(&self, table_name: &str) -> Option<&TableSchema> {
        self.schemas.get(table_name)
    }
}
