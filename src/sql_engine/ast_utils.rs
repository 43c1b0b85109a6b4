//! Utility functions for building the read query with `sqlparser` types
use anyhow::{bail, Context, Result};
use sqlparser::ast::{Ident, ObjectName};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use super::tables::TableSchema;

/// A table reference split into its optional schema and table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
}

impl TableRef {
    /// Parse `table` or `schema.table` using PostgreSQL identifier rules.
    ///
    /// Unquoted identifiers are folded to lower case the way PostgreSQL does.
    pub fn parse(input: &str) -> Result<TableRef> {
        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(input)
            .with_context(|| format!("Invalid table name '{}'", input))?;
        let name = parser
            .parse_object_name(false)
            .with_context(|| format!("Invalid table name '{}'", input))?;
        if parser.peek_token().token != Token::EOF {
            bail!("Invalid table name '{}': unexpected trailing input", input);
        }

        let mut parts: Vec<String> = name.0.iter().map(normalize_ident).collect();
        match parts.len() {
            1 => Ok(TableRef {
                schema: None,
                table: parts.remove(0),
            }),
            2 => {
                let table = parts.remove(1);
                Ok(TableRef {
                    schema: Some(parts.remove(0)),
                    table,
                })
            }
            n => bail!(
                "Invalid table name '{}': expected [schema.]table, got {} parts",
                input,
                n
            ),
        }
    }

    /// Quoted object name, safe to splice into SQL
    pub fn to_object_name(&self) -> ObjectName {
        let mut idents = Vec::with_capacity(2);
        if let Some(schema) = &self.schema {
            idents.push(Ident::with_quote('"', schema));
        }
        idents.push(Ident::with_quote('"', &self.table));
        ObjectName(idents)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => f.write_str(&self.table),
        }
    }
}

fn normalize_ident(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_lowercase(),
    }
}

/// Build the query reading every row of `table`.
///
/// This is `SELECT * FROM table` with the star expanded so every column is
/// cast to the type its declared schema maps it to. The schema is expected to
/// have at least one column.
pub fn build_select_all(table: &TableRef, schema: &TableSchema) -> String {
    let projection = schema
        .columns
        .iter()
        .map(|col| {
            let ident = Ident::with_quote('"', &col.name);
            format!(
                "CAST({} AS {}) AS {}",
                ident,
                col.data_type.cast_target(),
                ident
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("SELECT {} FROM {}", projection, table.to_object_name())
}
