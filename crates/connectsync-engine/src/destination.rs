//! Writes into the Heroku Connect mapped tables.
//!
//! A record for object type `Contact` lands in `"<schema>"."contact"` with
//! `_hc_lastop = 'PENDING'`, which tells Heroku Connect to push the row to
//! Salesforce.
//!
//! The record data travels as one JSONB parameter expanded with
//! `jsonb_populate_record`, so each field is converted to its column's type
//! (dates, numbers, nulls) by Postgres itself.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

use crate::error::DestinationError;

/// Default Heroku Connect schema.
pub const DEFAULT_SCHEMA: &str = "salesforce";

/// A parameterized insert into a mapped table.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationWrite {
    pub schema: String,
    pub table: String,
    /// Column names, lower-cased, in payload order.
    pub columns: Vec<String>,
    /// Field values keyed by column name, bound as `$1`.
    pub row: Map<String, JsonValue>,
}

impl DestinationWrite {
    /// Build the insert for `record_type` from a JSON object of fields.
    pub fn build(
        schema: &str,
        record_type: &str,
        data: &JsonValue,
    ) -> Result<Self, DestinationError> {
        let fields = data
            .as_object()
            .ok_or(DestinationError::NotAnObject(json_kind(data)))?;

        if fields.is_empty() {
            return Err(DestinationError::EmptyData);
        }

        let mut seen: HashMap<String, &str> = HashMap::with_capacity(fields.len());
        let mut columns = Vec::with_capacity(fields.len());
        let mut row = Map::new();

        for (name, value) in fields {
            let column = name.to_lowercase();
            if let Some(first) = seen.insert(column.clone(), name) {
                return Err(DestinationError::DuplicateColumn {
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
            row.insert(column.clone(), value.clone());
            columns.push(column);
        }

        Ok(Self {
            schema: schema.to_string(),
            table: record_type.to_lowercase(),
            columns,
            row,
        })
    }

    /// Schema-qualified, quoted table name.
    #[must_use]
    pub fn qualified_table(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }

    /// The `INSERT` statement; `$1` is [`Self::row`] as JSONB.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut columns = vec![
            quote_identifier("_hc_lastop"),
            quote_identifier("_hc_err"),
        ];
        let mut selected = vec!["'PENDING'".to_string(), "NULL".to_string()];

        for column in &self.columns {
            let column = quote_identifier(column);
            selected.push(format!("r.{column}"));
            columns.push(column);
        }

        let table = self.qualified_table();
        format!(
            "INSERT INTO {table} ({}) SELECT {} FROM jsonb_populate_record(NULL::{table}, $1) AS r",
            columns.join(", "),
            selected.join(", ")
        )
    }
}

/// Escape SQL identifier to prevent SQL injection.
#[must_use]
pub fn escape_identifier(identifier: &str) -> String {
    identifier.replace('"', "\"\"")
}

/// Escape and double-quote an identifier.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", escape_identifier(identifier))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
