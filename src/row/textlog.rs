//! Redo-log text for TEXT TABLE DML: every insert/delete against a
//! text-backed row store is also recorded as an equivalent SQL
//! statement, so a crash-recovery replay (outside this
//! crate's scope — it is the executor's job to run these back through
//! itself) can reconstruct the table's state without an explicit binary
//! transaction log for that table.

use crate::value::SqlValue;

/// Renders `INSERT INTO <table> VALUES (...)`.
pub fn insert_statement(table: &str, fields: &[SqlValue]) -> String {
    let values = fields
        .iter()
        .map(render_literal)
        .collect::<Vec<_>>()
        .join(",");
    format!("INSERT INTO {} VALUES ({})", table, values)
}

/// Renders `DELETE FROM <table> WHERE col0=v0 AND col1=v1 ...`, using
/// `IS NULL` for null-valued columns.
pub fn delete_statement(table: &str, columns: &[String], fields: &[SqlValue]) -> String {
    let predicate = columns
        .iter()
        .zip(fields.iter())
        .map(|(col, val)| match val {
            SqlValue::Null => format!("{} IS NULL", col),
            other => format!("{}={}", col, render_literal(other)),
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("DELETE FROM {} WHERE {}", table, predicate)
}

fn render_literal(v: &SqlValue) -> String {
    match v {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Boolean(b) => b.to_string(),
        SqlValue::TinyInt(x) => x.to_string(),
        SqlValue::SmallInt(x) => x.to_string(),
        SqlValue::Int(x) => x.to_string(),
        SqlValue::BigInt(x) => x.to_string(),
        SqlValue::Real(x) => x.to_string(),
        SqlValue::Double(x) => x.to_string(),
        SqlValue::Numeric(d) => format!("{}E-{}", d.unscaled, d.scale),
        SqlValue::Char(s) | SqlValue::VarChar(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_renders_values_list() {
        let fields = vec![SqlValue::Int(1), SqlValue::VarChar("a".into())];
        assert_eq!(
            insert_statement("T", &fields),
            "INSERT INTO T VALUES (1,'a')"
        );
    }

    #[test]
    fn delete_uses_is_null_for_null_columns() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let fields = vec![SqlValue::Int(1), SqlValue::Null];
        assert_eq!(
            delete_statement("T", &columns, &fields),
            "DELETE FROM T WHERE id=1 AND name IS NULL"
        );
    }

    #[test]
    fn string_literal_escapes_quotes() {
        let fields = vec![SqlValue::VarChar("o'brien".into())];
        assert_eq!(
            insert_statement("T", &fields),
            "INSERT INTO T VALUES ('o''brien')"
        );
    }
}
