//! In-memory tables used by the convert stage.
//!
//! [`RawTable`] accumulates CSV chunks column by column as undecoded bytes.
//! [`RawTable::into_text`] then coerces every column to UTF-8 text, giving a
//! [`TextTable`] ready for columnar encoding.

use crate::error::ItemFailure;
use csv::ByteRecord;
use tracing::warn;

/// Column-major table of raw cell bytes.
#[derive(Debug, Default)]
pub struct RawTable {
    names: Vec<Vec<u8>>,
    columns: Vec<Vec<Vec<u8>>>,
    rows: usize,
}

impl RawTable {
    /// An empty table with one column per header field.
    #[must_use]
    pub fn new(header: &ByteRecord) -> Self {
        Self {
            names: header.iter().map(<[u8]>::to_vec).collect(),
            columns: vec![Vec::new(); header.len()],
            rows: 0,
        }
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.names.len()
    }

    /// Append rows. Cells beyond the header width are ignored and missing
    /// cells are stored as empty.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = ByteRecord>) {
        for row in rows {
            for (i, column) in self.columns.iter_mut().enumerate() {
                column.push(row.get(i).map(<[u8]>::to_vec).unwrap_or_default());
            }
            self.rows += 1;
        }
    }

    /// Coerce every column to text.
    ///
    /// Each column is decoded strictly as UTF-8. A column holding an invalid
    /// sequence is logged and decoded value by value instead, replacing the
    /// invalid bytes; it is also returned as an [`ItemFailure`].
    #[must_use]
    pub fn into_text(self) -> (TextTable, Vec<ItemFailure>) {
        let mut failures = Vec::new();
        let names: Vec<String> = self
            .names
            .iter()
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect();

        let columns = names
            .iter()
            .zip(self.columns)
            .map(|(name, values)| match strict_text(values) {
                Ok(text) => text,
                Err((row, values)) => {
                    warn!(column = %name, row, "column is not valid UTF-8, converting per value");
                    failures.push(ItemFailure::new(
                        format!("column {name}"),
                        format!("invalid UTF-8 at row {row}"),
                    ));
                    lossy_text(values)
                }
            })
            .collect();

        (
            TextTable {
                names,
                columns,
                rows: self.rows,
            },
            failures,
        )
    }
}

/// All values decoded, or the first bad row with the untouched values.
fn strict_text(values: Vec<Vec<u8>>) -> Result<Vec<String>, (usize, Vec<Vec<u8>>)> {
    if let Some(row) = values.iter().position(|v| std::str::from_utf8(v).is_err()) {
        return Err((row, values));
    }
    Ok(values
        .into_iter()
        .map(|v| String::from_utf8(v).unwrap_or_default())
        .collect())
}

fn lossy_text(values: Vec<Vec<u8>>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match String::from_utf8(v) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
        .collect()
}

/// Column-major table where every cell is text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTable {
    names: Vec<String>,
    columns: Vec<Vec<String>>,
    rows: usize,
}

impl TextTable {
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.names.len()
    }

    /// Consume the table into `(names, columns)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<String>>) {
        (self.names, self.columns)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[String]> {
        let i = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_concatenate_in_order() {
        let mut t = RawTable::new(&ByteRecord::from(vec!["id", "v"]));
        t.extend(vec![ByteRecord::from(vec!["1", "3"])]);
        t.extend(vec![
            ByteRecord::from(vec!["2", ""]),
            ByteRecord::from(vec!["3", "abc"]),
        ]);
        let (text, failures) = t.into_text();
        assert!(failures.is_empty());
        assert_eq!(text.num_rows(), 3);
        assert_eq!(text.column("v").unwrap(), ["3", "", "abc"]);
        assert_eq!(text.column("id").unwrap(), ["1", "2", "3"]);
    }

    #[test]
    fn invalid_utf8_falls_back_per_value() {
        let mut t = RawTable::new(&ByteRecord::from(vec!["a", "b"]));
        let mut bad = ByteRecord::new();
        bad.push_field(b"ok");
        bad.push_field(&[0x66, 0xff, 0x6f]);
        t.extend(vec![ByteRecord::from(vec!["x", "y"]), bad]);

        let (text, failures) = t.into_text();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item, "column b");
        assert_eq!(text.column("a").unwrap(), ["x", "ok"]);
        assert_eq!(text.column("b").unwrap(), ["y", "f\u{fffd}o"]);
    }
}
