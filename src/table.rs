use chrono::NaiveDateTime;

/// Timestamp rendering used for display and export.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single cell. Every column is nullable; `Null` stands for both JSON null
/// and "field not present on this record".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    /// Non-object nested JSON (arrays), kept opaque.
    Json(serde_json::Value),
}

impl Value {
    /// Convert a leaf JSON value into a cell. Objects are flattened by the
    /// ingestor before they get here; one that slips through is kept opaque.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }
            Value::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Text is not coerced here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str(""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

/// A named column with one value per table row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// Column-oriented table with a dynamic schema.
///
/// All columns always hold exactly `len()` values. Column order follows
/// first appearance and is kept stable by in-place replacement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.position(name).map(|i| self.columns[i].values.as_slice())
    }

    /// Cell at `row` in column `name`. `None` if the column or row does not exist.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        self.column(name).and_then(|values| values.get(row))
    }

    /// Iterate the (column, value) pairs of one row.
    pub fn row(&self, index: usize) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .filter_map(move |c| c.values.get(index).map(|v| (c.name.as_str(), v)))
    }

    /// Append a row. Unknown columns are added with nulls back-filled for the
    /// existing rows; known columns missing from `fields` get a null.
    /// A repeated field name keeps the last value.
    pub fn push_row(&mut self, fields: Vec<(String, Value)>) {
        let mut slots = vec![Value::Null; self.columns.len()];
        for (name, value) in fields {
            let idx = match self.position(&name) {
                Some(i) => i,
                None => {
                    self.columns.push(Column {
                        name,
                        values: vec![Value::Null; self.len],
                    });
                    slots.push(Value::Null);
                    self.columns.len() - 1
                }
            };
            slots[idx] = value;
        }
        for (column, value) in self.columns.iter_mut().zip(slots) {
            column.values.push(value);
        }
        self.len += 1;
    }

    /// Rename `from` to `to`. Returns false if `from` is absent.
    ///
    /// When `to` already exists the two columns are coalesced: existing
    /// non-null values in `to` win, nulls are filled from `from`, and `from`
    /// is removed.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        let Some(src_idx) = self.position(from) else {
            return false;
        };
        match self.position(to) {
            None => {
                self.columns[src_idx].name = to.to_string();
            }
            Some(_) => {
                let source = self.columns.remove(src_idx);
                // Re-resolve: removal may have shifted the target index.
                if let Some(dst_idx) = self.position(to) {
                    let target = &mut self.columns[dst_idx].values;
                    for (slot, value) in target.iter_mut().zip(source.values) {
                        if slot.is_null() {
                            *slot = value;
                        }
                    }
                }
            }
        }
        true
    }

    /// Replace the values of `name`, or append it as a new column.
    ///
    /// `values` must have one entry per row. On a table with no rows and no
    /// columns the row count is taken from `values`.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        if self.columns.is_empty() && self.len == 0 {
            self.len = values.len();
        }
        debug_assert_eq!(values.len(), self.len, "column {name} has wrong length");
        match self.position(name) {
            Some(i) => self.columns[i].values = values,
            None => self.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
    }

    /// Remove a column, returning it if it existed.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        self.position(name).map(|i| self.columns.remove(i))
    }

    /// New table with only the rows for which `keep(row_index)` is true.
    /// The column set is unchanged.
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Table {
        let mask: Vec<bool> = (0..self.len).map(keep).collect();
        let len = mask.iter().filter(|k| **k).count();
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .zip(&mask)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| v.clone())
                    .collect(),
            })
            .collect();
        Table { columns, len }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_push_row_unions_schema() {
        let mut t = Table::new();
        t.push_row(vec![("a".into(), Value::Int(1))]);
        t.push_row(vec![("b".into(), text("x"))]);

        assert_eq!(t.len(), 2);
        assert_eq!(t.column_names(), vec!["a", "b"]);
        assert_eq!(t.column("a").unwrap(), &[Value::Int(1), Value::Null]);
        assert_eq!(t.column("b").unwrap(), &[Value::Null, text("x")]);
    }

    #[test]
    fn test_push_empty_row_counts() {
        let mut t = Table::new();
        t.push_row(Vec::new());
        assert_eq!(t.len(), 1);
        assert_eq!(t.width(), 0);
    }

    #[test]
    fn test_rename_missing_is_noop() {
        let mut t = Table::new();
        t.push_row(vec![("a".into(), Value::Int(1))]);
        assert!(!t.rename_column("missing", "other"));
        assert_eq!(t.column_names(), vec!["a"]);
    }

    #[test]
    fn test_rename_in_place_keeps_position() {
        let mut t = Table::new();
        t.push_row(vec![("a".into(), Value::Int(1)), ("b".into(), Value::Int(2))]);
        assert!(t.rename_column("a", "z"));
        assert_eq!(t.column_names(), vec!["z", "b"]);
    }

    #[test]
    fn test_rename_coalesces_into_existing() {
        let mut t = Table::new();
        t.push_row(vec![("old".into(), text("A"))]);
        t.push_row(vec![("new".into(), text("B"))]);
        t.push_row(vec![("old".into(), text("C")), ("new".into(), text("D"))]);

        assert!(t.rename_column("old", "new"));
        assert_eq!(t.column_names(), vec!["new"]);
        assert_eq!(t.column("new").unwrap(), &[text("A"), text("B"), text("D")]);
    }

    #[test]
    fn test_set_column_replaces_and_appends() {
        let mut t = Table::new();
        t.push_row(vec![("a".into(), Value::Int(1))]);
        t.set_column("a", vec![Value::Int(5)]);
        t.set_column("b", vec![Value::Bool(true)]);
        assert_eq!(t.column_names(), vec!["a", "b"]);
        assert_eq!(t.get(0, "a"), Some(&Value::Int(5)));
        assert_eq!(t.get(0, "b"), Some(&Value::Bool(true)));
        assert_eq!(t.get(1, "b"), None);
        assert_eq!(t.get(0, "c"), None);
    }

    #[test]
    fn test_filter_rows() {
        let mut t = Table::new();
        for i in 0..5 {
            t.push_row(vec![("n".into(), Value::Int(i))]);
        }
        let even = t.filter_rows(|i| i % 2 == 0);
        assert_eq!(even.len(), 3);
        assert_eq!(
            even.column("n").unwrap(),
            &[Value::Int(0), Value::Int(2), Value::Int(4)]
        );
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(serde_json::json!(30000)), Value::Int(30000));
        assert_eq!(Value::from_json(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(serde_json::json!(null)), Value::Null);
        assert!(matches!(
            Value::from_json(serde_json::json!([1, 2])),
            Value::Json(_)
        ));
    }

    #[test]
    fn test_row_iterates_pairs() {
        let mut t = Table::new();
        t.push_row(vec![("a".into(), Value::Int(1)), ("b".into(), text("x"))]);
        let row: Vec<_> = t.row(0).collect();
        assert_eq!(row, vec![("a", &Value::Int(1)), ("b", &text("x"))]);
    }
}
