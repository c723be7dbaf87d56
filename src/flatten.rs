use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::KiraError;
use crate::tabular::cell_text;

pub const SCALAR_RECORD_COLUMN: &str = "value";

#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    Scalar(Value),
    List(Vec<Nested>),
    Object(Vec<(String, Nested)>),
}

impl From<Value> for Nested {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Nested::List(items.into_iter().map(Nested::from).collect()),
            Value::Object(fields) => Nested::Object(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, Nested::from(value)))
                    .collect(),
            ),
            scalar => Nested::Scalar(scalar),
        }
    }
}

impl Nested {
    pub fn depth(&self) -> usize {
        match self {
            Nested::Scalar(_) => 0,
            Nested::List(items) => 1 + items.iter().map(Nested::depth).max().unwrap_or(0),
            Nested::Object(fields) => {
                1 + fields.iter().map(|(_, node)| node.depth()).max().unwrap_or(0)
            }
        }
    }
}

type Row = Vec<(String, String)>;

#[derive(Debug, Clone, Default)]
pub struct FlatTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl FlatTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let column = self.column_index(column)?;
        (row < self.rows.len()).then(|| self.cell(row, column))
    }

    fn push_row(&mut self, row: Row) {
        let mut cells = vec![String::new(); self.columns.len()];
        for (column, value) in row {
            let idx = match self.index.get(&column) {
                Some(idx) => *idx,
                None => {
                    let idx = self.columns.len();
                    self.index.insert(column.clone(), idx);
                    self.columns.push(column);
                    idx
                }
            };
            if idx >= cells.len() {
                cells.resize(idx + 1, String::new());
            }
            cells[idx] = value;
        }
        self.rows.push(cells);
    }
}

pub fn flatten<I>(records: I) -> FlatTable
where
    I: IntoIterator<Item = Value>,
{
    let mut table = FlatTable::default();
    let mut max_depth = 0;
    for record in records {
        let node = Nested::from(record);
        max_depth = max_depth.max(node.depth());
        let rows = match &node {
            Nested::Object(_) => flatten_node("", &node),
            _ => flatten_node(SCALAR_RECORD_COLUMN, &node),
        };
        for row in rows {
            table.push_row(row);
        }
    }
    debug!(max_depth, rows = table.len(), "flattened nested records");
    table
}

pub fn flatten_document(document: Value) -> FlatTable {
    match document {
        Value::Array(records) => flatten(records),
        record => flatten([record]),
    }
}

pub fn load_flat_reference(path: &Path) -> Result<FlatTable, KiraError> {
    let file = File::open(path).map_err(|err| KiraError::InputOpen {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let document: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| KiraError::JsonStream(format!("{}: {err}", path.display())))?;
    let table = flatten_document(document);
    if table.is_empty() {
        warn!(path = %path.display(), "reference data has no rows");
    }
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "reference data flattened"
    );
    Ok(table)
}

fn flatten_node(prefix: &str, node: &Nested) -> Vec<Row> {
    match node {
        Nested::Scalar(value) => vec![vec![(prefix.to_string(), cell_text(value))]],
        Nested::List(items) => items
            .iter()
            .flat_map(|item| flatten_node(prefix, item))
            .collect(),
        Nested::Object(fields) => {
            let mut rows: Vec<Row> = vec![Vec::new()];
            for (name, child) in fields {
                let column = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                let child_rows = flatten_node(&column, child);
                rows = rows
                    .iter()
                    .flat_map(|row| {
                        child_rows.iter().map(move |child_row| {
                            let mut combined = row.clone();
                            combined.extend(child_row.iter().cloned());
                            combined
                        })
                    })
                    .collect();
                if rows.is_empty() {
                    break;
                }
            }
            rows
        }
    }
}
