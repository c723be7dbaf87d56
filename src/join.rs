use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::KiraError;
use crate::flatten::FlatTable;
use crate::tabular::TsvSink;

pub const BATCH_ROWS: usize = 100_000;

pub const FILENAME_COLUMN: &str = "filename";

const EPITOPE_FEATURE_COLUMNS: [(&str, &str); 9] = [
    ("features.description", "epitope_description"),
    ("features.xrefs.name", "data_source"),
    ("features.xrefs.id", "iedb_id"),
    ("features.begin", "begin_aa_pos"),
    ("features.end", "end_aa_pos"),
    ("features.epitopeSequence", "epitope_sequence"),
    ("features.evidences.code", "evidence_code"),
    ("features.evidences.source.name", "evidence_source"),
    ("features.evidences.source.id", "evidence_source_id"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub key_left: String,
    pub key_right: String,
    pub projection: Vec<(String, String)>,
}

impl JoinSpec {
    pub fn new(key_left: &str, key_right: &str, projection: &[(&str, &str)]) -> Self {
        Self {
            key_left: key_left.to_string(),
            key_right: key_right.to_string(),
            projection: projection
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    pub fn epitope_by_accession() -> Self {
        let mut projection = vec![
            ("uniprotkb_accession", "uniprotkb_accession"),
            ("gene_name", "gene_name"),
            ("protein_name", "protein_name"),
        ];
        projection.extend(EPITOPE_FEATURE_COLUMNS);
        Self::new("uniprotkb_accession", "accession", &projection)
    }

    pub fn output_header(&self) -> Vec<&str> {
        self.projection.iter().map(|(_, to)| to.as_str()).collect()
    }
}

pub fn species_epitope_projection() -> Vec<(String, String)> {
    std::iter::once(("accession", "uniprotkb_accession"))
        .chain(EPITOPE_FEATURE_COLUMNS)
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

pub struct ReferenceIndex<'a> {
    table: &'a FlatTable,
    rows_by_key: HashMap<&'a str, Vec<usize>>,
}

impl<'a> ReferenceIndex<'a> {
    pub fn build(table: &'a FlatTable, key: &str) -> Result<Self, KiraError> {
        let column = table
            .column_index(key)
            .ok_or_else(|| KiraError::MissingColumn(key.to_string()))?;
        let mut rows_by_key: HashMap<&str, Vec<usize>> = HashMap::new();
        for row in 0..table.len() {
            let value = table.cell(row, column);
            if !value.is_empty() {
                rows_by_key.entry(value).or_default().push(row);
            }
        }
        Ok(Self { table, rows_by_key })
    }

    pub fn matches(&self, key: &str) -> &[usize] {
        self.rows_by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn table(&self) -> &'a FlatTable {
        self.table
    }
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    Left(usize),
    Tag,
    Right(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub batches: u64,
    pub source_rows: u64,
    pub rows: u64,
}

pub struct ChunkedJoin<'a> {
    spec: &'a JoinSpec,
    index: ReferenceIndex<'a>,
    batch_rows: usize,
}

impl<'a> ChunkedJoin<'a> {
    pub fn new(spec: &'a JoinSpec, reference: &'a FlatTable) -> Result<Self, KiraError> {
        Ok(Self {
            spec,
            index: ReferenceIndex::build(reference, &spec.key_right)?,
            batch_rows: BATCH_ROWS,
        })
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    pub fn join_file<W: Write>(
        &self,
        source: &Path,
        sink: &mut TsvSink<W>,
    ) -> Result<JoinStats, KiraError> {
        let file = File::open(source).map_err(|err| KiraError::InputOpen {
            path: source.to_path_buf(),
            message: err.to_string(),
        })?;
        let tag = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let decoder = MultiGzDecoder::new(BufReader::new(file));
        self.join_reader(decoder, source, &tag, sink)
    }

    /// Joins an uncompressed TSV stream batch by batch. The first batch
    /// writes the header; a batch without matches contributes no rows.
    pub fn join_reader<R: Read, W: Write>(
        &self,
        reader: R,
        source: &Path,
        tag: &str,
        sink: &mut TsvSink<W>,
    ) -> Result<JoinStats, KiraError> {
        let delimited_error = |err: csv::Error| KiraError::Delimited {
            path: source.to_path_buf(),
            message: err.to_string(),
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers().map_err(delimited_error)?.clone();
        let key_column = position(&headers, &self.spec.key_left)
            .ok_or_else(|| KiraError::MissingColumn(self.spec.key_left.clone()))?;
        let cells = self.resolve_projection(&headers)?;

        let mut stats = JoinStats::default();
        let mut batch = Vec::with_capacity(self.batch_rows.min(BATCH_ROWS));
        let mut records = reader.into_records();
        loop {
            batch.clear();
            for record in records.by_ref().take(self.batch_rows) {
                batch.push(record.map_err(delimited_error)?);
            }
            if batch.is_empty() {
                break;
            }
            stats.batches += 1;
            stats.source_rows += batch.len() as u64;

            let joined = self.join_batch(&batch, key_column, &cells, tag);
            sink.write_header(self.spec.output_header())?;
            for row in &joined {
                sink.write_row(row)?;
            }
            stats.rows += joined.len() as u64;
            debug!(
                source = %source.display(),
                batch = stats.batches,
                rows = joined.len(),
                "joined batch"
            );
        }

        info!(
            source = %source.display(),
            batches = stats.batches,
            source_rows = stats.source_rows,
            rows = stats.rows,
            "join finished"
        );
        Ok(stats)
    }

    fn resolve_projection(&self, headers: &StringRecord) -> Result<Vec<Cell>, KiraError> {
        let reference = self.index.table();
        self.spec
            .projection
            .iter()
            .map(|(from, _)| {
                if let Some(idx) = position(headers, from) {
                    Ok(Cell::Left(idx))
                } else if from == FILENAME_COLUMN {
                    Ok(Cell::Tag)
                } else if let Some(idx) = reference.column_index(from) {
                    Ok(Cell::Right(idx))
                } else {
                    Err(KiraError::MissingColumn(from.clone()))
                }
            })
            .collect()
    }

    fn join_batch(
        &self,
        batch: &[StringRecord],
        key_column: usize,
        cells: &[Cell],
        tag: &str,
    ) -> Vec<Vec<String>> {
        let reference = self.index.table();
        let mut seen = HashSet::new();
        let mut joined = Vec::new();
        for record in batch {
            let key = record.get(key_column).unwrap_or("");
            if key.is_empty() {
                continue;
            }
            for &row in self.index.matches(key) {
                let projected = cells
                    .iter()
                    .map(|cell| match *cell {
                        Cell::Left(idx) => record.get(idx).unwrap_or("").to_string(),
                        Cell::Tag => tag.to_string(),
                        Cell::Right(idx) => reference.cell(row, idx).to_string(),
                    })
                    .collect::<Vec<_>>();
                if seen.insert(projected.clone()) {
                    joined.push(projected);
                }
            }
        }
        joined
    }
}

pub fn write_filtered<W: Write>(
    reference: &FlatTable,
    key_column: &str,
    key: &str,
    projection: &[(String, String)],
    sink: &mut TsvSink<W>,
) -> Result<u64, KiraError> {
    let key_idx = reference
        .column_index(key_column)
        .ok_or_else(|| KiraError::MissingColumn(key_column.to_string()))?;
    let columns = projection
        .iter()
        .map(|(from, _)| {
            reference
                .column_index(from)
                .ok_or_else(|| KiraError::MissingColumn(from.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    sink.write_header(projection.iter().map(|(_, to)| to.as_str()))?;
    let mut seen = HashSet::new();
    let mut written = 0;
    for row in (0..reference.len()).filter(|&row| reference.cell(row, key_idx) == key) {
        let projected = columns
            .iter()
            .map(|&idx| reference.cell(row, idx))
            .collect::<Vec<_>>();
        if seen.insert(projected.clone()) {
            sink.write_row(&projected)?;
            written += 1;
        }
    }
    Ok(written)
}

fn position(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|header| header == name)
}
