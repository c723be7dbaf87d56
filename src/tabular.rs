use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::KiraError;

pub fn should_skip(destination: &Path, force: bool) -> bool {
    if destination.exists() && !force {
        debug!(path = %destination.display(), "output already exists, skipping");
        return true;
    }
    false
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub struct TsvSink<W: Write> {
    writer: csv::Writer<W>,
    path: PathBuf,
    header_written: bool,
    rows: u64,
}

impl<W: Write> TsvSink<W> {
    pub fn new(inner: W, path: impl Into<PathBuf>) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .flexible(false)
            .from_writer(inner);
        Self {
            writer,
            path: path.into(),
            header_written: false,
            rows: 0,
        }
    }

    pub fn write_header<I, T>(&mut self, header: I) -> Result<(), KiraError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        if self.header_written {
            return Ok(());
        }
        self.writer
            .write_record(header)
            .map_err(|err| self.write_error(err))?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_row<I, T>(&mut self, row: I) -> Result<(), KiraError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(row)
            .map_err(|err| self.write_error(err))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W, KiraError> {
        let path = self.path;
        self.writer
            .into_inner()
            .map_err(|err| KiraError::OutputWrite {
                path,
                message: err.error().to_string(),
            })
    }

    fn write_error(&self, err: csv::Error) -> KiraError {
        KiraError::OutputWrite {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

impl TsvSink<NamedTempFile> {
    /// Opens a scratch file next to `destination`. Nothing is visible at
    /// `destination` until [`TsvSink::commit`] succeeds.
    pub fn create(destination: &Path) -> Result<Self, KiraError> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| KiraError::OutputWrite {
            path: destination.to_path_buf(),
            message: err.to_string(),
        })?;
        let temp = tempfile::Builder::new()
            .prefix(".kira-pt")
            .suffix(".tsv.tmp")
            .tempfile_in(parent)
            .map_err(|err| KiraError::OutputWrite {
                path: destination.to_path_buf(),
                message: err.to_string(),
            })?;
        Ok(Self::new(temp, destination))
    }

    pub fn commit(self) -> Result<u64, KiraError> {
        let rows = self.rows;
        let destination = self.path.clone();
        let temp = self.into_inner()?;
        if destination.exists() {
            fs::remove_file(&destination).map_err(|err| KiraError::OutputWrite {
                path: destination.clone(),
                message: err.to_string(),
            })?;
        }
        temp.persist(&destination)
            .map_err(|err| KiraError::OutputWrite {
                path: destination.clone(),
                message: err.to_string(),
            })?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_cells() {
        assert_eq!(cell_text(&Value::Null), "");
        assert_eq!(cell_text(&serde_json::json!(10)), "10");
        assert_eq!(cell_text(&serde_json::json!(0.25)), "0.25");
        assert_eq!(cell_text(&serde_json::json!("rs1")), "rs1");
        assert_eq!(cell_text(&serde_json::json!(true)), "True");
    }

    #[test]
    fn header_is_written_once() {
        let mut sink = TsvSink::new(Vec::new(), "memory");
        sink.write_header(["a", "b"]).unwrap();
        sink.write_row(["1", "2"]).unwrap();
        sink.write_header(["a", "b"]).unwrap();
        sink.write_row(["3", ""]).unwrap();
        let bytes = sink.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a\tb\n1\t2\n3\t\n");
    }

    #[test]
    fn fields_are_not_quoted() {
        let mut sink = TsvSink::new(Vec::new(), "memory");
        sink.write_row(["[COSMIC]: \"quoted\", text"]).unwrap();
        let bytes = sink.into_inner().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "[COSMIC]: \"quoted\", text\n"
        );
    }
}
