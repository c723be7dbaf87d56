use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::error::KiraError;

const DBSNP_SOURCE_PATTERN: &str = r"^dbSNP.*\.gz$";

#[derive(Debug, Clone)]
pub struct ReleaseLayout {
    root: Utf8PathBuf,
}

impl ReleaseLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_path(root: &Path) -> Result<Self, KiraError> {
        let root = Utf8PathBuf::from_path_buf(root.to_path_buf())
            .map_err(|path| KiraError::Filesystem(format!("non UTF-8 path {}", path.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn variant_json(&self, species: &str) -> Utf8PathBuf {
        self.root.join(format!("{species}.json"))
    }

    pub fn variant_tsv(&self, species: &str) -> Utf8PathBuf {
        self.root.join(format!("{species}.tsv"))
    }

    pub fn epitope_dir(&self) -> Utf8PathBuf {
        self.root.join("epitope")
    }

    pub fn epitope_json(&self) -> Utf8PathBuf {
        self.epitope_dir().join("epitope.json")
    }

    pub fn epitope_output_for(&self, source: &Utf8Path) -> Utf8PathBuf {
        let stem = source
            .file_stem()
            .map(Utf8Path::new)
            .and_then(Utf8Path::file_stem)
            .unwrap_or_default();
        self.epitope_dir()
            .join(format!("{}.tsv", stem.replace("dbSNP", "IEDB")))
    }

    pub fn species_epitope_tsv(&self, species: &str) -> Utf8PathBuf {
        self.epitope_dir().join(format!("IEDB_{species}.tsv"))
    }

    pub fn dbsnp_sources(&self) -> Result<Vec<Utf8PathBuf>, KiraError> {
        let pattern =
            Regex::new(DBSNP_SOURCE_PATTERN).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let entries = fs::read_dir(self.root.as_std_path()).map_err(|err| {
            KiraError::InputOpen {
                path: self.root.clone().into_std_path_buf(),
                message: err.to_string(),
            }
        })?;

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let matches = path
                .file_name()
                .is_some_and(|name| pattern.is_match(name));
            if matches && path.as_std_path().is_file() {
                sources.push(path);
            }
        }
        sources.sort();
        Ok(sources)
    }
}
