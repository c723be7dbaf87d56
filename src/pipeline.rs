use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SpeciesConfig;
use crate::domain::TaxId;
use crate::error::KiraError;
use crate::flatten::FlatTable;
use crate::join::{ChunkedJoin, JoinSpec, species_epitope_projection, write_filtered};
use crate::layout::ReleaseLayout;
use crate::proteins_api::{ProteinsApi, TaxonomyNames};
use crate::tabular::{TsvSink, should_skip};
use crate::variant::extract_variants;

pub const TAXID_COLUMN: &str = "taxid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Written,
    Skipped,
    Empty,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputReport {
    pub path: String,
    pub action: Action,
    pub rows: u64,
    pub skipped_records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputReport {
    fn skipped(path: &Path) -> Self {
        Self::new(path, Action::Skipped, 0)
    }

    fn new(path: &Path, action: Action, rows: u64) -> Self {
        Self {
            path: path.display().to_string(),
            action,
            rows,
            skipped_records: 0,
            error: None,
        }
    }

    fn failed(path: &Path, error: &KiraError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(path, Action::Failed, 0)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub force: bool,
    pub batch_rows: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            batch_rows: crate::join::BATCH_ROWS,
        }
    }
}

pub fn run_variants(input: &Path, output: &Path, force: bool) -> Result<OutputReport, KiraError> {
    if should_skip(output, force) {
        return Ok(OutputReport::skipped(output));
    }

    info!(input = %input.display(), output = %output.display(), "parsing variants");
    let file = open_input(input)?;
    let mut sink = TsvSink::create(output)?;
    let stats = extract_variants(BufReader::new(file), &mut sink)?;
    let rows = sink.commit()?;

    Ok(OutputReport {
        skipped_records: stats.skipped_records,
        ..OutputReport::new(output, Action::Written, rows)
    })
}

pub fn run_epitope_join(
    layout: &ReleaseLayout,
    reference: &FlatTable,
    spec: &JoinSpec,
    options: RunOptions,
) -> Result<Vec<OutputReport>, KiraError> {
    let sources = layout.dbsnp_sources()?;
    if sources.is_empty() {
        info!(release = %layout.root(), "no dbSNP files found");
        return Ok(Vec::new());
    }

    let join = ChunkedJoin::new(spec, reference)?.with_batch_rows(options.batch_rows);
    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        let output = layout.epitope_output_for(&source);
        if should_skip(output.as_std_path(), options.force) {
            reports.push(OutputReport::skipped(output.as_std_path()));
            continue;
        }

        info!(source = %source, output = %output, "joining source with epitopes");
        let mut sink = TsvSink::create(output.as_std_path())?;
        let stats = match join.join_file(source.as_std_path(), &mut sink) {
            Ok(stats) => stats,
            Err(err @ (KiraError::Delimited { .. } | KiraError::MissingColumn(_))) => {
                warn!(source = %source, %err, "skipping unreadable source");
                reports.push(OutputReport::failed(output.as_std_path(), &err));
                continue;
            }
            Err(err) => return Err(err),
        };
        if stats.batches == 0 {
            warn!(source = %source, "source has no data rows");
            reports.push(OutputReport::new(output.as_std_path(), Action::Empty, 0));
            continue;
        }
        let rows = sink.commit()?;
        reports.push(OutputReport::new(output.as_std_path(), Action::Written, rows));
    }
    Ok(reports)
}

pub fn run_species_epitopes<A: ProteinsApi + ?Sized>(
    layout: &ReleaseLayout,
    reference: &FlatTable,
    config: &SpeciesConfig,
    mut names: Option<&mut TaxonomyNames<'_, A>>,
    force: bool,
) -> Result<Vec<OutputReport>, KiraError> {
    let projection = species_epitope_projection();
    let mut reports = Vec::with_capacity(config.species.len());
    for species in &config.species {
        let taxid = species.tax_id()?;
        let output = layout.species_epitope_tsv(&species.name);
        if should_skip(output.as_std_path(), force) {
            reports.push(OutputReport::skipped(output.as_std_path()));
            continue;
        }

        let scientific_name = names
            .as_deref_mut()
            .and_then(|names| names.resolve(&taxid).map(str::to_string));
        info!(
            species = %species.name,
            %taxid,
            scientific_name = scientific_name.as_deref().unwrap_or("-"),
            "writing species epitopes"
        );

        let mut sink = TsvSink::create(output.as_std_path())?;
        write_filtered(reference, TAXID_COLUMN, taxid.as_str(), &projection, &mut sink)?;
        let rows = sink.commit()?;
        reports.push(OutputReport::new(output.as_std_path(), Action::Written, rows));
    }
    Ok(reports)
}

pub fn fetch_variation<A: ProteinsApi + ?Sized>(
    api: &A,
    taxid: &TaxId,
    destination: &Path,
    force: bool,
) -> Result<OutputReport, KiraError> {
    if should_skip(destination, force) {
        return Ok(OutputReport::skipped(destination));
    }
    api.download_variation(taxid, destination)?;
    Ok(OutputReport::new(destination, Action::Written, 0))
}

pub fn fetch_epitopes<A: ProteinsApi + ?Sized>(
    api: &A,
    destination: &Path,
    force: bool,
) -> Result<OutputReport, KiraError> {
    if should_skip(destination, force) {
        return Ok(OutputReport::skipped(destination));
    }
    api.download_epitopes(destination)?;
    Ok(OutputReport::new(destination, Action::Written, 0))
}

fn open_input(path: &Path) -> Result<File, KiraError> {
    File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => KiraError::MissingInput(path.to_path_buf()),
        _ => KiraError::InputOpen {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
    })
}
