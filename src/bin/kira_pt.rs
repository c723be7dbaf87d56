use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_proteome_tables::config::ConfigLoader;
use kira_proteome_tables::domain::TaxId;
use kira_proteome_tables::error::KiraError;
use kira_proteome_tables::flatten::load_flat_reference;
use kira_proteome_tables::join::{BATCH_ROWS, JoinSpec};
use kira_proteome_tables::layout::ReleaseLayout;
use kira_proteome_tables::output::{OutputMode, RunSummary, print_summary};
use kira_proteome_tables::pipeline::{
    RunOptions, fetch_epitopes, fetch_variation, run_epitope_join, run_species_epitopes,
    run_variants,
};
use kira_proteome_tables::proteins_api::{ProteinsHttpClient, TaxonomyNames};

#[derive(Parser)]
#[command(name = "kira-pt")]
#[command(about = "Flatten UniProt Proteins API variant and epitope dumps into loadable TSV tables")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Print the run summary as JSON")]
    json: bool,

    #[arg(long, global = true, help = "Recompute outputs that already exist")]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Extract COSMIC-linked variants into a TSV")]
    Variants(VariantArgs),
    #[command(about = "Join dbSNP*.gz release files with epitope data")]
    Epitopes(EpitopeArgs),
    #[command(about = "Write per-species epitope tables keyed by taxonomy id")]
    SpeciesEpitopes(SpeciesArgs),
}

#[derive(Args)]
struct VariantArgs {
    #[arg(help = "Folder holding <species>.json and receiving <species>.tsv")]
    output: PathBuf,

    #[arg(long, default_value = "homo-sapiens")]
    species: String,

    #[arg(long, default_value = "9606")]
    taxid: String,

    #[arg(long, help = "Fetch the variation dump first when it is missing")]
    download: bool,
}

#[derive(Args)]
struct EpitopeArgs {
    release: PathBuf,

    #[arg(long, help = "Fetch epitope.json first when it is missing")]
    download: bool,

    #[arg(long, default_value_t = BATCH_ROWS)]
    batch_size: usize,
}

#[derive(Args)]
struct SpeciesArgs {
    release: PathBuf,

    #[arg(long, help = "Species properties file (N.name=..., N.taxId=...)")]
    config: PathBuf,

    #[arg(long, help = "Look up scientific names on the Proteins API for logging")]
    resolve_names: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingInput(_) | KiraError::ConfigRead(_) | KiraError::MissingTaxId(_) => 2,
        KiraError::ProteinsHttp(_) | KiraError::ProteinsStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let summary = match cli.command {
        Commands::Variants(args) => run_variants_command(args, cli.force)?,
        Commands::Epitopes(args) => run_epitopes_command(args, cli.force)?,
        Commands::SpeciesEpitopes(args) => run_species_command(args, cli.force)?,
    };
    print_summary(&summary, mode).into_diagnostic()
}

fn run_variants_command(args: VariantArgs, force: bool) -> miette::Result<RunSummary> {
    let layout = ReleaseLayout::from_path(&args.output)?;
    let input = layout.variant_json(&args.species);
    let output = layout.variant_tsv(&args.species);

    let mut outputs = Vec::new();
    if args.download {
        let taxid: TaxId = args.taxid.parse()?;
        let api = ProteinsHttpClient::new()?;
        outputs.push(fetch_variation(&api, &taxid, input.as_std_path(), force)?);
    }
    outputs.push(run_variants(
        input.as_std_path(),
        output.as_std_path(),
        force,
    )?);
    Ok(RunSummary::new("variants", outputs))
}

fn run_epitopes_command(args: EpitopeArgs, force: bool) -> miette::Result<RunSummary> {
    if !args.release.is_dir() {
        return Err(KiraError::MissingInput(args.release).into());
    }
    let layout = ReleaseLayout::from_path(&args.release)?;
    let reference_path = layout.epitope_json();

    let mut outputs = Vec::new();
    if args.download {
        let api = ProteinsHttpClient::new()?;
        outputs.push(fetch_epitopes(&api, reference_path.as_std_path(), force)?);
    }
    let reference = load_flat_reference(reference_path.as_std_path())?;
    let options = RunOptions {
        force,
        batch_rows: args.batch_size,
    };
    outputs.extend(run_epitope_join(
        &layout,
        &reference,
        &JoinSpec::epitope_by_accession(),
        options,
    )?);
    Ok(RunSummary::new("epitopes", outputs))
}

fn run_species_command(args: SpeciesArgs, force: bool) -> miette::Result<RunSummary> {
    let layout = ReleaseLayout::from_path(&args.release)?;
    let config = ConfigLoader::load(&args.config)?;
    let reference = load_flat_reference(layout.epitope_json().as_std_path())?;

    let outputs = if args.resolve_names {
        let api = ProteinsHttpClient::new()?;
        let mut names = TaxonomyNames::new(&api);
        run_species_epitopes(&layout, &reference, &config, Some(&mut names), force)?
    } else {
        run_species_epitopes::<ProteinsHttpClient>(&layout, &reference, &config, None, force)?
    };
    Ok(RunSummary::new("species-epitopes", outputs))
}
