use std::fs::File;
use std::io::Write;
use std::path::Path;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;

use kira_proteome_tables::error::KiraError;
use kira_proteome_tables::flatten::{FlatTable, flatten_document};
use kira_proteome_tables::join::{ChunkedJoin, JoinSpec, write_filtered, species_epitope_projection};
use kira_proteome_tables::tabular::TsvSink;

fn reference() -> FlatTable {
    flatten_document(json!([
        {
            "accession": "P1",
            "taxid": 9606,
            "features": [{
                "description": "Epitope A",
                "begin": "5",
                "end": "12",
                "epitopeSequence": "ABCDEFGH",
                "xrefs": [{"name": "IEDB", "id": "1001"}, {"name": "IEDB", "id": "1002"}],
                "evidences": [{"code": "ECO:0000269", "source": {"name": "PubMed", "id": "111"}}]
            }]
        },
        {
            "accession": "P2",
            "taxid": 9606,
            "features": [{
                "description": "Epitope B",
                "begin": "1",
                "end": "9",
                "epitopeSequence": "QWERTYIPA",
                "xrefs": [{"name": "IEDB", "id": "2001"}],
                "evidences": [{"code": "ECO:0000269", "source": {"name": "PubMed", "id": "333"}}]
            }]
        },
        {
            "accession": "Q7",
            "taxid": 10090,
            "features": [{
                "description": "Epitope C",
                "begin": "3",
                "end": "11",
                "epitopeSequence": "MMMMNNNNP",
                "xrefs": [{"name": "IEDB", "id": "3001"}],
                "evidences": [{"code": "ECO:0000269", "source": {"name": "PubMed", "id": "444"}}]
            }]
        }
    ]))
}

const SOURCE: &str = "uniprotkb_accession\tgene_name\tprotein_name\tdbsnp_id\n\
P1\tGENE1\tProtein one\trs1\n\
P9\tGENE9\tProtein nine\trs9\n\
P2\tGENE2\tProtein two\trs2\n\
Q7\tGENE7\tProtein seven\trs7\n\
P8\tGENE8\tProtein eight\trs8\n";

fn run_join(spec: &JoinSpec, source: &str, batch_rows: usize) -> (String, u64) {
    let reference = reference();
    let join = ChunkedJoin::new(spec, &reference)
        .unwrap()
        .with_batch_rows(batch_rows);
    let mut sink = TsvSink::new(Vec::new(), "memory");
    let stats = join
        .join_reader(source.as_bytes(), Path::new("memory"), "dbSNP_test.tsv.gz", &mut sink)
        .unwrap();
    (String::from_utf8(sink.into_inner().unwrap()).unwrap(), stats.batches)
}

fn sorted_rows(output: &str) -> Vec<&str> {
    let mut rows = output.lines().skip(1).collect::<Vec<_>>();
    rows.sort();
    rows
}

#[test]
fn inner_join_projects_epitope_columns() {
    let (output, batches) = run_join(&JoinSpec::epitope_by_accession(), SOURCE, 100_000);
    assert_eq!(batches, 1);
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(
        lines[0],
        "uniprotkb_accession\tgene_name\tprotein_name\tepitope_description\tdata_source\tiedb_id\t\
begin_aa_pos\tend_aa_pos\tepitope_sequence\tevidence_code\tevidence_source\tevidence_source_id"
    );
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[1],
        "P1\tGENE1\tProtein one\tEpitope A\tIEDB\t1001\t5\t12\tABCDEFGH\tECO:0000269\tPubMed\t111"
    );
    assert!(lines[2].contains("\t1002\t"));
    assert!(lines[3].starts_with("P2\tGENE2"));
    assert!(lines[4].starts_with("Q7\tGENE7"));
    assert!(!output.contains("P9") && !output.contains("P8"));
}

#[test]
fn batch_boundaries_do_not_change_results() {
    let spec = JoinSpec::epitope_by_accession();
    let (whole, whole_batches) = run_join(&spec, SOURCE, 100_000);
    let (chunked, chunked_batches) = run_join(&spec, SOURCE, 2);
    let (single, single_batches) = run_join(&spec, SOURCE, 1);

    assert_eq!(whole_batches, 1);
    assert_eq!(chunked_batches, 3);
    assert_eq!(single_batches, 5);
    assert_eq!(sorted_rows(&whole), sorted_rows(&chunked));
    assert_eq!(sorted_rows(&whole), sorted_rows(&single));
    for output in [&chunked, &single] {
        let headers = output
            .lines()
            .filter(|line| line.starts_with("uniprotkb_accession\t"))
            .count();
        assert_eq!(headers, 1);
    }
}

#[test]
fn duplicate_rows_within_a_batch_are_dropped() {
    let source = "uniprotkb_accession\tgene_name\tprotein_name\tdbsnp_id\n\
P2\tGENE2\tProtein two\trs2\n\
P2\tGENE2\tProtein two\trs22\n";
    let (output, _) = run_join(&JoinSpec::epitope_by_accession(), source, 100_000);
    assert_eq!(output.lines().count(), 2);
}

#[test]
fn batch_without_matches_writes_only_header() {
    let source = "uniprotkb_accession\tgene_name\tprotein_name\n\
X1\tG\tP\n";
    let (output, batches) = run_join(&JoinSpec::epitope_by_accession(), source, 100_000);
    assert_eq!(batches, 1);
    assert_eq!(output.lines().count(), 1);
}

#[test]
fn filename_column_is_available_to_projections() {
    let spec = JoinSpec::new(
        "uniprotkb_accession",
        "accession",
        &[("uniprotkb_accession", "accession"), ("filename", "source_file")],
    );
    let (output, _) = run_join(&spec, SOURCE, 100_000);
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "accession\tsource_file");
    assert_eq!(lines[1], "P1\tdbSNP_test.tsv.gz");
}

#[test]
fn missing_columns_are_reported() {
    let reference = reference();
    let spec = JoinSpec::new("uniprotkb_accession", "nope", &[]);
    assert_matches!(
        ChunkedJoin::new(&spec, &reference).err(),
        Some(KiraError::MissingColumn(column)) if column == "nope"
    );

    let spec = JoinSpec::new("accession_id", "accession", &[]);
    let join = ChunkedJoin::new(&spec, &reference).unwrap();
    let mut sink = TsvSink::new(Vec::new(), "memory");
    let err = join
        .join_reader(SOURCE.as_bytes(), Path::new("memory"), "", &mut sink)
        .unwrap_err();
    assert_matches!(err, KiraError::MissingColumn(column) if column == "accession_id");
}

#[test]
fn join_reads_gzip_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dbSNP_test.tsv.gz");
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(SOURCE.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let reference = reference();
    let spec = JoinSpec::epitope_by_accession();
    let join = ChunkedJoin::new(&spec, &reference).unwrap();
    let mut sink = TsvSink::new(Vec::new(), "memory");
    let stats = join.join_file(&path, &mut sink).unwrap();
    assert_eq!(stats.source_rows, 5);
    assert_eq!(stats.rows, 4);

    let err = join
        .join_file(&dir.path().join("missing.tsv.gz"), &mut sink)
        .unwrap_err();
    assert_matches!(err, KiraError::InputOpen { .. });
}

#[test]
fn filtered_reference_keys_by_taxid() {
    let reference = reference();
    let mut sink = TsvSink::new(Vec::new(), "memory");
    let written = write_filtered(
        &reference,
        "taxid",
        "10090",
        &species_epitope_projection(),
        &mut sink,
    )
    .unwrap();
    assert_eq!(written, 1);
    let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(lines[0].split('\t').count(), 10);
    assert_eq!(
        lines[1],
        "Q7\tEpitope C\tIEDB\t3001\t3\t11\tMMMMNNNNP\tECO:0000269\tPubMed\t444"
    );
}
