use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Write};

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::KiraError;
use crate::location::{self, DecodedLocation};
use crate::tabular::{TsvSink, cell_text};

pub const VARIANT_HEADER: [&str; 26] = [
    "uniprotkb_accession",
    "gene_name",
    "protein_name",
    "data_source",
    "dbsnp_id",
    "cosmic_id",
    "description",
    "cytogenetic_band",
    "chromosome_id",
    "position",
    "ref_allele",
    "alt_allele",
    "ref_aa",
    "alt_aa",
    "begin_aa_pos",
    "end_aa_pos",
    "frequency",
    "mutation_type",
    "polyphen_score",
    "polyphen_prediction",
    "sift_score",
    "sift_prediction",
    "somatic_status",
    "disease",
    "disease_description",
    "disease_xrefs",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListField<T> {
    List(Vec<T>),
    Other(Value),
}

impl<T> Default for ListField<T> {
    fn default() -> Self {
        ListField::List(Vec::new())
    }
}

impl<T> ListField<T> {
    pub fn as_list(&self) -> Option<&[T]> {
        match self {
            ListField::List(items) => Some(items),
            ListField::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSource {
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub gene_name: Option<String>,
    #[serde(default)]
    pub protein_name: Option<String>,
    #[serde(default)]
    pub features: ListField<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feature {
    pub xrefs: ListField<Xref>,
    pub descriptions: Vec<Description>,
    pub genomic_location: Option<GenomicLocation>,
    pub predictions: Vec<Prediction>,
    pub population_frequencies: Vec<PopulationFrequency>,
    pub begin: Option<Value>,
    pub end: Option<Value>,
    pub wild_type: Option<Value>,
    pub mutated_type: Option<Value>,
    pub consequence_type: Option<Value>,
    pub somatic_status: Option<Value>,
    pub cytogenetic_band: Option<Value>,
    pub association: Vec<Association>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Xref {
    pub name: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Description {
    pub sources: Vec<String>,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Prediction {
    pub pred_algorithm_name_type: Option<String>,
    pub prediction_val_type: Option<String>,
    pub score: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PopulationFrequency {
    pub frequency: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Association {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GenomicLocation {
    One(String),
    Many(Vec<String>),
}

impl GenomicLocation {
    pub fn first(&self) -> Option<&str> {
        let value = match self {
            GenomicLocation::One(value) => Some(value.as_str()),
            GenomicLocation::Many(values) => values.first().map(String::as_str),
        };
        value.filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlatVariantRecord {
    pub uniprotkb_accession: String,
    pub gene_name: String,
    pub protein_name: String,
    pub data_source: String,
    pub dbsnp_id: String,
    pub cosmic_id: String,
    pub description: String,
    pub cytogenetic_band: String,
    pub location: DecodedLocation,
    pub ref_aa: String,
    pub alt_aa: String,
    pub begin_aa_pos: String,
    pub end_aa_pos: String,
    pub frequency: String,
    pub mutation_type: String,
    pub polyphen_score: String,
    pub polyphen_prediction: String,
    pub sift_score: String,
    pub sift_prediction: String,
    pub somatic_status: String,
    pub disease: String,
    pub disease_description: String,
    pub disease_xrefs: String,
}

impl FlatVariantRecord {
    pub fn cells(&self) -> [&str; 26] {
        [
            &self.uniprotkb_accession,
            &self.gene_name,
            &self.protein_name,
            &self.data_source,
            &self.dbsnp_id,
            &self.cosmic_id,
            &self.description,
            &self.cytogenetic_band,
            &self.location.chromosome_id,
            &self.location.position,
            &self.location.ref_allele,
            &self.location.alt_allele,
            &self.ref_aa,
            &self.alt_aa,
            &self.begin_aa_pos,
            &self.end_aa_pos,
            &self.frequency,
            &self.mutation_type,
            &self.polyphen_score,
            &self.polyphen_prediction,
            &self.sift_score,
            &self.sift_prediction,
            &self.somatic_status,
            &self.disease,
            &self.disease_description,
            &self.disease_xrefs,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub records: u64,
    pub rows: u64,
    pub skipped_records: u64,
    pub skipped_features: u64,
}

pub fn first_matching<'a, T, P>(items: &'a [T], predicate: P) -> Option<&'a T>
where
    P: Fn(&T) -> bool,
{
    items.iter().find(|item| predicate(*item))
}

pub fn extract_variants<R: Read, W: Write>(
    reader: R,
    sink: &mut TsvSink<W>,
) -> Result<ExtractStats, KiraError> {
    sink.write_header(VARIANT_HEADER)?;

    let mut stats = ExtractStats::default();
    for_each_record(reader, |raw| {
        stats.records += 1;
        let mut source = match serde_json::from_value::<VariantSource>(raw) {
            Ok(source) => source,
            Err(err) => {
                warn!(record = stats.records, %err, "skipping malformed variant record");
                stats.skipped_records += 1;
                return Ok(());
            }
        };
        let features = match std::mem::take(&mut source.features) {
            ListField::List(features) => features,
            ListField::Other(_) => {
                warn!(accession = ?source.accession, "features is not a list, skipping record");
                stats.skipped_records += 1;
                return Ok(());
            }
        };
        for (idx, raw_feature) in features.into_iter().enumerate() {
            let feature = match serde_json::from_value::<Feature>(raw_feature) {
                Ok(feature) => feature,
                Err(err) => {
                    warn!(
                        accession = ?source.accession,
                        feature = idx,
                        %err,
                        "skipping malformed feature"
                    );
                    stats.skipped_features += 1;
                    continue;
                }
            };
            match flatten_feature(&source, &feature) {
                Some(record) => {
                    sink.write_row(record.cells())?;
                    stats.rows += 1;
                }
                None => stats.skipped_features += 1,
            }
        }
        Ok(())
    })?;

    info!(
        records = stats.records,
        rows = stats.rows,
        skipped_records = stats.skipped_records,
        "variant extraction finished"
    );
    Ok(stats)
}

pub fn flatten_feature(source: &VariantSource, feature: &Feature) -> Option<FlatVariantRecord> {
    let xrefs = feature.xrefs.as_list()?;
    let cosmic = first_matching(xrefs, is_cosmic_xref)?;

    let snps = xrefs
        .iter()
        .filter_map(|xref| xref.id.as_deref())
        .filter(|id| id.starts_with("rs"))
        .collect::<BTreeSet<_>>();
    let data_sources = xrefs
        .iter()
        .filter_map(|xref| xref.name.as_deref())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>();
    let descriptions = feature
        .descriptions
        .iter()
        .map(|description| {
            let value = description.value.as_ref().map(cell_text).unwrap_or_default();
            format!("[{}]: {value}", description.sources.join(";"))
        })
        .collect::<Vec<_>>();

    let location = match feature.genomic_location.as_ref().and_then(GenomicLocation::first) {
        Some(raw) => location::decode(raw),
        None => {
            debug!(accession = ?source.accession, "feature has no genomic location");
            DecodedLocation::default()
        }
    };

    let frequency = feature
        .population_frequencies
        .first()
        .and_then(|freq| freq.frequency.as_ref())
        .map(cell_text)
        .unwrap_or_default();

    let polyphen = first_matching(&feature.predictions, |p| {
        p.pred_algorithm_name_type.as_deref() == Some("PolyPhen")
    });
    let sift = first_matching(&feature.predictions, |p| {
        p.pred_algorithm_name_type.as_deref() == Some("SIFT")
    });
    let disease = first_matching(&feature.predictions, |p| {
        matches!(p.prediction_val_type.as_deref(), Some(kind) if !kind.is_empty() && kind != "benign")
    });

    Some(FlatVariantRecord {
        uniprotkb_accession: source.accession.clone().unwrap_or_default(),
        gene_name: source.gene_name.clone().unwrap_or_default(),
        protein_name: source.protein_name.clone().unwrap_or_default(),
        data_source: join(data_sources),
        dbsnp_id: join(snps),
        cosmic_id: cosmic.id.clone().unwrap_or_default(),
        description: descriptions.join(","),
        cytogenetic_band: optional_text(&feature.cytogenetic_band),
        location,
        ref_aa: optional_text(&feature.wild_type),
        alt_aa: optional_text(&feature.mutated_type),
        begin_aa_pos: optional_text(&feature.begin),
        end_aa_pos: optional_text(&feature.end),
        frequency,
        mutation_type: optional_text(&feature.consequence_type),
        polyphen_score: polyphen.map(score_text).unwrap_or_default(),
        polyphen_prediction: polyphen.map(prediction_text).unwrap_or_default(),
        sift_score: sift.map(score_text).unwrap_or_default(),
        sift_prediction: sift.map(prediction_text).unwrap_or_default(),
        somatic_status: optional_text(&feature.somatic_status),
        disease: disease.map(prediction_text).unwrap_or_default(),
        disease_description: feature
            .association
            .first()
            .and_then(|association| association.name.clone())
            .unwrap_or_default(),
        disease_xrefs: String::new(),
    })
}

fn is_cosmic_xref(xref: &Xref) -> bool {
    let named_cosmic = xref
        .name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains("cosmic"));
    let has_id = xref.id.as_deref().is_some_and(|id| !id.is_empty());
    named_cosmic && has_id
}

fn join<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values.into_iter().collect::<Vec<_>>().join(",")
}

fn optional_text(value: &Option<Value>) -> String {
    value.as_ref().map(cell_text).unwrap_or_default()
}

fn score_text(prediction: &Prediction) -> String {
    optional_text(&prediction.score)
}

fn prediction_text(prediction: &Prediction) -> String {
    prediction.prediction_val_type.clone().unwrap_or_default()
}

/// Calls `on_record` for every element of a top-level JSON array without
/// materialising the array. Returns the number of elements visited.
pub fn for_each_record<R, F>(reader: R, mut on_record: F) -> Result<u64, KiraError>
where
    R: Read,
    F: FnMut(Value) -> Result<(), KiraError>,
{
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let mut failure = None;
    let visited = serde::Deserializer::deserialize_seq(
        &mut deserializer,
        RecordVisitor {
            on_record: &mut on_record,
            failure: &mut failure,
        },
    );
    if let Some(err) = failure {
        return Err(err);
    }
    let visited = visited.map_err(|err| KiraError::JsonStream(err.to_string()))?;
    deserializer
        .end()
        .map_err(|err| KiraError::JsonStream(err.to_string()))?;
    Ok(visited)
}

struct RecordVisitor<'a, F> {
    on_record: &'a mut F,
    failure: &'a mut Option<KiraError>,
}

impl<'de, F> Visitor<'de> for RecordVisitor<'_, F>
where
    F: FnMut(Value) -> Result<(), KiraError>,
{
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON array of records")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut visited = 0u64;
        while let Some(record) = seq.next_element::<Value>()? {
            visited += 1;
            if let Err(err) = (self.on_record)(record) {
                *self.failure = Some(err);
                return Err(de::Error::custom("record handler failed"));
            }
        }
        Ok(visited)
    }
}
