use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use kira_proteome_tables::domain::TaxId;
use kira_proteome_tables::error::KiraError;
use kira_proteome_tables::proteins_api::{ProteinsApi, TaxonomyNames};

#[derive(Default)]
struct CountingApi {
    lookups: AtomicUsize,
}

impl ProteinsApi for CountingApi {
    fn download_variation(&self, _taxid: &TaxId, _destination: &Path) -> Result<(), KiraError> {
        unreachable!("not used")
    }

    fn download_epitopes(&self, _destination: &Path) -> Result<(), KiraError> {
        unreachable!("not used")
    }

    fn scientific_name(&self, taxid: &TaxId) -> Result<Option<String>, KiraError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match taxid.as_str() {
            "9606" => Ok(Some("Homo sapiens".to_string())),
            "10090" => Ok(Some("Mus musculus".to_string())),
            "1" => Ok(None),
            _ => Err(KiraError::ProteinsStatus {
                status: 503,
                message: "unavailable".to_string(),
            }),
        }
    }
}

fn taxid(value: &str) -> TaxId {
    value.parse().unwrap()
}

#[test]
fn names_are_looked_up_once_per_taxid() {
    let api = CountingApi::default();
    let mut names = TaxonomyNames::new(&api);

    assert_eq!(names.resolve(&taxid("9606")), Some("Homo sapiens"));
    assert_eq!(names.resolve(&taxid("9606")), Some("Homo sapiens"));
    assert_eq!(names.resolve(&taxid("10090")), Some("Mus musculus"));
    assert_eq!(api.lookups.load(Ordering::SeqCst), 2);
    assert_eq!(names.cached(), 2);
}

#[test]
fn unknown_and_failed_lookups_are_cached_as_missing() {
    let api = CountingApi::default();
    let mut names = TaxonomyNames::new(&api);

    assert_eq!(names.resolve(&taxid("1")), None);
    assert_eq!(names.resolve(&taxid("7955")), None);
    assert_eq!(names.resolve(&taxid("7955")), None);
    assert_eq!(api.lookups.load(Ordering::SeqCst), 2);
}
