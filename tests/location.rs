use kira_proteome_tables::location::{DecodedLocation, decode};

fn decoded(chromosome: &str, position: &str, ref_allele: &str, alt_allele: &str) -> DecodedLocation {
    DecodedLocation {
        chromosome_id: chromosome.to_string(),
        position: position.to_string(),
        ref_allele: ref_allele.to_string(),
        alt_allele: alt_allele.to_string(),
    }
}

#[test]
fn decode_substitution() {
    assert_eq!(decode("17:g.7676154C>T"), decoded("17", "7676154", "C", "T"));
}

#[test]
fn decode_maps_sex_chromosomes() {
    assert_eq!(decode("23:g.100A>G").chromosome_id, "X");
    assert_eq!(decode("24:g.100A>G").chromosome_id, "Y");
}

#[test]
fn decode_passes_other_contigs_through() {
    assert_eq!(decode("MT:g.7028C>T"), decoded("MT", "7028", "C", "T"));
    assert_eq!(decode("X:g.5A>G").chromosome_id, "X");
}

#[test]
fn decode_without_substitution_has_empty_alt() {
    assert_eq!(decode("17:g.7676154delC"), decoded("17", "7676154", "delC", ""));
}

#[test]
fn decode_multi_base_alleles() {
    assert_eq!(decode("1:g.1000AC>GT"), decoded("1", "1000", "AC", "GT"));
}

#[test]
fn decode_position_without_alleles() {
    assert_eq!(decode("5:g.123456"), decoded("5", "123456", "", ""));
}

#[test]
fn decode_keeps_chromosome_when_coordinate_is_unreadable() {
    assert_eq!(decode("17:7676154C>T"), decoded("17", "", "", ""));
}

#[test]
fn decode_without_colon_is_empty() {
    assert_eq!(decode("7676154C>T"), DecodedLocation::default());
    assert_eq!(decode(""), DecodedLocation::default());
}
