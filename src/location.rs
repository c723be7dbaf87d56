use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedLocation {
    pub chromosome_id: String,
    pub position: String,
    pub ref_allele: String,
    pub alt_allele: String,
}

/// Decodes one location string. Never fails; unreadable parts come back empty.
pub fn decode(location: &str) -> DecodedLocation {
    let mut parts = location.split(':');
    let (Some(chromosome), Some(coordinate)) = (parts.next(), parts.next()) else {
        return DecodedLocation::default();
    };

    let mut decoded = DecodedLocation {
        chromosome_id: normalize_chromosome(chromosome),
        ..DecodedLocation::default()
    };

    match decode_coordinate(coordinate) {
        Some((position, ref_allele, alt_allele)) => {
            decoded.position = position;
            decoded.ref_allele = ref_allele;
            decoded.alt_allele = alt_allele;
        }
        None => warn!(location, "genomic location has no '.' coordinate prefix"),
    }
    decoded
}

pub fn normalize_chromosome(code: &str) -> String {
    match code {
        "23" => "X".to_string(),
        "24" => "Y".to_string(),
        other => other.to_string(),
    }
}

fn decode_coordinate(coordinate: &str) -> Option<(String, String, String)> {
    let body = coordinate.split('.').nth(1)?;

    let position = match body.char_indices().find(|(_, ch)| ch.is_alphabetic()) {
        Some((idx, _)) => body[..idx].to_string(),
        None => return Some((body.to_string(), String::new(), String::new())),
    };

    let tail = coordinate.rsplit('.').next().unwrap_or_default();
    let ref_allele = letters(tail.split('>').next().unwrap_or_default());
    let alt_allele = match coordinate.rsplit_once('>') {
        Some((_, alt)) => letters(alt),
        None => String::new(),
    };

    Some((position, ref_allele, alt_allele))
}

fn letters(segment: &str) -> String {
    segment.chars().filter(|ch| ch.is_alphabetic()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_separator_means_empty() {
        assert_eq!(decode("garbage"), DecodedLocation::default());
    }

    #[test]
    fn letters_only_keep_alphabetic() {
        assert_eq!(letters("12AC-"), "AC");
    }
}
