use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::TaxId;
use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Species {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl Species {
    pub fn tax_id(&self) -> Result<TaxId, KiraError> {
        self.properties
            .get("taxId")
            .ok_or_else(|| KiraError::MissingTaxId(self.name.clone()))?
            .parse()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpeciesConfig {
    pub species: Vec<Species>,
}

impl SpeciesConfig {
    pub fn get(&self, name: &str) -> Option<&Species> {
        self.species.iter().find(|species| species.name == name)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> Result<SpeciesConfig, KiraError> {
        let content =
            fs::read_to_string(path).map_err(|_| KiraError::ConfigRead(path.to_path_buf()))?;
        Ok(Self::parse(&content))
    }

    /// A `name` key opens a new block; other keys attach to the latest block.
    /// Comments, blank lines, lines without `=` and keys without a `.` prefix
    /// are ignored, as are keys seen before the first `name`.
    pub fn parse(content: &str) -> SpeciesConfig {
        let mut config = SpeciesConfig::default();
        for line in content.lines() {
            if line.starts_with('#') {
                continue;
            }
            let Some((prefix, value)) = line.trim().split_once('=') else {
                continue;
            };
            let Some((_, key)) = prefix.split_once('.') else {
                continue;
            };
            if key == "name" {
                config.species.push(Species {
                    name: value.to_string(),
                    properties: BTreeMap::new(),
                });
            } else if let Some(current) = config.species.last_mut() {
                current.properties.insert(key.to_string(), value.to_string());
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_before_first_name_are_ignored() {
        let config = ConfigLoader::parse("1.taxId=1\n2.name=mus-musculus\n2.taxId=10090\n");
        assert_eq!(config.species.len(), 1);
        assert_eq!(config.species[0].tax_id().unwrap().as_str(), "10090");
    }
}
