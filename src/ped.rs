//! Pedigree (PED) file parsing

use crate::{MendelError, MendelResult, Sex};
use crate::utils::is_gzipped;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One individual as declared in a pedigree file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub id: String,
    pub family: String,
    pub father: Option<String>,
    pub mother: Option<String>,
    pub sex: Sex,
}

impl Individual {
    pub fn new(
        id: String,
        family: String,
        father: Option<String>,
        mother: Option<String>,
        sex: Sex,
    ) -> Self {
        Self {
            id,
            family,
            father,
            mother,
            sex,
        }
    }
}

/// PED parent columns use "0" or "." for "no parent declared"
fn parse_parent(field: &str) -> Option<String> {
    match field.trim() {
        "" | "0" | "." => None,
        id => Some(id.to_string()),
    }
}

/// Loaded pedigree indexed by individual id
#[derive(Debug, Clone, Default)]
pub struct Pedigree {
    individuals: HashMap<String, Individual>,
}

impl Pedigree {
    /// Load a PED file: one row per individual with columns
    /// family, individual, father, mother, sex (extra columns ignored).
    /// Lines starting with '#' are skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> MendelResult<Self> {
        let file = File::open(&path)
            .map_err(|_| MendelError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

        let reader: Box<dyn BufRead> = if is_gzipped(&path)? {
            let gz_decoder = MultiGzDecoder::new(file);
            Box::new(BufReader::new(gz_decoder))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut individuals = HashMap::new();

        for result in csv_reader.records() {
            let record = result?;
            // file line (1-based), counting the comment lines csv skips
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() == 1 && record[0].trim().is_empty() {
                continue;
            }
            if record.len() < 5 {
                return Err(MendelError::InvalidPedigree(format!(
                    "Line {} has {} columns, expected at least 5 (family, individual, father, mother, sex)",
                    line,
                    record.len()
                )));
            }

            let family = record[0].trim().to_string();
            let id = record[1].trim().to_string();
            if id.is_empty() {
                return Err(MendelError::InvalidPedigree(format!(
                    "Line {} has an empty individual id",
                    line
                )));
            }

            let individual = Individual::new(
                id.clone(),
                family,
                parse_parent(&record[2]),
                parse_parent(&record[3]),
                Sex::from_ped_code(&record[4]),
            );

            if individuals.insert(id.clone(), individual).is_some() {
                return Err(MendelError::InvalidPedigree(format!(
                    "Duplicate individual id '{}' at line {}",
                    id, line
                )));
            }
        }

        Ok(Pedigree { individuals })
    }

    pub fn get(&self, id: &str) -> Option<&Individual> {
        self.individuals.get(id)
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.values()
    }
}
