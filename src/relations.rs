//! Pedigree relation resolution against the VCF sample set

use crate::ped::Pedigree;
use crate::Sex;
use std::collections::HashMap;

/// A child with at least one parent genotyped in the VCF.
///
/// Parent fields are VCF sample-column indices; `None` means the parent is
/// either undeclared in the pedigree or absent from the VCF (a parent without
/// a genotype column cannot contribute inheritance evidence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub child: String,
    pub child_idx: usize,
    pub mother_idx: Option<usize>,
    pub mother_id: Option<String>,
    pub father_idx: Option<usize>,
    pub father_id: Option<String>,
    pub sex: Sex,
}

/// Immutable child-to-parents map, ordered by VCF sample column.
///
/// Built exactly once per run; shared read-only across all variants. Its
/// length is the denominator for the emission filter's phased fraction.
#[derive(Debug, Clone, Default)]
pub struct RelationMap {
    relations: Vec<Relation>,
}

impl RelationMap {
    pub fn get(&self, child: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.child == child)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Intersect the pedigree with the VCF sample set.
///
/// For each VCF sample found in the pedigree, a relation is recorded if at
/// least one declared parent also has a VCF sample column. Samples absent
/// from the pedigree and families with no phaseable member are warned about
/// but never abort the run.
pub fn build_relations(vcf_samples: &[String], pedigree: &Pedigree) -> RelationMap {
    let sample_index: HashMap<&str, usize> = vcf_samples
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    let mut relations = Vec::new();
    // family id -> whether any member yielded a relation
    let mut families: HashMap<String, bool> = HashMap::new();

    for (child_idx, sample) in vcf_samples.iter().enumerate() {
        let individual = match pedigree.get(sample) {
            Some(individual) => individual,
            None => {
                log::warn!("Sample '{}' is not in the pedigree; it will not be phased", sample);
                continue;
            }
        };

        let mother_idx = individual
            .mother
            .as_deref()
            .and_then(|id| sample_index.get(id).copied());
        let mother_id = mother_idx.map(|i| vcf_samples[i].clone());
        let father_idx = individual
            .father
            .as_deref()
            .and_then(|id| sample_index.get(id).copied());
        let father_id = father_idx.map(|i| vcf_samples[i].clone());

        let phaseable = mother_idx.is_some() || father_idx.is_some();
        let entry = families.entry(individual.family.clone()).or_insert(false);
        *entry |= phaseable;

        if phaseable {
            relations.push(Relation {
                child: sample.clone(),
                child_idx,
                mother_idx,
                mother_id,
                father_idx,
                father_id,
                sex: individual.sex,
            });
        }
    }

    for (family, phaseable) in &families {
        if !phaseable {
            log::warn!(
                "Family '{}' has no member with a genotyped parent; nothing to phase",
                family
            );
        }
    }

    RelationMap { relations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ped::Pedigree;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn trio_pedigree() -> Pedigree {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "FAM1\tchild\tdad\tmum\t1\t2\n\
             FAM1\tdad\t0\t0\t1\t1\n\
             FAM1\tmum\t0\t0\t2\t1\n\
             FAM2\tuncle\t0\t0\t1\t1\n"
        )
        .unwrap();
        Pedigree::load(file.path()).unwrap()
    }

    fn samples(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_trio() {
        let ped = trio_pedigree();
        let map = build_relations(&samples(&["child", "dad", "mum"]), &ped);

        assert_eq!(map.len(), 1);
        let rel = map.get("child").unwrap();
        assert_eq!(rel.child_idx, 0);
        assert_eq!(rel.father_idx, Some(1));
        assert_eq!(rel.father_id.as_deref(), Some("dad"));
        assert_eq!(rel.mother_idx, Some(2));
        assert_eq!(rel.mother_id.as_deref(), Some("mum"));
        assert_eq!(rel.sex, Sex::Male);
    }

    #[test]
    fn test_parent_absent_from_vcf_degrades_to_duo() {
        let ped = trio_pedigree();
        let map = build_relations(&samples(&["child", "mum"]), &ped);

        let rel = map.get("child").unwrap();
        assert_eq!(rel.father_idx, None);
        assert_eq!(rel.father_id, None);
        assert_eq!(rel.mother_idx, Some(1));
        assert_eq!(rel.mother_id.as_deref(), Some("mum"));
    }

    #[test]
    fn test_no_parent_in_vcf_means_no_relation() {
        let ped = trio_pedigree();
        let map = build_relations(&samples(&["child"]), &ped);
        assert!(map.is_empty());
    }

    #[test]
    fn test_sample_not_in_pedigree_is_skipped() {
        let ped = trio_pedigree();
        let map = build_relations(&samples(&["stranger", "child", "mum"]), &ped);

        assert_eq!(map.len(), 1);
        assert!(map.get("stranger").is_none());
        assert_eq!(map.get("child").unwrap().child_idx, 1);
    }

    #[test]
    fn test_parents_themselves_get_no_relation() {
        let ped = trio_pedigree();
        let map = build_relations(&samples(&["child", "dad", "mum"]), &ped);
        assert!(map.get("dad").is_none());
        assert!(map.get("mum").is_none());
    }
}
