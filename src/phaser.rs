//! Transmission phasing of genotype calls against parental genotypes

use crate::genotype::{EligibilityGate, FormatLayout, Genotype, SampleCall};
use crate::relations::{Relation, RelationMap};
use crate::vcf::{VcfRecord, INFO_PHASED, INFO_VIOLATION};
use crate::{MendelResult, Sex};

/// Per-child result for one variant.
///
/// Phasing and violation flagging are independent: a call can be flagged and
/// left unphased, phased without a flag, both, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChildOutcome {
    pub phased: Option<[u32; 2]>,
    pub violation: bool,
}

/// Per-variant aggregation over all relations, in VCF sample-column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub phased: Vec<String>,
    pub violations: Vec<String>,
}

impl PhaseOutcome {
    pub fn phased_count(&self) -> usize {
        self.phased.len()
    }
}

/// Strip a literal leading "chr" for sex-chromosome comparison
fn normalize_chrom(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

/// A parent's call for this variant, degraded to unusable if the genotype is
/// unavailable or gate-rejected. The degradation holds for this variant only.
fn usable_parent_genotype(
    record: &VcfRecord,
    layout: &FormatLayout,
    idx: Option<usize>,
    sample: Option<&str>,
    gate: &EligibilityGate,
    max_allele: u32,
) -> MendelResult<Option<Genotype>> {
    let (idx, sample) = match (idx, sample) {
        (Some(idx), Some(sample)) => (idx, sample),
        _ => return Ok(None),
    };
    let call = record.sample_call(layout, idx)?;
    if gate.is_eligible(&call, sample, max_allele) {
        Ok(Some(call.genotype))
    } else {
        Ok(None)
    }
}

/// Determine phase and inheritance consistency for one child's call.
///
/// `mother` and `father` are `None` when the parent is absent from the VCF
/// or unusable for this variant; both `None` means nothing to check.
pub fn phase_child(
    call: &SampleCall,
    mother: Option<Genotype>,
    father: Option<Genotype>,
    sex: Sex,
    chrom: &str,
) -> ChildOutcome {
    let mut outcome = ChildOutcome::default();

    let [a, b] = match call.genotype {
        Genotype::Called(alleles) => alleles,
        Genotype::Missing => return outcome,
    };

    if mother.is_none() && father.is_none() {
        return outcome;
    }

    let chrom = normalize_chrom(chrom);
    let mut maternal: Option<u32> = None;
    let mut paternal: Option<u32> = None;

    if a == b {
        // Homozygous or hemizygous call
        if chrom == "X" && sex == Sex::Male {
            // Check the mother only; never phase on this branch
            if let Some(mother) = mother {
                if !mother.contains(a) {
                    outcome.violation = true;
                }
            }
        } else if chrom == "Y" && sex == Sex::Male {
            if let Some(father) = father {
                if !father.contains(a) {
                    outcome.violation = true;
                }
            }
        } else if matches!(mother, Some(m) if !m.contains(a)) {
            outcome.violation = true;
        } else if matches!(father, Some(f) if !f.contains(a)) {
            outcome.violation = true;
        } else {
            maternal = Some(a);
            paternal = Some(a);
        }
    } else {
        // Heterozygous call: resolve each allele in call order. A later
        // allele's assignment replaces an earlier one to the same slot.
        for allele in [a, b] {
            match (mother, father) {
                (Some(mother), Some(father)) => {
                    match (mother.contains(allele), father.contains(allele)) {
                        (false, false) => outcome.violation = true,
                        (true, false) => maternal = Some(allele),
                        (false, true) => paternal = Some(allele),
                        // Present in both parents: ambiguous, no assignment
                        (true, true) => {}
                    }
                }
                (Some(mother), None) => {
                    // The allele the known parent lacks must be the other's
                    if !mother.contains(allele) {
                        paternal = Some(allele);
                    }
                }
                (None, Some(father)) => {
                    if !father.contains(allele) {
                        maternal = Some(allele);
                    }
                }
                (None, None) => unreachable!("checked above"),
            }
        }
    }

    outcome.phased = match (maternal, paternal) {
        (Some(m), Some(p)) => Some([m, p]),
        (Some(m), None) => {
            let p = if m == a { b } else { a };
            Some([m, p])
        }
        (None, Some(p)) => {
            let m = if p == a { b } else { a };
            Some([m, p])
        }
        (None, None) => None,
    };

    outcome
}

fn usable_parent_for(
    record: &VcfRecord,
    layout: &FormatLayout,
    relation: &Relation,
    gate: &EligibilityGate,
    max_allele: u32,
) -> MendelResult<(Option<Genotype>, Option<Genotype>)> {
    let mother = usable_parent_genotype(
        record,
        layout,
        relation.mother_idx,
        relation.mother_id.as_deref(),
        gate,
        max_allele,
    )?;
    let father = usable_parent_genotype(
        record,
        layout,
        relation.father_idx,
        relation.father_id.as_deref(),
        gate,
        max_allele,
    )?;
    Ok((mother, father))
}

/// Phase one record against the relation map.
///
/// Each child is processed independently; phased children have their GT
/// rewritten as `maternal|paternal` and the record gains MV/PHS INFO fields
/// when the respective sets are non-empty.
pub fn phase_record(
    record: &mut VcfRecord,
    relations: &RelationMap,
    gate: &EligibilityGate,
) -> MendelResult<PhaseOutcome> {
    let mut outcome = PhaseOutcome::default();
    let layout = record.format_layout();
    let max_allele = record.alt_allele_count();

    let mut phased_calls: Vec<(usize, [u32; 2])> = Vec::new();

    for relation in relations.iter() {
        let call = record.sample_call(&layout, relation.child_idx)?;
        if !gate.is_eligible(&call, &relation.child, max_allele) {
            continue;
        }

        let (mother, father) = usable_parent_for(record, &layout, relation, gate, max_allele)?;
        let child = phase_child(&call, mother, father, relation.sex, &record.chrom);

        if child.violation {
            outcome.violations.push(relation.child.clone());
        }
        if let Some(pair) = child.phased {
            outcome.phased.push(relation.child.clone());
            phased_calls.push((relation.child_idx, pair));
        }
    }

    for (idx, [maternal, paternal]) in phased_calls {
        record.set_phased_genotype(&layout, idx, maternal, paternal);
    }

    if !outcome.violations.is_empty() {
        record.push_info(INFO_VIOLATION, &outcome.violations.join(","));
    }
    if !outcome.phased.is_empty() {
        record.push_info(INFO_PHASED, &outcome.phased.join(","));
    }

    Ok(outcome)
}
