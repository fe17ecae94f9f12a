//! Genotype call model and per-sample eligibility gating

use crate::{GtFilterConfig, MendelError, MendelResult};
use serde::{Deserialize, Serialize};

/// A diploid genotype call.
///
/// `Missing` covers any call with a `.` in an allele position or a ploidy
/// other than two. "Parent has no genotype column at all" is a separate
/// condition expressed at the relation level, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genotype {
    Missing,
    Called([u32; 2]),
}

impl Genotype {
    pub fn contains(&self, allele: u32) -> bool {
        matches!(self, Genotype::Called([a, b]) if *a == allele || *b == allele)
    }
}

/// One sample's call for one variant, with the quality metrics the
/// eligibility gate consumes
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCall {
    pub genotype: Genotype,
    pub phased: bool,
    pub gq: Option<f64>,
    pub dp: Option<u32>,
    pub ad: Option<Vec<u32>>,
}

impl SampleCall {
    pub fn missing() -> Self {
        Self {
            genotype: Genotype::Missing,
            phased: false,
            gq: None,
            dp: None,
            ad: None,
        }
    }
}

/// Positions of the subfields we consume within a FORMAT column
#[derive(Debug, Clone, Default)]
pub struct FormatLayout {
    pub gt: Option<usize>,
    pub ad: Option<usize>,
    pub dp: Option<usize>,
    pub gq: Option<usize>,
}

impl FormatLayout {
    pub fn parse(format: &str) -> Self {
        let mut layout = FormatLayout::default();
        for (i, key) in format.split(':').enumerate() {
            match key {
                "GT" => layout.gt = Some(i),
                "AD" => layout.ad = Some(i),
                "DP" => layout.dp = Some(i),
                "GQ" => layout.gq = Some(i),
                _ => {}
            }
        }
        layout
    }
}

/// Parse a genotype subfield like `0/1`, `1|0` or `./.`
///
/// Only diploid calls are usable; haploid or polyploid genotypes parse as
/// `Missing`. Non-numeric allele tokens are a format error.
pub fn parse_gt(gt: &str) -> MendelResult<(Genotype, bool)> {
    let phased = gt.contains('|');
    let tokens: Vec<&str> = gt.split(['/', '|']).collect();

    if tokens.len() != 2 || tokens.iter().any(|t| *t == ".") {
        return Ok((Genotype::Missing, phased));
    }

    let a = tokens[0].parse::<u32>().map_err(|_| {
        MendelError::InvalidVariant(format!("Invalid genotype field: {}", gt))
    })?;
    let b = tokens[1].parse::<u32>().map_err(|_| {
        MendelError::InvalidVariant(format!("Invalid genotype field: {}", gt))
    })?;

    Ok((Genotype::Called([a, b]), phased))
}

/// Parse one sample column against a FORMAT layout.
///
/// Missing or non-numeric quality metrics become `None`; only the genotype
/// subfield itself is parsed strictly.
pub fn parse_sample_call(layout: &FormatLayout, sample: &str) -> MendelResult<SampleCall> {
    if sample == "." {
        return Ok(SampleCall::missing());
    }

    let subfields: Vec<&str> = sample.split(':').collect();
    let field = |idx: Option<usize>| idx.and_then(|i| subfields.get(i)).copied();

    let (genotype, phased) = match field(layout.gt) {
        Some(gt) => parse_gt(gt)?,
        None => (Genotype::Missing, false),
    };

    let gq = field(layout.gq).and_then(|s| s.parse::<f64>().ok());
    let dp = field(layout.dp).and_then(|s| s.parse::<u32>().ok());
    let ad = field(layout.ad).and_then(|s| {
        s.split(',')
            .map(|d| d.parse::<u32>().ok())
            .collect::<Option<Vec<u32>>>()
    });

    Ok(SampleCall {
        genotype,
        phased,
        gq,
        dp,
        ad,
    })
}

/// Per-sample genotype eligibility gate.
///
/// Pure given its configuration: the same call and thresholds always give
/// the same verdict, independent of any other sample.
#[derive(Debug, Clone)]
pub struct EligibilityGate {
    config: GtFilterConfig,
}

impl EligibilityGate {
    pub fn new(config: GtFilterConfig) -> Self {
        Self { config }
    }

    /// Whether a call is usable as phasing evidence.
    ///
    /// An unavailable genotype is never eligible regardless of thresholds.
    /// A threshold of zero disables its check; a call missing a metric
    /// passes that check (an absent annotation is uninformative).
    pub fn is_eligible(&self, call: &SampleCall, sample: &str, max_allele: u32) -> bool {
        let alleles = match call.genotype {
            Genotype::Called(alleles) => alleles,
            Genotype::Missing => return false,
        };

        if alleles.iter().any(|&a| a > max_allele) {
            log::debug!(
                "Sample '{}': allele index out of range for this variant",
                sample
            );
            return false;
        }

        if self.config.min_gq > 0.0 {
            if let Some(gq) = call.gq {
                if gq < self.config.min_gq {
                    return false;
                }
            }
        }

        if self.config.min_dp > 0 {
            if let Some(dp) = call.dp {
                if dp < self.config.min_dp {
                    return false;
                }
            }
        }

        let ab_min = if alleles[0] == alleles[1] {
            self.config.min_ab_hom
        } else {
            self.config.min_ab_het
        };
        if ab_min > 0.0 {
            if let Some(ad) = &call.ad {
                let total: u32 = ad.iter().sum();
                if total > 0 {
                    for &allele in alleles.iter().filter(|&&a| a > 0) {
                        let depth = ad.get(allele as usize).copied().unwrap_or(0);
                        if (depth as f64 / total as f64) < ab_min {
                            return false;
                        }
                    }
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(gt: &str) -> SampleCall {
        parse_sample_call(&FormatLayout::parse("GT"), gt).unwrap()
    }

    #[test]
    fn test_parse_gt_unphased() {
        let (genotype, phased) = parse_gt("0/1").unwrap();
        assert_eq!(genotype, Genotype::Called([0, 1]));
        assert!(!phased);
    }

    #[test]
    fn test_parse_gt_phased() {
        let (genotype, phased) = parse_gt("1|0").unwrap();
        assert_eq!(genotype, Genotype::Called([1, 0]));
        assert!(phased);
    }

    #[test]
    fn test_parse_gt_missing_positions() {
        assert_eq!(parse_gt("./.").unwrap().0, Genotype::Missing);
        assert_eq!(parse_gt("0/.").unwrap().0, Genotype::Missing);
        assert_eq!(parse_gt(".").unwrap().0, Genotype::Missing);
    }

    #[test]
    fn test_parse_gt_non_diploid_is_missing() {
        assert_eq!(parse_gt("1").unwrap().0, Genotype::Missing);
        assert_eq!(parse_gt("0/1/1").unwrap().0, Genotype::Missing);
    }

    #[test]
    fn test_parse_gt_garbage_is_fatal() {
        assert!(parse_gt("a/b").is_err());
    }

    #[test]
    fn test_parse_sample_call_with_metrics() {
        let layout = FormatLayout::parse("GT:AD:DP:GQ");
        let call = parse_sample_call(&layout, "0/1:20,10:30:99").unwrap();

        assert_eq!(call.genotype, Genotype::Called([0, 1]));
        assert_eq!(call.gq, Some(99.0));
        assert_eq!(call.dp, Some(30));
        assert_eq!(call.ad, Some(vec![20, 10]));
    }

    #[test]
    fn test_parse_sample_call_dot_column() {
        let layout = FormatLayout::parse("GT:DP");
        let call = parse_sample_call(&layout, ".").unwrap();
        assert_eq!(call.genotype, Genotype::Missing);
    }

    #[test]
    fn test_parse_sample_call_missing_metrics() {
        let layout = FormatLayout::parse("GT:AD:DP:GQ");
        let call = parse_sample_call(&layout, "0/0:.:.:.").unwrap();
        assert_eq!(call.genotype, Genotype::Called([0, 0]));
        assert_eq!(call.gq, None);
        assert_eq!(call.dp, None);
        assert_eq!(call.ad, None);
    }

    #[test]
    fn test_genotype_contains() {
        let genotype = Genotype::Called([0, 2]);
        assert!(genotype.contains(0));
        assert!(genotype.contains(2));
        assert!(!genotype.contains(1));
        assert!(!Genotype::Missing.contains(0));
    }

    #[test]
    fn test_gate_rejects_missing_genotype() {
        let gate = EligibilityGate::new(GtFilterConfig::default());
        assert!(!gate.is_eligible(&call("./."), "s1", 1));
    }

    #[test]
    fn test_gate_rejects_out_of_range_allele() {
        let gate = EligibilityGate::new(GtFilterConfig::default());
        assert!(!gate.is_eligible(&call("0/2"), "s1", 1));
        assert!(gate.is_eligible(&call("0/2"), "s1", 2));
    }

    #[test]
    fn test_gate_gq_threshold() {
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 20.0,
            ..Default::default()
        });
        let layout = FormatLayout::parse("GT:GQ");

        let low = parse_sample_call(&layout, "0/1:10").unwrap();
        assert!(!gate.is_eligible(&low, "s1", 1));

        let high = parse_sample_call(&layout, "0/1:50").unwrap();
        assert!(gate.is_eligible(&high, "s1", 1));

        // missing GQ passes
        let absent = parse_sample_call(&layout, "0/1:.").unwrap();
        assert!(gate.is_eligible(&absent, "s1", 1));
    }

    #[test]
    fn test_gate_dp_threshold() {
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 0.0,
            min_dp: 10,
            ..Default::default()
        });
        let layout = FormatLayout::parse("GT:DP");

        let shallow = parse_sample_call(&layout, "0/1:5").unwrap();
        assert!(!gate.is_eligible(&shallow, "s1", 1));

        let deep = parse_sample_call(&layout, "0/1:15").unwrap();
        assert!(gate.is_eligible(&deep, "s1", 1));
    }

    #[test]
    fn test_gate_het_allele_balance() {
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 0.0,
            min_ab_het: 0.25,
            ..Default::default()
        });
        let layout = FormatLayout::parse("GT:AD");

        let skewed = parse_sample_call(&layout, "0/1:38,2").unwrap();
        assert!(!gate.is_eligible(&skewed, "s1", 1));

        let balanced = parse_sample_call(&layout, "0/1:20,20").unwrap();
        assert!(gate.is_eligible(&balanced, "s1", 1));
    }

    #[test]
    fn test_gate_hom_allele_balance() {
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 0.0,
            min_ab_hom: 0.9,
            ..Default::default()
        });
        let layout = FormatLayout::parse("GT:AD");

        let contaminated = parse_sample_call(&layout, "1/1:10,30").unwrap();
        assert!(!gate.is_eligible(&contaminated, "s1", 1));

        let clean = parse_sample_call(&layout, "1/1:1,39").unwrap();
        assert!(gate.is_eligible(&clean, "s1", 1));
    }
}
