//! Variant emission filtering on per-variant phasing counts

use crate::EmitConfig;

/// Decides whether a phased variant is written downstream.
///
/// The denominator for the fraction test is the run-wide relation count,
/// fixed at construction, not a per-variant recomputation.
#[derive(Debug, Clone)]
pub struct EmissionFilter {
    config: EmitConfig,
    relation_total: usize,
}

impl EmissionFilter {
    pub fn new(config: EmitConfig, relation_total: usize) -> Self {
        Self {
            config,
            relation_total,
        }
    }

    /// Both thresholds must hold; a threshold of zero disables its check
    pub fn passes(&self, phased_count: usize) -> bool {
        if self.config.min_phased > 0 && phased_count < self.config.min_phased {
            return false;
        }
        if self.config.min_phased_fraction > 0.0 {
            if self.relation_total == 0 {
                return false;
            }
            let fraction = phased_count as f64 / self.relation_total as f64;
            if fraction < self.config.min_phased_fraction {
                return false;
            }
        }
        true
    }
}
