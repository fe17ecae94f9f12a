//! # mendel - Transmission Phasing Tool
//!
//! Assigns parent-of-origin ("phase") to genotype calls in VCF records for
//! samples with at least one genotyped parent, and flags calls inconsistent
//! with simple Mendelian inheritance.

pub mod annotate;
pub mod filter;
pub mod genotype;
pub mod ped;
pub mod phaser;
pub mod relations;
pub mod utils;
pub mod vcf;

use serde::{Deserialize, Serialize};

/// Sex of an individual as declared in the pedigree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Unknown,
    Male,
    Female,
}

impl Sex {
    /// Parse a PED sex code (1 = male, 2 = female, anything else unknown)
    pub fn from_ped_code(code: &str) -> Self {
        match code.trim() {
            "1" => Sex::Male,
            "2" => Sex::Female,
            _ => Sex::Unknown,
        }
    }
}

/// Per-sample genotype eligibility thresholds
#[derive(Debug, Clone)]
pub struct GtFilterConfig {
    pub min_gq: f64,
    pub min_dp: u32,
    pub min_ab_het: f64,
    pub min_ab_hom: f64,
}

impl Default for GtFilterConfig {
    fn default() -> Self {
        Self {
            min_gq: 20.0,
            min_dp: 0,
            min_ab_het: 0.0,
            min_ab_hom: 0.0,
        }
    }
}

/// Variant emission thresholds; zero means no filtering
#[derive(Debug, Clone, Default)]
pub struct EmitConfig {
    pub min_phased: usize,
    pub min_phased_fraction: f64,
}

/// Validate gate and emission configuration values
pub fn validate_config(gt: &GtFilterConfig, emit: &EmitConfig) -> MendelResult<()> {
    if gt.min_gq < 0.0 {
        return Err(MendelError::InvalidConfig(format!(
            "Minimum GQ must be non-negative, got {}",
            gt.min_gq
        )));
    }
    for (name, value) in [
        ("het allele balance", gt.min_ab_het),
        ("hom allele balance", gt.min_ab_hom),
        ("phased fraction", emit.min_phased_fraction),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(MendelError::InvalidConfig(format!(
                "Minimum {} must be between 0 and 1, got {}",
                name, value
            )));
        }
    }
    Ok(())
}

/// Error types for the mendel library
#[derive(Debug, thiserror::Error)]
pub enum MendelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid variant format: {0}")]
    InvalidVariant(String),

    #[error("Invalid pedigree: {0}")]
    InvalidPedigree(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type MendelResult<T> = Result<T, MendelError>;
