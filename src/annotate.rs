//! Allele annotation and filtering against reference score/variant files

use crate::utils::is_gzipped;
use crate::vcf::{VcfReader, VcfRecord};
use crate::{MendelError, MendelResult};
use flate2::read::MultiGzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reduce a ref/alt pair to its simplest representation: identical trailing
/// bases are trimmed first, then identical leading bases with the position
/// advanced accordingly
pub fn minimize_allele(mut pos: u32, ref_allele: &str, alt_allele: &str) -> (u32, String, String) {
    let mut r = ref_allele.as_bytes();
    let mut a = alt_allele.as_bytes();

    while r.len() > 1 && a.len() > 1 && r[r.len() - 1] == a[a.len() - 1] {
        r = &r[..r.len() - 1];
        a = &a[..a.len() - 1];
    }
    while r.len() > 1 && a.len() > 1 && r[0] == a[0] {
        r = &r[1..];
        a = &a[1..];
        pos += 1;
    }

    (
        pos,
        String::from_utf8_lossy(r).into_owned(),
        String::from_utf8_lossy(a).into_owned(),
    )
}

/// Alt alleles that cannot be matched against a reference file
fn is_symbolic(alt: &str) -> bool {
    alt == "*" || alt == "." || alt.starts_with('<')
}

/// Lookup key for one alternate allele after minimization; the "chr" prefix
/// is stripped so files with and without it interoperate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlleleKey {
    pub chrom: String,
    pub pos: u32,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl AlleleKey {
    pub fn new(chrom: &str, pos: u32, ref_allele: &str, alt_allele: &str) -> Self {
        let (pos, ref_allele, alt_allele) = minimize_allele(pos, ref_allele, alt_allele);
        AlleleKey {
            chrom: chrom.strip_prefix("chr").unwrap_or(chrom).to_string(),
            pos,
            ref_allele,
            alt_allele,
        }
    }
}

/// Format a per-allele (Number=A) INFO value, `.` for unmatched alleles
fn number_a_value<T: std::fmt::Display>(values: &[Option<T>]) -> String {
    values
        .iter()
        .map(|v| match v {
            Some(v) => v.to_string(),
            None => ".".to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_float_list(s: &str) -> Vec<Option<f64>> {
    s.split(',').map(|v| v.parse::<f64>().ok()).collect()
}

/// A record is dropped when it has alternate alleles and every one of them
/// is filtered by at least one reference source
pub fn all_alleles_filtered(per_source: &[Vec<bool>]) -> bool {
    let n_alleles = per_source.iter().map(|v| v.len()).max().unwrap_or(0);
    if n_alleles == 0 {
        return false;
    }
    (0..n_alleles).all(|i| {
        per_source
            .iter()
            .any(|verdicts| verdicts.get(i).copied().unwrap_or(false))
    })
}

/// What is known about one allele in the reference VCF
#[derive(Debug, Clone, PartialEq)]
pub struct KnownAllele {
    pub rsid: Option<String>,
    pub freq: Option<f64>,
    pub build: Option<u32>,
}

/// Thresholds for filtering against known-variant annotations; `None`
/// disables the corresponding check
#[derive(Debug, Clone, Default)]
pub struct KnownFilterConfig {
    pub max_freq: Option<f64>,
    pub min_freq: Option<f64>,
    pub min_build: Option<u32>,
    pub max_build: Option<u32>,
}

impl KnownFilterConfig {
    pub fn validate(&self) -> MendelResult<()> {
        for (name, value) in [("max-freq", self.max_freq), ("min-freq", self.min_freq)] {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(MendelError::InvalidConfig(format!(
                        "{} must be between 0 and 1, got {}",
                        name, value
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_build, self.max_build) {
            if min > max {
                return Err(MendelError::InvalidConfig(format!(
                    "min-build ({}) must not be greater than max-build ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

/// Annotates record alleles with frequency, build and identifier data from
/// a reference VCF (e.g. dbSNP) and filters them against thresholds.
///
/// The reference is held in memory keyed by minimized allele, so it should
/// be restricted to the regions under analysis rather than a whole-genome
/// release.
pub struct KnownVariantAnnotator {
    sites: HashMap<AlleleKey, KnownAllele>,
    config: KnownFilterConfig,
}

impl KnownVariantAnnotator {
    /// INFO declarations for the fields this annotator adds
    pub fn header_lines() -> [&'static str; 2] {
        [
            "##INFO=<ID=DBSNP_FREQ,Number=A,Type=Float,Description=\"Allele frequency of the matching allele in the reference VCF\">",
            "##INFO=<ID=DBSNP_BUILD,Number=A,Type=Integer,Description=\"dbSNP build in which the matching allele first appeared\">",
        ]
    }

    /// Load a reference VCF. Per allele, the frequency is taken from the
    /// first of CAF, TOPMED (allele-indexed with the reference first) or AF
    /// that parses; the build from dbSNPBuildID. The first record matching
    /// an allele wins.
    pub fn load<P: AsRef<Path>>(path: P, config: KnownFilterConfig) -> MendelResult<Self> {
        config.validate()?;

        let mut reader = VcfReader::new(&path)?;
        let mut sites = HashMap::new();

        for record in reader.records() {
            let record = record?;

            let rsid = if record.id == "." || record.id.is_empty() {
                None
            } else {
                Some(record.id.clone())
            };
            let build = record
                .info_value("dbSNPBuildID")
                .and_then(|v| v.parse::<u32>().ok());
            let caf = record.info_value("CAF").map(parse_float_list);
            let topmed = record.info_value("TOPMED").map(parse_float_list);
            let af = record.info_value("AF").map(parse_float_list);

            if record.alt_allele == "." {
                continue;
            }
            for (i, alt) in record.alt_allele.split(',').enumerate() {
                if is_symbolic(alt) {
                    continue;
                }
                // CAF and TOPMED carry the reference allele at index 0
                let freq = caf
                    .as_ref()
                    .and_then(|v| v.get(i + 1).copied().flatten())
                    .or_else(|| topmed.as_ref().and_then(|v| v.get(i + 1).copied().flatten()))
                    .or_else(|| af.as_ref().and_then(|v| v.get(i).copied().flatten()));

                let key = AlleleKey::new(&record.chrom, record.pos, &record.ref_allele, alt);
                sites.entry(key).or_insert_with(|| KnownAllele {
                    rsid: rsid.clone(),
                    freq,
                    build,
                });
            }
        }

        log::info!("Loaded {} known alleles from reference VCF", sites.len());
        Ok(KnownVariantAnnotator { sites, config })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Annotate matching alleles and return one filter verdict per alt
    /// allele. Unmatched alleles are never filtered.
    pub fn annotate_record(&self, record: &mut VcfRecord) -> Vec<bool> {
        let alts: Vec<String> = if record.alt_allele == "." {
            Vec::new()
        } else {
            record.alt_allele.split(',').map(|s| s.to_string()).collect()
        };

        let mut verdicts = vec![false; alts.len()];
        let mut freqs: Vec<Option<f64>> = vec![None; alts.len()];
        let mut builds: Vec<Option<u32>> = vec![None; alts.len()];
        let mut rsids: Vec<String> = Vec::new();

        for (i, alt) in alts.iter().enumerate() {
            if is_symbolic(alt) {
                continue;
            }
            let key = AlleleKey::new(&record.chrom, record.pos, &record.ref_allele, alt);
            let known = match self.sites.get(&key) {
                Some(known) => known,
                None => continue,
            };

            freqs[i] = known.freq;
            builds[i] = known.build;
            if let Some(rsid) = &known.rsid {
                if !rsids.contains(rsid) {
                    rsids.push(rsid.clone());
                }
            }

            let mut drop = false;
            if let (Some(max), Some(freq)) = (self.config.max_freq, known.freq) {
                if freq >= max {
                    drop = true;
                }
            }
            if let (Some(min), Some(freq)) = (self.config.min_freq, known.freq) {
                if freq < min {
                    drop = true;
                }
            }
            if let (Some(min), Some(build)) = (self.config.min_build, known.build) {
                if build < min {
                    drop = true;
                }
            }
            if let (Some(max), Some(build)) = (self.config.max_build, known.build) {
                if build > max {
                    drop = true;
                }
            }
            verdicts[i] = drop;
        }

        if freqs.iter().any(|f| f.is_some()) {
            record.push_info("DBSNP_FREQ", &number_a_value(&freqs));
        }
        if builds.iter().any(|b| b.is_some()) {
            record.push_info("DBSNP_BUILD", &number_a_value(&builds));
        }
        for rsid in &rsids {
            record.add_id(rsid);
        }

        verdicts
    }
}

/// CADD deleteriousness scores for one allele
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaddScore {
    pub raw: f64,
    pub phred: f64,
}

/// Score floors for filtering against CADD annotations; `None` disables
/// the corresponding check
#[derive(Debug, Clone, Default)]
pub struct CaddFilterConfig {
    pub min_raw: Option<f64>,
    pub min_phred: Option<f64>,
}

/// Annotates record alleles with CADD raw and PHRED scores from a
/// tab-delimited reference file (chrom, pos, ref, alt, raw, PHRED) and
/// filters alleles scoring below the configured floors
pub struct CaddAnnotator {
    scores: HashMap<AlleleKey, CaddScore>,
    config: CaddFilterConfig,
}

impl CaddAnnotator {
    /// INFO declarations for the fields this annotator adds
    pub fn header_lines() -> [&'static str; 2] {
        [
            "##INFO=<ID=CADD_RAW,Number=A,Type=Float,Description=\"CADD raw score added from reference files\">",
            "##INFO=<ID=CADD_PHRED,Number=A,Type=Float,Description=\"CADD PHRED score added from reference files\">",
        ]
    }

    /// Load a CADD scores file (plain or gzipped, `#` header lines skipped).
    /// Rows with fewer than six columns are warned about and skipped; the
    /// first row matching an allele wins.
    pub fn load<P: AsRef<Path>>(path: P, config: CaddFilterConfig) -> MendelResult<Self> {
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

        let mut scores = HashMap::new();

        for result in csv_reader.records() {
            let record = result?;

            if record.len() < 6 {
                log::warn!("Not enough columns for CADD record: {:?}", record);
                continue;
            }

            let pos = record[1].parse::<u32>().map_err(|_| {
                MendelError::InvalidVariant(format!("Invalid position in CADD record: {}", &record[1]))
            })?;
            let raw = record[4].parse::<f64>().map_err(|_| {
                MendelError::InvalidVariant(format!("Invalid CADD raw score: {}", &record[4]))
            })?;
            let phred = record[5].parse::<f64>().map_err(|_| {
                MendelError::InvalidVariant(format!("Invalid CADD PHRED score: {}", &record[5]))
            })?;

            let key = AlleleKey::new(&record[0], pos, &record[2], &record[3]);
            scores.entry(key).or_insert(CaddScore { raw, phred });
        }

        log::info!("Loaded {} CADD scores", scores.len());
        Ok(CaddAnnotator { scores, config })
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Annotate matching alleles and return one filter verdict per alt
    /// allele. Unscored alleles are never filtered.
    pub fn annotate_record(&self, record: &mut VcfRecord) -> Vec<bool> {
        let alts: Vec<String> = if record.alt_allele == "." {
            Vec::new()
        } else {
            record.alt_allele.split(',').map(|s| s.to_string()).collect()
        };

        let mut verdicts = vec![false; alts.len()];
        let mut raws: Vec<Option<f64>> = vec![None; alts.len()];
        let mut phreds: Vec<Option<f64>> = vec![None; alts.len()];

        for (i, alt) in alts.iter().enumerate() {
            if is_symbolic(alt) {
                continue;
            }
            let key = AlleleKey::new(&record.chrom, record.pos, &record.ref_allele, alt);
            let score = match self.scores.get(&key) {
                Some(score) => score,
                None => continue,
            };

            raws[i] = Some(score.raw);
            phreds[i] = Some(score.phred);

            let mut drop = false;
            if let Some(min) = self.config.min_raw {
                if score.raw < min {
                    drop = true;
                }
            }
            if let Some(min) = self.config.min_phred {
                if score.phred < min {
                    drop = true;
                }
            }
            verdicts[i] = drop;
        }

        if raws.iter().any(|r| r.is_some()) {
            record.push_info("CADD_RAW", &number_a_value(&raws));
            record.push_info("CADD_PHRED", &number_a_value(&phreds));
        }

        verdicts
    }
}

/// The optional reference annotators for a run
#[derive(Default)]
pub struct Annotators {
    pub dbsnp: Option<KnownVariantAnnotator>,
    pub cadd: Option<CaddAnnotator>,
}

impl Annotators {
    pub fn is_enabled(&self) -> bool {
        self.dbsnp.is_some() || self.cadd.is_some()
    }

    /// INFO declarations for every enabled annotator
    pub fn header_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.dbsnp.is_some() {
            lines.extend(
                KnownVariantAnnotator::header_lines()
                    .iter()
                    .map(|l| l.to_string()),
            );
        }
        if self.cadd.is_some() {
            lines.extend(CaddAnnotator::header_lines().iter().map(|l| l.to_string()));
        }
        lines
    }

    /// Annotate a record against every enabled source; returns whether the
    /// record should be dropped (all alt alleles filtered)
    pub fn annotate(&self, record: &mut VcfRecord) -> bool {
        let mut verdicts = Vec::new();
        if let Some(dbsnp) = &self.dbsnp {
            verdicts.push(dbsnp.annotate_record(record));
        }
        if let Some(cadd) = &self.cadd {
            verdicts.push(cadd.annotate_record(record));
        }
        all_alleles_filtered(&verdicts)
    }
}
