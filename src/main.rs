//! CLI binary for mendel - phases genotypes by transmission and flags
//! Mendelian violations in one pass over a VCF

use clap::Parser;
use env_logger::Env;
use rayon::prelude::*;
use std::path::PathBuf;
use mendel_rs::{
    annotate::{
        Annotators, CaddAnnotator, CaddFilterConfig, KnownFilterConfig, KnownVariantAnnotator,
    },
    filter::EmissionFilter,
    genotype::EligibilityGate,
    ped::Pedigree,
    phaser::{phase_record, PhaseOutcome},
    relations::{build_relations, RelationMap},
    utils::{chunk_work, ensure_parent_dirs, get_num_cpus, validate_file_readable, Timer},
    vcf::{VcfReader, VcfRecord, VcfWriter},
    validate_config, EmitConfig, GtFilterConfig, MendelError, MendelResult,
};

/// Records per read-phase-write cycle
const BATCH_SIZE: usize = 1000;
/// Progress log interval in records
const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Parser)]
#[command(name = "mendel")]
#[command(about = "mendel - transmission phasing and Mendelian violation detection for VCF files")]
#[command(long_about = "
mendel assigns parent-of-origin (phase) to genotype calls for every sample in
a VCF that has at least one genotyped parent, and flags genotypes that are
inconsistent with simple Mendelian inheritance.

The tool reads a pedigree (PED) file and intersects it with the samples in
the VCF: a child is phaseable when at least one declared parent also has a
genotype column. For each variant, each child's call is checked against the
usable parental calls; phased genotypes are rewritten as maternal|paternal
and two INFO fields are added per record when non-empty:
- MV:  sample ids whose genotype violates Mendelian inheritance
- PHS: sample ids whose genotype was phased by transmission

Low-quality genotypes can be excluded from the evidence with the GQ, depth
and allele-balance thresholds. Variants can optionally be dropped from the
output when too few samples were phased.

Records can additionally be annotated against reference files: a dbSNP-style
VCF (allele frequency, build, rs identifiers) and a CADD scores file. With
the matching thresholds set, records whose alternate alleles are all
filtered by the reference data are dropped from the output.
")]
struct Args {
    /// Path to the input VCF file (plain or gzipped)
    #[arg(long, value_name = "FILE")]
    input_vcf: PathBuf,

    /// Path to the pedigree (PED) file
    #[arg(long, value_name = "FILE")]
    ped: PathBuf,

    /// Path to the output VCF file
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Minimum genotype quality (GQ) for a call to count as evidence
    #[arg(long, default_value = "20")]
    min_gq: f64,

    /// Minimum depth (DP) for a call to count as evidence
    #[arg(long, default_value = "0")]
    min_dp: u32,

    /// Minimum allele balance for heterozygous calls (0 disables)
    #[arg(long, default_value = "0.0")]
    het_ab: f64,

    /// Minimum allele balance for homozygous calls (0 disables)
    #[arg(long, default_value = "0.0")]
    hom_ab: f64,

    /// Drop variants with fewer phased samples than this (0 disables)
    #[arg(long, default_value = "0")]
    min_phased: usize,

    /// Drop variants where phased samples / known relations is below this (0 disables)
    #[arg(long, default_value = "0.0")]
    min_phased_fraction: f64,

    /// dbSNP-style reference VCF for frequency/build annotation (plain or gzipped)
    #[arg(long, value_name = "FILE")]
    dbsnp: Option<PathBuf>,

    /// Filter alleles with a reference frequency at or above this value
    #[arg(long)]
    max_freq: Option<f64>,

    /// Filter alleles with a reference frequency below this value
    #[arg(long)]
    min_freq: Option<f64>,

    /// Filter alleles first seen in a dbSNP build older than this
    #[arg(long)]
    min_build: Option<u32>,

    /// Filter alleles first seen in a dbSNP build newer than this
    #[arg(long)]
    max_build: Option<u32>,

    /// CADD scores file: tab-delimited chrom, pos, ref, alt, raw, PHRED
    #[arg(long, value_name = "FILE")]
    cadd: Option<PathBuf>,

    /// Filter alleles with a CADD raw score below this value
    #[arg(long)]
    min_cadd_raw: Option<f64>,

    /// Filter alleles with a CADD PHRED score below this value
    #[arg(long)]
    min_cadd_phred: Option<f64>,

    /// Number of processes to use for parallel processing
    #[arg(long, default_value_t = get_num_cpus())]
    num_processes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Force overwrite of output file if it exists
    #[arg(short, long)]
    force: bool,
}

/// Build the optional reference annotators from the CLI arguments.
///
/// A threshold given without its reference file is a configuration error.
fn build_annotators(args: &Args) -> MendelResult<Annotators> {
    if args.dbsnp.is_none()
        && (args.max_freq.is_some()
            || args.min_freq.is_some()
            || args.min_build.is_some()
            || args.max_build.is_some())
    {
        return Err(MendelError::InvalidConfig(
            "Frequency and build thresholds require --dbsnp".to_string(),
        ));
    }
    if args.cadd.is_none() && (args.min_cadd_raw.is_some() || args.min_cadd_phred.is_some()) {
        return Err(MendelError::InvalidConfig(
            "CADD score thresholds require --cadd".to_string(),
        ));
    }

    let mut annotators = Annotators::default();

    if let Some(path) = &args.dbsnp {
        validate_file_readable(path)?;
        let _timer = Timer::new("Loading reference VCF");
        let config = KnownFilterConfig {
            max_freq: args.max_freq,
            min_freq: args.min_freq,
            min_build: args.min_build,
            max_build: args.max_build,
        };
        annotators.dbsnp = Some(KnownVariantAnnotator::load(path, config)?);
    }

    if let Some(path) = &args.cadd {
        validate_file_readable(path)?;
        let _timer = Timer::new("Loading CADD scores");
        let config = CaddFilterConfig {
            min_raw: args.min_cadd_raw,
            min_phred: args.min_cadd_phred,
        };
        annotators.cadd = Some(CaddAnnotator::load(path, config)?);
    }

    Ok(annotators)
}

/// Annotate and phase a batch of records across the worker pool, preserving
/// input order. The third tuple field marks records whose alternate alleles
/// were all filtered by the reference data; those are not phased.
fn process_batch(
    batch: Vec<VcfRecord>,
    relations: &RelationMap,
    gate: &EligibilityGate,
    annotators: &Annotators,
    num_processes: usize,
) -> MendelResult<Vec<(VcfRecord, PhaseOutcome, bool)>> {
    let chunks = chunk_work(batch, num_processes);

    let chunk_results: Result<Vec<Vec<_>>, MendelError> = chunks
        .into_par_iter()
        .map(|chunk| {
            chunk
                .into_iter()
                .map(|mut record| {
                    let dropped = annotators.annotate(&mut record);
                    if dropped {
                        return Ok((record, PhaseOutcome::default(), true));
                    }
                    let outcome = phase_record(&mut record, relations, gate)?;
                    Ok((record, outcome, false))
                })
                .collect()
        })
        .collect();

    let mut results = Vec::new();
    for chunk_result in chunk_results? {
        results.extend(chunk_result);
    }
    Ok(results)
}

fn run() -> MendelResult<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    log::info!("Starting mendel transmission phasing");
    log::info!("Input VCF: {:?}", args.input_vcf);
    log::info!("Pedigree: {:?}", args.ped);
    log::info!("Output VCF: {:?}", args.output);
    log::info!("Number of processes: {}", args.num_processes);

    // Validate input files
    validate_file_readable(&args.input_vcf)?;
    validate_file_readable(&args.ped)?;

    // Check if output file exists and handle accordingly
    if args.output.exists() && !args.force {
        return Err(MendelError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!(
                "Output file {:?} already exists. Use --force to overwrite.",
                args.output
            ),
        )));
    }

    ensure_parent_dirs(&args.output)?;

    let gt_config = GtFilterConfig {
        min_gq: args.min_gq,
        min_dp: args.min_dp,
        min_ab_het: args.het_ab,
        min_ab_hom: args.hom_ab,
    };
    let emit_config = EmitConfig {
        min_phased: args.min_phased,
        min_phased_fraction: args.min_phased_fraction,
    };
    validate_config(&gt_config, &emit_config)?;
    log::info!(
        "Genotype thresholds: GQ>={}, DP>={}, het AB>={}, hom AB>={}",
        gt_config.min_gq,
        gt_config.min_dp,
        gt_config.min_ab_het,
        gt_config.min_ab_hom
    );

    // Step 1: Load the pedigree
    let _timer = Timer::new("Loading pedigree");
    let pedigree = Pedigree::load(&args.ped)?;
    log::info!("Loaded {} individuals from pedigree", pedigree.len());

    // Step 2: Open the VCF and resolve relations against its sample set
    let _timer = Timer::new("Resolving relations");
    let mut reader = VcfReader::new(&args.input_vcf)?;
    let samples = reader.sample_names()?;
    log::info!("VCF contains {} samples", samples.len());

    let relations = build_relations(&samples, &pedigree);
    if relations.is_empty() {
        log::warn!("No sample in the VCF has a genotyped parent; nothing will be phased");
    } else {
        log::info!("{} samples have at least one genotyped parent", relations.len());
    }

    let gate = EligibilityGate::new(gt_config);
    let emission = EmissionFilter::new(emit_config, relations.len());
    let annotators = build_annotators(&args)?;

    // Step 3: Stream records, annotate, phase, filter, write
    let _timer = Timer::new("Phasing records");
    let mut writer = VcfWriter::create(&args.output)?;
    writer.write_header(reader.header_lines(), &annotators.header_lines())?;

    let mut records_read: u64 = 0;
    let mut records_written: u64 = 0;
    let mut records_filtered: u64 = 0;
    let mut phased_genotypes: u64 = 0;
    let mut violations: u64 = 0;

    let mut records = reader.records();
    loop {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        for record in records.by_ref().take(BATCH_SIZE) {
            batch.push(record?);
        }
        if batch.is_empty() {
            break;
        }

        let results = process_batch(batch, &relations, &gate, &annotators, args.num_processes)?;

        for (record, outcome, dropped) in results {
            records_read += 1;
            phased_genotypes += outcome.phased_count() as u64;
            violations += outcome.violations.len() as u64;

            if dropped {
                records_filtered += 1;
            } else if emission.passes(outcome.phased_count()) {
                writer.write_record(&record)?;
                records_written += 1;
            }

            if records_read % PROGRESS_INTERVAL == 0 {
                log::info!("Processed {} records", records_read);
            }
        }
    }

    writer.flush()?;

    log::info!("Phasing summary:");
    log::info!("  Records read: {}", records_read);
    log::info!(
        "  Records written: {} (dropped {})",
        records_written,
        records_read - records_written
    );
    if annotators.is_enabled() {
        log::info!("  Records removed by reference filters: {}", records_filtered);
    }
    log::info!("  Genotypes phased: {}", phased_genotypes);
    log::info!("  Mendelian violations: {}", violations);
    log::info!("Annotated VCF written to: {:?}", args.output);

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: MendelError) -> ! {
    match error {
        MendelError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        MendelError::InvalidVariant(msg) => {
            eprintln!("Error: Invalid variant data: {}", msg);
            eprintln!("Please check that your VCF file is properly formatted.");
        }
        MendelError::InvalidPedigree(msg) => {
            eprintln!("Error: Invalid pedigree data: {}", msg);
            eprintln!("Please check your PED file (family, individual, father, mother, sex).");
        }
        MendelError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check your threshold parameters.");
        }
        MendelError::Csv(ref e) => {
            eprintln!("Error: Pedigree parsing error: {}", e);
            eprintln!("Please check that your PED file is tab-delimited.");
        }
        MendelError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn trio_inputs() -> (NamedTempFile, NamedTempFile) {
        let mut vcf = NamedTempFile::new().unwrap();
        writeln!(vcf, "##fileformat=VCFv4.2").unwrap();
        writeln!(
            vcf,
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tchild\tdad\tmum"
        )
        .unwrap();
        // phaseable het
        writeln!(vcf, "chr1\t100\t.\tA\tT\t50\tPASS\t.\tGT\t0/1\t1/1\t0/0").unwrap();
        // violation, unphased
        writeln!(vcf, "chr1\t200\t.\tG\tC\t50\tPASS\t.\tGT\t1/1\t0/0\t0/0").unwrap();

        let mut ped = NamedTempFile::new().unwrap();
        write!(
            ped,
            "FAM1\tchild\tdad\tmum\t1\t2\n\
             FAM1\tdad\t0\t0\t1\t1\n\
             FAM1\tmum\t0\t0\t2\t1\n"
        )
        .unwrap();

        (vcf, ped)
    }

    fn trio_relations(vcf: &NamedTempFile, ped: &NamedTempFile) -> RelationMap {
        let pedigree = Pedigree::load(ped.path()).unwrap();
        let reader = VcfReader::new(vcf.path()).unwrap();
        let samples = reader.sample_names().unwrap();
        build_relations(&samples, &pedigree)
    }

    #[test]
    fn test_phase_batch_preserves_order() {
        let (vcf, ped) = trio_inputs();
        let relations = trio_relations(&vcf, &ped);
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 0.0,
            ..Default::default()
        });

        let mut reader = VcfReader::new(vcf.path()).unwrap();
        let batch: Vec<_> = reader
            .records()
            .collect::<MendelResult<_>>()
            .unwrap();

        let results = process_batch(batch, &relations, &gate, &Annotators::default(), 4).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.pos, 100);
        assert_eq!(results[1].0.pos, 200);

        // first record phased maternal|paternal, second flagged
        assert_eq!(results[0].0.samples[0], "0|1");
        assert_eq!(results[0].1.phased, vec!["child".to_string()]);
        assert_eq!(results[1].1.violations, vec!["child".to_string()]);
        assert!(results[1].0.info.contains("MV=child"));
    }

    #[test]
    fn test_emission_filter_drops_unphased_record() {
        let (vcf, ped) = trio_inputs();
        let relations = trio_relations(&vcf, &ped);
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 0.0,
            ..Default::default()
        });
        let emission = EmissionFilter::new(
            EmitConfig {
                min_phased: 1,
                min_phased_fraction: 0.0,
            },
            relations.len(),
        );

        let mut reader = VcfReader::new(vcf.path()).unwrap();
        let batch: Vec<_> = reader.records().collect::<MendelResult<_>>().unwrap();
        let results = process_batch(batch, &relations, &gate, &Annotators::default(), 1).unwrap();

        let kept: Vec<_> = results
            .iter()
            .filter(|(_, outcome, _)| emission.passes(outcome.phased_count()))
            .collect();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0.pos, 100);
    }

    #[test]
    fn test_process_batch_drops_common_variant_before_phasing() {
        let (vcf, ped) = trio_inputs();
        let relations = trio_relations(&vcf, &ped);
        let gate = EligibilityGate::new(GtFilterConfig {
            min_gq: 0.0,
            ..Default::default()
        });

        // reference knows the first variant as common
        let mut dbsnp = NamedTempFile::new().unwrap();
        writeln!(dbsnp, "##fileformat=VCFv4.2").unwrap();
        writeln!(dbsnp, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO").unwrap();
        writeln!(dbsnp, "1\t100\trs1\tA\tT\t.\t.\tCAF=0.6,0.4").unwrap();

        let annotators = Annotators {
            dbsnp: Some(
                KnownVariantAnnotator::load(
                    dbsnp.path(),
                    KnownFilterConfig {
                        max_freq: Some(0.01),
                        ..Default::default()
                    },
                )
                .unwrap(),
            ),
            cadd: None,
        };

        let mut reader = VcfReader::new(vcf.path()).unwrap();
        let batch: Vec<_> = reader.records().collect::<MendelResult<_>>().unwrap();
        let results = process_batch(batch, &relations, &gate, &annotators, 1).unwrap();

        // common variant annotated and dropped, never phased
        assert!(results[0].2);
        assert_eq!(results[0].1, PhaseOutcome::default());
        assert_eq!(results[0].0.samples[0], "0/1");
        assert_eq!(results[0].0.id, "rs1");

        // unknown variant untouched by the reference, phased as usual
        assert!(!results[1].2);
        assert_eq!(results[1].1.violations, vec!["child".to_string()]);
    }

    #[test]
    fn test_thresholds_require_reference_files() {
        let base = [
            "mendel", "--input-vcf", "in.vcf", "--ped", "trio.ped", "--output", "out.vcf",
        ];

        let mut with_freq: Vec<&str> = base.to_vec();
        with_freq.extend(["--max-freq", "0.01"]);
        let args = Args::parse_from(with_freq);
        assert!(matches!(
            build_annotators(&args),
            Err(MendelError::InvalidConfig(_))
        ));

        let mut with_cadd: Vec<&str> = base.to_vec();
        with_cadd.extend(["--min-cadd-phred", "10"]);
        let args = Args::parse_from(with_cadd);
        assert!(matches!(
            build_annotators(&args),
            Err(MendelError::InvalidConfig(_))
        ));
    }
}
