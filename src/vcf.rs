//! VCF file processing functionality

use crate::genotype::{parse_sample_call, FormatLayout, SampleCall};
use crate::utils::is_gzipped;
use crate::{MendelError, MendelResult};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// INFO key listing samples flagged as Mendelian violations
pub const INFO_VIOLATION: &str = "MV";
/// INFO key listing samples whose genotype was phased by transmission
pub const INFO_PHASED: &str = "PHS";

/// Header declarations for the two INFO fields this tool adds
pub fn annotation_header_lines() -> [&'static str; 2] {
    [
        "##INFO=<ID=MV,Number=.,Type=String,Description=\"Samples whose genotype violates Mendelian inheritance\">",
        "##INFO=<ID=PHS,Number=.,Type=String,Description=\"Samples whose genotype was phased by transmission\">",
    ]
}

/// A VCF record with per-sample genotype columns
#[derive(Debug, Clone)]
pub struct VcfRecord {
    pub chrom: String,
    pub pos: u32,
    pub id: String,
    pub ref_allele: String,
    pub alt_allele: String,
    pub qual: String,
    pub filter: String,
    pub info: String,
    pub format: Option<String>,
    pub samples: Vec<String>,
}

impl VcfRecord {
    pub fn from_line(line: &str) -> MendelResult<Self> {
        let fields: Vec<&str> = line.split('\t').collect();

        if fields.len() < 8 {
            return Err(MendelError::InvalidVariant(format!(
                "Invalid VCF line format - not enough columns: {}",
                line
            )));
        }

        let pos = fields[1].parse::<u32>().map_err(|_| {
            MendelError::InvalidVariant(format!("Invalid position: {}", fields[1]))
        })?;

        let format = fields.get(8).map(|f| f.to_string());
        let samples = if fields.len() > 9 {
            fields[9..].iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };

        Ok(VcfRecord {
            chrom: fields[0].to_string(),
            pos,
            id: fields[2].to_string(),
            ref_allele: fields[3].to_string(),
            alt_allele: fields[4].to_string(),
            qual: fields[5].to_string(),
            filter: fields[6].to_string(),
            info: fields[7].to_string(),
            format,
            samples,
        })
    }

    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.pos,
            self.id,
            self.ref_allele,
            self.alt_allele,
            self.qual,
            self.filter,
            self.info
        );

        if let Some(format) = &self.format {
            line.push('\t');
            line.push_str(format);

            for sample in &self.samples {
                line.push('\t');
                line.push_str(sample);
            }
        }

        line
    }

    /// Number of declared alternate alleles; allele indices above this are
    /// out of range for the record
    pub fn alt_allele_count(&self) -> u32 {
        if self.alt_allele == "." || self.alt_allele.is_empty() {
            0
        } else {
            self.alt_allele.split(',').count() as u32
        }
    }

    pub fn format_layout(&self) -> FormatLayout {
        self.format
            .as_deref()
            .map(FormatLayout::parse)
            .unwrap_or_default()
    }

    /// Parse one sample column; out-of-range indices parse as missing
    pub fn sample_call(&self, layout: &FormatLayout, idx: usize) -> MendelResult<SampleCall> {
        match self.samples.get(idx) {
            Some(sample) => parse_sample_call(layout, sample),
            None => Ok(SampleCall::missing()),
        }
    }

    /// Rewrite one sample's GT subfield as a phased `maternal|paternal` pair,
    /// leaving every other subfield untouched
    pub fn set_phased_genotype(
        &mut self,
        layout: &FormatLayout,
        idx: usize,
        maternal: u32,
        paternal: u32,
    ) {
        let gt_idx = match layout.gt {
            Some(gt_idx) => gt_idx,
            None => return,
        };
        if let Some(sample) = self.samples.get_mut(idx) {
            let mut subfields: Vec<String> = sample.split(':').map(|s| s.to_string()).collect();
            if gt_idx < subfields.len() {
                subfields[gt_idx] = format!("{}|{}", maternal, paternal);
                *sample = subfields.join(":");
            }
        }
    }

    /// Append `;KEY=value` to the INFO column, replacing a bare `.`
    pub fn push_info(&mut self, key: &str, value: &str) {
        if self.info == "." || self.info.is_empty() {
            self.info = format!("{}={}", key, value);
        } else {
            self.info = format!("{};{}={}", self.info, key, value);
        }
    }

    /// Value of an INFO key, if present (`None` for flag-style keys)
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info.split(';').find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// Merge an identifier into the ID column, replacing a bare `.`
    pub fn add_id(&mut self, id: &str) {
        if self.id == "." || self.id.is_empty() {
            self.id = id.to_string();
        } else if !self.id.split(';').any(|existing| existing == id) {
            self.id = format!("{};{}", self.id, id);
        }
    }
}

/// VCF file reader that handles both compressed and uncompressed files
pub struct VcfReader {
    reader: Box<dyn BufRead>,
    header_lines: Vec<String>,
    pending: Option<String>,
}

impl VcfReader {
    pub fn new<P: AsRef<Path>>(path: P) -> MendelResult<Self> {
        let file = File::open(&path)
            .map_err(|_| MendelError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

        let reader: Box<dyn BufRead> = if is_gzipped(&path)? {
            let gz_decoder = MultiGzDecoder::new(file);
            Box::new(BufReader::new(gz_decoder))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut reader = VcfReader {
            reader,
            header_lines: Vec::new(),
            pending: None,
        };
        reader.read_header()?;
        Ok(reader)
    }

    fn read_header(&mut self) -> MendelResult<()> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line)? {
                0 => break, // EOF
                _ => {
                    let trimmed = line.trim_end();
                    if trimmed.starts_with('#') {
                        self.header_lines.push(trimmed.to_string());
                    } else {
                        // First data line; hand it to the record iterator
                        if !trimmed.is_empty() {
                            self.pending = Some(trimmed.to_string());
                        }
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    pub fn header_lines(&self) -> &[String] {
        &self.header_lines
    }

    /// Sample names from the `#CHROM` header line (columns after FORMAT)
    pub fn sample_names(&self) -> MendelResult<Vec<String>> {
        let header = self
            .header_lines
            .iter()
            .find(|l| l.starts_with("#CHROM"))
            .ok_or_else(|| {
                MendelError::InvalidVariant("#CHROM header line not found in VCF".to_string())
            })?;

        let columns: Vec<&str> = header.split('\t').collect();
        let samples = match columns.iter().position(|&c| c == "FORMAT") {
            Some(format_idx) => columns[format_idx + 1..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            None => Vec::new(),
        };

        Ok(samples)
    }

    pub fn records(&mut self) -> VcfRecordIterator {
        VcfRecordIterator { reader: self }
    }
}

/// Iterator over VCF records
pub struct VcfRecordIterator<'a> {
    reader: &'a mut VcfReader,
}

impl<'a> Iterator for VcfRecordIterator<'a> {
    type Item = MendelResult<VcfRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.reader.pending.take() {
            return Some(VcfRecord::from_line(&line));
        }

        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    let line = line.trim_end();
                    if line.starts_with('#') || line.is_empty() {
                        continue;
                    }

                    return Some(VcfRecord::from_line(line));
                }
                Err(e) => return Some(Err(MendelError::Io(e))),
            }
        }
    }
}

/// VCF writer that injects this tool's INFO declarations into the header
pub struct VcfWriter {
    writer: BufWriter<File>,
}

impl VcfWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> MendelResult<Self> {
        let file = File::create(path)?;
        Ok(VcfWriter {
            writer: BufWriter::new(file),
        })
    }

    /// Write header lines, inserting the MV/PHS declarations plus any
    /// extra INFO declarations immediately before the `#CHROM` line
    pub fn write_header(&mut self, header_lines: &[String], extra_info: &[String]) -> MendelResult<()> {
        for line in header_lines {
            if line.starts_with("#CHROM") {
                for declaration in annotation_header_lines() {
                    writeln!(self.writer, "{}", declaration)?;
                }
                for declaration in extra_info {
                    writeln!(self.writer, "{}", declaration)?;
                }
            }
            writeln!(self.writer, "{}", line)?;
        }
        Ok(())
    }

    pub fn write_record(&mut self, record: &VcfRecord) -> MendelResult<()> {
        writeln!(self.writer, "{}", record.to_line())?;
        Ok(())
    }

    pub fn flush(&mut self) -> MendelResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
