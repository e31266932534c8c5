//! Plain FASTA input and output.
//!
//! Sequence data arrives already encoded as nucleotide codes, so a record
//! here is just a name plus a coded sequence. Names are the first
//! whitespace-separated token of the `>` header; the rest of the header
//! line is dropped. Sequences may span any number of lines.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use culpa::{throw, throws};
use thiserror::Error;

use crate::nuc::{self, Nuc};

/// Errors when reading a FASTA file.
#[derive(Error, Debug)]
pub enum FastaError {
    #[error("error reading the sequence file")]
    Io(#[from] io::Error),
    #[error("line {line}: sequence data before the first '>' header. Only plain FASTA is understood.")]
    MissingHeader { line: usize },
}
type Error = FastaError; // do it this way for better docs

/// Read every record of a FASTA file.
#[throws]
pub fn read_file(path: impl AsRef<Path>) -> Vec<(String, Vec<Nuc>)> {
    read(BufReader::new(File::open(path)?))?
}

/// Read every record from any buffered reader.
#[throws]
pub fn read<R: BufRead>(reader: R) -> Vec<(String, Vec<Nuc>)> {
    let mut records: Vec<(String, Vec<Nuc>)> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            let name = header.split_whitespace().next().unwrap_or("").to_string();
            records.push((name, Vec::new()));
        } else {
            match records.last_mut() {
                Some((_, seq)) => seq.extend(line.bytes().map(nuc::encode)),
                None => throw!(Error::MissingHeader { line: index + 1 }),
            }
        }
    }
    records
}

/// Write records back out, one sequence line per record.
#[throws(io::Error)]
pub fn write<W: Write>(writer: &mut W, records: &[(String, Vec<Nuc>)]) {
    for (name, seq) in records {
        writeln!(writer, ">{}", name)?;
        let bases: String = seq.iter().map(|&n| nuc::decode(n)).collect();
        writeln!(writer, "{}", bases)?;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nuc::encode_seq;
    use std::io::Cursor;

    #[test]
    fn multi_record_multi_line() {
        let input = b">contig_1 some description\nACGT\nacgt\n\n>contig_2\nNNAC\n";
        let records = read(Cursor::new(&input[..])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "contig_1");
        assert_eq!(records[0].1, encode_seq(b"ACGTACGT"));
        assert_eq!(records[1], ("contig_2".to_string(), encode_seq(b"NNAC")));
    }

    #[test]
    fn headerless_data_is_refused() {
        let err = read(Cursor::new(&b"ACGT\n"[..])).unwrap_err();
        assert!(matches!(err, FastaError::MissingHeader { line: 1 }));
    }

    #[test]
    fn roundtrip() {
        let records = vec![
            ("a".to_string(), encode_seq(b"ACGTN")),
            ("b".to_string(), encode_seq(b"TTTT")),
        ];
        let mut buf = Vec::new();
        write(&mut buf, &records).unwrap();
        assert_eq!(read(Cursor::new(buf)).unwrap(), records);
    }
}
