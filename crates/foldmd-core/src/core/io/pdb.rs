use crate::core::io::traits::MolecularFile;
use crate::core::models::atom::{Atom, infer_element, normalize_element};
use crate::core::models::chain::ChainType;
use crate::core::models::ids::AtomId;
use crate::core::models::periodic::PeriodicBox;
use crate::core::models::system::MolecularSystem;
use crate::core::models::topology::BondOrder;
use crate::core::topology::templates::{chain_type_for, classify_residue};
use nalgebra::Point3;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbMetadata {
    /// HEADER/TITLE/REMARK/COMPND lines, copied verbatim on output.
    pub header_lines: Vec<String>,
    /// Residue names declared by SEQRES records, per chain.
    pub seqres: BTreeMap<char, Vec<String>>,
}

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
    #[error("Missing required record: {0}")]
    MissingRecord(String),
    #[error("Value {value} does not fit the {width}-column {field} field")]
    Overflow {
        field: &'static str,
        width: usize,
        value: i64,
    },
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: String },
    #[error("Line is too short for an ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
    #[error("CONECT line references unknown atom serial {0}")]
    UnknownConectSerial(usize),
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn char_at(line: &str, col: usize) -> Option<char> {
    line.get(col..col + 1)
        .and_then(|s| s.chars().next())
        .filter(|c| !c.is_whitespace())
}

const HY36_UPPER: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const HY36_LOWER: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut value: u64, width: usize, digits: &[u8; 36]) -> String {
    let mut out = vec![b'0'; width];
    for slot in out.iter_mut().rev() {
        *slot = digits[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encodes a non-negative integer in the hybrid-36 scheme used for PDB fields that
/// overflow their decimal width (atom serials above 99999, residue numbers above 9999).
pub(crate) fn encode_hybrid36(width: usize, value: i64) -> Option<String> {
    let decimal_limit = 10_i64.pow(width as u32);
    if value < decimal_limit {
        let min = -(10_i64.pow(width as u32 - 1)) + 1;
        return (value >= min).then(|| format!("{:>width$}", value, width = width));
    }
    let span = 26 * 36_i64.pow(width as u32 - 1);
    let offset = 10 * 36_i64.pow(width as u32 - 1);
    let v = value - decimal_limit;
    if v < span {
        return Some(base36((v + offset) as u64, width, HY36_UPPER));
    }
    let v = v - span;
    if v < span {
        return Some(base36((v + offset) as u64, width, HY36_LOWER));
    }
    None
}

/// Decodes a hybrid-36 field; plain decimal fields decode as usual.
pub(crate) fn decode_hybrid36(field: &str) -> Option<i64> {
    let s = field.trim();
    let first = s.chars().next()?;
    if first.is_ascii_digit() || first == '-' {
        return s.parse().ok();
    }
    let width = s.len() as u32;
    let digits = if first.is_ascii_uppercase() {
        HY36_UPPER
    } else if first.is_ascii_lowercase() {
        HY36_LOWER
    } else {
        return None;
    };
    let mut value: i64 = 0;
    for b in s.bytes() {
        let d = digits.iter().position(|&x| x == b)? as i64;
        value = value * 36 + d;
    }
    let span = 26 * 36_i64.pow(width - 1);
    let offset = 10 * 36_i64.pow(width - 1);
    let decimal_limit = 10_i64.pow(width);
    if first.is_ascii_uppercase() {
        Some(value - offset + decimal_limit)
    } else {
        Some(value - offset + decimal_limit + span)
    }
}

struct AtomRecord {
    serial: Option<usize>,
    name: String,
    residue_name: String,
    chain_id: char,
    residue_number: isize,
    insertion_code: Option<char>,
    position: Point3<f64>,
    element: String,
}

fn parse_float(line: &str, start: usize, end: usize, line_num: usize) -> Result<f64, PdbError> {
    let s = slice_and_trim(line, start, end);
    s.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: s.into(),
        },
    })
}

fn parse_atom_record(line: &str, line_num: usize) -> Result<AtomRecord, PdbError> {
    if line.len() < 54 {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::LineTooShort,
        });
    }

    let name = slice_and_trim(line, 12, 16);
    if name.is_empty() {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::MissingRequiredField {
                columns: "13-16".into(),
            },
        });
    }
    let residue_name = slice_and_trim(line, 17, 21);
    let serial_str = slice_and_trim(line, 6, 11);
    let serial = decode_hybrid36(serial_str).and_then(|v| usize::try_from(v).ok());

    let res_seq_str = slice_and_trim(line, 22, 26);
    let residue_number = decode_hybrid36(res_seq_str).ok_or_else(|| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns: "23-26".into(),
            value: res_seq_str.into(),
        },
    })? as isize;

    let x = parse_float(line, 30, 38, line_num)?;
    let y = parse_float(line, 38, 46, line_num)?;
    let z = parse_float(line, 46, 54, line_num)?;

    let element_field = slice_and_trim(line, 76, 78);
    let element = if element_field.is_empty() {
        infer_element(name, residue_name)
    } else {
        normalize_element(element_field)
    };

    Ok(AtomRecord {
        serial,
        name: name.to_string(),
        residue_name: residue_name.to_string(),
        chain_id: char_at(line, 21).unwrap_or(' '),
        residue_number,
        insertion_code: char_at(line, 26),
        position: Point3::new(x, y, z),
        element,
    })
}

fn parse_cryst1(line: &str, line_num: usize) -> Result<PeriodicBox, PdbError> {
    let a = parse_float(line, 6, 15, line_num)?;
    let b = parse_float(line, 15, 24, line_num)?;
    let c = parse_float(line, 24, 33, line_num)?;
    for (start, end) in [(33, 40), (40, 47), (47, 54)] {
        if line.len() >= end {
            let angle = parse_float(line, start, end, line_num)?;
            if (angle - 90.0).abs() > 1e-3 {
                return Err(PdbError::Inconsistency(format!(
                    "CRYST1 on line {} describes a triclinic cell (angle {:.2}); only orthorhombic cells are supported",
                    line_num, angle
                )));
            }
        }
    }
    Ok(PeriodicBox::new(a, b, c))
}

/// Formats an atom name into the 4-column PDB name field. One-letter elements start
/// in column 14 unless the name already fills all four columns.
fn format_atom_name(name: &str, element: &str) -> String {
    if name.len() < 4 && element.len() == 1 {
        format!(" {:<3}", name)
    } else {
        format!("{:<4}", name)
    }
}

pub struct PdbFile;

impl PdbFile {
    /// Writes one MODEL block with the system's topology and the given positions.
    ///
    /// Used for multi-model trajectories; positions are in canonical order.
    pub fn write_model(
        system: &MolecularSystem,
        positions: &[Point3<f64>],
        model_number: usize,
        writer: &mut impl Write,
    ) -> Result<(), PdbError> {
        if let Some(cell) = system.periodic_box() {
            write_cryst1(cell, writer)?;
        }
        writeln!(writer, "MODEL     {:>4}", model_number)?;
        write_atom_records(system, positions, writer)?;
        writeln!(writer, "ENDMDL")?;
        Ok(())
    }
}

fn write_cryst1(cell: &PeriodicBox, writer: &mut impl Write) -> io::Result<()> {
    writeln!(
        writer,
        "CRYST1{:>9.3}{:>9.3}{:>9.3}{:>7.2}{:>7.2}{:>7.2} P 1           1",
        cell.lengths.x, cell.lengths.y, cell.lengths.z, 90.0, 90.0, 90.0
    )
}

/// Writes ATOM/HETATM and TER records; returns the serial assigned to each atom.
fn write_atom_records(
    system: &MolecularSystem,
    positions: &[Point3<f64>],
    writer: &mut impl Write,
) -> Result<HashMap<AtomId, i64>, PdbError> {
    if positions.len() != system.atom_count() {
        return Err(PdbError::Inconsistency(format!(
            "{} positions supplied for {} atoms",
            positions.len(),
            system.atom_count()
        )));
    }

    let mut serials = HashMap::with_capacity(system.atom_count());
    let mut serial: i64 = 1;
    let mut index = 0;

    for (_, chain) in system.chains_iter() {
        let mut last_residue = None;
        for &residue_id in chain.residues() {
            let Some(residue) = system.residue(residue_id) else {
                continue;
            };
            let record = if residue.category.is_hetero_record() {
                "HETATM"
            } else {
                "ATOM"
            };
            let res_seq =
                encode_hybrid36(4, residue.residue_number as i64).ok_or(PdbError::Overflow {
                    field: "residue number",
                    width: 4,
                    value: residue.residue_number as i64,
                })?;
            for &atom_id in residue.atoms() {
                let atom = system.atom(atom_id).ok_or_else(|| {
                    PdbError::Inconsistency(format!(
                        "Residue {} references a missing atom",
                        residue.name
                    ))
                })?;
                let position = positions[index];
                index += 1;
                let serial_field = encode_hybrid36(5, serial).ok_or(PdbError::Overflow {
                    field: "atom serial",
                    width: 5,
                    value: serial,
                })?;
                writeln!(
                    writer,
                    "{:<6}{:>5} {}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}  ",
                    record,
                    serial_field,
                    format_atom_name(&atom.name, &atom.element),
                    ' ',
                    residue.name,
                    chain.id,
                    res_seq,
                    residue.insertion_code.unwrap_or(' '),
                    position.x,
                    position.y,
                    position.z,
                    1.0,
                    0.0,
                    atom.element.to_ascii_uppercase(),
                )?;
                serials.insert(atom_id, serial);
                serial += 1;
            }
            last_residue = Some((residue.name.clone(), res_seq, residue.insertion_code));
        }
        if chain.chain_type == ChainType::Protein || chain.chain_type == ChainType::NucleicAcid {
            if let Some((name, res_seq, icode)) = last_residue {
                let serial_field = encode_hybrid36(5, serial).unwrap_or_else(|| "*****".into());
                writeln!(
                    writer,
                    "TER   {:>5}      {:>3} {}{:>4}{}",
                    serial_field,
                    name,
                    chain.id,
                    res_seq,
                    icode.unwrap_or(' ')
                )?;
                serial += 1;
            }
        }
    }
    Ok(serials)
}

impl MolecularFile for PdbFile {
    type Metadata = PdbMetadata;
    type Error = PdbError;

    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularSystem, Self::Metadata), Self::Error> {
        let mut metadata = PdbMetadata::default();
        let mut records: Vec<AtomRecord> = Vec::new();
        let mut conect: Vec<(usize, usize)> = Vec::new();
        let mut cell = None;
        let mut seen_altlocs: HashMap<(char, isize, Option<char>, String), char> = HashMap::new();

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let record_type = slice_and_trim(&line, 0, 6);

            match record_type {
                "ATOM" | "HETATM" => {
                    let record = parse_atom_record(&line, line_num)?;
                    if let Some(alt) = char_at(&line, 16) {
                        let key = (
                            record.chain_id,
                            record.residue_number,
                            record.insertion_code,
                            record.name.clone(),
                        );
                        let first = *seen_altlocs.entry(key).or_insert(alt);
                        if first != alt {
                            continue;
                        }
                    }
                    records.push(record);
                }
                "CONECT" => {
                    let origin = decode_hybrid36(slice_and_trim(&line, 6, 11));
                    let Some(origin) = origin.and_then(|v| usize::try_from(v).ok()) else {
                        continue;
                    };
                    for start in [11, 16, 21, 26] {
                        let field = slice_and_trim(&line, start, start + 5);
                        if field.is_empty() {
                            continue;
                        }
                        if let Some(partner) =
                            decode_hybrid36(field).and_then(|v| usize::try_from(v).ok())
                        {
                            conect.push((origin.min(partner), origin.max(partner)));
                        }
                    }
                }
                "CRYST1" => cell = Some(parse_cryst1(&line, line_num)?),
                "SEQRES" => {
                    let chain = char_at(&line, 11).unwrap_or(' ');
                    let names = line
                        .get(19..)
                        .unwrap_or("")
                        .split_whitespace()
                        .map(str::to_string);
                    metadata.seqres.entry(chain).or_default().extend(names);
                }
                "HEADER" | "TITLE" | "COMPND" | "REMARK" | "SOURCE" | "KEYWDS" | "EXPDTA"
                | "AUTHOR" => metadata.header_lines.push(line.clone()),
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }

        if records.is_empty() {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }

        let mut residue_sizes: HashMap<(char, isize, Option<char>), usize> = HashMap::new();
        for r in &records {
            *residue_sizes
                .entry((r.chain_id, r.residue_number, r.insertion_code))
                .or_default() += 1;
        }

        let mut system = MolecularSystem::new();
        system.set_periodic_box(cell);
        let mut serial_map: HashMap<usize, AtomId> = HashMap::new();

        for r in records {
            let size = residue_sizes[&(r.chain_id, r.residue_number, r.insertion_code)];
            let category = classify_residue(&r.residue_name, size);
            let chain_id = system.add_chain(r.chain_id, chain_type_for(category, &r.residue_name));
            let residue_id = system
                .add_residue(
                    chain_id,
                    r.residue_number,
                    r.insertion_code,
                    &r.residue_name,
                    category,
                )
                .ok_or_else(|| PdbError::Inconsistency("Chain vanished while reading".into()))?;

            let mut atom = Atom::new(&r.name, &r.element, residue_id, r.position);
            if let Some(serial) = r.serial {
                atom = atom.with_serial(serial);
            }
            let atom_id = system
                .add_atom_to_residue(residue_id, atom)
                .ok_or_else(|| PdbError::Inconsistency("Residue vanished while reading".into()))?;
            if let Some(serial) = r.serial {
                if serial_map.insert(serial, atom_id).is_some() {
                    return Err(PdbError::Inconsistency(format!(
                        "Duplicate atom serial: {}",
                        serial
                    )));
                }
            }
        }

        conect.sort_unstable();
        conect.dedup();
        for (s1, s2) in conect {
            let a1 = *serial_map.get(&s1).ok_or(PdbError::Parse {
                line: 0,
                kind: PdbParseErrorKind::UnknownConectSerial(s1),
            })?;
            let a2 = *serial_map.get(&s2).ok_or(PdbError::Parse {
                line: 0,
                kind: PdbParseErrorKind::UnknownConectSerial(s2),
            })?;
            system.add_bond(a1, a2, BondOrder::Single);
        }

        Ok((system, metadata))
    }

    fn write_to(
        system: &MolecularSystem,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        for line in &metadata.header_lines {
            writeln!(writer, "{}", line)?;
        }
        if metadata.header_lines.is_empty() {
            writeln!(writer, "REMARK   1 CREATED WITH FOLDMD {}", env!("CARGO_PKG_VERSION"))?;
        }
        if let Some(cell) = system.periodic_box() {
            write_cryst1(cell, writer)?;
        }

        let serials = write_atom_records(system, &system.positions(), writer)?;

        let mut conect: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for bond in system.bonds() {
            let (Some(&s1), Some(&s2)) = (serials.get(&bond.atom1_id), serials.get(&bond.atom2_id))
            else {
                return Err(PdbError::Inconsistency(
                    "Bond references an atom that was not written".into(),
                ));
            };
            conect.entry(s1).or_default().push(s2);
            conect.entry(s2).or_default().push(s1);
        }
        for (origin, mut partners) in conect {
            partners.sort_unstable();
            let origin_field = encode_hybrid36(5, origin).unwrap_or_else(|| "*****".into());
            for chunk in partners.chunks(4) {
                write!(writer, "CONECT{:>5}", origin_field)?;
                for partner in chunk {
                    let field = encode_hybrid36(5, *partner).unwrap_or_else(|| "*****".into());
                    write!(writer, "{:>5}", field)?;
                }
                writeln!(writer)?;
            }
        }

        writeln!(writer, "END")?;
        Ok(())
    }
}
