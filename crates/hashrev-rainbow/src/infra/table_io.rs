//! Table file I/O operations
//!
//! This module provides functions for reading and writing chain table files.
//!
//! Record layout (little-endian):
//! `id u64 | chain_length u32 | variant u32 | selector i32 | min u32 | max u32`
//! followed by three length-prefixed (u16) UTF-8 strings:
//! `start_plaintext | end_hash | charset_range`.

use crate::constants::FILE_HEADER_SIZE;
use crate::domain::chain::Chain;
use crate::domain::charset::CharsetSelector;
use crate::domain::table_format::{TableFormatError, TableHeader};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Default table file name inside a table directory
pub const TABLE_FILE_NAME: &str = "chains.hrt";

/// Get the table file path inside a directory
pub fn get_table_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(TABLE_FILE_NAME)
}

/// Save chains to a table file
pub fn save_chains(path: impl AsRef<Path>, chains: &[Chain]) -> Result<(), TableFormatError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&TableHeader::new(chains.len() as u64).to_bytes())?;
    for (index, chain) in chains.iter().enumerate() {
        write_chain(&mut writer, chain, index as u64)?;
    }

    writer.flush()?;
    Ok(())
}

/// Load chains from a table file
pub fn load_chains(path: impl AsRef<Path>) -> Result<(TableHeader, Vec<Chain>), TableFormatError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut buf = [0u8; FILE_HEADER_SIZE];
    reader.read_exact(&mut buf)?;
    let header = TableHeader::from_bytes(&buf)?;

    let mut chains = Vec::with_capacity(header.chain_count.min(1 << 20) as usize);
    for index in 0..header.chain_count {
        match read_chain(&mut reader, index) {
            Ok(chain) => chains.push(chain),
            Err(TableFormatError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(TableFormatError::Truncated {
                    expected: header.chain_count,
                    found: index,
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok((header, chains))
}

fn write_chain<W: Write>(writer: &mut W, chain: &Chain, index: u64) -> Result<(), TableFormatError> {
    writer.write_u64::<LittleEndian>(chain.id)?;
    writer.write_u32::<LittleEndian>(chain.chain_length)?;
    writer.write_u32::<LittleEndian>(chain.reduction_variant)?;
    writer.write_i32::<LittleEndian>(chain.charset_selector.code())?;
    writer.write_u32::<LittleEndian>(length_field(chain.min_length, index)?)?;
    writer.write_u32::<LittleEndian>(length_field(chain.max_length, index)?)?;
    write_str(writer, &chain.start_plaintext, index)?;
    write_str(writer, &chain.end_hash, index)?;
    write_str(writer, &chain.charset_range, index)?;
    Ok(())
}

fn length_field(len: usize, index: u64) -> Result<u32, TableFormatError> {
    u32::try_from(len).map_err(|_| TableFormatError::LengthOutOfRange { index, len })
}

fn read_chain<R: Read>(reader: &mut R, index: u64) -> Result<Chain, TableFormatError> {
    let id = reader.read_u64::<LittleEndian>()?;
    let chain_length = reader.read_u32::<LittleEndian>()?;
    let reduction_variant = reader.read_u32::<LittleEndian>()?;
    let charset_selector = CharsetSelector::from_code(reader.read_i32::<LittleEndian>()?);
    let min_length = reader.read_u32::<LittleEndian>()? as usize;
    let max_length = reader.read_u32::<LittleEndian>()? as usize;
    let start_plaintext = read_str(reader, index)?;
    let end_hash = read_str(reader, index)?;
    let charset_range = read_str(reader, index)?;

    Ok(Chain {
        id,
        chain_length,
        start_plaintext,
        end_hash,
        reduction_variant,
        charset_selector,
        min_length,
        max_length,
        charset_range,
    })
}

fn write_str<W: Write>(writer: &mut W, value: &str, index: u64) -> Result<(), TableFormatError> {
    let len = u16::try_from(value.len()).map_err(|_| TableFormatError::FieldTooLong {
        index,
        len: value.len(),
    })?;
    writer.write_u16::<LittleEndian>(len)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_str<R: Read>(reader: &mut R, index: u64) -> Result<String, TableFormatError> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| TableFormatError::InvalidString { index })
}
