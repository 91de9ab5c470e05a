use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Seek, SeekFrom, Write};

/// Magic identifying a SieveKV table file ("VSST").
pub const TABLE_MAGIC: u32 = 0x5653_5354;

/// Footer size: max_seq (8) + bloom_offset (8) + index_offset (8) + magic (4).
pub const FOOTER_BYTES: u64 = 28;

/// Parsed table footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Highest sequence number stored in the data section.
    pub max_seq: u64,
    /// Byte offset where the bloom section starts.
    pub bloom_offset: u64,
    /// Byte offset where the index section starts.
    pub index_offset: u64,
}

/// Returns the position where the footer starts (filesize - FOOTER_BYTES).
pub fn footer_pos(filesize: u64) -> u64 {
    filesize.saturating_sub(FOOTER_BYTES)
}

/// Writes the footer at the writer's current position.
pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> IoResult<()> {
    w.write_u64::<LittleEndian>(footer.max_seq)?;
    w.write_u64::<LittleEndian>(footer.bloom_offset)?;
    w.write_u64::<LittleEndian>(footer.index_offset)?;
    w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
    Ok(())
}

/// Seeks to the end of `r` and reads back the footer and the magic.
pub fn read_footer<R: Read + Seek>(r: &mut R) -> IoResult<(Footer, u32)> {
    let filesize = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(footer_pos(filesize)))?;
    let max_seq = r.read_u64::<LittleEndian>()?;
    let bloom_offset = r.read_u64::<LittleEndian>()?;
    let index_offset = r.read_u64::<LittleEndian>()?;
    let magic = r.read_u32::<LittleEndian>()?;
    Ok((
        Footer {
            max_seq,
            bloom_offset,
            index_offset,
        },
        magic,
    ))
}
