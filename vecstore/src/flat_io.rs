use std::io::{BufReader, BufWriter, Read, Write};

use crate::error::VecError;
use crate::flat::FlatIndex;

const FLAT_MAGIC: [u8; 4] = [b'F', b'L', b'A', b'T'];
const FLAT_VERSION: u32 = 1;

/// Save serializes a flat index to a writer.
///
/// ```text
/// [4B magic "FLAT"] [4B version=1]
/// [4B dim] [8B count]
/// [count x dim x 4B float32 vectors]
/// ```
///
/// All multi-byte values are little-endian.
pub fn save(idx: &FlatIndex, w: &mut dyn Write) -> Result<(), VecError> {
    let mut bw = BufWriter::new(w);
    let write_err = |e: std::io::Error| VecError::Io(e.to_string());

    bw.write_all(&FLAT_MAGIC).map_err(write_err)?;
    bw.write_all(&FLAT_VERSION.to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(idx.dim() as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(idx.len() as u64).to_le_bytes()).map_err(write_err)?;

    for &v in idx.raw() {
        bw.write_all(&v.to_le_bytes()).map_err(write_err)?;
    }

    bw.flush().map_err(write_err)?;
    Ok(())
}

/// Load deserializes a flat index from a reader.
///
/// The stream must hold exactly what [`save`] produced; trailing bytes are
/// rejected so that a truncated or concatenated file is not silently
/// accepted.
pub fn load(r: &mut dyn Read) -> Result<FlatIndex, VecError> {
    let mut br = BufReader::new(r);
    let read_err = |e: std::io::Error| VecError::Io(e.to_string());

    let mut buf4 = [0u8; 4];
    br.read_exact(&mut buf4).map_err(read_err)?;
    if buf4 != FLAT_MAGIC {
        return Err(VecError::InvalidFormat(format!("invalid magic {:?}", buf4)));
    }

    br.read_exact(&mut buf4).map_err(read_err)?;
    let version = u32::from_le_bytes(buf4);
    if version != FLAT_VERSION {
        return Err(VecError::InvalidFormat(format!(
            "unsupported version {version} (want {FLAT_VERSION})"
        )));
    }

    br.read_exact(&mut buf4).map_err(read_err)?;
    let dim = u32::from_le_bytes(buf4) as usize;
    if dim == 0 {
        return Err(VecError::InvalidFormat("invalid dimension 0".into()));
    }

    let mut buf8 = [0u8; 8];
    br.read_exact(&mut buf8).map_err(read_err)?;
    let count = u64::from_le_bytes(buf8) as usize;

    let total = count
        .checked_mul(dim)
        .ok_or_else(|| VecError::InvalidFormat(format!("count {count} overflows")))?;
    let mut data = Vec::with_capacity(total.min(1 << 24));
    for _ in 0..total {
        br.read_exact(&mut buf4).map_err(read_err)?;
        data.push(f32::from_le_bytes(buf4));
    }

    let mut probe = [0u8; 1];
    match br.read(&mut probe).map_err(read_err)? {
        0 => {}
        _ => return Err(VecError::InvalidFormat("trailing bytes after vectors".into())),
    }

    Ok(FlatIndex::from_raw(dim, data))
}
