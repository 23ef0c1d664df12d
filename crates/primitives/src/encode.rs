//! Canonical, versioned byte encoding used for persisted snapshots and
//! content digests.

use crate::error::{Error, Result};
use crate::field::{fr_from_be32, fr_to_be32, Fr};

/// Version tag for canonical encodings.
pub const ENC_V1: u8 = 1;

pub fn encode_u8(v: u8, out: &mut Vec<u8>) { out.push(v); }
pub fn encode_u32(v: u32, out: &mut Vec<u8>) { out.extend_from_slice(&v.to_be_bytes()); }
pub fn encode_u64(v: u64, out: &mut Vec<u8>) { out.extend_from_slice(&v.to_be_bytes()); }
pub fn encode_fr(v: &Fr, out: &mut Vec<u8>) { out.extend_from_slice(&fr_to_be32(v)); }

pub fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    encode_u32(bytes.len() as u32, out);
    out.extend_from_slice(bytes);
}

/// Length-prefixed list of field elements.
pub fn encode_vec_fr<'a, I>(items: I, out: &mut Vec<u8>)
where
    I: ExactSizeIterator<Item = &'a Fr>,
{
    encode_u32(items.len() as u32, out);
    for f in items { encode_fr(f, out); }
}

pub fn read_u8(data: &mut &[u8]) -> Result<u8> {
    let [v] = read_fixed::<1>(data)?;
    Ok(v)
}

pub fn read_u32(data: &mut &[u8]) -> Result<u32> { Ok(u32::from_be_bytes(read_fixed::<4>(data)?)) }

pub fn read_u64(data: &mut &[u8]) -> Result<u64> { Ok(u64::from_be_bytes(read_fixed::<8>(data)?)) }

pub fn read_fr(data: &mut &[u8]) -> Result<Fr> { fr_from_be32(&read_fixed::<32>(data)?) }

pub fn read_vec(data: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_u32(data)? as usize;
    if data.len() < len { return Err(Error::UnexpectedEof); }
    let v = data[..len].to_vec();
    *data = &data[len..];
    Ok(v)
}

pub fn read_vec_fr(data: &mut &[u8]) -> Result<Vec<Fr>> {
    let len = read_u32(data)? as usize;
    if data.len() < len.saturating_mul(32) { return Err(Error::UnexpectedEof); }
    let mut v = Vec::with_capacity(len);
    for _ in 0..len { v.push(read_fr(data)?); }
    Ok(v)
}

pub fn read_fixed<const N: usize>(data: &mut &[u8]) -> Result<[u8; N]> {
    if data.len() < N { return Err(Error::UnexpectedEof); }
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    *data = &data[N..];
    Ok(out)
}

/// Read and check the leading version byte.
pub fn read_version(data: &mut &[u8]) -> Result<()> {
    match read_u8(data)? {
        ENC_V1 => Ok(()),
        other => Err(Error::UnsupportedVersion(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_list_decodes_in_order() {
        let items = [Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        let mut out = Vec::new();
        encode_u8(ENC_V1, &mut out);
        encode_vec_fr(items.iter(), &mut out);
        encode_u64(42, &mut out);
        assert_eq!(out.len(), 1 + 4 + 3 * 32 + 8);

        let mut data = out.as_slice();
        read_version(&mut data).unwrap();
        assert_eq!(read_vec_fr(&mut data).unwrap(), items.to_vec());
        assert_eq!(read_u64(&mut data).unwrap(), 42);
        assert!(data.is_empty());
    }

    #[test]
    fn truncated_input_is_eof() {
        let mut out = Vec::new();
        encode_bytes(b"abcdef", &mut out);
        let mut data = &out[..out.len() - 1];
        assert_eq!(read_vec(&mut data), Err(Error::UnexpectedEof));
        let mut claims_huge = &[0xff, 0xff, 0xff, 0xff][..];
        assert_eq!(read_vec_fr(&mut claims_huge), Err(Error::UnexpectedEof));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut data = &[9u8][..];
        assert_eq!(read_version(&mut data), Err(Error::UnsupportedVersion(9)));
    }
}
