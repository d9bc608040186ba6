use crate::error::{StoreError, StoreResult};
use crate::types::{ResourceLocation, Row};

const ROW_V1: u8 = 1;
const LOCATION_V1: u8 = 1;

/// Encode a record to a stable on-disk format.
///
/// Format v1:
/// [0]      u8  version = 1
/// [1..5]   u32 field count LE
/// then per field, in key order:
///          u32 key len LE, key bytes, u32 value len LE, value bytes
pub fn encode_row(row: &Row) -> Vec<u8> {
    let body: usize = row.iter().map(|(k, v)| 8 + k.len() + v.len()).sum();
    let mut out = Vec::with_capacity(5 + body);
    out.push(ROW_V1);
    out.extend_from_slice(&(row.len() as u32).to_le_bytes());
    for (k, v) in row {
        put_str(&mut out, k);
        put_str(&mut out, v);
    }
    out
}

pub fn decode_row(bytes: &[u8]) -> StoreResult<Row> {
    let mut r = Reader::new(bytes, "row");
    match r.u8()? {
        ROW_V1 => {}
        v => return Err(StoreError::codec("row", format!("unknown version {v}"))),
    }
    let count = r.u32()?;
    let mut row = Row::new();
    for _ in 0..count {
        let k = r.str()?;
        let v = r.str()?;
        row.insert(k, v);
    }
    r.finish()?;
    Ok(row)
}

/// Format v1: [0] version, [1..9] u64 local id LE, [9..] collection UTF-8.
pub fn encode_location(location: &ResourceLocation) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + location.collection().len());
    out.push(LOCATION_V1);
    out.extend_from_slice(&location.local_id().to_le_bytes());
    out.extend_from_slice(location.collection().as_bytes());
    out
}

pub fn decode_location(bytes: &[u8]) -> StoreResult<ResourceLocation> {
    let mut r = Reader::new(bytes, "location");
    match r.u8()? {
        LOCATION_V1 => {}
        v => return Err(StoreError::codec("location", format!("unknown version {v}"))),
    }
    let local_id = r.u64()?;
    let collection = std::str::from_utf8(r.rest())
        .map_err(|e| StoreError::codec("location", e.to_string()))?;
    Ok(ResourceLocation::new(collection, local_id))
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len());
        let Some(end) = end else {
            return Err(StoreError::codec(
                self.what,
                format!("truncated at byte {} ({} bytes total)", self.pos, self.bytes.len()),
            ));
        };
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(arr))
    }

    fn u64(&mut self) -> StoreResult<u64> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(arr))
    }

    fn str(&mut self) -> StoreResult<String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| StoreError::codec(self.what, e.to_string()))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        out
    }

    fn finish(&self) -> StoreResult<()> {
        if self.pos != self.bytes.len() {
            return Err(StoreError::codec(
                self.what,
                format!("{} trailing bytes", self.bytes.len() - self.pos),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_keeps_empty_values() {
        let mut row = Row::new();
        row.insert("uuid".into(), String::new());
        row.insert("title".into(), "Hello".into());
        let back = decode_row(&encode_row(&row)).unwrap();
        assert_eq!(back, row);
        assert_eq!(back["uuid"], "");
    }

    #[test]
    fn truncated_row_is_reported() {
        let mut row = Row::new();
        row.insert("uuid".into(), "x".repeat(36));
        let blob = encode_row(&row);
        let err = decode_row(&blob[..blob.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        assert!(decode_row(&[9, 0, 0, 0, 0]).is_err());
        assert!(decode_location(&[2, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(decode_location(&[]).is_err());
    }

    #[test]
    fn location_layout() {
        let loc = ResourceLocation::new("pages", 42);
        let blob = encode_location(&loc);
        assert_eq!(blob[0], 1);
        assert_eq!(&blob[1..9], &42u64.to_le_bytes());
        assert_eq!(&blob[9..], b"pages");
        assert_eq!(decode_location(&blob).unwrap(), loc);
    }
}
