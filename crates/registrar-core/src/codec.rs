//! Binary record format for registration data
//!
//! Layout: an i32 binding count, then per binding the NUL-terminated id,
//! contact URI and Call-ID, the i32 CSeq, expiry and priority, an i32
//! parameter count with NUL-terminated name/value pairs, and an i32 path
//! count with NUL-terminated path values.
//!
//! Integers are written in the byte order of the writing host. Writers and
//! readers share a deployment, which is the only reason this is acceptable;
//! all integer access is funneled through two helpers so a move to a tagged
//! little-endian format touches nothing else.
//!
//! The decoder accepts exactly what the encoder produces and refuses
//! truncated input at every cut point.

use bytes::{BufMut, Bytes, BytesMut};

use crate::aor::AoR;
use crate::error::{RegistrarError, Result};

fn put_i32(buf: &mut BytesMut, value: i32) {
    buf.put_i32_ne(value);
}

fn put_cstr(buf: &mut BytesMut, value: &str) {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

/// Serializes an AoR's bindings. The CAS token is not part of the record;
/// it travels in the store's metadata.
pub fn serialize_aor(aor: &AoR) -> Bytes {
    let mut buf = BytesMut::new();

    put_i32(&mut buf, aor.len() as i32);
    for (id, binding) in aor.bindings() {
        put_cstr(&mut buf, id);
        put_cstr(&mut buf, &binding.uri);
        put_cstr(&mut buf, &binding.cid);
        put_i32(&mut buf, binding.cseq);
        put_i32(&mut buf, binding.expires);
        put_i32(&mut buf, binding.priority);

        put_i32(&mut buf, binding.params.len() as i32);
        for (name, value) in &binding.params {
            put_cstr(&mut buf, name);
            put_cstr(&mut buf, value);
        }

        put_i32(&mut buf, binding.path_headers.len() as i32);
        for path in &binding.path_headers {
            put_cstr(&mut buf, path);
        }
    }

    buf.freeze()
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn read_i32(&mut self) -> Result<i32> {
        let end = self.pos + 4;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| RegistrarError::Corrupt("record truncated in integer field".into()))?;
        self.pos = end;
        let array: [u8; 4] = slice
            .try_into()
            .map_err(|_| RegistrarError::Corrupt("record truncated in integer field".into()))?;
        Ok(i32::from_ne_bytes(array))
    }

    fn read_cstr(&mut self) -> Result<String> {
        let rest = self
            .data
            .get(self.pos..)
            .ok_or_else(|| RegistrarError::Corrupt("record truncated in string field".into()))?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| RegistrarError::Corrupt("unterminated string field".into()))?;
        let value = String::from_utf8(rest[..nul].to_vec())
            .map_err(|_| RegistrarError::Corrupt("string field is not UTF-8".into()))?;
        self.pos += nul + 1;
        Ok(value)
    }

    fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count)
            .map_err(|_| RegistrarError::Corrupt(format!("negative {what} count")))
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Deserializes a record produced by [`serialize_aor`]. The returned AoR
/// carries CAS 0; the caller stamps the token from the store read.
pub fn deserialize_aor(data: &[u8]) -> Result<AoR> {
    let mut reader = Reader::new(data);
    let mut aor = AoR::new();

    let num_bindings = reader.read_count("binding")?;
    for _ in 0..num_bindings {
        let binding_id = reader.read_cstr()?;
        let binding = aor.get_binding(&binding_id);

        binding.uri = reader.read_cstr()?;
        binding.cid = reader.read_cstr()?;
        binding.cseq = reader.read_i32()?;
        binding.expires = reader.read_i32()?;
        binding.priority = reader.read_i32()?;

        let num_params = reader.read_count("parameter")?;
        for _ in 0..num_params {
            let name = reader.read_cstr()?;
            let value = reader.read_cstr()?;
            binding.params.push((name, value));
        }

        let num_paths = reader.read_count("path")?;
        for _ in 0..num_paths {
            let path = reader.read_cstr()?;
            binding.path_headers.push(path);
        }
    }

    if !reader.at_end() {
        return Err(RegistrarError::Corrupt("trailing bytes after last binding".into()));
    }

    Ok(aor)
}
