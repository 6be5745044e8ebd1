use crate::CodecError;

/// Cursor over a received buffer with bounds-checked reads.
///
/// Every read reports the failing offset so decode errors point at the
/// exact spot in the datagram. Endianness is explicit per call: the RTP
/// header legacy fields are big-endian while everything that follows is
/// little-endian, so a buffer-wide mode would invite mistakes.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize, reason: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Malformed {
                offset: self.pos,
                reason,
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn get_u8(&mut self, reason: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, reason)?[0])
    }

    pub fn get_u16_be(&mut self, reason: &'static str) -> Result<u16, CodecError> {
        let bytes = self.take(2, reason)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_u16_le(&mut self, reason: &'static str) -> Result<u16, CodecError> {
        let bytes = self.take(2, reason)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_i16_le(&mut self, reason: &'static str) -> Result<i16, CodecError> {
        let bytes = self.take(2, reason)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_u32_be(&mut self, reason: &'static str) -> Result<u32, CodecError> {
        let bytes = self.take(4, reason)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_u32_le(&mut self, reason: &'static str) -> Result<u32, CodecError> {
        let bytes = self.take(4, reason)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_f32_le(&mut self, reason: &'static str) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.get_u32_le(reason)?))
    }

    pub fn get_u64_le(&mut self, reason: &'static str) -> Result<u64, CodecError> {
        let bytes = self.take(8, reason)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn get_i64_le(&mut self, reason: &'static str) -> Result<i64, CodecError> {
        Ok(self.get_u64_le(reason)? as i64)
    }

    pub fn get_bytes(&mut self, len: usize, reason: &'static str) -> Result<&'a [u8], CodecError> {
        self.take(len, reason)
    }

    pub fn get_array<const N: usize>(
        &mut self,
        reason: &'static str,
    ) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, reason)?);
        Ok(out)
    }

    /// u32-LE length-prefixed byte blob.
    pub fn get_blob_u32(&mut self, reason: &'static str) -> Result<&'a [u8], CodecError> {
        let len = self.get_u32_le(reason)? as usize;
        self.take(len, reason)
    }

    /// u16-LE length-prefixed UTF-8 string.
    pub fn get_utf8_u16(&mut self, reason: &'static str) -> Result<&'a str, CodecError> {
        let offset = self.pos;
        let len = self.get_u16_le(reason)? as usize;
        let bytes = self.take(len, reason)?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::Malformed { offset, reason })
    }

    /// Remaining bytes, consuming the reader.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    /// Fixed-shape payloads must consume their buffer exactly; anything left
    /// over would be silently dropped by a re-encode.
    pub fn expect_end(&self, reason: &'static str) -> Result<(), CodecError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Malformed {
                offset: self.pos,
                reason,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_endian_reads() {
        let data = [0x12, 0x34, 0x34, 0x12, 0xff];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.get_u16_be("be").unwrap(), 0x1234);
        assert_eq!(reader.get_u16_le("le").unwrap(), 0x1234);
        assert_eq!(reader.get_u8("u8").unwrap(), 0xff);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_overrun_reports_offset() {
        let data = [0x01, 0x02];
        let mut reader = ByteReader::new(&data);
        reader.get_u8("first").unwrap();

        let err = reader.get_u32_le("int").unwrap_err();
        match err {
            CodecError::Malformed { offset, .. } => assert_eq!(offset, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_prefixed_string() {
        let mut data = vec![5, 0];
        data.extend_from_slice(b"Video");
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.get_utf8_u16("name").unwrap(), "Video");
        reader.expect_end("trailing").unwrap();
    }
}
