use crate::Error;
use std::fmt;
use std::sync::Arc;

/// Type tag of the default, empty platform data (a GVariant-style
/// dictionary).
pub const DEFAULT_TYPE_TAG: &str = "a{sv}";

const LEN_SIZE: usize = std::mem::size_of::<u32>();

/// Opaque, typed context sent along with every forwarded call
///
/// The payload is never interpreted here. Clones share the same byte buffer,
/// the buffer is freed when the last clone (the call site or an in-flight
/// forwarded call) is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct PlatformData {
    type_tag: Arc<str>,
    payload: Arc<[u8]>,
}

impl PlatformData {
    pub fn new(type_tag: &str, payload: impl Into<Vec<u8>>) -> Result<Self, Error> {
        validate_type_tag(type_tag)?;
        let payload: Vec<u8> = payload.into();
        wire_len(type_tag.len(), "type tag")?;
        wire_len(payload.len(), "payload")?;
        Ok(Self {
            type_tag: Arc::from(type_tag),
            payload: Arc::from(payload),
        })
    }

    /// Empty dictionary, used when the invocation carries no context
    pub fn empty() -> Self {
        Self {
            type_tag: Arc::from(DEFAULT_TYPE_TAG),
            payload: Arc::from(Vec::new()),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encodes to the wire form:
    /// `u32 tag length | tag | u32 payload length | payload`, little endian.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.type_tag.as_bytes();
        // Both lengths fit, `new` and `decode` reject anything larger
        let tag_len = wire_len(tag.len(), "type tag").unwrap_or(u32::MAX);
        let payload_len = wire_len(self.payload.len(), "payload").unwrap_or(u32::MAX);

        let mut out = Vec::with_capacity(2 * LEN_SIZE + tag.len() + self.payload.len());
        out.extend_from_slice(&tag_len.to_le_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(&payload_len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes the wire form produced by [`PlatformData::encode`].
    ///
    /// The declared lengths must exactly cover the input.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader { bytes };

        let tag = reader.take_prefixed("type tag")?;
        let tag = std::str::from_utf8(tag)
            .map_err(|_| Error::Decode("type tag is not valid UTF-8".to_string()))?;
        validate_type_tag(tag)?;

        let payload = reader.take_prefixed("payload")?;

        if !reader.bytes.is_empty() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after payload",
                reader.bytes.len()
            )));
        }

        Ok(Self {
            type_tag: Arc::from(tag),
            payload: Arc::from(payload),
        })
    }
}

impl Default for PlatformData {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PlatformData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformData")
            .field("type_tag", &self.type_tag)
            .field("len", &self.payload.len())
            .finish()
    }
}

fn validate_type_tag(tag: &str) -> Result<(), Error> {
    if tag.is_empty() {
        return Err(Error::Decode("empty type tag".to_string()));
    }
    if !tag.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(Error::Decode(format!("invalid type tag '{}'", tag)));
    }
    Ok(())
}

/// Length as written in a `u32` prefix
fn wire_len(len: usize, what: &str) -> Result<u32, Error> {
    u32::try_from(len)
        .map_err(|_| Error::Decode(format!("{} of {} bytes does not fit the wire format", what, len)))
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], Error> {
        if self.bytes.len() < n {
            return Err(Error::Decode(format!(
                "truncated {}: need {} bytes, have {}",
                what,
                n,
                self.bytes.len()
            )));
        }
        let (head, rest) = self.bytes.split_at(n);
        self.bytes = rest;
        Ok(head)
    }

    fn take_prefixed(&mut self, what: &str) -> Result<&'a [u8], Error> {
        let len = self.take(LEN_SIZE, what)?;
        let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
        self.take(len, what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_keeps_tag_and_bytes() {
        for payload in [vec![], vec![0x7f], (0..=255u8).collect::<Vec<_>>()] {
            let data = PlatformData::new("ay", payload.clone()).unwrap();
            let decoded = PlatformData::decode(&data.encode()).unwrap();
            assert_eq!(decoded.type_tag(), "ay");
            assert_eq!(decoded.payload(), payload.as_slice());
            assert_eq!(decoded, data);
        }
    }

    #[test]
    fn encoding_layout() {
        let data = PlatformData::new("s", b"hi".to_vec()).unwrap();
        assert_eq!(data.encode(), vec![1, 0, 0, 0, b's', 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = PlatformData::new("ay", vec![1, 2, 3]).unwrap().encode();
        bytes.pop();
        assert!(matches!(PlatformData::decode(&bytes), Err(Error::Decode(_))));

        assert!(matches!(PlatformData::decode(&[1, 0]), Err(Error::Decode(_))));
        assert!(matches!(PlatformData::decode(&[]), Err(Error::Decode(_))));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = PlatformData::empty().encode();
        bytes.push(0);
        assert!(matches!(PlatformData::decode(&bytes), Err(Error::Decode(_))));
    }

    #[test]
    fn bad_type_tags_are_rejected() {
        assert!(PlatformData::new("", vec![]).is_err());
        assert!(PlatformData::new("a s", vec![]).is_err());

        // Length prefix claims a huge tag
        let bytes = [0xff, 0xff, 0xff, 0xff, b'a'];
        assert!(PlatformData::decode(&bytes).is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn lengths_beyond_u32_are_rejected() {
        let too_long = u32::MAX as usize + 1;
        assert!(matches!(wire_len(too_long, "payload"), Err(Error::Decode(_))));
        assert_eq!(wire_len(u32::MAX as usize, "payload").unwrap(), u32::MAX);
    }

    #[test]
    fn clones_share_payload() {
        let data = PlatformData::new("ay", vec![9; 64]).unwrap();
        let copy = data.clone();
        assert!(Arc::ptr_eq(&data.payload, &copy.payload));
        drop(data);
        assert_eq!(copy.payload().len(), 64);
    }
}
