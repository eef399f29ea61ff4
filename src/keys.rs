//! Canonical record keys for the update log.
//!
//! Every persisted record is addressed by a composite key that sorts
//! bytewise in logical order, so clock-range reads are plain iterator
//! scans:
//!
//! ```text
//! ┌─────────┬───────────┬──────┬──────┬───────────┬──────────┐
//! │ version │ doc bytes │ 0x00 │ kind │ clock BE  │ part BE  │
//! │ 1 byte  │ n bytes   │      │ 1 B  │ update    │ update   │
//! └─────────┴───────────┴──────┴──────┴───────────┴──────────┘
//! ```
//!
//! The NUL terminator keeps document names prefix-free ("doc" never
//! shadows "doc2"), which is why NUL is banned from names. Big-endian
//! clock and part fields make `(clock, part)` ordering fall out of the
//! byte comparison. `part == 0` marks a whole, un-chunked payload;
//! chunk parts count from 1.
//!
//! Also hosts the LEB128 varint codec used by the state-vector value
//! encoding.

/// Current key scheme version byte.
pub const KEY_VERSION: u8 = 1;

/// Exclusive upper bound for "scan every clock" ranges.
pub const MAX_CLOCK: u32 = u32::MAX;

const KIND_UPDATE: u8 = 1;
const KIND_STATE_VECTOR: u8 = 2;
const KIND_META: u8 = 3;

/// Key construction and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Document or meta name rejected before any I/O.
    InvalidName(String),
    /// A stored key did not decode under the current scheme.
    Malformed(String),
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::InvalidName(e) => write!(f, "invalid name: {e}"),
            KeyError::Malformed(e) => write!(f, "malformed key: {e}"),
        }
    }
}

impl std::error::Error for KeyError {}

/// What a record holds, with the kind-specific key fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// One update fragment. `part == 0` means the whole payload fits in
    /// a single record; chunked payloads use parts 1..=k.
    Update { clock: u32, part: u32 },
    /// The single per-document state-vector marker.
    StateVector,
    /// A named metadata record.
    Meta { name: String },
}

impl RecordKind {
    fn code(&self) -> u8 {
        match self {
            RecordKind::Update { .. } => KIND_UPDATE,
            RecordKind::StateVector => KIND_STATE_VECTOR,
            RecordKind::Meta { .. } => KIND_META,
        }
    }
}

/// A decoded record key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub doc: String,
    pub kind: RecordKind,
}

impl RecordKey {
    /// Key for an update fragment.
    pub fn update(doc: &str, clock: u32, part: u32) -> Result<Self, KeyError> {
        validate_doc_name(doc)?;
        Ok(Self {
            doc: doc.to_string(),
            kind: RecordKind::Update { clock, part },
        })
    }

    /// Key for the document's state-vector marker.
    pub fn state_vector(doc: &str) -> Result<Self, KeyError> {
        validate_doc_name(doc)?;
        Ok(Self {
            doc: doc.to_string(),
            kind: RecordKind::StateVector,
        })
    }

    /// Key for a named metadata record.
    pub fn meta(doc: &str, name: &str) -> Result<Self, KeyError> {
        validate_doc_name(doc)?;
        if name.is_empty() || name.contains('\0') {
            return Err(KeyError::InvalidName(format!(
                "meta name {name:?} must be non-empty and NUL-free"
            )));
        }
        Ok(Self {
            doc: doc.to_string(),
            kind: RecordKind::Meta {
                name: name.to_string(),
            },
        })
    }

    /// Encode to the canonical byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.doc.len() + 12);
        buf.push(KEY_VERSION);
        buf.extend_from_slice(self.doc.as_bytes());
        buf.push(0x00);
        buf.push(self.kind.code());
        match &self.kind {
            RecordKind::Update { clock, part } => {
                buf.extend_from_slice(&clock.to_be_bytes());
                buf.extend_from_slice(&part.to_be_bytes());
            }
            RecordKind::StateVector => {}
            RecordKind::Meta { name } => buf.extend_from_slice(name.as_bytes()),
        }
        buf
    }

    /// Decode a stored key.
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyError> {
        let (&version, rest) = bytes
            .split_first()
            .ok_or_else(|| KeyError::Malformed("empty key".into()))?;
        if version != KEY_VERSION {
            return Err(KeyError::Malformed(format!(
                "unsupported key version {version}"
            )));
        }
        let sep = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| KeyError::Malformed("missing name terminator".into()))?;
        let doc = std::str::from_utf8(&rest[..sep])
            .map_err(|e| KeyError::Malformed(format!("document name not UTF-8: {e}")))?
            .to_string();
        if doc.is_empty() {
            return Err(KeyError::Malformed("empty document name".into()));
        }
        let tail = &rest[sep + 1..];
        let (&code, tail) = tail
            .split_first()
            .ok_or_else(|| KeyError::Malformed("missing kind byte".into()))?;
        let kind = match code {
            KIND_UPDATE => {
                if tail.len() != 8 {
                    return Err(KeyError::Malformed(format!(
                        "update key suffix is {} bytes, expected 8",
                        tail.len()
                    )));
                }
                let mut clock = [0u8; 4];
                clock.copy_from_slice(&tail[..4]);
                let mut part = [0u8; 4];
                part.copy_from_slice(&tail[4..]);
                RecordKind::Update {
                    clock: u32::from_be_bytes(clock),
                    part: u32::from_be_bytes(part),
                }
            }
            KIND_STATE_VECTOR => {
                if !tail.is_empty() {
                    return Err(KeyError::Malformed(
                        "trailing bytes after state-vector key".into(),
                    ));
                }
                RecordKind::StateVector
            }
            KIND_META => {
                let name = std::str::from_utf8(tail)
                    .map_err(|e| KeyError::Malformed(format!("meta name not UTF-8: {e}")))?;
                if name.is_empty() {
                    return Err(KeyError::Malformed("empty meta name".into()));
                }
                RecordKind::Meta {
                    name: name.to_string(),
                }
            }
            other => return Err(KeyError::Malformed(format!("unknown kind byte {other}"))),
        };
        Ok(Self { doc, kind })
    }
}

/// Reject malformed document names before any I/O happens.
pub fn validate_doc_name(doc: &str) -> Result<(), KeyError> {
    if doc.is_empty() || doc.contains('\0') {
        return Err(KeyError::InvalidName(format!(
            "document name {doc:?} must be non-empty and NUL-free"
        )));
    }
    Ok(())
}

fn doc_prefix(doc: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(doc.len() + 2);
    buf.push(KEY_VERSION);
    buf.extend_from_slice(doc.as_bytes());
    buf.push(0x00);
    buf
}

/// Encoded `[start, end)` bounds covering a document's update clocks
/// `from <= clock < to` (every part included).
pub fn update_range(doc: &str, from: u32, to: u32) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    let start = RecordKey::update(doc, from, 0)?.encode();
    let end = RecordKey::update(doc, to, 0)?.encode();
    Ok((start, end))
}

/// Encoded `[start, end)` bounds covering every record of a document,
/// all kinds.
pub fn doc_range(doc: &str) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    validate_doc_name(doc)?;
    let start = doc_prefix(doc);
    let mut end = start.clone();
    end.push(KIND_META + 1);
    Ok((start, end))
}

/// Append an LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Read an LEB128 varint, returning the value and the remaining bytes.
pub fn read_varint(buf: &[u8]) -> Result<(u64, &[u8]), KeyError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return Err(KeyError::Malformed("varint longer than 64 bits".into()));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, &buf[i + 1..]));
        }
        shift += 7;
    }
    Err(KeyError::Malformed("truncated varint".into()))
}
