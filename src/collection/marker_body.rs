//! Type-specific marker body layout for document/edge/deletion markers
//! (§6.2: `{..., key-bytes, body-bytes}` appended after the common prefix).

use crate::error::{Result, StorageError};
use crate::shaper::{AttributeId, Shape, ShapeId};

/// `(from-cid, from-key, to-cid, to-key)` carried by an edge marker (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeFields {
    pub from_cid: u64,
    pub from_key: String,
    pub to_cid: u64,
    pub to_key: String,
}

pub struct ParsedDocumentBody<'a> {
    pub key: &'a str,
    pub shape_id: ShapeId,
    pub edge: Option<EdgeFields>,
    pub shaped_body: &'a [u8],
}

/// `{key_len:u32, shape_id:u32, [edge fields], key_bytes, shaped_body}`.
pub fn encode_document_body(key: &str, shape_id: ShapeId, shaped_body: &[u8], edge: Option<&EdgeFields>) -> Vec<u8> {
    let key_bytes = key.as_bytes();
    let mut out = Vec::new();
    out.extend_from_slice(&(key_bytes.len() as u32).to_ne_bytes());
    out.extend_from_slice(&shape_id.to_ne_bytes());
    if let Some(edge) = edge {
        out.extend_from_slice(&edge.from_cid.to_ne_bytes());
        out.extend_from_slice(&(edge.from_key.len() as u32).to_ne_bytes());
        out.extend_from_slice(&edge.to_cid.to_ne_bytes());
        out.extend_from_slice(&(edge.to_key.len() as u32).to_ne_bytes());
    }
    out.extend_from_slice(key_bytes);
    if let Some(edge) = edge {
        out.extend_from_slice(edge.from_key.as_bytes());
        out.extend_from_slice(edge.to_key.as_bytes());
    }
    out.extend_from_slice(shaped_body);
    out
}

pub fn decode_document_body(bytes: &[u8], is_edge: bool) -> Result<ParsedDocumentBody<'_>> {
    let bad = || StorageError::CorruptedDatafile {
        offset: 0,
        reason: "document marker body truncated".into(),
    };
    if bytes.len() < 8 {
        return Err(bad());
    }
    let key_len = u32::from_ne_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let shape_id = u32::from_ne_bytes(bytes[4..8].try_into().unwrap());
    let mut cursor = 8;

    let edge_header = if is_edge {
        if bytes.len() < cursor + 24 {
            return Err(bad());
        }
        let from_cid = u64::from_ne_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        let from_key_len = u32::from_ne_bytes(bytes[cursor + 8..cursor + 12].try_into().unwrap()) as usize;
        let to_cid = u64::from_ne_bytes(bytes[cursor + 12..cursor + 20].try_into().unwrap());
        let to_key_len = u32::from_ne_bytes(bytes[cursor + 20..cursor + 24].try_into().unwrap()) as usize;
        cursor += 24;
        Some((from_cid, from_key_len, to_cid, to_key_len))
    } else {
        None
    };

    let key = std::str::from_utf8(&bytes[cursor..cursor + key_len]).map_err(|_| bad())?;
    cursor += key_len;

    let edge = if let Some((from_cid, from_key_len, to_cid, to_key_len)) = edge_header {
        let from_key = std::str::from_utf8(&bytes[cursor..cursor + from_key_len])
            .map_err(|_| bad())?
            .to_string();
        cursor += from_key_len;
        let to_key = std::str::from_utf8(&bytes[cursor..cursor + to_key_len])
            .map_err(|_| bad())?
            .to_string();
        cursor += to_key_len;
        Some(EdgeFields {
            from_cid,
            from_key,
            to_cid,
            to_key,
        })
    } else {
        None
    };

    Ok(ParsedDocumentBody {
        key,
        shape_id,
        edge,
        shaped_body: &bytes[cursor..],
    })
}

/// `{key_len:u32, key_bytes}` — a deletion marker carries no body.
pub fn encode_deletion_body(key: &str) -> Vec<u8> {
    let key_bytes = key.as_bytes();
    let mut out = Vec::with_capacity(4 + key_bytes.len());
    out.extend_from_slice(&(key_bytes.len() as u32).to_ne_bytes());
    out.extend_from_slice(key_bytes);
    out
}

/// `{attribute_id:u32, name_len:u32, name_bytes}` — persists a freshly
/// interned attribute name so a restart can reconstruct the id→name table
/// before replaying any document marker that references it.
pub fn encode_attribute_marker(id: AttributeId, name: &str) -> Vec<u8> {
    let name_bytes = name.as_bytes();
    let mut out = Vec::with_capacity(8 + name_bytes.len());
    out.extend_from_slice(&id.to_ne_bytes());
    out.extend_from_slice(&(name_bytes.len() as u32).to_ne_bytes());
    out.extend_from_slice(name_bytes);
    out
}

pub fn decode_attribute_marker(bytes: &[u8]) -> Result<(AttributeId, &str)> {
    let bad = || StorageError::CorruptedDatafile {
        offset: 0,
        reason: "attribute-name marker body truncated".into(),
    };
    if bytes.len() < 8 {
        return Err(bad());
    }
    let id = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
    let name_len = u32::from_ne_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let name = std::str::from_utf8(&bytes[8..8 + name_len]).map_err(|_| bad())?;
    Ok((id, name))
}

/// `{shape_id:u32, bincode-encoded Shape}` — persists a freshly interned
/// shape descriptor, the way `encode_attribute_marker` persists names.
pub fn encode_shape_marker(id: ShapeId, shape: &Shape) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4);
    out.extend_from_slice(&id.to_ne_bytes());
    bincode::serialize_into(&mut out, shape)?;
    Ok(out)
}

pub fn decode_shape_marker(bytes: &[u8]) -> Result<(ShapeId, Shape)> {
    if bytes.len() < 4 {
        return Err(StorageError::CorruptedDatafile {
            offset: 0,
            reason: "shape marker body truncated".into(),
        });
    }
    let id = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
    let shape: Shape = bincode::deserialize(&bytes[4..])?;
    Ok((id, shape))
}

pub fn decode_deletion_body(bytes: &[u8]) -> Result<&str> {
    if bytes.len() < 4 {
        return Err(StorageError::CorruptedDatafile {
            offset: 0,
            reason: "deletion marker body truncated".into(),
        });
    }
    let key_len = u32::from_ne_bytes(bytes[0..4].try_into().unwrap()) as usize;
    std::str::from_utf8(&bytes[4..4 + key_len]).map_err(|_| StorageError::CorruptedDatafile {
        offset: 0,
        reason: "deletion marker key not utf8".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_body_roundtrips_without_edge() {
        let body = encode_document_body("k1", 7, b"payload", None);
        let parsed = decode_document_body(&body, false).unwrap();
        assert_eq!(parsed.key, "k1");
        assert_eq!(parsed.shape_id, 7);
        assert_eq!(parsed.shaped_body, b"payload");
        assert!(parsed.edge.is_none());
    }

    #[test]
    fn edge_body_roundtrips_with_edge_fields() {
        let edge = EdgeFields {
            from_cid: 1,
            from_key: "a".to_string(),
            to_cid: 2,
            to_key: "bb".to_string(),
        };
        let body = encode_document_body("e1", 3, b"xyz", Some(&edge));
        let parsed = decode_document_body(&body, true).unwrap();
        assert_eq!(parsed.key, "e1");
        assert_eq!(parsed.edge, Some(edge));
        assert_eq!(parsed.shaped_body, b"xyz");
    }

    #[test]
    fn deletion_body_roundtrips() {
        let body = encode_deletion_body("k9");
        assert_eq!(decode_deletion_body(&body).unwrap(), "k9");
    }

    #[test]
    fn attribute_marker_roundtrips() {
        let body = encode_attribute_marker(7, "name");
        let (id, name) = decode_attribute_marker(&body).unwrap();
        assert_eq!(id, 7);
        assert_eq!(name, "name");
    }

    #[test]
    fn shape_marker_roundtrips() {
        let shape = Shape::Array {
            entries: vec![(0, 1), (2, 3)],
        };
        let body = encode_shape_marker(5, &shape).unwrap();
        let (id, decoded) = decode_shape_marker(&body).unwrap();
        assert_eq!(id, 5);
        assert_eq!(decoded, shape);
    }
}
