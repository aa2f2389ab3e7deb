//! `to_shaped`: dynamic JSON → `(shape id, body bytes)` (§4.2 encoding rules).

use std::collections::HashSet;

use serde_json::Value;

use super::shape::{fixed_body_size, Shape, ShapeId, SHORT_STRING_SLOT};
use super::Shaper;
use crate::error::Result;

/// Convert a JSON value into its shape id and shape-encoded body bytes.
///
/// Attribute names beginning with `_` are skipped (the system attributes
/// `_id`/`_rev`/`_from`/`_to` are surfaced separately at retrieval, not
/// carried inside the shaped body). Cyclic object graphs are broken by
/// replacing a second encounter of the same node identity with `null`.
pub fn to_shaped(shaper: &mut Shaper, value: &Value) -> Result<(ShapeId, Vec<u8>)> {
    let mut seen = HashSet::new();
    encode_value(shaper, value, &mut seen)
}

fn identity(value: &Value) -> usize {
    value as *const Value as usize
}

fn encode_value(shaper: &mut Shaper, value: &Value, seen: &mut HashSet<usize>) -> Result<(ShapeId, Vec<u8>)> {
    match value {
        Value::Null => Ok((shaper.shapes.find_shape(Shape::Null), Vec::new())),
        Value::Bool(b) => Ok((
            shaper.shapes.find_shape(Shape::Boolean),
            vec![if *b { 1 } else { 0 }],
        )),
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(0.0);
            Ok((shaper.shapes.find_shape(Shape::Number), f.to_ne_bytes().to_vec()))
        }
        Value::String(s) => encode_string(shaper, s),
        Value::Array(_) | Value::Object(_) => {
            let id = identity(value);
            if seen.contains(&id) {
                return Ok((shaper.shapes.find_shape(Shape::Null), Vec::new()));
            }
            seen.insert(id);
            match value {
                Value::Array(items) => encode_array(shaper, items, seen),
                Value::Object(map) => encode_object(shaper, map, seen),
                _ => unreachable!(),
            }
        }
    }
}

fn encode_string(shaper: &mut Shaper, s: &str) -> Result<(ShapeId, Vec<u8>)> {
    let bytes = s.as_bytes();
    if bytes.len() < SHORT_STRING_SLOT - 1 {
        let mut body = vec![0u8; SHORT_STRING_SLOT];
        body[0] = bytes.len() as u8;
        body[1..1 + bytes.len()].copy_from_slice(bytes);
        Ok((shaper.shapes.find_shape(Shape::ShortString), body))
    } else {
        let mut body = Vec::with_capacity(bytes.len() + 1);
        body.extend_from_slice(bytes);
        body.push(0); // terminating NUL
        Ok((shaper.shapes.find_shape(Shape::LongString), body))
    }
}

fn encode_array(
    shaper: &mut Shaper,
    items: &[Value],
    seen: &mut HashSet<usize>,
) -> Result<(ShapeId, Vec<u8>)> {
    if items.is_empty() {
        return Ok((shaper.shapes.find_shape(Shape::ListHeterogeneous), 0u32.to_ne_bytes().to_vec()));
    }

    let mut encoded = Vec::with_capacity(items.len());
    for item in items {
        encoded.push(encode_value(shaper, item, seen)?);
    }

    let first_shape = encoded[0].0;
    let homogeneous = encoded.iter().all(|(sid, _)| *sid == first_shape);
    let first_size = encoded[0].1.len();
    let same_size = encoded.iter().all(|(_, body)| body.len() == first_size);

    let count = items.len() as u32;
    let mut out = Vec::new();
    out.extend_from_slice(&count.to_ne_bytes());

    if homogeneous && same_size {
        let shape_id = shaper.shapes.find_shape(Shape::ListHomogeneousSized {
            element: first_shape,
            element_size: first_size as u32,
        });
        for (_, body) in &encoded {
            out.extend_from_slice(body);
        }
        Ok((shape_id, out))
    } else if homogeneous {
        let shape_id = shaper.shapes.find_shape(Shape::ListHomogeneous { element: first_shape });
        write_offsets(&mut out, &encoded);
        for (_, body) in &encoded {
            out.extend_from_slice(body);
        }
        Ok((shape_id, out))
    } else {
        let shape_id = shaper.shapes.find_shape(Shape::ListHeterogeneous);
        for (sid, _) in &encoded {
            out.extend_from_slice(&sid.to_ne_bytes());
        }
        write_offsets(&mut out, &encoded);
        for (_, body) in &encoded {
            out.extend_from_slice(body);
        }
        Ok((shape_id, out))
    }
}

fn write_offsets(out: &mut Vec<u8>, encoded: &[(ShapeId, Vec<u8>)]) {
    let mut offset = 0u32;
    for (_, body) in encoded {
        out.extend_from_slice(&offset.to_ne_bytes());
        offset += body.len() as u32;
    }
    out.extend_from_slice(&offset.to_ne_bytes()); // one extra end-offset
}

/// Encode a named-attribute object per §4.2 rule 7:
/// `{header, sorted sid[], sorted aid[], fixed-offset[], variable-offset[],
/// bodies}`. Entries are sorted by attribute id (so identical objects always
/// produce identical shapes and bytes); the header records the count of
/// fixed-sized vs variable-sized entries, and each group's bodies are
/// packed contiguously — fixed entries first, then variable ones — so a
/// fixed entry's body can be located by its static width alone, without an
/// end offset.
fn encode_object(
    shaper: &mut Shaper,
    map: &serde_json::Map<String, Value>,
    seen: &mut HashSet<usize>,
) -> Result<(ShapeId, Vec<u8>)> {
    let mut fields = Vec::new();
    for (key, value) in map {
        if key.starts_with('_') {
            continue;
        }
        let attr_id = shaper.attributes.find_attribute_name(key);
        let (shape_id, body) = encode_value(shaper, value, seen)?;
        fields.push((attr_id, shape_id, body));
    }
    fields.sort_by_key(|(attr_id, _, _)| *attr_id);

    let entries: Vec<_> = fields.iter().map(|(a, s, _)| (*a, *s)).collect();
    let shape_id = shaper.shapes.find_shape(Shape::Array { entries });

    let is_fixed: Vec<bool> = fields
        .iter()
        .map(|(_, sid, _)| fixed_body_size(shaper.shapes.lookup_shape_id(*sid).unwrap()).is_some())
        .collect();
    let fixed_count = is_fixed.iter().filter(|f| **f).count() as u32;
    let variable_count = fields.len() as u32 - fixed_count;

    let mut out = Vec::new();
    out.extend_from_slice(&fixed_count.to_ne_bytes());
    out.extend_from_slice(&variable_count.to_ne_bytes());

    for (_, shape_id, _) in &fields {
        out.extend_from_slice(&shape_id.to_ne_bytes());
    }
    for (attr_id, _, _) in &fields {
        out.extend_from_slice(&attr_id.to_ne_bytes());
    }

    let mut offset = 0u32;
    for (i, (_, _, body)) in fields.iter().enumerate() {
        if is_fixed[i] {
            out.extend_from_slice(&offset.to_ne_bytes());
            offset += body.len() as u32;
        }
    }

    let mut offset = 0u32;
    for (i, (_, _, body)) in fields.iter().enumerate() {
        if !is_fixed[i] {
            out.extend_from_slice(&offset.to_ne_bytes());
            offset += body.len() as u32;
        }
    }
    out.extend_from_slice(&offset.to_ne_bytes()); // one extra end-offset

    for (i, (_, _, body)) in fields.iter().enumerate() {
        if is_fixed[i] {
            out.extend_from_slice(body);
        }
    }
    for (i, (_, _, body)) in fields.iter().enumerate() {
        if !is_fixed[i] {
            out.extend_from_slice(body);
        }
    }

    Ok((shape_id, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cycle_guard_nulls_a_previously_seen_node() {
        let mut shaper = Shaper::new();
        let child = json!({"a": 1});
        let mut seen = HashSet::new();
        seen.insert(identity(&child));
        let (shape_id, body) = encode_value(&mut shaper, &child, &mut seen).unwrap();
        assert_eq!(shaper.shapes.lookup_shape_id(shape_id), Some(&Shape::Null));
        assert!(body.is_empty());
    }

    #[test]
    fn underscore_attributes_are_skipped() {
        let mut shaper = Shaper::new();
        let value = json!({"_id": "x/1", "a": 1});
        let (shape_id, _) = to_shaped(&mut shaper, &value).unwrap();
        match shaper.shapes.lookup_shape_id(shape_id).unwrap() {
            Shape::Array { entries } => assert_eq!(entries.len(), 1),
            other => panic!("unexpected shape {other:?}"),
        }
    }
}
