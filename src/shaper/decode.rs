//! `from_shaped`: shape id + body bytes → dynamic JSON (§4.2 encoding rules).

use serde_json::{Map, Number, Value};

use super::shape::{fixed_body_size, Shape, ShapeId, SHORT_STRING_SLOT};
use super::Shaper;
use crate::error::{Result, StorageError};

pub fn from_shaped(shaper: &Shaper, shape_id: ShapeId, body: &[u8]) -> Result<Value> {
    let shape = shaper
        .shapes
        .lookup_shape_id(shape_id)
        .ok_or_else(|| StorageError::IllegalState(format!("unknown shape id {shape_id}")))?;

    match shape {
        Shape::Null => Ok(Value::Null),
        Shape::Boolean => Ok(Value::Bool(body.first().copied().unwrap_or(0) != 0)),
        Shape::Number => {
            let bytes: [u8; 8] = body[0..8].try_into().unwrap();
            let f = f64::from_ne_bytes(bytes);
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Shape::ShortString => {
            let len = body[0] as usize;
            let s = std::str::from_utf8(&body[1..1 + len])
                .map_err(|e| StorageError::IllegalState(e.to_string()))?;
            Ok(Value::String(s.to_string()))
        }
        Shape::LongString => {
            let end = body.len().saturating_sub(1); // drop terminating NUL
            let s = std::str::from_utf8(&body[..end])
                .map_err(|e| StorageError::IllegalState(e.to_string()))?;
            Ok(Value::String(s.to_string()))
        }
        Shape::ListHomogeneousSized { element, element_size } => {
            let count = read_u32(body, 0) as usize;
            let mut items = Vec::with_capacity(count);
            let mut offset = 4;
            for _ in 0..count {
                let slice = &body[offset..offset + *element_size as usize];
                items.push(from_shaped(shaper, *element, slice)?);
                offset += *element_size as usize;
            }
            Ok(Value::Array(items))
        }
        Shape::ListHomogeneous { element } => {
            let count = read_u32(body, 0) as usize;
            let offsets_start = 4;
            let data_start = offsets_start + (count + 1) * 4;
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let start = data_start + read_u32(body, offsets_start + i * 4) as usize;
                let end = data_start + read_u32(body, offsets_start + (i + 1) * 4) as usize;
                items.push(from_shaped(shaper, *element, &body[start..end])?);
            }
            Ok(Value::Array(items))
        }
        Shape::ListHeterogeneous => {
            let count = read_u32(body, 0) as usize;
            let sids_start = 4;
            let offsets_start = sids_start + count * 4;
            let data_start = offsets_start + (count + 1) * 4;
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let sid = read_u32(body, sids_start + i * 4);
                let start = data_start + read_u32(body, offsets_start + i * 4) as usize;
                let end = data_start + read_u32(body, offsets_start + (i + 1) * 4) as usize;
                items.push(from_shaped(shaper, sid, &body[start..end])?);
            }
            Ok(Value::Array(items))
        }
        Shape::Array { entries } => {
            // Mirrors `encode::encode_object`'s `{header, sorted sid[],
            // sorted aid[], fixed-offset[], variable-offset[], bodies}`
            // layout: fixed-width entries (their own static size) are
            // located by a one-offset-per-entry array, variable-width ones
            // by the usual offset-pair-per-entry array with a trailing end
            // offset; fixed bodies are packed before variable ones.
            let fixed_count = read_u32(body, 0) as usize;
            let variable_count = read_u32(body, 4) as usize;
            let total = fixed_count + variable_count;
            debug_assert_eq!(total, entries.len());

            let sids_start = 8;
            let aids_start = sids_start + total * 4;
            let fixed_offsets_start = aids_start + total * 4;
            let variable_offsets_start = fixed_offsets_start + fixed_count * 4;
            let data_start = variable_offsets_start + (variable_count + 1) * 4;

            let mut classified = Vec::with_capacity(total);
            let mut fixed_body_total = 0usize;
            for i in 0..total {
                let sid = read_u32(body, sids_start + i * 4);
                let aid = read_u32(body, aids_start + i * 4);
                let shape = shaper
                    .shapes
                    .lookup_shape_id(sid)
                    .ok_or_else(|| StorageError::IllegalState(format!("unknown shape id {sid}")))?;
                let width = fixed_body_size(shape);
                if let Some(w) = width {
                    fixed_body_total += w;
                }
                classified.push((sid, aid, width));
            }
            let variable_data_start = data_start + fixed_body_total;

            let mut map = Map::new();
            let mut fixed_idx = 0usize;
            let mut variable_idx = 0usize;
            for (sid, aid, width) in classified {
                let name = shaper
                    .attributes
                    .lookup_attribute_id(aid)
                    .ok_or_else(|| StorageError::IllegalState(format!("unknown attribute id {aid}")))?;
                let value = if let Some(size) = width {
                    let start = data_start + read_u32(body, fixed_offsets_start + fixed_idx * 4) as usize;
                    fixed_idx += 1;
                    from_shaped(shaper, sid, &body[start..start + size])?
                } else {
                    let start = variable_data_start + read_u32(body, variable_offsets_start + variable_idx * 4) as usize;
                    let end = variable_data_start + read_u32(body, variable_offsets_start + (variable_idx + 1) * 4) as usize;
                    variable_idx += 1;
                    from_shaped(shaper, sid, &body[start..end])?
                };
                map.insert(name.to_string(), value);
            }
            Ok(Value::Object(map))
        }
    }
}

fn read_u32(body: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(body[offset..offset + 4].try_into().unwrap())
}
