//! Structured point ⇄ flat record conversion.
//!
//! The flat record is the canonical layout every backend and buffer shape
//! agrees on:
//!
//! ```text
//! [px, py, pz, nx, ny, nz, radius, aux_0.., aux_1.., ...]
//! ```
//!
//! Auxiliary values appear in schema declaration order, each expanded to its
//! type's component count. The name-keyed [`Point::data`] view only exists at
//! this boundary; the batch path never touches it.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schema::{Schema, VarType, FIXED_FIELDS};

/// Value of one auxiliary variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// `float`
    Float(f32),
    /// `color`, `point`, `normal`, `vector`
    Triple([f32; 3]),
    /// `matrix`, row-major
    Matrix([f32; 16]),
}

impl Value {
    pub fn components(&self) -> &[f32] {
        match self {
            Value::Float(v) => std::slice::from_ref(v),
            Value::Triple(v) => v,
            Value::Matrix(v) => v,
        }
    }

    /// Rebuild a value of type `ty` from exactly `ty.components()` floats.
    fn from_components(ty: VarType, c: &[f32]) -> Self {
        match ty {
            VarType::Float => Value::Float(c[0]),
            VarType::Color | VarType::Point | VarType::Normal | VarType::Vector => {
                Value::Triple([c[0], c[1], c[2]])
            }
            VarType::Matrix => {
                let mut m = [0.0; 16];
                m.copy_from_slice(c);
                Value::Matrix(m)
            }
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_triple(&self) -> Option<[f32; 3]> {
        match self {
            Value::Triple(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<[f32; 16]> {
        match self {
            Value::Matrix(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Triple(v)
    }
}

impl From<[f32; 16]> for Value {
    fn from(v: [f32; 16]) -> Self {
        Value::Matrix(v)
    }
}

/// One point in structured form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Point {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub radius: f32,
    pub data: BTreeMap<String, Value>,
}

impl Point {
    pub fn new(position: [f32; 3], normal: [f32; 3], radius: f32) -> Self {
        Self {
            position,
            normal,
            radius,
            data: BTreeMap::new(),
        }
    }

    /// Builder-style insertion of an auxiliary value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }
}

/// Append the flat record for `point` to `out`.
///
/// Keys in `point.data` that the schema does not declare are ignored.
pub fn encode_into(point: &Point, schema: &Schema, out: &mut Vec<f32>) -> Result<()> {
    let start = out.len();
    out.reserve(schema.stride());
    out.extend_from_slice(&point.position);
    out.extend_from_slice(&point.normal);
    out.push(point.radius);

    for var in schema.variables() {
        let Some(value) = point.data.get(&var.name) else {
            out.truncate(start);
            return Err(Error::MissingVariable {
                name: var.name.clone(),
            });
        };
        let components = value.components();
        if components.len() != var.ty.components() {
            out.truncate(start);
            return Err(Error::VariableShape {
                name: var.name.clone(),
                expected: var.ty.components(),
                actual: components.len(),
            });
        }
        out.extend_from_slice(components);
    }

    if point.data.len() > schema.len() {
        tracing::debug!(
            extra = point.data.len() - schema.len(),
            "ignoring undeclared point data keys"
        );
    }
    Ok(())
}

/// Flat record for `point`.
pub fn encode(point: &Point, schema: &Schema) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(schema.stride());
    encode_into(point, schema, &mut out)?;
    Ok(out)
}

/// Structured point from a flat record of exactly `schema.stride()` floats.
pub fn decode(record: &[f32], schema: &Schema) -> Result<Point> {
    if record.len() != schema.stride() {
        return Err(Error::buffer_size("record", schema.stride(), record.len()));
    }
    let aux = &record[FIXED_FIELDS..];
    let data = schema
        .slots()
        .map(|(var, offset)| {
            let value = Value::from_components(var.ty, &aux[offset..offset + var.ty.components()]);
            (var.name.clone(), value)
        })
        .collect();

    Ok(Point {
        position: [record[0], record[1], record[2]],
        normal: [record[3], record[4], record[5]],
        radius: record[6],
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn spam_schema() -> Schema {
        Schema::parse([("float", "fspam"), ("vector", "vspam")]).unwrap()
    }

    #[test]
    fn test_encode_canonical_order() {
        let p = Point::new([0.4, 0.8, 1.0], [1.0, 0.0, 0.0], 0.4)
            .with("vspam", [1.0f32, 2.0, 3.0])
            .with("fspam", 12.0f32);
        let flat = encode(&p, &spam_schema()).unwrap();
        assert_eq!(
            flat,
            vec![0.4, 0.8, 1.0, 1.0, 0.0, 0.0, 0.4, 12.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_decode_restores_point() {
        let schema = Schema::parse([("matrix", "xf"), ("color", "Cs"), ("float", "area")]).unwrap();
        let mut xf = [0.0; 16];
        for (i, v) in xf.iter_mut().enumerate() {
            *v = i as f32 * 0.5;
        }
        let p = Point::new([-1.0, 0.17, 42.0], [0.0, 0.0, 1.0], 1.5)
            .with("xf", xf)
            .with("Cs", [0.25f32, 0.5, 0.75])
            .with("area", 3.0f32);

        let flat = encode(&p, &schema).unwrap();
        assert_eq!(flat.len(), schema.stride());
        assert_eq!(decode(&flat, &schema).unwrap(), p);
    }

    #[test]
    fn test_empty_schema_record() {
        let p = Point::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], 0.5);
        let flat = encode(&p, &Schema::empty()).unwrap();
        assert_eq!(flat.len(), FIXED_FIELDS);
        let back = decode(&flat, &Schema::empty()).unwrap();
        assert!(back.data.is_empty());
        assert_eq!(back, p);
    }

    #[test]
    fn test_missing_variable() {
        let p = Point::new([0.0; 3], [0.0; 3], 1.0).with("fspam", 1.0f32);
        let mut out = vec![9.0];
        let err = encode_into(&p, &spam_schema(), &mut out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingVariable);
        assert!(err.to_string().contains("vspam"));
        assert_eq!(out, vec![9.0], "failed encode must not leave a partial record");
    }

    #[test]
    fn test_wrong_value_shape() {
        let p = Point::new([0.0; 3], [0.0; 3], 1.0)
            .with("fspam", [1.0f32, 2.0, 3.0])
            .with("vspam", [1.0f32, 2.0, 3.0]);
        let err = encode(&p, &spam_schema()).unwrap_err();
        assert!(matches!(
            err,
            Error::VariableShape { expected: 1, actual: 3, .. }
        ));
    }

    #[test]
    fn test_extra_keys_are_ignored() {
        let p = Point::new([0.0; 3], [0.0; 3], 1.0)
            .with("fspam", 2.0f32)
            .with("vspam", [4.0f32, 5.0, 6.0])
            .with("undeclared", 7.0f32);
        let flat = encode(&p, &spam_schema()).unwrap();
        assert_eq!(flat.len(), spam_schema().stride());

        let back = decode(&flat, &spam_schema()).unwrap();
        assert!(!back.data.contains_key("undeclared"));
        assert_eq!(back.data.len(), 2);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = decode(&[0.0; 8], &spam_schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferSize);
    }
}
