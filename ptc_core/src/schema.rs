use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of leading floats in every record: position(3) + normal(3) + radius(1).
pub const FIXED_FIELDS: usize = 7;

/// Closed set of auxiliary variable types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Float,
    Color,
    Point,
    Normal,
    Vector,
    Matrix,
}

impl VarType {
    pub const ALL: [VarType; 6] = [
        VarType::Float,
        VarType::Color,
        VarType::Point,
        VarType::Normal,
        VarType::Vector,
        VarType::Matrix,
    ];

    /// Number of `f32` components one value of this type occupies in a record.
    pub fn components(self) -> usize {
        match self {
            VarType::Float => 1,
            VarType::Color | VarType::Point | VarType::Normal | VarType::Vector => 3,
            VarType::Matrix => 16,
        }
    }

    /// Stable lowercase tag, also used by the on-disk schema encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            VarType::Float => "float",
            VarType::Color => "color",
            VarType::Point => "point",
            VarType::Normal => "normal",
            VarType::Vector => "vector",
            VarType::Matrix => "matrix",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        VarType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == tag)
            .ok_or_else(|| Error::UnknownType {
                tag: tag.to_string(),
            })
    }
}

/// One declared auxiliary variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub ty: VarType,
    pub name: String,
}

impl Variable {
    pub fn new(ty: VarType, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }
}

/// Ordered list of auxiliary variables attached to every point.
///
/// Declaration order fixes the order of the auxiliary values inside a record.
/// Two schemas are equal only when their declarations match in type, name and
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    variables: Vec<Variable>,
    datasize: usize,
}

impl Schema {
    /// Build a schema, rejecting duplicate or empty names.
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Result<Self> {
        let variables: Vec<Variable> = variables.into_iter().collect();
        let mut seen = HashSet::with_capacity(variables.len());
        for var in &variables {
            if var.name.is_empty() {
                return Err(Error::EmptyVariableName);
            }
            if !seen.insert(var.name.as_str()) {
                return Err(Error::DuplicateVariable {
                    name: var.name.clone(),
                });
            }
        }
        let datasize = variables.iter().map(|v| v.ty.components()).sum();
        Ok(Self {
            variables,
            datasize,
        })
    }

    /// Build a schema from `(type tag, name)` pairs such as `("vector", "dPdu")`.
    pub fn parse<'a>(decls: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let variables = decls
            .into_iter()
            .map(|(tag, name)| Ok(Variable::new(tag.parse()?, name)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(variables)
    }

    /// Schema with no auxiliary variables.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Total auxiliary components per point.
    pub fn datasize(&self) -> usize {
        self.datasize
    }

    /// Floats per record.
    pub fn stride(&self) -> usize {
        FIXED_FIELDS + self.datasize
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Declarations as `(tag, name)` pairs.
    pub fn declarations(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.variables.iter().map(|v| (v.ty.as_str(), v.name.as_str()))
    }

    /// Each variable together with its offset into the auxiliary tail of a record.
    pub fn slots(&self) -> impl Iterator<Item = (&Variable, usize)> {
        self.variables.iter().scan(0usize, |offset, var| {
            let start = *offset;
            *offset += var.ty.components();
            Some((var, start))
        })
    }
}
