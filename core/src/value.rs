//! Runtime values. A [Value] is a small tagged union; composite values
//! (`Array`, `Record`, `Set`) own their data directly so that `#[derive(
//! Clone)]` already gives the deep-copy semantics assignment requires,
//! while `Pointer`/`ClassRef` clone as the cheap integer id they are,
//! giving reference-copy semantics for free.

use crate::date::Date;
use crate::error::PrescribeError;
use crate::numeric::format_real;
use crate::types::Type;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i32),
    Real(f64),
    Boolean(bool),
    Char(char),
    String(String),
    Date(Date),
    Array {
        /// Inclusive `(low, high)` bounds per dimension.
        dims: Vec<(i32, i32)>,
        /// Row-major flattened elements.
        elems: Vec<Value>,
    },
    /// Ordered field name -> value, preserving declaration order.
    Record(Vec<(String, Value)>),
    Set {
        base_enum: String,
        members: BTreeSet<i32>,
    },
    /// `Some(id)` is a heap address into [crate::store::Heap]; `None` is
    /// `NULL`.
    Pointer(Option<usize>),
    /// `Some(id)` is an object id into the heap; `None` is `NULL`.
    ClassRef(Option<usize>, String),
    /// `None` until `OPENFILE` assigns it a slot in the interpreter's file
    /// table.
    TextFile(Option<usize>),
    RandomFile(Option<usize>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Char(_) => "CHAR",
            Value::String(_) => "STRING",
            Value::Date(_) => "DATE",
            Value::Array { .. } => "ARRAY",
            Value::Record(_) => "RECORD",
            Value::Set { .. } => "SET",
            Value::Pointer(_) => "POINTER",
            Value::ClassRef(_, _) => "CLASS",
            Value::TextFile(_) => "TEXTFILE",
            Value::RandomFile(_) => "RANDOMFILE",
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// `OUTPUT`/`STRING` conversion rules; `None` for composite types,
    /// which are not outputtable.
    pub fn to_output_string(&self) -> Option<String> {
        match self {
            Value::Integer(n) => Some(n.to_string()),
            Value::Real(x) => Some(format_real(*x)),
            Value::Boolean(b) => Some(if *b { "TRUE".to_string() } else { "FALSE".to_string() }),
            Value::Char(c) => Some(c.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(d.to_string()),
            _ => None,
        }
    }
}

/// The default value for a freshly entered variable of semantic type `ty`,
/// per the data model's lifecycle rules.
pub fn default_for_type(ty: &Type) -> Value {
    match ty {
        Type::Integer => Value::Integer(0),
        Type::Real => Value::Real(0.0),
        Type::Boolean => Value::Boolean(false),
        Type::Char => Value::Char('\0'),
        Type::String => Value::String(String::new()),
        Type::Date => Value::Date(Date::new(1, 1, 1).expect("0001-01-01 is always valid")),
        Type::Array { .. } => {
            unreachable!("array defaults are built from AST bounds via default_array, not Type alone")
        }
        Type::Record(fields) => {
            Value::Record(fields.iter().map(|(n, t)| (n.clone(), default_for_type(t))).collect())
        }
        Type::Enum(_) => Value::Integer(0), // first member's ordinal; enum values are represented as their ordinal
        Type::SetOfEnum(base) => Value::Set {
            base_enum: base.clone(),
            members: BTreeSet::new(),
        },
        Type::Pointer(_) => Value::Pointer(None),
        Type::TextFile => Value::TextFile(None),
        Type::RandomFile(_) => Value::RandomFile(None),
        Type::Class(name) => Value::ClassRef(None, name.clone()),
        Type::Null => Value::Pointer(None),
    }
}

/// Builds a default-valued array given its (already const-evaluated)
/// per-dimension bounds and element type. Kept separate from
/// [default_for_type] because array bounds come from evaluated AST
/// expressions, not from the `Type` itself (the semantic `Type::Array`
/// only records rank, per `types.rs`).
pub fn default_array(dims: Vec<(i32, i32)>, elem_ty: &Type) -> Value {
    let count: usize = dims
        .iter()
        .map(|(lo, hi)| (*hi - *lo + 1).max(0) as usize)
        .product();
    let elems = (0..count).map(|_| default_for_type(elem_ty)).collect();
    Value::Array { dims, elems }
}

/// Converts a multi-dimensional index to a flat offset into `dims`/`elems`,
/// row-major. Bounds are checked; any violation is a `RangeError`.
pub fn flat_index(line: usize, dims: &[(i32, i32)], indices: &[i32]) -> Result<usize, PrescribeError> {
    if dims.len() != indices.len() {
        return Err(PrescribeError::runtime(
            line,
            format!("expected {} array indices, got {}", dims.len(), indices.len()),
        ));
    }
    let mut offset: i64 = 0;
    for ((lo, hi), idx) in dims.iter().zip(indices) {
        if *idx < *lo || *idx > *hi {
            return Err(PrescribeError::range(
                line,
                format!("array index {} out of bounds [{}:{}]", idx, lo, hi),
            ));
        }
        let extent = (*hi - *lo + 1) as i64;
        offset = offset * extent + (*idx - *lo) as i64;
    }
    Ok(offset as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_deep_copies_array() {
        let mut a = Value::Array {
            dims: vec![(1, 3)],
            elems: vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
        };
        let b = a.clone();
        if let Value::Array { elems, .. } = &mut a {
            elems[0] = Value::Integer(99);
        }
        assert_eq!(b, Value::Array {
            dims: vec![(1, 3)],
            elems: vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
        });
    }

    #[test]
    fn test_clone_shares_class_ref_id() {
        let a = Value::ClassRef(Some(5), "Dog".into());
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flat_index_row_major() {
        // ARRAY[1:2, 1:3] — row-major means the second dimension varies
        // fastest.
        let dims = vec![(1, 2), (1, 3)];
        assert_eq!(flat_index(1, &dims, &[1, 1]).unwrap(), 0);
        assert_eq!(flat_index(1, &dims, &[1, 3]).unwrap(), 2);
        assert_eq!(flat_index(1, &dims, &[2, 1]).unwrap(), 3);
    }

    #[test]
    fn test_flat_index_out_of_bounds() {
        let dims = vec![(1, 5)];
        assert!(flat_index(1, &dims, &[0]).is_err());
        assert!(flat_index(1, &dims, &[6]).is_err());
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(Value::Integer(42).to_output_string().unwrap(), "42");
        assert_eq!(Value::Boolean(true).to_output_string().unwrap(), "TRUE");
        assert!(Value::Array { dims: vec![], elems: vec![] }.to_output_string().is_none());
    }
}
