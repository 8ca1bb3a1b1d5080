//! The runtime store: a stack of frames plus a heap, and the `Lvalue`
//! descriptions used to resolve "places" (names, array elements, record
//! fields, class fields, dereferenced pointers) into and out of it.
//!
//! Lvalues are plain data, not live borrows — resolving one walks the
//! store fresh each time. This keeps aliasing (by-reference parameters)
//! representable without `Rc<RefCell<_>>`: a by-reference parameter's cell
//! is [Cell::Alias], naming the caller's slot by frame index, and every
//! `get`/`set` chases that alias at the moment of access.

use crate::error::PrescribeError;
use crate::value::Value;
use std::collections::HashMap;

/// One named slot in a frame. Holds either an owned value, or (for
/// by-reference parameters) a description of where the real value lives.
#[derive(Clone, Debug)]
pub enum Cell {
    Direct(Value),
    Alias(Box<Lvalue>),
}

#[derive(Default, Debug)]
pub struct Frame {
    cells: HashMap<String, Cell>,
    /// Names currently locked against assignment (active `FOR` counters).
    locked: std::collections::HashSet<String>,
}

impl Frame {
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        self.cells.insert(name.into(), Cell::Direct(value));
    }

    pub fn declare_alias(&mut self, name: impl Into<String>, target: Lvalue) {
        self.cells.insert(name.into(), Cell::Alias(Box::new(target)));
    }

    pub fn lock(&mut self, name: &str) {
        self.locked.insert(name.to_string());
    }

    pub fn unlock(&mut self, name: &str) {
        self.locked.remove(name);
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.locked.contains(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// Removes a cell entirely, for a `FOR` loop counter that didn't exist
    /// before the loop and shouldn't leak into the enclosing scope after it.
    pub fn remove(&mut self, name: &str) {
        self.cells.remove(name);
        self.locked.remove(name);
    }
}

#[derive(Clone, Debug)]
pub enum HeapEntry {
    /// The target of a pointer allocated by `NEW <Type>`: an independent,
    /// owned value with no backing frame cell.
    Pointee(Value),
    /// The target of a pointer produced by `@lvalue`: not a copy, but a
    /// standing description of the cell it was taken from. Reads and
    /// writes chase `Lvalue::resolve`/`resolve_mut` through to that cell,
    /// so `^p` sees and mutates the original storage.
    Alias(Lvalue),
    Object(ClassObject),
}

#[derive(Clone, Debug)]
pub struct ClassObject {
    pub class_name: String,
    pub fields: HashMap<String, Value>,
}

#[derive(Default, Debug)]
pub struct Heap {
    entries: HashMap<usize, HeapEntry>,
    next_id: usize,
}

impl Heap {
    pub fn alloc_pointee(&mut self, value: Value) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, HeapEntry::Pointee(value));
        id
    }

    pub fn alloc_object(&mut self, object: ClassObject) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, HeapEntry::Object(object));
        id
    }

    pub fn alloc_alias(&mut self, target: Lvalue) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, HeapEntry::Alias(target));
        id
    }

    pub fn get(&self, id: usize) -> Option<&HeapEntry> {
        self.entries.get(&id)
    }

    pub fn object(&self, id: usize) -> Option<&ClassObject> {
        match self.entries.get(&id) {
            Some(HeapEntry::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn object_mut(&mut self, id: usize) -> Option<&mut ClassObject> {
        match self.entries.get_mut(&id) {
            Some(HeapEntry::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn pointee(&self, id: usize) -> Option<&Value> {
        match self.entries.get(&id) {
            Some(HeapEntry::Pointee(v)) => Some(v),
            _ => None,
        }
    }

    pub fn pointee_mut(&mut self, id: usize) -> Option<&mut Value> {
        match self.entries.get_mut(&id) {
            Some(HeapEntry::Pointee(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Default, Debug)]
pub struct Store {
    pub frames: Vec<Frame>,
    pub heap: Heap,
}

impl Store {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            heap: Heap::default(),
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn top_frame_index(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn frame(&self, idx: usize) -> &Frame {
        &self.frames[idx]
    }

    pub fn frame_mut(&mut self, idx: usize) -> &mut Frame {
        &mut self.frames[idx]
    }
}

/// A description of a "place" a value can be read from or written to.
///
/// Hashable and comparable so callers (`@lvalue`) can memoize against one:
/// two `Lvalue`s that name the same place compare equal regardless of when
/// they were built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lvalue {
    Var { frame: usize, name: String },
    Index { base: Box<Lvalue>, indices: Vec<i32> },
    Field { base: Box<Lvalue>, name: String },
    ClassField { object_id: usize, name: String },
    /// `^p`: the boxed lvalue names where the *pointer value* lives; the
    /// target is found by reading it and following the heap id.
    Deref { pointer: Box<Lvalue>, line: usize },
}

impl Lvalue {
    pub fn get(&self, store: &Store) -> Result<Value, PrescribeError> {
        Ok(self.resolve(store)?.clone())
    }

    pub fn set(&self, store: &mut Store, value: Value) -> Result<(), PrescribeError> {
        *self.resolve_mut(store)? = value;
        Ok(())
    }

    fn resolve<'a>(&self, store: &'a Store) -> Result<&'a Value, PrescribeError> {
        match self {
            Lvalue::Var { frame, name } => match store.frame(*frame).cells.get(name) {
                Some(Cell::Direct(v)) => Ok(v),
                Some(Cell::Alias(target)) => target.resolve(store),
                None => Err(PrescribeError::runtime(0, format!("undefined variable `{}`", name))),
            },
            Lvalue::Index { base, indices } => {
                let base_val = base.resolve(store)?;
                match base_val {
                    Value::Array { dims, elems } => {
                        let offset = crate::value::flat_index(0, dims, indices)?;
                        Ok(&elems[offset])
                    }
                    _ => Err(PrescribeError::runtime(0, "indexing a non-array value")),
                }
            }
            Lvalue::Field { base, name } => {
                let base_val = base.resolve(store)?;
                match base_val {
                    Value::Record(fields) => fields
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| PrescribeError::name(0, format!("no field `{}`", name))),
                    _ => Err(PrescribeError::runtime(0, "field access on a non-record value")),
                }
            }
            Lvalue::ClassField { object_id, name } => store
                .heap
                .object(*object_id)
                .and_then(|o| o.fields.get(name))
                .ok_or_else(|| PrescribeError::name(0, format!("no field `{}`", name))),
            Lvalue::Deref { pointer, line } => {
                let ptr_val = pointer.resolve(store)?;
                match ptr_val {
                    Value::Pointer(Some(id)) => {
                        let id = *id;
                        match store.heap.get(id) {
                            Some(HeapEntry::Pointee(_)) => store
                                .heap
                                .pointee(id)
                                .ok_or_else(|| PrescribeError::runtime(*line, "dangling pointer")),
                            Some(HeapEntry::Alias(target)) => {
                                let target = target.clone();
                                target.resolve(store)
                            }
                            _ => Err(PrescribeError::runtime(*line, "dangling pointer")),
                        }
                    }
                    Value::Pointer(None) => Err(PrescribeError::runtime(*line, "null dereference")),
                    _ => Err(PrescribeError::runtime(*line, "dereferencing a non-pointer value")),
                }
            }
        }
    }

    fn resolve_mut<'a>(&self, store: &'a mut Store) -> Result<&'a mut Value, PrescribeError> {
        match self {
            Lvalue::Var { frame, name } => {
                let needs_alias = matches!(store.frame(*frame).cells.get(name), Some(Cell::Alias(_)));
                if needs_alias {
                    let target = match store.frame(*frame).cells.get(name) {
                        Some(Cell::Alias(target)) => (**target).clone(),
                        _ => unreachable!(),
                    };
                    target.resolve_mut(store)
                } else if store.frame(*frame).is_locked(name) {
                    Err(PrescribeError::access(0, format!("`{}` is a locked FOR loop counter", name)))
                } else {
                    match store.frame_mut(*frame).cells.get_mut(name) {
                        Some(Cell::Direct(v)) => Ok(v),
                        _ => Err(PrescribeError::runtime(0, format!("undefined variable `{}`", name))),
                    }
                }
            }
            Lvalue::Index { base, indices } => {
                let indices = indices.clone();
                let base_val = base.resolve_mut(store)?;
                match base_val {
                    Value::Array { dims, elems } => {
                        let offset = crate::value::flat_index(0, dims, &indices)?;
                        Ok(&mut elems[offset])
                    }
                    _ => Err(PrescribeError::runtime(0, "indexing a non-array value")),
                }
            }
            Lvalue::Field { base, name } => {
                let base_val = base.resolve_mut(store)?;
                match base_val {
                    Value::Record(fields) => fields
                        .iter_mut()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| PrescribeError::name(0, format!("no field `{}`", name))),
                    _ => Err(PrescribeError::runtime(0, "field access on a non-record value")),
                }
            }
            Lvalue::ClassField { object_id, name } => store
                .heap
                .object_mut(*object_id)
                .and_then(|o| o.fields.get_mut(name))
                .ok_or_else(|| PrescribeError::name(0, format!("no field `{}`", name))),
            Lvalue::Deref { pointer, line } => {
                let ptr_val = pointer.resolve(store)?.clone();
                match ptr_val {
                    Value::Pointer(Some(id)) => {
                        let alias = match store.heap.get(id) {
                            Some(HeapEntry::Pointee(_)) => None,
                            Some(HeapEntry::Alias(target)) => Some(target.clone()),
                            _ => return Err(PrescribeError::runtime(*line, "dangling pointer")),
                        };
                        match alias {
                            Some(target) => target.resolve_mut(store),
                            None => store
                                .heap
                                .pointee_mut(id)
                                .ok_or_else(|| PrescribeError::runtime(*line, "dangling pointer")),
                        }
                    }
                    Value::Pointer(None) => Err(PrescribeError::runtime(*line, "null dereference")),
                    _ => Err(PrescribeError::runtime(*line, "dereferencing a non-pointer value")),
                }
            }
        }
    }
}

/// Reads the value a pointer id currently refers to, whether it backs an
/// independently owned pointee (`NEW`) or aliases an existing cell (`@lvalue`).
pub fn read_pointee(store: &Store, id: usize, line: usize) -> Result<Value, PrescribeError> {
    match store.heap.get(id) {
        Some(HeapEntry::Pointee(v)) => Ok(v.clone()),
        Some(HeapEntry::Alias(target)) => {
            let target = target.clone();
            target.get(store)
        }
        _ => Err(PrescribeError::runtime(line, "dangling pointer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_direct_var_get_set() {
        let mut store = Store::new();
        store.frame_mut(0).declare("X", Value::Integer(1));
        let lv = Lvalue::Var { frame: 0, name: "X".into() };
        assert_eq!(lv.get(&store).unwrap(), Value::Integer(1));
        lv.set(&mut store, Value::Integer(2)).unwrap();
        assert_eq!(lv.get(&store).unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_alias_reads_and_writes_through_to_caller_frame() {
        let mut store = Store::new();
        store.frame_mut(0).declare("X", Value::Integer(10));
        store.push_frame();
        store.frame_mut(1).declare_alias("Param", Lvalue::Var { frame: 0, name: "X".into() });

        let param_lv = Lvalue::Var { frame: 1, name: "Param".into() };
        assert_eq!(param_lv.get(&store).unwrap(), Value::Integer(10));
        param_lv.set(&mut store, Value::Integer(99)).unwrap();

        let x_lv = Lvalue::Var { frame: 0, name: "X".into() };
        assert_eq!(x_lv.get(&store).unwrap(), Value::Integer(99));
    }

    #[test]
    fn test_array_element_lvalue() {
        let mut store = Store::new();
        store.frame_mut(0).declare(
            "A",
            Value::Array {
                dims: vec![(1, 3)],
                elems: vec![Value::Integer(0), Value::Integer(0), Value::Integer(0)],
            },
        );
        let lv = Lvalue::Index {
            base: Box::new(Lvalue::Var { frame: 0, name: "A".into() }),
            indices: vec![2],
        };
        lv.set(&mut store, Value::Integer(7)).unwrap();
        assert_eq!(lv.get(&store).unwrap(), Value::Integer(7));
    }

    #[test]
    fn test_null_deref_errors() {
        let mut store = Store::new();
        store.frame_mut(0).declare("P", Value::Pointer(None));
        let lv = Lvalue::Deref {
            pointer: Box::new(Lvalue::Var { frame: 0, name: "P".into() }),
            line: 3,
        };
        let err = lv.get(&store).unwrap_err();
        assert_eq!(err.message, "null dereference");
    }

    #[test]
    fn test_alias_pointee_writes_through_to_original_cell() {
        let mut store = Store::new();
        store.frame_mut(0).declare("X", Value::Integer(5));
        let x_lv = Lvalue::Var { frame: 0, name: "X".into() };
        let id = store.heap.alloc_alias(x_lv.clone());
        store.frame_mut(0).declare("P", Value::Pointer(Some(id)));

        let deref_lv = Lvalue::Deref {
            pointer: Box::new(Lvalue::Var { frame: 0, name: "P".into() }),
            line: 1,
        };
        assert_eq!(deref_lv.get(&store).unwrap(), Value::Integer(5));
        deref_lv.set(&mut store, Value::Integer(99)).unwrap();
        assert_eq!(x_lv.get(&store).unwrap(), Value::Integer(99));
        assert_eq!(read_pointee(&store, id, 1).unwrap(), Value::Integer(99));
    }

    #[test]
    fn test_class_field_through_heap() {
        let mut store = Store::new();
        let mut fields = HashMap::new();
        fields.insert("Name".to_string(), Value::String("Rex".into()));
        let id = store.heap.alloc_object(ClassObject {
            class_name: "Dog".into(),
            fields,
        });
        let lv = Lvalue::ClassField { object_id: id, name: "Name".into() };
        assert_eq!(lv.get(&store).unwrap(), Value::String("Rex".into()));
        lv.set(&mut store, Value::String("Fido".into())).unwrap();
        assert_eq!(lv.get(&store).unwrap(), Value::String("Fido".into()));
    }
}
