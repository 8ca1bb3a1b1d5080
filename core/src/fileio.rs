//! Text and random file handles (`spec.md` §4.7) and the fixed-layout
//! little-endian binary record codec. The codec is value-driven rather
//! than type-driven: encoding reads whatever shape the `Value` already
//! has, and decoding is handed a same-shaped "template" value (the
//! lvalue's current contents) so an `ARRAY`'s dimensions never need a
//! second, separate source of truth.

use crate::date::Date;
use crate::error::{PrResult, PrescribeError};
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

impl FileMode {
    pub fn parse(line: usize, s: &str) -> PrResult<Self> {
        match s.to_uppercase().as_str() {
            "READ" => Ok(FileMode::Read),
            "WRITE" => Ok(FileMode::Write),
            "APPEND" => Ok(FileMode::Append),
            other => Err(PrescribeError::file(line, format!("unknown file mode `{}`", other))),
        }
    }
}

fn split_lines(content: &str) -> Vec<String> {
    content.split("\r\n").flat_map(|s| s.split('\n')).map(str::to_string).collect()
}

pub struct TextFileHandle {
    mode: FileMode,
    path: String,
    read_lines: Vec<String>,
    read_cursor: usize,
    write_lines: Vec<String>,
    existing_for_append: String,
    pub open: bool,
}

impl TextFileHandle {
    pub fn open(line: usize, path: &str, mode: FileMode) -> PrResult<Self> {
        match mode {
            FileMode::Read => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| PrescribeError::file(line, format!("cannot open `{}` for reading: {}", path, e)))?;
                Ok(Self {
                    mode,
                    path: path.to_string(),
                    read_lines: split_lines(&content),
                    read_cursor: 0,
                    write_lines: Vec::new(),
                    existing_for_append: String::new(),
                    open: true,
                })
            }
            FileMode::Write => Ok(Self {
                mode,
                path: path.to_string(),
                read_lines: Vec::new(),
                read_cursor: 0,
                write_lines: Vec::new(),
                existing_for_append: String::new(),
                open: true,
            }),
            FileMode::Append => {
                let existing = std::fs::read_to_string(path).unwrap_or_default();
                Ok(Self {
                    mode,
                    path: path.to_string(),
                    read_lines: Vec::new(),
                    read_cursor: 0,
                    write_lines: Vec::new(),
                    existing_for_append: existing,
                    open: true,
                })
            }
        }
    }

    pub fn read_line(&mut self, line: usize) -> PrResult<String> {
        if !self.open {
            return Err(PrescribeError::file(line, "file is closed"));
        }
        if self.read_cursor >= self.read_lines.len() {
            return Err(PrescribeError::file(line, "read past end of file"));
        }
        let text = self.read_lines[self.read_cursor].trim().to_string();
        self.read_cursor += 1;
        Ok(text)
    }

    pub fn write_line(&mut self, line: usize, text: String) -> PrResult<()> {
        if !self.open {
            return Err(PrescribeError::file(line, "file is closed"));
        }
        if self.mode == FileMode::Read {
            return Err(PrescribeError::file(line, "cannot WRITEFILE a file opened for READ"));
        }
        self.write_lines.push(text);
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        !self.open || self.read_cursor >= self.read_lines.len()
    }

    pub fn close(&mut self, line: usize) -> PrResult<()> {
        if !self.open {
            return Err(PrescribeError::file(line, "file already closed"));
        }
        self.open = false;
        if self.mode == FileMode::Read {
            return Ok(());
        }
        let joined: String = self.write_lines.iter().map(|l| format!("{}\n", l)).collect();
        let content = if self.mode == FileMode::Append {
            format!("{}{}", self.existing_for_append, joined)
        } else {
            joined
        };
        std::fs::write(&self.path, content)
            .map_err(|e| PrescribeError::file(line, format!("cannot write `{}`: {}", self.path, e)))
    }
}

pub struct RandomFileHandle {
    path: String,
    buffer: Vec<u8>,
    /// 1-based current record position.
    position: usize,
    record_size: usize,
    pub open: bool,
}

impl RandomFileHandle {
    pub fn open(path: &str, record_size: usize) -> Self {
        let buffer = std::fs::read(path).unwrap_or_default();
        Self {
            path: path.to_string(),
            buffer,
            position: 1,
            record_size,
            open: true,
        }
    }

    pub fn seek(&mut self, line: usize, k: i32) -> PrResult<()> {
        if k < 1 {
            return Err(PrescribeError::range(line, "SEEK position must be >= 1"));
        }
        self.position = k as usize;
        Ok(())
    }

    pub fn get_record(&self, line: usize, template: &Value) -> PrResult<Value> {
        let offset = (self.position - 1) * self.record_size;
        if offset + self.record_size > self.buffer.len() {
            return Err(PrescribeError::file(line, "read past end of random file"));
        }
        let mut cursor = offset;
        decode_value(line, &self.buffer, &mut cursor, template)
    }

    pub fn put_record(&mut self, line: usize, v: &Value) -> PrResult<()> {
        let bytes = encode_value(line, v)?;
        let offset = (self.position - 1) * self.record_size;
        let needed = offset + bytes.len();
        if self.buffer.len() < needed {
            self.buffer.resize(needed, 0);
        }
        self.buffer[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        !self.open || self.position > (self.buffer.len() / self.record_size.max(1))
    }

    pub fn close(&mut self, line: usize) -> PrResult<()> {
        if !self.open {
            return Err(PrescribeError::file(line, "file already closed"));
        }
        self.open = false;
        std::fs::write(&self.path, &self.buffer)
            .map_err(|e| PrescribeError::file(line, format!("cannot write `{}`: {}", self.path, e)))
    }
}

/// The byte size a value would take in a random-file record, or `None` if
/// it contains a type the codec cannot represent (`String`, `Set`,
/// `Pointer`, a class reference, or a file handle) — used by the checker
/// to reject ineligible record types up front.
pub fn record_byte_size(v: &Value) -> Option<usize> {
    match v {
        Value::Integer(_) | Value::Date(_) | Value::Char(_) => Some(4),
        Value::Real(_) => Some(8),
        Value::Boolean(_) => Some(1),
        Value::Array { elems, .. } => {
            if elems.is_empty() {
                Some(0)
            } else {
                let one = record_byte_size(&elems[0])?;
                Some(one * elems.len())
            }
        }
        Value::Record(fields) => {
            let mut total = 0;
            for (_, v) in fields {
                total += record_byte_size(v)?;
            }
            Some(total)
        }
        _ => None,
    }
}

fn encode_value(line: usize, v: &Value) -> PrResult<Vec<u8>> {
    match v {
        Value::Integer(n) => Ok(n.to_le_bytes().to_vec()),
        Value::Real(x) => Ok(x.to_le_bytes().to_vec()),
        Value::Boolean(b) => Ok(vec![if *b { 1 } else { 0 }]),
        Value::Char(c) => Ok((*c as u32).to_le_bytes().to_vec()),
        Value::Date(d) => Ok(d.to_day_number().to_le_bytes().to_vec()),
        Value::Array { elems, .. } => {
            let mut out = Vec::new();
            for e in elems {
                out.extend(encode_value(line, e)?);
            }
            Ok(out)
        }
        Value::Record(fields) => {
            let mut out = Vec::new();
            for (_, v) in fields {
                out.extend(encode_value(line, v)?);
            }
            Ok(out)
        }
        other => Err(PrescribeError::file(line, format!("a {} field cannot be stored in a random file", other.type_name()))),
    }
}

fn take_bytes<'a>(line: usize, bytes: &'a [u8], cursor: &mut usize, n: usize) -> PrResult<&'a [u8]> {
    if *cursor + n > bytes.len() {
        return Err(PrescribeError::file(line, "read past end of record"));
    }
    let slice = &bytes[*cursor..*cursor + n];
    *cursor += n;
    Ok(slice)
}

fn decode_value(line: usize, bytes: &[u8], cursor: &mut usize, template: &Value) -> PrResult<Value> {
    match template {
        Value::Integer(_) => {
            let b = take_bytes(line, bytes, cursor, 4)?;
            Ok(Value::Integer(i32::from_le_bytes(b.try_into().unwrap())))
        }
        Value::Real(_) => {
            let b = take_bytes(line, bytes, cursor, 8)?;
            Ok(Value::Real(f64::from_le_bytes(b.try_into().unwrap())))
        }
        Value::Boolean(_) => {
            let b = take_bytes(line, bytes, cursor, 1)?;
            Ok(Value::Boolean(b[0] != 0))
        }
        Value::Char(_) => {
            let b = take_bytes(line, bytes, cursor, 4)?;
            let n = u32::from_le_bytes(b.try_into().unwrap());
            Ok(Value::Char(char::from_u32(n).unwrap_or('\u{FFFD}')))
        }
        Value::Date(_) => {
            let b = take_bytes(line, bytes, cursor, 4)?;
            let n = i32::from_le_bytes(b.try_into().unwrap());
            Ok(Value::Date(Date::from_day_number(n)))
        }
        Value::Array { dims, elems } => {
            let mut out = Vec::with_capacity(elems.len());
            for e in elems {
                out.push(decode_value(line, bytes, cursor, e)?);
            }
            Ok(Value::Array { dims: dims.clone(), elems: out })
        }
        Value::Record(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for (name, v) in fields {
                out.push((name.clone(), decode_value(line, bytes, cursor, v)?));
            }
            Ok(Value::Record(out))
        }
        other => Err(PrescribeError::file(line, format!("a {} field cannot be read from a random file", other.type_name()))),
    }
}

pub enum FileHandle {
    Text(TextFileHandle),
    Random(RandomFileHandle),
}

/// Owns every open file handle for one program run, indexed by a stable
/// id that `Value::TextFile`/`Value::RandomFile` carry.
#[derive(Default)]
pub struct FileTable {
    handles: Vec<FileHandle>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: FileHandle) -> usize {
        self.handles.push(handle);
        self.handles.len() - 1
    }

    pub fn text_mut(&mut self, line: usize, id: usize) -> PrResult<&mut TextFileHandle> {
        match self.handles.get_mut(id) {
            Some(FileHandle::Text(h)) => Ok(h),
            Some(FileHandle::Random(_)) => Err(PrescribeError::file(line, "expected a text file handle")),
            None => Err(PrescribeError::file(line, "invalid file handle")),
        }
    }

    pub fn random_mut(&mut self, line: usize, id: usize) -> PrResult<&mut RandomFileHandle> {
        match self.handles.get_mut(id) {
            Some(FileHandle::Random(h)) => Ok(h),
            Some(FileHandle::Text(_)) => Err(PrescribeError::file(line, "expected a random file handle")),
            None => Err(PrescribeError::file(line, "invalid file handle")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_byte_size_rejects_string_fields() {
        let v = Value::Record(vec![("Name".to_string(), Value::String("x".into()))]);
        assert!(record_byte_size(&v).is_none());
    }

    #[test]
    fn test_record_byte_size_of_mixed_record() {
        let v = Value::Record(vec![
            ("N".to_string(), Value::Integer(0)),
            ("D".to_string(), Value::Date(Date::new(1, 1, 1).unwrap())),
        ]);
        assert_eq!(record_byte_size(&v), Some(8));
    }

    #[test]
    fn test_encode_decode_round_trip_record() {
        let template = Value::Record(vec![
            ("N".to_string(), Value::Integer(0)),
            ("D".to_string(), Value::Date(Date::new(1, 1, 1).unwrap())),
        ]);
        let value = Value::Record(vec![
            ("N".to_string(), Value::Integer(7)),
            ("D".to_string(), Value::Date(Date::new(2024, 2, 29).unwrap())),
        ]);
        let bytes = encode_value(1, &value).unwrap();
        assert_eq!(bytes.len(), 8);
        let mut cursor = 0;
        let decoded = decode_value(1, &bytes, &mut cursor, &template).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_encode_decode_round_trip_array() {
        let template = Value::Array { dims: vec![(1, 3)], elems: vec![Value::Integer(0); 3] };
        let value = Value::Array { dims: vec![(1, 3)], elems: vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)] };
        let bytes = encode_value(1, &value).unwrap();
        assert_eq!(bytes.len(), 12);
        let mut cursor = 0;
        assert_eq!(decode_value(1, &bytes, &mut cursor, &template).unwrap(), value);
    }

    #[test]
    fn test_random_file_put_then_get_record() {
        let template = Value::Record(vec![("N".to_string(), Value::Integer(0))]);
        let mut handle = RandomFileHandle { path: "unused".into(), buffer: Vec::new(), position: 1, record_size: 4, open: true };
        let value = Value::Record(vec![("N".to_string(), Value::Integer(42))]);
        handle.put_record(1, &value).unwrap();
        assert_eq!(handle.get_record(1, &template).unwrap(), value);
    }

    #[test]
    fn test_random_file_eof() {
        let handle = RandomFileHandle { path: "unused".into(), buffer: vec![0; 8], position: 3, record_size: 4, open: true };
        assert!(handle.is_eof());
        let handle2 = RandomFileHandle { path: "unused".into(), buffer: vec![0; 8], position: 2, record_size: 4, open: true };
        assert!(!handle2.is_eof());
    }
}
