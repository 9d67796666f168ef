//! Binary record format
//!
//! A payload is the marker byte `0x00` followed by tagged records. Integers
//! are LEB128 varints (signed values zigzag-encoded), strings and symbols are
//! length-prefixed UTF-8, floats are 8 bytes little-endian.
//!
//! ```text
//! record := 0x01 flags [id] count slot*     flags bit 0: named
//! slot   := key value
//! value  := 0x10 zigzag | 0x11 f64 | 0x12 string | 0x13 symbol | 0x14 flags [id] count slot*
//! ```

use crate::error::FrameError;
use crate::store::{Handle, Slot, Store, Value};

/// First byte of every binary payload
pub const BINARY_MARKER: u8 = 0x00;

const TAG_RECORD: u8 = 0x01;
const TAG_INT: u8 = 0x10;
const TAG_FLOAT: u8 = 0x11;
const TAG_STR: u8 = 0x12;
const TAG_SYM: u8 = 0x13;
const TAG_NESTED: u8 = 0x14;

const FLAG_NAMED: u8 = 0x01;

pub(crate) const MAX_DEPTH: usize = 64;

/// Append `value` as an unsigned LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read an unsigned LEB128 varint at `*pos`, advancing it.
pub fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64, FrameError> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data.get(*pos).ok_or(FrameError::UnexpectedEnd)?;
        *pos += 1;
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(FrameError::InvalidVarint);
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Append a length-prefixed byte string.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Read a length-prefixed byte string.
pub fn read_bytes<'d>(data: &'d [u8], pos: &mut usize) -> Result<&'d [u8], FrameError> {
    let len = read_varint(data, pos)? as usize;
    let end = pos.checked_add(len).ok_or(FrameError::UnexpectedEnd)?;
    let bytes = data.get(*pos..end).ok_or(FrameError::UnexpectedEnd)?;
    *pos = end;
    Ok(bytes)
}

pub fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

pub fn read_str(data: &[u8], pos: &mut usize) -> Result<String, FrameError> {
    let bytes = read_bytes(data, pos)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Binary encoder for records.
pub struct Encoder<'a> {
    store: &'a Store,
    output: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            output: vec![BINARY_MARKER],
        }
    }

    /// Encode a stored record as a top-level definition.
    pub fn encode(&mut self, h: Handle) {
        let store = self.store;
        self.encode_record(store.id(h), store.slots(h));
    }

    /// Encode a record that is not (or not yet) stored.
    pub fn encode_record(&mut self, id: Option<&str>, slots: &[Slot]) {
        self.output.push(TAG_RECORD);
        self.write_body(id, slots);
    }

    pub fn output(self) -> Vec<u8> {
        self.output
    }

    fn write_body(&mut self, id: Option<&str>, slots: &[Slot]) {
        match id {
            Some(id) => {
                self.output.push(FLAG_NAMED);
                write_str(&mut self.output, id);
            }
            None => self.output.push(0),
        }
        write_varint(&mut self.output, slots.len() as u64);
        for slot in slots {
            let key = self.store.id(slot.key).unwrap_or_default();
            write_str(&mut self.output, key);
            self.write_value(&slot.value);
        }
    }

    fn write_value(&mut self, value: &Value) {
        match value {
            Value::Int(n) => {
                self.output.push(TAG_INT);
                write_varint(&mut self.output, zigzag(*n));
            }
            Value::Float(f) => {
                self.output.push(TAG_FLOAT);
                self.output.extend_from_slice(&f.to_le_bytes());
            }
            Value::Str(s) => {
                self.output.push(TAG_STR);
                write_str(&mut self.output, s);
            }
            Value::Ref(h) => {
                let store = self.store;
                match store.id(*h) {
                    Some(id) => {
                        self.output.push(TAG_SYM);
                        write_str(&mut self.output, id);
                    }
                    None => {
                        self.output.push(TAG_NESTED);
                        self.write_body(None, store.slots(*h));
                    }
                }
            }
        }
    }
}

/// Binary decoder materializing records into a store.
pub struct Decoder<'s, 'd> {
    store: &'s mut Store,
    data: &'d [u8],
    pos: usize,
}

impl<'s, 'd> Decoder<'s, 'd> {
    pub fn new(store: &'s mut Store, data: &'d [u8]) -> Self {
        Self {
            store,
            data,
            pos: 0,
        }
    }

    /// Decode every top-level record, in payload order.
    pub fn decode_all(mut self) -> Result<Vec<Handle>, FrameError> {
        match self.data.first() {
            Some(&BINARY_MARKER) => self.pos = 1,
            Some(_) => return Err(FrameError::UnknownFormat),
            None => return Err(FrameError::UnexpectedEnd),
        }

        let mut handles = Vec::new();
        while self.pos < self.data.len() {
            let tag = self.byte()?;
            if tag != TAG_RECORD {
                return Err(FrameError::UnknownTag(tag));
            }
            handles.push(self.read_body(0)?);
        }
        Ok(handles)
    }

    fn byte(&mut self) -> Result<u8, FrameError> {
        let b = *self.data.get(self.pos).ok_or(FrameError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_body(&mut self, depth: usize) -> Result<Handle, FrameError> {
        if depth > MAX_DEPTH {
            return Err(FrameError::Parse {
                offset: self.pos,
                message: "records nested too deeply".to_string(),
            });
        }

        let flags = self.byte()?;
        let id = if flags & FLAG_NAMED != 0 {
            Some(read_str(self.data, &mut self.pos)?)
        } else {
            None
        };

        let count = read_varint(self.data, &mut self.pos)?;
        let mut slots = Vec::new();
        for _ in 0..count {
            let key = read_str(self.data, &mut self.pos)?;
            let key = self.store.lookup(&key);
            let value = self.read_value(depth)?;
            slots.push(Slot { key, value });
        }

        let h = match id {
            Some(id) => self.store.lookup(&id),
            None => self.store.anonymous(),
        };
        self.store.replace_slots(h, slots);
        Ok(h)
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, FrameError> {
        match self.byte()? {
            TAG_INT => Ok(Value::Int(unzigzag(read_varint(self.data, &mut self.pos)?))),
            TAG_FLOAT => {
                let end = self.pos + 8;
                let bytes = self
                    .data
                    .get(self.pos..end)
                    .ok_or(FrameError::UnexpectedEnd)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                self.pos = end;
                Ok(Value::Float(f64::from_le_bytes(raw)))
            }
            TAG_STR => Ok(Value::Str(read_str(self.data, &mut self.pos)?)),
            TAG_SYM => {
                let id = read_str(self.data, &mut self.pos)?;
                Ok(Value::Ref(self.store.lookup(&id)))
            }
            TAG_NESTED => Ok(Value::Ref(self.read_body(depth + 1)?)),
            tag => Err(FrameError::UnknownTag(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(127)]
    #[case(128)]
    #[case(300)]
    #[case(u64::MAX)]
    fn test_varint(#[case] n: u64) {
        let mut buf = Vec::new();
        write_varint(&mut buf, n);
        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), n);
        assert_eq!(pos, buf.len());
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(63)]
    #[case(-64)]
    #[case(i64::MIN)]
    #[case(i64::MAX)]
    fn test_zigzag(#[case] n: i64) {
        assert_eq!(unzigzag(zigzag(n)), n);
    }

    #[test]
    fn test_truncated_varint() {
        let mut pos = 0;
        assert_eq!(read_varint(&[0x80, 0x80], &mut pos), Err(FrameError::UnexpectedEnd));
    }

    #[test]
    fn test_encode_decode_topic() {
        let mut store = Store::new();
        let name = store.lookup("name");
        let is = store.lookup("is");
        let born = store.lookup("P569");
        let q5 = store.lookup("Q5");
        let t = store.lookup("t/2/4");
        store.add(t, name, "Ada");
        store.add(t, born, 1815i64);
        store.add(t, born, 1815.5f64);
        let q = store.anonymous_with(vec![Slot::new(is, q5)]);
        store.add(t, is, q);

        let mut encoder = Encoder::new(&store);
        encoder.encode(t);
        let bytes = encoder.output();
        assert_eq!(bytes[0], BINARY_MARKER);

        let mut other = Store::new();
        let handles = Decoder::new(&mut other, &bytes).decode_all().unwrap();
        let t2 = handles[0];
        let name2 = other.find("name").unwrap();
        let born2 = other.find("P569").unwrap();
        let is2 = other.find("is").unwrap();
        assert_eq!(other.id(t2), Some("t/2/4"));
        assert_eq!(other.get_str(t2, name2), Some("Ada"));
        let births: Vec<_> = other.all(t2, born2).cloned().collect();
        assert_eq!(births, vec![Value::Int(1815), Value::Float(1815.5)]);
        let q2 = other.get_handle(t2, is2).unwrap();
        assert!(other.is_anonymous(q2));
        assert_eq!(other.get_handle(q2, is2), other.find("Q5"));
    }

    #[test]
    fn test_truncated_payload() {
        let mut store = Store::new();
        let name = store.lookup("name");
        let t = store.lookup("t/1/1");
        store.add(t, name, "Truncate me");
        let mut encoder = Encoder::new(&store);
        encoder.encode(t);
        let mut bytes = encoder.output();
        bytes.truncate(bytes.len() - 3);

        let mut other = Store::new();
        assert_eq!(
            Decoder::new(&mut other, &bytes).decode_all(),
            Err(FrameError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_unknown_tag() {
        let mut store = Store::new();
        assert_eq!(
            Decoder::new(&mut store, &[BINARY_MARKER, 0x7F]).decode_all(),
            Err(FrameError::UnknownTag(0x7F))
        );
    }
}
