//! Append-only record arena

use std::collections::HashMap;

/// Opaque reference to a record in a [`Store`].
///
/// Handles are only meaningful for the store that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Position of the record in the arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Slot value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    /// Reference to a named or anonymous record
    Ref(Handle),
}

impl Value {
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Ref(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Value::Ref(h)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// A single `(key, value)` pair of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub key: Handle,
    pub value: Value,
}

impl Slot {
    pub fn new(key: Handle, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Record {
    id: Option<String>,
    bound: bool,
    slots: Vec<Slot>,
    /// Position of the first slot for each key
    first: HashMap<Handle, usize>,
}

impl Record {
    fn reindex(&mut self) {
        self.first.clear();
        for (i, slot) in self.slots.iter().enumerate() {
            self.first.entry(slot.key).or_insert(i);
        }
    }
}

/// Process-wide record arena with symbol interning.
///
/// Records are never removed. [`Store::unbind`] drops a record's identity and
/// content, but its handle remains valid.
#[derive(Debug, Default)]
pub struct Store {
    records: Vec<Record>,
    symbols: HashMap<String, Handle>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records ever allocated
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Intern `id`, creating an empty named record if it does not exist yet.
    pub fn lookup(&mut self, id: &str) -> Handle {
        if let Some(&h) = self.symbols.get(id) {
            return h;
        }
        let h = self.push(Record {
            id: Some(id.to_string()),
            bound: true,
            ..Default::default()
        });
        self.symbols.insert(id.to_string(), h);
        h
    }

    /// Resolve `id` without interning it.
    pub fn find(&self, id: &str) -> Option<Handle> {
        self.symbols.get(id).copied()
    }

    /// Allocate a new anonymous record.
    pub fn anonymous(&mut self) -> Handle {
        self.push(Record::default())
    }

    /// Allocate a new anonymous record with the given slots.
    pub fn anonymous_with(&mut self, slots: Vec<Slot>) -> Handle {
        let h = self.anonymous();
        self.replace_slots(h, slots);
        h
    }

    /// Id of a named record. Unbound records keep reporting their former id.
    pub fn id(&self, h: Handle) -> Option<&str> {
        self.record(h).id.as_deref()
    }

    pub fn is_anonymous(&self, h: Handle) -> bool {
        self.record(h).id.is_none()
    }

    /// True for named records whose id still resolves to them.
    pub fn is_bound(&self, h: Handle) -> bool {
        self.record(h).bound
    }

    pub fn slots(&self, h: Handle) -> &[Slot] {
        &self.record(h).slots
    }

    /// First value for `key`.
    pub fn get(&self, h: Handle, key: Handle) -> Option<&Value> {
        let record = self.record(h);
        record.first.get(&key).map(|&i| &record.slots[i].value)
    }

    pub fn get_str(&self, h: Handle, key: Handle) -> Option<&str> {
        self.get(h, key).and_then(Value::as_str)
    }

    pub fn get_handle(&self, h: Handle, key: Handle) -> Option<Handle> {
        self.get(h, key).and_then(Value::as_handle)
    }

    pub fn get_int(&self, h: Handle, key: Handle) -> Option<i64> {
        self.get(h, key).and_then(Value::as_int)
    }

    /// All values for `key`, in slot order.
    pub fn all(&self, h: Handle, key: Handle) -> impl Iterator<Item = &Value> + '_ {
        self.record(h)
            .slots
            .iter()
            .filter(move |s| s.key == key)
            .map(|s| &s.value)
    }

    pub fn has(&self, h: Handle, key: Handle) -> bool {
        self.record(h).first.contains_key(&key)
    }

    /// Append a slot. Repeated keys are kept.
    pub fn add(&mut self, h: Handle, key: Handle, value: impl Into<Value>) {
        let record = self.record_mut(h);
        record.first.entry(key).or_insert(record.slots.len());
        record.slots.push(Slot::new(key, value));
    }

    /// Replace the first value for `key`, or append it.
    pub fn set(&mut self, h: Handle, key: Handle, value: impl Into<Value>) {
        let record = self.record_mut(h);
        match record.first.get(&key) {
            Some(&i) => record.slots[i].value = value.into(),
            None => {
                record.first.insert(key, record.slots.len());
                record.slots.push(Slot::new(key, value));
            }
        }
    }

    /// Remove every slot with `key`. Returns the number removed.
    pub fn remove(&mut self, h: Handle, key: Handle) -> usize {
        let record = self.record_mut(h);
        let before = record.slots.len();
        record.slots.retain(|s| s.key != key);
        let removed = before - record.slots.len();
        if removed > 0 {
            record.reindex();
        }
        removed
    }

    /// Overwrite the value of the slot at `index`, keeping its key.
    pub fn set_value_at(&mut self, h: Handle, index: usize, value: Value) {
        self.record_mut(h).slots[index].value = value;
    }

    pub fn replace_slots(&mut self, h: Handle, slots: Vec<Slot>) {
        let record = self.record_mut(h);
        record.slots = slots;
        record.reindex();
    }

    /// Discard the identity of a named record: its id stops resolving and
    /// its slots are dropped.
    pub fn unbind(&mut self, h: Handle) {
        if let Some(id) = self.record(h).id.clone() {
            if self.symbols.get(&id) == Some(&h) {
                self.symbols.remove(&id);
            }
        }
        let record = self.record_mut(h);
        record.bound = false;
        record.slots.clear();
        record.first.clear();
    }

    fn push(&mut self, record: Record) -> Handle {
        let h = Handle(self.records.len() as u32);
        self.records.push(record);
        h
    }

    fn record(&self, h: Handle) -> &Record {
        &self.records[h.index()]
    }

    fn record_mut(&mut self, h: Handle) -> &mut Record {
        &mut self.records[h.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_interns() {
        let mut store = Store::new();
        let a = store.lookup("Q42");
        let b = store.lookup("Q42");
        assert_eq!(a, b);
        assert_eq!(store.find("Q42"), Some(a));
        assert_eq!(store.find("Q43"), None);
        assert!(store.is_bound(a));
        assert!(!store.is_anonymous(a));
    }

    #[test]
    fn test_repeated_keys() {
        let mut store = Store::new();
        let alias = store.lookup("alias");
        let t = store.lookup("t/1/1");
        store.add(t, alias, "Bob");
        store.add(t, alias, "Robert");

        let all: Vec<_> = store.all(t, alias).filter_map(Value::as_str).collect();
        assert_eq!(all, vec!["Bob", "Robert"]);
        assert_eq!(store.get_str(t, alias), Some("Bob"));
    }

    #[test]
    fn test_set_and_remove_keep_index() {
        let mut store = Store::new();
        let name = store.lookup("name");
        let alias = store.lookup("alias");
        let t = store.lookup("t/1/1");
        store.add(t, alias, "x");
        store.add(t, name, "Alice");
        store.set(t, name, "Alicia");
        assert_eq!(store.slots(t).len(), 2);
        assert_eq!(store.get_str(t, name), Some("Alicia"));

        assert_eq!(store.remove(t, alias), 1);
        assert_eq!(store.get_str(t, name), Some("Alicia"));
        assert_eq!(store.get(t, alias), None);
    }

    #[test]
    fn test_unbind() {
        let mut store = Store::new();
        let name = store.lookup("name");
        let t = store.lookup("t/1/7");
        store.add(t, name, "Gone");
        store.unbind(t);

        assert!(!store.is_bound(t));
        assert_eq!(store.id(t), Some("t/1/7"));
        assert!(store.slots(t).is_empty());
        assert_eq!(store.find("t/1/7"), None);

        let fresh = store.lookup("t/1/7");
        assert_ne!(fresh, t);
    }

    #[test]
    fn test_anonymous_records() {
        let mut store = Store::new();
        let is = store.lookup("is");
        let item = store.lookup("Q5");
        let q = store.anonymous_with(vec![Slot::new(is, item)]);
        assert!(store.is_anonymous(q));
        assert_eq!(store.get_handle(q, is), Some(item));
    }
}
