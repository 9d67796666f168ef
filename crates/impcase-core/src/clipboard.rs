//! Clipboard transfer of topic selections
//!
//! A clipboard payload holds the selected topic records followed by a
//! wrapper record listing them in order:
//!
//! ```text
//! {=t/7/2 name:"Alice" is:Q42}
//! {=t/7/5 name:"Bob" P3342:t/7/2}
//! {topics:t/7/2 topics:t/7/5}
//! ```
//!
//! Payloads are parsed into a throwaway [`Store`], never the live one.
//! Pasting resolves each record against the live case: known topics are
//! linked, scraps are undeleted, and foreign topics are copied under fresh
//! ids with their cross-references remapped.

use std::collections::HashMap;

use impress_frames::{parse_payload, Encoder, Handle, Printer, Slot, Store, Value, BINARY_MARKER};

use crate::document::CaseDocument;
use crate::error::{Result, ValidationError};
use crate::topic::{topic_id, TopicState};

/// Serialization used for clipboard payloads and case snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClipFormat {
    #[default]
    Text,
    Binary,
}

/// Topic records read from a clipboard payload.
#[derive(Debug)]
pub struct Clipping {
    store: Store,
    topics: Vec<Handle>,
}

impl Clipping {
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Parsed topic records, in selection order
    pub fn topics(&self) -> &[Handle] {
        &self.topics
    }

    pub fn ids(&self) -> Vec<&str> {
        self.topics
            .iter()
            .filter_map(|&t| self.store.id(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Serialize `topics` of `doc` into a clipboard payload.
pub fn write(doc: &CaseDocument, topics: &[Handle], format: ClipFormat) -> Vec<u8> {
    let store = doc.store();
    let wrapper: Vec<Slot> = topics
        .iter()
        .map(|&t| Slot::new(doc.names().topics, t))
        .collect();

    match format {
        ClipFormat::Text => {
            let mut printer = Printer::new(store);
            for &topic in topics {
                printer.print(topic);
            }
            printer.print_record(None, &wrapper);
            printer.into_output().into_bytes()
        }
        ClipFormat::Binary => {
            let mut encoder = Encoder::new(store);
            for &topic in topics {
                encoder.encode(topic);
            }
            encoder.encode_record(None, &wrapper);
            encoder.output()
        }
    }
}

fn has_marker(payload: &[u8]) -> bool {
    match payload.first() {
        Some(&BINARY_MARKER) => true,
        _ => payload
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|&b| b == b'{'),
    }
}

/// Parse a clipboard payload.
///
/// Returns `Ok(None)` for payloads that are not in a record format, so they
/// can be handed to other paste handlers.
pub fn read(payload: &[u8]) -> Result<Option<Clipping>> {
    if !has_marker(payload) {
        return Ok(None);
    }

    let mut store = Store::new();
    let records = parse_payload(&mut store, payload)?;
    let topics_key = store.lookup("topics");

    let wrapper = records
        .iter()
        .rev()
        .copied()
        .find(|&h| store.is_anonymous(h) && store.has(h, topics_key));
    let topics: Vec<Handle> = match wrapper {
        // Inline anonymous entries have no id to paste under.
        Some(w) => store
            .all(w, topics_key)
            .filter_map(Value::as_handle)
            .filter(|&h| !store.is_anonymous(h))
            .collect(),
        // Bare record text: every named record is a topic.
        None => records
            .into_iter()
            .filter(|&h| !store.is_anonymous(h))
            .collect(),
    };

    tracing::debug!(topics = topics.len(), "Read clipboard");
    Ok(Some(Clipping { store, topics }))
}

/// Copy a value from a clipping into the live store. Named references go
/// through `remap` first; anonymous records are copied recursively.
fn copy_value(
    from: &Store,
    to: &mut Store,
    remap: &HashMap<String, Handle>,
    value: &Value,
) -> Value {
    match value {
        Value::Ref(h) => match from.id(*h) {
            Some(id) => Value::Ref(remap.get(id).copied().unwrap_or_else(|| to.lookup(id))),
            None => {
                let slots = copy_slots(from, to, remap, *h);
                Value::Ref(to.anonymous_with(slots))
            }
        },
        other => other.clone(),
    }
}

fn copy_slots(
    from: &Store,
    to: &mut Store,
    remap: &HashMap<String, Handle>,
    record: Handle,
) -> Vec<Slot> {
    from.slots(record)
        .iter()
        .map(|slot| {
            let key = to.lookup(from.id(slot.key).unwrap_or_default());
            Slot {
                key,
                value: copy_value(from, to, remap, &slot.value),
            }
        })
        .collect()
}

impl CaseDocument {
    fn live_topic(&self, id: &str) -> Option<(Handle, TopicState)> {
        let h = self.store.find(id)?;
        match self.state(h)? {
            TopicState::Purged => None,
            state => Some((h, state)),
        }
    }

    /// Number of clipped topics that need a new id when pasted.
    pub fn foreign_count(&self, clip: &Clipping) -> usize {
        clip.ids()
            .into_iter()
            .filter(|id| self.live_topic(id).is_none())
            .count()
    }

    /// Paste clipped topics into the current folder.
    ///
    /// `ids` must hold at least [`CaseDocument::foreign_count`] topic
    /// sequence numbers from the issuing authority. Returns the live topics
    /// in clipping order.
    pub fn paste(&mut self, clip: &Clipping, ids: &[u64]) -> Result<Vec<Handle>> {
        self.check_insertable()?;
        let needed = self.foreign_count(clip);
        if ids.len() < needed {
            return Err(ValidationError::MissingIds {
                needed,
                got: ids.len(),
            }
            .into());
        }

        // Assign live handles first so references between pasted records
        // resolve to the new topics.
        let mut fresh = ids.iter();
        let mut remap: HashMap<String, Handle> = HashMap::new();
        let mut plan = Vec::with_capacity(clip.len());
        for &topic in clip.topics() {
            let Some(id) = clip.store.id(topic) else {
                continue;
            };
            match self.live_topic(id) {
                Some((live, _)) => plan.push((live, None)),
                None => {
                    let Some(&seq) = fresh.next() else {
                        return Err(ValidationError::MissingIds {
                            needed,
                            got: ids.len(),
                        }
                        .into());
                    };
                    let live = self.store.lookup(&topic_id(self.caseid, seq));
                    remap.insert(id.to_string(), live);
                    plan.push((live, Some(topic)));
                }
            }
        }

        let mut pasted = Vec::with_capacity(plan.len());
        for (live, source) in plan {
            if let Some(source) = source {
                let slots = copy_slots(&clip.store, &mut self.store, &remap, source);
                self.store.replace_slots(live, slots);
            }
            self.add_topic(live)?;
            pasted.push(live);
        }

        // Existing references to the old ids now point at the copies.
        for (old, &live) in &remap {
            if let Some(stale) = self.store.find(old) {
                if stale != live {
                    self.redirect(stale, &Value::Ref(live));
                }
            }
        }

        tracing::info!(
            caseid = self.caseid,
            pasted = pasted.len(),
            copied = remap.len(),
            "Pasted topics"
        );
        Ok(pasted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicSeed;
    use rstest::rstest;

    #[rstest]
    #[case(ClipFormat::Text)]
    #[case(ClipFormat::Binary)]
    fn test_write_read(#[case] format: ClipFormat) {
        let mut doc = CaseDocument::new(4, "Case");
        let a = doc.new_topic(TopicSeed::item("Q42", Some("Douglas \"DNA\" Adams".into()))).unwrap();
        let b = doc.new_topic(TopicSeed::named("Ford")).unwrap();
        doc.edit_topic(b, |store, names, t| {
            let born = store.lookup("P569");
            let q = store.anonymous_with(vec![Slot::new(names.is, a), Slot::new(born, 1952i64)]);
            store.add(t, names.alias, q);
            store.add(t, born, 3.5f64);
        })
        .unwrap();

        let payload = write(&doc, &[a, b], format);
        let clip = read(&payload).unwrap().unwrap();
        assert_eq!(clip.ids(), vec!["t/4/1", "t/4/2"]);

        let cs = clip.store();
        let name = cs.find("name").unwrap();
        let alias = cs.find("alias").unwrap();
        let born = cs.find("P569").unwrap();
        let is = cs.find("is").unwrap();
        let [ca, cb] = [clip.topics()[0], clip.topics()[1]];
        assert_eq!(cs.get_str(ca, name), Some("Douglas \"DNA\" Adams"));
        assert_eq!(cs.id(cs.get_handle(ca, is).unwrap()), Some("Q42"));
        let q = cs.get_handle(cb, alias).unwrap();
        assert!(cs.is_anonymous(q));
        assert_eq!(cs.get_handle(q, is), Some(ca));
        assert_eq!(cs.get_int(q, born), Some(1952));
        assert_eq!(cs.get(cb, born), Some(&Value::Float(3.5)));
    }

    #[rstest]
    #[case(b"https://example.org/Q42".as_slice())]
    #[case(b"".as_slice())]
    #[case(b"plain words".as_slice())]
    fn test_read_plain_text(#[case] payload: &[u8]) {
        assert!(read(payload).unwrap().is_none());
    }

    #[test]
    fn test_inline_wrapper_entries_are_skipped() {
        let mut doc = CaseDocument::new(4, "Case");
        let payload = br#"{topics:{name:"Stray"}}"#;
        let clip = read(payload).unwrap().unwrap();
        assert!(clip.is_empty());
        assert_eq!(doc.foreign_count(&clip), 0);

        assert!(doc.paste(&clip, &[]).unwrap().is_empty());
        assert_eq!(doc.topic("t/4/0"), None);
        assert_eq!(doc.topics().len(), 1);
        assert_eq!(doc.next_id(), 1);
    }

    #[test]
    fn test_read_malformed() {
        assert!(read(b"{=t/1/1 name:\"unterminated}").is_err());
    }

    #[test]
    fn test_read_deeply_nested() {
        let payload = format!("{{=t/1/1 a:{}", "{a:".repeat(200_000));
        assert!(read(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_paste_live_topic_links() {
        let mut doc = CaseDocument::new(4, "Case");
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        let payload = write(&doc, &[a], ClipFormat::Text);
        doc.add_folder("Other").unwrap();

        let clip = read(&payload).unwrap().unwrap();
        assert_eq!(doc.foreign_count(&clip), 0);
        let pasted = doc.paste(&clip, &[]).unwrap();

        assert_eq!(pasted, vec![a]);
        assert_eq!(doc.topics().iter().filter(|&&t| t == a).count(), 1);
        assert_eq!(doc.refcount(a), 2);
        assert_eq!(doc.folder("Other").unwrap().topics, vec![a]);
    }

    #[test]
    fn test_paste_undeletes_scrap() {
        let mut doc = CaseDocument::new(4, "Case");
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        let payload = write(&doc, &[a], ClipFormat::Binary);
        doc.delete_topics(&[a]).unwrap();
        assert_eq!(doc.state(a), Some(TopicState::Scrap));

        let clip = read(&payload).unwrap().unwrap();
        doc.paste(&clip, &[]).unwrap();
        assert_eq!(doc.state(a), Some(TopicState::Active));
        assert!(doc.scraps().is_empty());
    }

    #[test]
    fn test_paste_foreign_remaps_ids() {
        let mut source = CaseDocument::new(9, "Source");
        let x = source.new_topic(TopicSeed::named("X")).unwrap();
        let y = source.new_topic(TopicSeed::named("Y")).unwrap();
        source
            .edit_topic(y, |store, names, t| {
                let q = store.anonymous_with(vec![Slot::new(names.is, x)]);
                store.add(t, names.is, x);
                store.add(t, names.alias, q);
            })
            .unwrap();
        let payload = write(&source, &[x, y], ClipFormat::Binary);

        let mut doc = CaseDocument::new(4, "Target");
        let clip = read(&payload).unwrap().unwrap();
        assert_eq!(doc.foreign_count(&clip), 2);
        assert!(matches!(
            doc.paste(&clip, &[1]),
            Err(crate::CaseError::Validation(ValidationError::MissingIds { needed: 2, got: 1 }))
        ));
        assert_eq!(doc.topics().len(), 1);

        let pasted = doc.paste(&clip, &[1, 2]).unwrap();
        assert_eq!(doc.id_of(pasted[0]), "t/4/1");
        assert_eq!(doc.id_of(pasted[1]), "t/4/2");

        let names = *doc.names();
        let store = doc.store();
        assert_eq!(store.get_str(pasted[0], names.name), Some("X"));
        assert_eq!(store.get_handle(pasted[1], names.is), Some(pasted[0]));
        let q = store.get_handle(pasted[1], names.alias).unwrap();
        assert_eq!(store.get_handle(q, names.is), Some(pasted[0]));
        assert_eq!(doc.folder("General").unwrap().len(), 3);
    }

    #[test]
    fn test_paste_redirects_existing_links() {
        let mut source = CaseDocument::new(9, "Source");
        let x = source.new_topic(TopicSeed::named("X")).unwrap();
        let payload = write(&source, &[x], ClipFormat::Text);

        let mut doc = CaseDocument::new(4, "Target");
        let link = doc.new_topic(TopicSeed::topic_link("t/9/1", Some("X".into()))).unwrap();

        let clip = read(&payload).unwrap().unwrap();
        let pasted = doc.paste(&clip, &[5]).unwrap();
        assert_eq!(doc.store().get_handle(link, doc.names().is), Some(pasted[0]));
    }
}
