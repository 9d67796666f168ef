//! Reference integrity: redirect, purge, and merge
//!
//! Topics reference each other through slot values. Before a topic's
//! identity is discarded, every reference to it is rewritten to a successor
//! value so no slot is left pointing at a dead record.
//!
//! Rewrites reach direct slot values and one level of anonymous qualifier
//! records (`{is:t/1/4 P580:1998}`), matched through their own `is` slot.

use impress_frames::{Handle, Slot, Store, Value};

use crate::document::CaseDocument;
use crate::error::{Result, ValidationError};
use crate::event::CaseEvent;
use crate::topic::TopicState;

/// Rewrite slots of `record` holding `Ref(source)`. With `key`, only slots
/// with that key are considered.
fn rewrite(
    store: &mut Store,
    record: Handle,
    key: Option<Handle>,
    source: Handle,
    target: &Value,
) -> usize {
    let hits: Vec<usize> = store
        .slots(record)
        .iter()
        .enumerate()
        .filter(|(_, slot)| key.map_or(true, |k| slot.key == k))
        .filter(|(_, slot)| slot.value == Value::Ref(source))
        .map(|(i, _)| i)
        .collect();
    for &i in &hits {
        store.set_value_at(record, i, target.clone());
    }
    hits.len()
}

impl CaseDocument {
    /// Rewrite every reference to `source` in active topics and scraps.
    ///
    /// Returns the number of slots rewritten.
    pub fn redirect(&mut self, source: Handle, target: &Value) -> usize {
        if *target == Value::Ref(source) {
            return 0;
        }

        let is = self.names.is;
        let records: Vec<Handle> = self.topics.iter().chain(self.scraps.iter()).copied().collect();
        let mut total = 0;
        for record in records {
            let mut count = rewrite(&mut self.store, record, None, source, target);

            let qualifiers: Vec<Handle> = self
                .store
                .slots(record)
                .iter()
                .filter_map(|slot| slot.value.as_handle())
                .filter(|&h| self.store.is_anonymous(h))
                .collect();
            for qualifier in qualifiers {
                count += rewrite(&mut self.store, qualifier, Some(is), source, target);
            }

            if count > 0 && self.state(record) == Some(TopicState::Active) {
                self.commit(CaseEvent::TopicUpdated(record));
            }
            total += count;
        }

        if total > 0 {
            tracing::debug!(
                source = self.id_of(source),
                rewritten = total,
                "Redirected references"
            );
        }
        total
    }

    /// Value that replaces references to `topic` once it is purged: its
    /// link, else its name, else its id.
    pub fn redirect_target(&self, topic: Handle) -> Value {
        if let Some(link) = self.store.get(topic, self.names.is) {
            return link.clone();
        }
        if let Some(name) = self.store.get_str(topic, self.names.name) {
            return Value::Str(name.to_string());
        }
        Value::Str(self.id_of(topic).to_string())
    }

    /// Redirect all references to `topic` and discard its identity.
    pub fn purge_topic(&mut self, topic: Handle) -> Result<()> {
        if topic == self.main {
            return Err(ValidationError::MainTopic.into());
        }

        // An active topic leaves its folders and becomes a scrap first.
        if self.state(topic) == Some(TopicState::Active) {
            let changed: Vec<String> = self
                .folders
                .iter_mut()
                .filter_map(|f| f.remove(topic).then(|| f.name.clone()))
                .collect();
            for name in changed {
                self.commit(CaseEvent::FolderUpdated(name));
            }
            self.scrap(topic);
        }

        let target = self.redirect_target(topic);
        self.redirect(topic, &target);

        self.scraps.retain(|&t| t != topic);
        if self.focus == Some(topic) {
            self.focus = None;
        }

        self.set_state(topic, TopicState::Purged);
        tracing::debug!(topic = self.id_of(topic), "Purged topic");
        self.store.unbind(topic);
        self.dirty = true;
        Ok(())
    }

    /// Purge every scrap. Returns the number of topics purged.
    pub fn purge_scraps(&mut self) -> usize {
        // Scraps stay in the bucket until purged so later redirects still
        // reach their slots.
        let scraps = self.scraps.clone();
        let mut purged = 0;
        for topic in scraps {
            // Scraps are never the main topic.
            if self.purge_topic(topic).is_ok() {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(caseid = self.caseid, purged, "Purged scraps");
        }
        purged
    }

    /// Fold `sources` into `target`.
    ///
    /// Source slots are appended to the target, except `is` links pointing
    /// into the merge group. References to the sources are then redirected to
    /// the target and the sources are deleted from the current folder.
    pub fn merge(&mut self, target: Handle, sources: &[Handle]) -> Result<()> {
        self.check_writable()?;
        let sources: Vec<Handle> = sources.iter().copied().filter(|&s| s != target).collect();
        if sources.is_empty() {
            return Ok(());
        }
        if sources.contains(&self.main) {
            return Err(ValidationError::MainTopic.into());
        }

        let is = self.names.is;
        let in_group = |h: Handle| h == target || sources.contains(&h);
        for &source in &sources {
            let slots: Vec<Slot> = self
                .store
                .slots(source)
                .iter()
                .filter(|slot| !(slot.key == is && slot.value.as_handle().is_some_and(in_group)))
                .cloned()
                .collect();
            for slot in slots {
                self.store.add(target, slot.key, slot.value);
            }
        }
        self.commit(CaseEvent::TopicUpdated(target));

        for &source in &sources {
            self.redirect(source, &Value::Ref(target));
        }

        tracing::info!(
            target = self.id_of(target),
            sources = sources.len(),
            "Merged topics"
        );
        self.delete_topics(&sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaseError;
    use crate::topic::TopicSeed;

    fn references(doc: &CaseDocument, topic: Handle) -> usize {
        let mut count = 0;
        for &record in doc.topics().iter().chain(doc.scraps()) {
            for slot in doc.store().slots(record) {
                if slot.value == Value::Ref(topic) {
                    count += 1;
                }
                if let Some(q) = slot.value.as_handle() {
                    if doc.store().is_anonymous(q) {
                        count += doc
                            .store()
                            .slots(q)
                            .iter()
                            .filter(|s| s.value == Value::Ref(topic))
                            .count();
                    }
                }
            }
        }
        count
    }

    #[test]
    fn test_purge_after_scrap() {
        let mut doc = CaseDocument::new(3, "Case");
        let a = doc.new_topic(TopicSeed::named("Alpha")).unwrap();
        let b = doc.new_topic(TopicSeed::named("Beta")).unwrap();
        let is = doc.names().is;
        doc.edit_topic(b, |store, _, t| store.add(t, is, a)).unwrap();

        doc.delete_topics(&[a]).unwrap();
        assert_eq!(doc.store().get_handle(b, is), Some(a));

        assert_eq!(doc.purge_scraps(), 1);
        assert_eq!(doc.store().get_str(b, is), Some("Alpha"));
        assert_eq!(doc.state(a), Some(TopicState::Purged));
        assert!(doc.scraps().is_empty());
        assert_eq!(doc.store().find("t/3/1"), None);
    }

    #[test]
    fn test_purge_scrap_chain() {
        let mut doc = CaseDocument::new(3, "Case");
        let a = doc.new_topic(TopicSeed::named("Alpha")).unwrap();
        let c = doc.new_topic(TopicSeed::named("Gamma")).unwrap();
        let d = doc.new_topic(TopicSeed::named("Delta")).unwrap();
        doc.edit_topic(c, |store, n, t| store.add(t, n.is, a)).unwrap();
        doc.edit_topic(d, |store, _, t| {
            let knows = store.lookup("P3342");
            store.add(t, knows, c);
        })
        .unwrap();
        let knows = doc.store().find("P3342").unwrap();

        doc.delete_topics(&[a, c]).unwrap();
        assert_eq!(doc.purge_scraps(), 2);

        assert_eq!(references(&doc, a), 0);
        assert_eq!(references(&doc, c), 0);
        // c forwarded to a, and a resolved to its name.
        assert_eq!(doc.store().get_str(d, knows), Some("Alpha"));
        assert_eq!(doc.state(a), Some(TopicState::Purged));
        assert_eq!(doc.state(c), Some(TopicState::Purged));
        assert_eq!(doc.audit(), 0);
    }

    #[test]
    fn test_purge_active_topic_reports_delete() {
        let mut doc = CaseDocument::new(3, "Case");
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        doc.take_events();

        doc.purge_topic(a).unwrap();
        assert_eq!(doc.take_events(), vec![
            CaseEvent::FolderUpdated("General".into()),
            CaseEvent::TopicDeleted("t/3/1".into()),
        ]);
        assert_eq!(doc.state(a), Some(TopicState::Purged));
        assert_eq!(doc.audit(), 0);
        assert!(matches!(doc.add_topic(a), Err(CaseError::NotFound(_))));
        assert!(doc.scraps().is_empty());
    }

    #[test]
    fn test_redirect_target_priority() {
        let mut doc = CaseDocument::new(3, "Case");
        let linked = doc.new_topic(TopicSeed::item("Q90", Some("Paris".into()))).unwrap();
        let named = doc.new_topic(TopicSeed::named("Berlin")).unwrap();
        let bare = doc.new_topic(TopicSeed::default()).unwrap();

        let q90 = doc.store().find("Q90").unwrap();
        assert_eq!(doc.redirect_target(linked), Value::Ref(q90));
        assert_eq!(doc.redirect_target(named), Value::Str("Berlin".into()));
        assert_eq!(doc.redirect_target(bare), Value::Str("t/3/3".into()));
    }

    #[test]
    fn test_purge_rewrites_qualifiers() {
        let mut doc = CaseDocument::new(3, "Case");
        let a = doc.new_topic(TopicSeed::item("Q5", None)).unwrap();
        let b = doc.new_topic(TopicSeed::named("B")).unwrap();
        let q5 = doc.store().find("Q5").unwrap();
        doc.edit_topic(b, |store, names, t| {
            let employer = store.lookup("P108");
            let start = store.lookup("P580");
            let q = store.anonymous_with(vec![Slot::new(names.is, a), Slot::new(start, 1998i64)]);
            store.add(t, employer, q);
            store.add(t, names.alias, a);
        })
        .unwrap();

        doc.delete_topics(&[a]).unwrap();
        doc.purge_scraps();

        assert_eq!(references(&doc, a), 0);
        let employer = doc.store().find("P108").unwrap();
        let q = doc.store().get_handle(b, employer).unwrap();
        assert_eq!(doc.store().get_handle(q, doc.names().is), Some(q5));
        assert_eq!(doc.store().get_handle(b, doc.names().alias), Some(q5));
    }

    #[test]
    fn test_purge_main_rejected() {
        let mut doc = CaseDocument::new(3, "Case");
        let main = doc.main();
        assert!(doc.purge_topic(main).is_err());
        assert_eq!(doc.state(main), Some(TopicState::Active));
    }

    #[test]
    fn test_delete_scrap_from_scrap_bucket_purges() {
        let mut doc = CaseDocument::new(3, "Case");
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        doc.delete_topics(&[a]).unwrap();
        doc.show_folder(crate::folder::FolderView::Scraps).unwrap();
        doc.delete_topics(&[a]).unwrap();
        assert_eq!(doc.state(a), Some(TopicState::Purged));
        assert!(doc.scraps().is_empty());
    }

    #[test]
    fn test_merge_union() {
        let mut doc = CaseDocument::new(3, "Case");
        let target = doc.new_topic(TopicSeed::named("Ada Lovelace")).unwrap();
        let s1 = doc.new_topic(TopicSeed::named("Ada")).unwrap();
        let s2 = doc.new_topic(TopicSeed::item("Q7259", Some("Countess".into()))).unwrap();
        let other = doc.new_topic(TopicSeed::named("Babbage")).unwrap();
        let names = *doc.names();
        doc.edit_topic(s1, |store, n, t| store.add(t, n.is, target)).unwrap();
        doc.edit_topic(other, |store, n, t| {
            let knows = store.lookup("P3342");
            store.add(t, knows, s1);
            store.add(t, knows, s2);
            store.add(t, n.alias, "Charles");
        })
        .unwrap();

        doc.merge(target, &[s1, s2]).unwrap();

        assert_eq!(references(&doc, s1), 0);
        assert_eq!(references(&doc, s2), 0);

        let merged: Vec<_> = doc
            .store()
            .all(target, names.name)
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(merged, vec!["Ada Lovelace", "Ada", "Countess"]);
        // The is-link from s1 back to the target is dropped.
        let links: Vec<_> = doc.store().all(target, names.is).cloned().collect();
        let q7259 = doc.store().find("Q7259").unwrap();
        assert_eq!(links, vec![Value::Ref(q7259)]);

        let knows = doc.store().find("P3342").unwrap();
        let known: Vec<_> = doc.store().all(other, knows).cloned().collect();
        assert_eq!(known, vec![Value::Ref(target), Value::Ref(target)]);

        assert_eq!(doc.state(s1), Some(TopicState::Scrap));
        assert_eq!(doc.state(s2), Some(TopicState::Scrap));
        assert_eq!(doc.folder("General").unwrap().len(), 3);
    }

    #[test]
    fn test_merge_with_main_rejected() {
        let mut doc = CaseDocument::new(3, "Case");
        let target = doc.new_topic(TopicSeed::named("T")).unwrap();
        let main = doc.main();
        let before = doc.store().slots(target).len();

        assert!(doc.merge(target, &[main]).is_err());
        assert_eq!(doc.store().slots(target).len(), before);
    }
}
