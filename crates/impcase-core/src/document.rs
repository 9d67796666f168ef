//! The case document: topics, folders, and case metadata
//!
//! A case owns a flat set of active topics, an ordered list of folders
//! referencing them, and a scrap bucket of soft-deleted topics. All topic
//! content lives in the document's record [`Store`]; the document only keeps
//! handles.
//!
//! Every committed mutation is validated before its first change and then
//! reported as a [`CaseEvent`] in the document's outbox.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use impress_frames::{parse_payload, Encoder, Handle, Printer, Slot, Store, Value};

use crate::clipboard::ClipFormat;
use crate::error::{CaseError, Result, ValidationError};
use crate::event::CaseEvent;
use crate::folder::{swap_adjacent, Direction, Folder, FolderView};
use crate::topic::{case_ref, topic_id, Names, TopicSeed, TopicState};

/// Name of the folder every new case starts with
pub const DEFAULT_FOLDER: &str = "General";

/// Who issues topic ids for this case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// The document's own counter
    Local,
    /// The collaboration server; the local counter must not be used
    Delegated,
}

/// Sharing flags of a case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sharing {
    pub share: bool,
    pub publish: bool,
    /// When the case was last shared or published
    pub shared: Option<DateTime<Utc>>,
}

/// Link between a case and its collaboration server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollabLink {
    pub url: String,
    pub userid: String,
    pub credentials: String,
}

pub struct CaseDocument {
    pub(crate) store: Store,
    pub(crate) names: Names,
    pub(crate) caseid: u64,
    pub(crate) main: Handle,
    /// Active topic set, in insertion order
    pub(crate) topics: Vec<Handle>,
    pub(crate) folders: Vec<Folder>,
    pub(crate) current: FolderView,
    pub(crate) scraps: Vec<Handle>,
    pub(crate) states: HashMap<Handle, TopicState>,
    pub(crate) next: u64,
    pub(crate) ids: IdSource,
    pub(crate) sharing: Sharing,
    pub(crate) modified: Option<DateTime<Utc>>,
    pub(crate) collab: Option<CollabLink>,
    pub(crate) readonly: bool,
    pub(crate) focus: Option<Handle>,
    pub(crate) dirty: bool,
    pub(crate) outbox: Vec<CaseEvent>,
}

impl std::fmt::Debug for CaseDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseDocument")
            .field("caseid", &self.caseid)
            .field("topics", &self.topics.len())
            .field("folders", &self.folder_names())
            .field("scraps", &self.scraps.len())
            .field("next", &self.next)
            .finish()
    }
}

impl CaseDocument {
    /// Create a new case whose main topic is named `name`.
    pub fn new(caseid: u64, name: &str) -> Self {
        let mut store = Store::new();
        let names = Names::bind(&mut store);
        let main = store.lookup(&case_ref(caseid));
        store.add(main, names.name, name);

        let mut general = Folder::new(DEFAULT_FOLDER);
        general.insert(main);

        Self {
            store,
            names,
            caseid,
            main,
            topics: vec![main],
            folders: vec![general],
            current: FolderView::Folder(DEFAULT_FOLDER.to_string()),
            scraps: Vec::new(),
            states: HashMap::from([(main, TopicState::Active)]),
            next: 1,
            ids: IdSource::Local,
            sharing: Sharing::default(),
            modified: None,
            collab: None,
            readonly: false,
            focus: Some(main),
            dirty: false,
            outbox: Vec::new(),
        }
    }

    // --- accessors ---

    pub fn caseid(&self) -> u64 {
        self.caseid
    }

    pub fn main(&self) -> Handle {
        self.main
    }

    /// Display name of the case (the main topic's name)
    pub fn name(&self) -> Option<&str> {
        self.store.get_str(self.main, self.names.name)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn names(&self) -> &Names {
        &self.names
    }

    pub fn topics(&self) -> &[Handle] {
        &self.topics
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn folder_names(&self) -> Vec<String> {
        self.folders.iter().map(|f| f.name.clone()).collect()
    }

    pub fn scraps(&self) -> &[Handle] {
        &self.scraps
    }

    pub fn current(&self) -> &FolderView {
        &self.current
    }

    /// Topics of the current folder, or the scrap bucket.
    pub fn current_topics(&self) -> &[Handle] {
        match &self.current {
            FolderView::Folder(name) => self.folder(name).map(|f| &f.topics[..]).unwrap_or(&[]),
            FolderView::Scraps => &self.scraps,
        }
    }

    pub fn state(&self, topic: Handle) -> Option<TopicState> {
        self.states.get(&topic).copied()
    }

    /// Resolve a topic of this case by id.
    pub fn topic(&self, id: &str) -> Option<Handle> {
        self.store.find(id).filter(|h| self.states.contains_key(h))
    }

    /// Id of a record as a string, empty for anonymous records.
    pub fn id_of(&self, h: Handle) -> &str {
        self.store.id(h).unwrap_or_default()
    }

    pub fn focus(&self) -> Option<Handle> {
        self.focus
    }

    pub fn next_id(&self) -> u64 {
        self.next
    }

    pub fn id_source(&self) -> IdSource {
        self.ids
    }

    pub fn set_id_source(&mut self, ids: IdSource) {
        self.ids = ids;
    }

    pub fn sharing(&self) -> &Sharing {
        &self.sharing
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn collab(&self) -> Option<&CollabLink> {
        self.collab.as_ref()
    }

    pub fn set_collab(&mut self, link: Option<CollabLink>) {
        self.collab = link;
        self.dirty = true;
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Mark the case as a read-only view of a linked case.
    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Stamp the case as modified now.
    pub fn touch(&mut self) {
        self.modified = Some(Utc::now());
    }

    /// Drain the events committed since the last call.
    pub fn take_events(&mut self) -> Vec<CaseEvent> {
        std::mem::take(&mut self.outbox)
    }

    // --- folders ---

    pub fn add_folder(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        if self.folder(name).is_some() {
            return Err(ValidationError::DuplicateFolder(name.to_string()).into());
        }

        self.folders.push(Folder::new(name));
        self.current = FolderView::Folder(name.to_string());
        self.focus = None;
        tracing::info!(caseid = self.caseid, folder = name, "Added folder");
        self.commit(CaseEvent::FoldersUpdated);
        Ok(())
    }

    pub fn rename_folder(&mut self, folder: &str, name: &str) -> Result<()> {
        self.check_writable()?;
        let pos = self.folder_pos(folder)?;
        if folder == name {
            return Ok(());
        }
        if self.folder(name).is_some() {
            return Err(ValidationError::DuplicateFolder(name.to_string()).into());
        }

        self.folders[pos].name = name.to_string();
        if self.current == FolderView::Folder(folder.to_string()) {
            self.current = FolderView::Folder(name.to_string());
        }
        tracing::info!(caseid = self.caseid, old = folder, new = name, "Renamed folder");
        self.commit(CaseEvent::FolderRenamed {
            old: folder.to_string(),
            new: name.to_string(),
        });
        Ok(())
    }

    /// Swap a folder with its neighbour. Returns false at either end.
    pub fn move_folder(&mut self, folder: &str, direction: Direction) -> Result<bool> {
        self.check_writable()?;
        let pos = self.folder_pos(folder)?;
        if !swap_adjacent(&mut self.folders, pos, direction) {
            return Ok(false);
        }
        self.commit(CaseEvent::FoldersUpdated);
        Ok(true)
    }

    pub fn delete_folder(&mut self, folder: &str) -> Result<()> {
        self.check_writable()?;
        let pos = self.folder_pos(folder)?;
        if !self.folders[pos].is_empty() {
            return Err(ValidationError::FolderNotEmpty(folder.to_string()).into());
        }
        if self.folders.len() == 1 {
            return Err(ValidationError::LastFolder.into());
        }

        self.folders.remove(pos);
        let adjacent = if pos == self.folders.len() { pos - 1 } else { pos };
        self.current = FolderView::Folder(self.folders[adjacent].name.clone());
        self.focus = self.folders[adjacent].topics.first().copied();
        tracing::info!(caseid = self.caseid, folder, "Deleted folder");
        self.commit(CaseEvent::FoldersUpdated);
        Ok(())
    }

    /// Switch the current folder. Leaving the scrap bucket purges it.
    pub fn show_folder(&mut self, view: FolderView) -> Result<()> {
        if view == self.current {
            return Ok(());
        }
        if let FolderView::Folder(name) = &view {
            self.folder_pos(name)?;
        }

        if self.current == FolderView::Scraps && !self.scraps.is_empty() {
            self.purge_scraps();
        }
        self.current = view;
        self.focus = self.current_topics().first().copied();
        Ok(())
    }

    /// Name of the first folder containing `topic`.
    pub fn folder_of(&self, topic: Handle) -> Option<&str> {
        self.folders
            .iter()
            .find(|f| f.contains(topic))
            .map(|f| f.name.as_str())
    }

    /// Number of folders referencing `topic`.
    pub fn refcount(&self, topic: Handle) -> usize {
        self.folders.iter().filter(|f| f.contains(topic)).count()
    }

    // --- topics ---

    /// Take the next id from the local counter.
    pub fn next_local_id(&mut self) -> Result<u64> {
        if self.ids == IdSource::Delegated {
            return Err(ValidationError::DelegatedIds.into());
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }

    /// Create a topic with a locally issued id in the current folder.
    pub fn new_topic(&mut self, seed: TopicSeed) -> Result<Handle> {
        self.check_insertable()?;
        let seq = self.next_local_id()?;
        self.create_topic(seq, seed)
    }

    /// Create topic `t/{caseid}/{seq}` in the current folder.
    ///
    /// `seq` must come from the issuing authority: the local counter or the
    /// collaboration server.
    pub fn create_topic(&mut self, seq: u64, seed: TopicSeed) -> Result<Handle> {
        self.check_insertable()?;

        let topic = self.store.lookup(&topic_id(self.caseid, seq));
        if let Some(link) = &seed.link {
            let target = self.store.lookup(link);
            self.store.add(topic, self.names.is, target);
        }
        if seed.case_file {
            self.store
                .add(topic, self.names.instance_of, self.names.case_file);
        }
        if let Some(name) = &seed.name {
            self.store.add(topic, self.names.name, name.as_str());
        }

        tracing::debug!(caseid = self.caseid, topic = self.id_of(topic), "Created topic");
        self.add_topic(topic)?;
        Ok(topic)
    }

    /// Insert a topic into the current folder and the active set.
    ///
    /// Idempotent. A scrap is undeleted.
    pub fn add_topic(&mut self, topic: Handle) -> Result<()> {
        self.check_insertable()?;
        let FolderView::Folder(name) = self.current.clone() else {
            return Err(ValidationError::ScrapFolder.into());
        };

        if self.state(topic) == Some(TopicState::Purged) {
            return Err(CaseError::NotFound(self.id_of(topic).to_string()));
        }
        if self.state(topic) != Some(TopicState::Active) {
            if self.state(topic) == Some(TopicState::Scrap) {
                self.scraps.retain(|&s| s != topic);
                tracing::debug!(topic = self.id_of(topic), "Undeleted scrap");
            }
            if !self.topics.contains(&topic) {
                self.topics.push(topic);
            }
            self.set_state(topic, TopicState::Active);
            self.commit(CaseEvent::TopicUpdated(topic));
        }

        let pos = self.folder_pos(&name)?;
        if self.folders[pos].insert(topic) {
            self.commit(CaseEvent::FolderUpdated(name));
        }
        self.focus = Some(topic);
        Ok(())
    }

    /// Remove topics from the current folder.
    ///
    /// Topics left in no folder become scraps; scraps deleted from the scrap
    /// bucket are purged. The whole call is rejected if the main topic is
    /// among `list`.
    pub fn delete_topics(&mut self, list: &[Handle]) -> Result<()> {
        self.check_writable()?;
        if list.is_empty() {
            return Ok(());
        }
        if list.contains(&self.main) {
            return Err(ValidationError::MainTopic.into());
        }

        // Focus moves to the topic after the selection.
        let members = self.current_topics();
        let next = list
            .last()
            .and_then(|&last| members.iter().position(|&t| t == last))
            .and_then(|pos| members.get(pos + 1))
            .copied();

        match self.current.clone() {
            FolderView::Scraps => {
                for &topic in list {
                    if self.state(topic) == Some(TopicState::Scrap) {
                        self.purge_topic(topic)?;
                    }
                }
            }
            FolderView::Folder(name) => {
                let pos = self.folder_pos(&name)?;
                let mut changed = false;
                for &topic in list {
                    changed |= self.folders[pos].remove(topic);
                    if self.refcount(topic) > 0 {
                        continue;
                    }
                    match self.state(topic) {
                        Some(TopicState::Active) => self.scrap(topic),
                        Some(TopicState::Scrap) => self.purge_topic(topic)?,
                        _ => {}
                    }
                }
                if changed {
                    self.commit(CaseEvent::FolderUpdated(name));
                }
            }
        }

        self.focus = next.or_else(|| self.current_topics().last().copied());
        self.dirty = true;
        Ok(())
    }

    /// Move a topic one step within the current folder.
    pub fn move_topic(&mut self, topic: Handle, direction: Direction) -> Result<bool> {
        self.check_writable()?;
        let FolderView::Folder(name) = self.current.clone() else {
            return Ok(false);
        };
        let folder = self.folder_pos(&name)?;
        let Some(pos) = self.folders[folder].position(topic) else {
            return Ok(false);
        };
        if !swap_adjacent(&mut self.folders[folder].topics, pos, direction) {
            return Ok(false);
        }
        self.focus = Some(topic);
        self.commit(CaseEvent::FolderUpdated(name));
        Ok(true)
    }

    /// Edit the content of an active topic.
    pub fn edit_topic<F>(&mut self, topic: Handle, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Store, &Names, Handle),
    {
        self.check_writable()?;
        if self.state(topic) != Some(TopicState::Active) {
            return Err(CaseError::NotFound(self.id_of(topic).to_string()));
        }
        let names = self.names;
        edit(&mut self.store, &names, topic);
        self.commit(CaseEvent::TopicUpdated(topic));
        Ok(())
    }

    /// Case ids of the cases linked from this case.
    pub fn linked_cases(&self) -> Vec<u64> {
        self.topics
            .iter()
            .filter(|&&t| t != self.main)
            .filter(|&&t| self.store.get_handle(t, self.names.instance_of) == Some(self.names.case_file))
            .filter_map(|&t| self.store.get_handle(t, self.names.is))
            .filter_map(|link| self.store.id(link)?.strip_prefix("c/")?.parse().ok())
            .collect()
    }

    pub fn set_sharing(&mut self, share: bool, publish: bool) -> Result<()> {
        self.check_writable()?;
        self.sharing.share = share;
        self.sharing.publish = publish;
        self.sharing.shared = (share || publish).then(Utc::now);
        self.dirty = true;
        Ok(())
    }

    /// Check structural invariants, logging every anomaly as a warning.
    ///
    /// Returns the number of anomalies found.
    pub fn audit(&self) -> usize {
        let mut anomalies = 0;
        for folder in &self.folders {
            for &topic in &folder.topics {
                if self.state(topic) != Some(TopicState::Active) {
                    tracing::warn!(
                        folder = %folder.name,
                        topic = self.id_of(topic),
                        "Folder references a topic outside the active set"
                    );
                    anomalies += 1;
                }
            }
        }
        for &topic in &self.topics {
            if self.refcount(topic) == 0 {
                tracing::warn!(topic = self.id_of(topic), "Active topic is in no folder");
                anomalies += 1;
            }
            for slot in self.store.slots(topic) {
                if let Value::Ref(h) = slot.value {
                    if self.state(h) == Some(TopicState::Purged) {
                        tracing::warn!(
                            topic = self.id_of(topic),
                            target = self.id_of(h),
                            "Slot references a purged topic"
                        );
                        anomalies += 1;
                    }
                }
            }
        }
        anomalies
    }

    // --- snapshots ---

    /// Encode the full case: every topic record followed by the casefile.
    pub fn encode(&self, format: ClipFormat) -> Vec<u8> {
        let records = self.topics.iter().chain(self.scraps.iter()).copied();
        let casefile = self.casefile_slots();
        match format {
            ClipFormat::Binary => {
                let mut encoder = Encoder::new(&self.store);
                for topic in records {
                    encoder.encode(topic);
                }
                encoder.encode_record(None, &casefile);
                encoder.output()
            }
            ClipFormat::Text => {
                let mut printer = Printer::new(&self.store);
                for topic in records {
                    printer.print(topic);
                }
                printer.print_record(None, &casefile);
                printer.into_output().into_bytes()
            }
        }
    }

    /// Rebuild a case from a snapshot made by [`CaseDocument::encode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut store = Store::new();
        let names = Names::bind(&mut store);
        let records = parse_payload(&mut store, data)?;

        let casefile = records
            .iter()
            .rev()
            .copied()
            .find(|&h| store.is_anonymous(h) && store.has(h, names.caseid))
            .ok_or_else(|| invalid("missing casefile record"))?;

        let caseid = store
            .get_int(casefile, names.caseid)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| invalid("bad case id"))?;
        let main = store
            .get_handle(casefile, names.main)
            .ok_or_else(|| invalid("missing main topic"))?;
        let next = store
            .get_int(casefile, names.next)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(1);

        let mut topics = Vec::new();
        let mut scraps = Vec::new();
        let mut folders: Vec<Folder> = Vec::new();
        let mut sharing = Sharing::default();
        let mut modified = None;
        let mut readonly = false;
        let (mut url, mut userid, mut credentials) = (None, None, None);

        let slots: Vec<Slot> = store.slots(casefile).to_vec();
        for Slot { key, value } in slots {
            let text = value.as_str().map(str::to_string);
            if key == names.topics {
                topics.extend(value.as_handle());
            } else if key == names.folder {
                let name = text.ok_or_else(|| invalid("folder name must be a string"))?;
                folders.push(Folder::new(name));
            } else if key == names.topic {
                let topic = value.as_handle().ok_or_else(|| invalid("bad folder member"))?;
                folders
                    .last_mut()
                    .ok_or_else(|| invalid("folder member before folder"))?
                    .insert(topic);
            } else if key == names.scrap {
                scraps.extend(value.as_handle());
            } else if key == names.share {
                sharing.share = value.as_int() == Some(1);
            } else if key == names.publish {
                sharing.publish = value.as_int() == Some(1);
            } else if key == names.shared {
                sharing.shared = text.as_deref().and_then(parse_time);
            } else if key == names.modified {
                modified = text.as_deref().and_then(parse_time);
            } else if key == names.link {
                readonly = value.as_int() == Some(1);
            } else if key == names.url {
                url = text;
            } else if key == names.userid {
                userid = text;
            } else if key == names.credentials {
                credentials = text;
            }
        }

        if folders.is_empty() {
            return Err(invalid("case has no folders"));
        }

        let collab = match (url, userid, credentials) {
            (Some(url), Some(userid), Some(credentials)) => Some(CollabLink {
                url,
                userid,
                credentials,
            }),
            _ => None,
        };

        let mut states: HashMap<Handle, TopicState> =
            topics.iter().map(|&t| (t, TopicState::Active)).collect();
        states.extend(scraps.iter().map(|&t| (t, TopicState::Scrap)));
        states.insert(main, TopicState::Active);

        let current = FolderView::Folder(folders[0].name.clone());
        let focus = folders[0].topics.first().copied();
        let ids = if collab.is_some() {
            IdSource::Delegated
        } else {
            IdSource::Local
        };
        let doc = Self {
            store,
            names,
            caseid,
            main,
            topics,
            folders,
            current,
            scraps,
            states,
            next,
            ids,
            sharing,
            modified,
            collab,
            readonly,
            focus,
            dirty: false,
            outbox: Vec::new(),
        };
        doc.audit();
        Ok(doc)
    }

    fn casefile_slots(&self) -> Vec<Slot> {
        let n = &self.names;
        let mut slots = vec![
            Slot::new(n.caseid, self.caseid as i64),
            Slot::new(n.main, self.main),
            Slot::new(n.next, self.next as i64),
        ];
        slots.extend(self.topics.iter().map(|&t| Slot::new(n.topics, t)));
        for folder in &self.folders {
            slots.push(Slot::new(n.folder, folder.name.as_str()));
            slots.extend(folder.topics.iter().map(|&t| Slot::new(n.topic, t)));
        }
        slots.extend(self.scraps.iter().map(|&t| Slot::new(n.scrap, t)));
        slots.push(Slot::new(n.share, self.sharing.share as i64));
        slots.push(Slot::new(n.publish, self.sharing.publish as i64));
        if let Some(shared) = self.sharing.shared {
            slots.push(Slot::new(n.shared, shared.to_rfc3339()));
        }
        if let Some(modified) = self.modified {
            slots.push(Slot::new(n.modified, modified.to_rfc3339()));
        }
        if self.readonly {
            slots.push(Slot::new(n.link, 1i64));
        }
        if let Some(link) = &self.collab {
            slots.push(Slot::new(n.url, link.url.as_str()));
            slots.push(Slot::new(n.userid, link.userid.as_str()));
            slots.push(Slot::new(n.credentials, link.credentials.as_str()));
        }
        slots
    }

    // --- internals ---

    /// Move an unreferenced active topic to the scrap bucket.
    pub(crate) fn scrap(&mut self, topic: Handle) {
        self.topics.retain(|&t| t != topic);
        self.scraps.push(topic);
        self.set_state(topic, TopicState::Scrap);
        tracing::debug!(topic = self.id_of(topic), "Moved topic to scraps");
        let id = self.id_of(topic).to_string();
        self.commit(CaseEvent::TopicDeleted(id));
    }

    /// Record a lifecycle change of `topic`.
    pub(crate) fn set_state(&mut self, topic: Handle, state: TopicState) {
        debug_assert!(
            self.state(topic)
                .map_or(true, |from| from == state || from.can_transition_to(&state)),
            "invalid transition of {} to {}",
            self.id_of(topic),
            state
        );
        self.states.insert(topic, state);
    }

    pub(crate) fn folder_pos(&self, name: &str) -> Result<usize> {
        self.folders
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| ValidationError::UnknownFolder(name.to_string()).into())
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CaseError::ReadOnly);
        }
        Ok(())
    }

    /// Topics can only be inserted into a real folder of a writable case.
    pub(crate) fn check_insertable(&self) -> Result<()> {
        self.check_writable()?;
        match &self.current {
            FolderView::Scraps => Err(ValidationError::ScrapFolder.into()),
            FolderView::Folder(name) => self.folder_pos(name).map(|_| ()),
        }
    }

    /// Record a committed mutation.
    pub(crate) fn commit(&mut self, event: CaseEvent) {
        self.dirty = true;
        if self.outbox.last() != Some(&event) {
            self.outbox.push(event);
        }
    }
}

fn invalid(reason: &str) -> CaseError {
    ValidationError::InvalidSnapshot(reason.to_string()).into()
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> CaseDocument {
        CaseDocument::new(7, "Investigation")
    }

    #[test]
    fn test_new_case() {
        let doc = case();
        assert_eq!(doc.id_of(doc.main()), "c/7");
        assert_eq!(doc.name(), Some("Investigation"));
        assert_eq!(doc.folder_names(), vec!["General"]);
        assert_eq!(doc.current_topics(), &[doc.main()]);
        assert_eq!(doc.next_id(), 1);
        assert!(!doc.is_dirty());
    }

    #[test]
    fn test_new_topic_alice() {
        let mut doc = case();
        let alice = doc.new_topic(TopicSeed::named("Alice")).unwrap();

        assert_eq!(doc.id_of(alice), "t/7/1");
        assert_eq!(doc.store().get_str(alice, doc.names().name), Some("Alice"));
        assert_eq!(doc.folder("General").unwrap().len(), 2);
        assert_eq!(doc.topics().last(), Some(&alice));
        assert_eq!(doc.next_id(), 2);
        assert_eq!(doc.focus(), Some(alice));
        assert!(doc.is_dirty());
    }

    #[test]
    fn test_add_folder_twice() {
        let mut doc = case();
        doc.add_folder("People").unwrap();
        let err = doc.add_folder("People").unwrap_err();
        assert!(matches!(
            err,
            CaseError::Validation(ValidationError::DuplicateFolder(_))
        ));
        assert_eq!(
            doc.folders().iter().filter(|f| f.name == "People").count(),
            1
        );
        assert_eq!(doc.current(), &FolderView::Folder("People".into()));
    }

    #[test]
    fn test_rename_folder() {
        let mut doc = case();
        doc.add_folder("People").unwrap();
        let bob = doc.new_topic(TopicSeed::named("Bob")).unwrap();

        assert!(doc.rename_folder("People", "General").is_err());
        doc.rename_folder("People", "Persons").unwrap();
        assert_eq!(doc.folder("Persons").unwrap().topics, vec![bob]);
        assert_eq!(doc.current(), &FolderView::Folder("Persons".into()));
        assert!(matches!(
            doc.take_events().last(),
            Some(CaseEvent::FolderRenamed { .. })
        ));
    }

    #[test]
    fn test_move_folder_boundaries() {
        let mut doc = case();
        doc.add_folder("A").unwrap();
        doc.add_folder("B").unwrap();

        assert!(!doc.move_folder("General", Direction::Up).unwrap());
        assert!(!doc.move_folder("B", Direction::Down).unwrap());
        assert!(doc.move_folder("B", Direction::Up).unwrap());
        assert_eq!(doc.folder_names(), vec!["General", "B", "A"]);
    }

    #[test]
    fn test_delete_folder() {
        let mut doc = case();
        doc.add_folder("A").unwrap();
        doc.add_folder("B").unwrap();
        doc.new_topic(TopicSeed::named("x")).unwrap();

        assert!(matches!(
            doc.delete_folder("B"),
            Err(CaseError::Validation(ValidationError::FolderNotEmpty(_)))
        ));

        doc.delete_folder("A").unwrap();
        assert_eq!(doc.folder_names(), vec!["General", "B"]);
        assert_eq!(doc.current(), &FolderView::Folder("B".into()));
    }

    #[test]
    fn test_delete_last_folder_rejected() {
        let mut doc = case();
        doc.add_folder("Empty").unwrap();
        doc.delete_folder("Empty").unwrap();
        assert_eq!(doc.current(), &FolderView::Folder("General".into()));

        let mut lone = CaseDocument::new(1, "x");
        lone.rename_folder("General", "Only").unwrap();
        lone.show_folder(FolderView::Folder("Only".into())).unwrap();
        // Main topic keeps the only folder non-empty.
        assert!(lone.delete_folder("Only").is_err());
    }

    #[test]
    fn test_delete_topic_becomes_scrap() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        let b = doc.new_topic(TopicSeed::named("B")).unwrap();
        let is = doc.names().is;
        doc.edit_topic(b, |store, _, t| store.add(t, is, a)).unwrap();
        doc.take_events();

        doc.delete_topics(&[a]).unwrap();

        assert_eq!(doc.refcount(a), 0);
        assert_eq!(doc.state(a), Some(TopicState::Scrap));
        assert!(doc.scraps().contains(&a));
        assert!(!doc.topics().contains(&a));
        assert_eq!(doc.store().get_handle(b, is), Some(a));
        assert_eq!(doc.focus(), Some(b));

        let events = doc.take_events();
        assert!(events.contains(&CaseEvent::TopicDeleted("t/7/1".into())));
        assert!(events.contains(&CaseEvent::FolderUpdated("General".into())));
    }

    #[test]
    fn test_delete_topic_still_referenced() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        doc.add_folder("Other").unwrap();
        doc.add_topic(a).unwrap();

        doc.delete_topics(&[a]).unwrap();
        assert_eq!(doc.state(a), Some(TopicState::Active));
        assert_eq!(doc.folder_of(a), Some("General"));
        assert_eq!(doc.refcount(a), 1);
    }

    #[test]
    fn test_delete_main_rejects_batch() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        let main = doc.main();

        assert!(matches!(
            doc.delete_topics(&[a, main]),
            Err(CaseError::Validation(ValidationError::MainTopic))
        ));
        assert_eq!(doc.state(a), Some(TopicState::Active));
        assert_eq!(doc.folder("General").unwrap().len(), 2);
    }

    #[test]
    fn test_focus_falls_back_to_last() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        doc.delete_topics(&[a]).unwrap();
        assert_eq!(doc.focus(), Some(doc.main()));
    }

    #[test]
    fn test_undelete_scrap() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        doc.delete_topics(&[a]).unwrap();
        doc.add_topic(a).unwrap();

        assert_eq!(doc.state(a), Some(TopicState::Active));
        assert!(doc.scraps().is_empty());
        assert_eq!(doc.topics().iter().filter(|&&t| t == a).count(), 1);
    }

    #[test]
    fn test_scrap_folder_is_not_insertable() {
        let mut doc = case();
        doc.show_folder(FolderView::Scraps).unwrap();
        assert!(matches!(
            doc.new_topic(TopicSeed::named("x")),
            Err(CaseError::Validation(ValidationError::ScrapFolder))
        ));
        assert_eq!(doc.next_id(), 1);
    }

    #[test]
    fn test_delegated_ids() {
        let mut doc = case();
        doc.set_id_source(IdSource::Delegated);
        assert!(doc.new_topic(TopicSeed::named("x")).is_err());
        let t = doc.create_topic(40, TopicSeed::named("x")).unwrap();
        assert_eq!(doc.id_of(t), "t/7/40");
    }

    #[test]
    fn test_move_topic() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::named("A")).unwrap();
        assert!(doc.move_topic(a, Direction::Up).unwrap());
        assert_eq!(doc.current_topics(), &[a, doc.main()]);
        assert!(!doc.move_topic(a, Direction::Up).unwrap());
    }

    #[test]
    fn test_case_link() {
        let mut doc = case();
        doc.new_topic(TopicSeed::case_link(12, Some("Related".into())))
            .unwrap();
        doc.new_topic(TopicSeed::item("Q42", None)).unwrap();
        assert_eq!(doc.linked_cases(), vec![12]);
    }

    #[test]
    fn test_readonly() {
        let mut doc = case();
        doc.set_readonly(true);
        assert!(matches!(doc.add_folder("x"), Err(CaseError::ReadOnly)));
        assert!(matches!(
            doc.new_topic(TopicSeed::named("x")),
            Err(CaseError::ReadOnly)
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut doc = case();
        let a = doc.new_topic(TopicSeed::item("Q5", Some("Alice".into()))).unwrap();
        doc.add_folder("Places").unwrap();
        let b = doc.new_topic(TopicSeed::named("Paris")).unwrap();
        doc.delete_topics(&[b]).unwrap();
        doc.set_sharing(true, false).unwrap();

        for format in [ClipFormat::Text, ClipFormat::Binary] {
            let copy = CaseDocument::decode(&doc.encode(format)).unwrap();
            assert_eq!(copy.caseid(), 7);
            assert_eq!(copy.name(), Some("Investigation"));
            assert_eq!(copy.folder_names(), vec!["General", "Places"]);
            assert_eq!(copy.folder("General").unwrap().len(), 2);
            assert_eq!(copy.scraps().len(), 1);
            assert_eq!(copy.next_id(), 3);
            assert!(copy.sharing().share);
            assert!(copy.sharing().shared.is_some());

            let a2 = copy.topic(doc.id_of(a)).unwrap();
            assert_eq!(copy.store().get_str(a2, copy.names().name), Some("Alice"));
            assert_eq!(copy.audit(), 0);
        }
    }

    #[test]
    fn test_decode_without_casefile() {
        assert!(matches!(
            CaseDocument::decode(b"{=t/1/1 name:\"x\"}"),
            Err(CaseError::Validation(ValidationError::InvalidSnapshot(_)))
        ));
        assert!(matches!(
            CaseDocument::decode(b"{=t/1/1 name:"),
            Err(CaseError::Parse(_))
        ));
    }
}
