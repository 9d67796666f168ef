//! Mapping between document events and wire deltas

use std::collections::HashMap;

use impress_frames::{parse_payload, Encoder, Handle};

use crate::document::CaseDocument;
use crate::error::Result;
use crate::event::{CaseEvent, Delta};
use crate::folder::{Folder, FolderView};
use crate::topic::TopicState;

impl CaseDocument {
    /// Delta describing a committed event, or `None` if it no longer applies
    /// (the topic was purged or the folder removed in the meantime).
    pub fn delta_for(&self, event: &CaseEvent) -> Option<Delta> {
        match event {
            CaseEvent::TopicUpdated(topic) => {
                if !self.store.is_bound(*topic) {
                    return None;
                }
                let mut encoder = Encoder::new(&self.store);
                encoder.encode(*topic);
                Some(Delta::Topic(encoder.output()))
            }
            CaseEvent::TopicDeleted(id) => Some(Delta::TopicDeleted(id.clone())),
            CaseEvent::FolderUpdated(name) => self.folder(name).map(|folder| Delta::Folder {
                name: name.clone(),
                topics: folder
                    .topics
                    .iter()
                    .map(|&t| self.id_of(t).to_string())
                    .collect(),
            }),
            CaseEvent::FolderRenamed { old, new } => Some(Delta::FolderRenamed {
                old: old.clone(),
                new: new.clone(),
            }),
            CaseEvent::FoldersUpdated => Some(Delta::Folders(self.folder_names())),
        }
    }

    /// Apply a change made by another collaborator.
    ///
    /// Remote changes are applied as-is: they emit no events and skip the
    /// scrap and redirect pipeline. Returns true if the current view changed.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<bool> {
        tracing::debug!(caseid = self.caseid, kind = delta.kind(), "Applying remote change");
        match delta {
            Delta::Topic(record) => {
                let records = parse_payload(&mut self.store, record)?;
                let mut refresh = false;
                for topic in records {
                    if self.store.is_anonymous(topic) {
                        continue;
                    }
                    self.activate(topic);
                    refresh |= self.current_topics().contains(&topic);
                }
                Ok(refresh)
            }
            Delta::TopicDeleted(id) => {
                let Some(topic) = self.store.find(id) else {
                    return Ok(false);
                };
                if topic == self.main {
                    tracing::warn!(caseid = self.caseid, "Ignoring remote delete of main topic");
                    return Ok(false);
                }
                self.topics.retain(|&t| t != topic);
                self.states.remove(&topic);
                Ok(self.current_topics().contains(&topic))
            }
            Delta::Folder { name, topics } => {
                let members: Vec<Handle> = topics.iter().map(|id| self.store.lookup(id)).collect();
                for &topic in &members {
                    self.activate(topic);
                }
                match self.folders.iter_mut().find(|f| &f.name == name) {
                    Some(folder) => folder.topics = members,
                    None => {
                        tracing::debug!(folder = %name, "Remote update for unknown folder");
                        self.folders.push(Folder {
                            name: name.clone(),
                            topics: members,
                        });
                    }
                }
                Ok(self.current == FolderView::Folder(name.clone()))
            }
            Delta::FolderRenamed { old, new } => {
                if self.folder(new).is_some() {
                    tracing::warn!(old = %old, new = %new, "Remote rename collides with existing folder");
                    return Ok(false);
                }
                let Some(folder) = self.folders.iter_mut().find(|f| &f.name == old) else {
                    return Ok(false);
                };
                folder.name = new.clone();
                if self.current == FolderView::Folder(old.clone()) {
                    self.current = FolderView::Folder(new.clone());
                }
                Ok(true)
            }
            Delta::Folders(names) => {
                if names.is_empty() {
                    tracing::warn!(caseid = self.caseid, "Ignoring remote folder list without folders");
                    return Ok(false);
                }
                let mut existing: HashMap<String, Folder> = self
                    .folders
                    .drain(..)
                    .map(|f| (f.name.clone(), f))
                    .collect();
                self.folders = names
                    .iter()
                    .map(|name| existing.remove(name).unwrap_or_else(|| Folder::new(name.as_str())))
                    .collect();
                for dropped in existing.keys() {
                    tracing::debug!(folder = %dropped, "Folder removed remotely");
                }

                if let FolderView::Folder(name) = &self.current {
                    if self.folder(name).is_none() {
                        self.current = FolderView::Folder(self.folders[0].name.clone());
                    }
                }
                Ok(true)
            }
        }
    }

    /// Bring a remotely referenced topic into the active set.
    fn activate(&mut self, topic: Handle) {
        match self.state(topic) {
            Some(TopicState::Active) => {}
            Some(TopicState::Scrap) => {
                self.scraps.retain(|&s| s != topic);
                self.topics.push(topic);
                self.set_state(topic, TopicState::Active);
            }
            // Purged handles are unbound, so a remote id never resolves to one.
            _ => {
                self.topics.push(topic);
                self.set_state(topic, TopicState::Active);
            }
        }
    }
}
