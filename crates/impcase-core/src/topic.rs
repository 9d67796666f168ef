//! Topic identity, lifecycle state, and well-known slot names

use serde::{Deserialize, Serialize};

use impress_frames::{Handle, Store};

/// Lifecycle of a topic.
///
/// ```text
/// Active ⇄ Scrap → Purged
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicState {
    /// In the active topic set and referenced by at least one folder
    Active,
    /// Soft-deleted, kept in the scrap bucket for undo
    Scrap,
    /// Identity discarded after redirecting every reference
    Purged,
}

impl TopicState {
    pub fn can_transition_to(&self, target: &TopicState) -> bool {
        matches!(
            (self, target),
            (TopicState::Active, TopicState::Scrap)
                | (TopicState::Scrap, TopicState::Active)
                | (TopicState::Scrap, TopicState::Purged)
        )
    }
}

impl std::fmt::Display for TopicState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicState::Active => write!(f, "active"),
            TopicState::Scrap => write!(f, "scrap"),
            TopicState::Purged => write!(f, "purged"),
        }
    }
}

/// Id of topic `seq` in case `caseid`.
pub fn topic_id(caseid: u64, seq: u64) -> String {
    format!("t/{}/{}", caseid, seq)
}

/// Id of the record standing for a whole case.
pub fn case_ref(caseid: u64) -> String {
    format!("c/{}", caseid)
}

/// Split a topic id into `(caseid, seq)`.
pub fn parse_topic_id(id: &str) -> Option<(u64, u64)> {
    let rest = id.strip_prefix("t/")?;
    let (caseid, seq) = rest.split_once('/')?;
    Some((caseid.parse().ok()?, seq.parse().ok()?))
}

/// Initial content for a new topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSeed {
    /// Id of the item, topic, or case the topic stands in for
    pub link: Option<String>,
    pub name: Option<String>,
    /// Mark the topic as a link to another case file
    pub case_file: bool,
}

impl TopicSeed {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Topic for an external knowledge-base item.
    pub fn item(itemid: impl Into<String>, name: Option<String>) -> Self {
        Self {
            link: Some(itemid.into()),
            name,
            case_file: false,
        }
    }

    /// Topic linking to a topic in another case.
    pub fn topic_link(topicid: impl Into<String>, name: Option<String>) -> Self {
        Self::item(topicid, name)
    }

    /// Topic linking to another case.
    pub fn case_link(caseid: u64, name: Option<String>) -> Self {
        Self {
            link: Some(case_ref(caseid)),
            name,
            case_file: true,
        }
    }
}

/// Interned slot names used by the case model.
#[derive(Debug, Clone, Copy)]
pub struct Names {
    pub is: Handle,
    pub name: Handle,
    pub alias: Handle,
    pub instance_of: Handle,
    pub case_file: Handle,
    pub topics: Handle,
    pub caseid: Handle,
    pub main: Handle,
    pub next: Handle,
    pub folder: Handle,
    pub topic: Handle,
    pub scrap: Handle,
    pub share: Handle,
    pub publish: Handle,
    pub shared: Handle,
    pub modified: Handle,
    pub link: Handle,
    pub url: Handle,
    pub userid: Handle,
    pub credentials: Handle,
}

impl Names {
    pub fn bind(store: &mut Store) -> Self {
        Self {
            is: store.lookup("is"),
            name: store.lookup("name"),
            alias: store.lookup("alias"),
            instance_of: store.lookup("P31"),
            case_file: store.lookup("Q108673968"),
            topics: store.lookup("topics"),
            caseid: store.lookup("caseid"),
            main: store.lookup("main"),
            next: store.lookup("next"),
            folder: store.lookup("folder"),
            topic: store.lookup("topic"),
            scrap: store.lookup("scrap"),
            share: store.lookup("share"),
            publish: store.lookup("publish"),
            shared: store.lookup("shared"),
            modified: store.lookup("modified"),
            link: store.lookup("link"),
            url: store.lookup("url"),
            userid: store.lookup("userid"),
            credentials: store.lookup("credentials"),
        }
    }
}
