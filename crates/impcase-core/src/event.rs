use serde::{Deserialize, Serialize};

use impress_frames::Handle;

/// Committed structural change to a case document.
///
/// Documents queue these in an outbox; the editing session drains it and
/// forwards each event to the collaboration server as a [`Delta`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseEvent {
    /// A topic record was created or edited
    TopicUpdated(Handle),
    /// A topic left the case
    TopicDeleted(String),
    /// Membership or order of the named folder changed
    FolderUpdated(String),
    FolderRenamed { old: String, new: String },
    /// Folders were added, removed, or reordered
    FoldersUpdated,
}

/// Minimal self-contained description of a change, as exchanged with the
/// collaboration server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delta {
    /// A single topic record in binary record format
    Topic(Vec<u8>),
    TopicDeleted(String),
    /// Full member list of one folder, as topic ids
    Folder { name: String, topics: Vec<String> },
    FolderRenamed { old: String, new: String },
    /// Full folder-name ordering
    Folders(Vec<String>),
}

impl Delta {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Delta::Topic(_) => "topic_updated",
            Delta::TopicDeleted(_) => "topic_deleted",
            Delta::Folder { .. } => "folder_updated",
            Delta::FolderRenamed { .. } => "folder_renamed",
            Delta::Folders(_) => "folders_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_serde_round_trip() {
        let deltas = vec![
            Delta::Topic(vec![0, 1, 2]),
            Delta::TopicDeleted("t/1/2".into()),
            Delta::Folder {
                name: "General".into(),
                topics: vec!["c/1".into(), "t/1/1".into()],
            },
            Delta::FolderRenamed {
                old: "A".into(),
                new: "B".into(),
            },
            Delta::Folders(vec!["B".into(), "General".into()]),
        ];
        for d in &deltas {
            let json = serde_json::to_string(d).unwrap();
            let back: Delta = serde_json::from_str(&json).unwrap();
            assert_eq!(*d, back);
        }
    }

    #[test]
    fn delta_kind() {
        assert_eq!(Delta::Folders(vec![]).kind(), "folders_updated");
    }
}
