//! impcase-core: case documents for the impress case editor.
//!
//! A case is a set of topics (frame records) organized into named folders,
//! plus a scrap folder holding topics that were deleted but may still be
//! pasted back. The document keeps references between topics intact when
//! topics are purged, merged, or copied between cases, and can be shared
//! with other users through a collaboration server.
//!
//! ```text
//! CaseSession ── edits ──▶ CaseDocument ── CaseEvent ──▶ Delta ──▶ server
//!      ▲                                                            │
//!      └──────────────────── remote Delta ◀─────────────────────────┘
//! ```

pub mod clipboard;
pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod folder;
mod integrity;
pub mod search;
pub mod session;
pub mod sync;
pub mod topic;

pub use clipboard::{ClipFormat, Clipping};
pub use config::{CaseConfig, ConfigError};
pub use document::{CaseDocument, CollabLink, IdSource, Sharing, DEFAULT_FOLDER};
pub use error::{CaseError, Result, TransportError, ValidationError};
pub use event::{CaseEvent, Delta};
pub use folder::{Direction, Folder, FolderView};
pub use search::display_names;
pub use session::{CaseSession, SessionNotice};
pub use sync::{CollabHub, Connection, SyncHandle, SyncNotice, Synchronizer};
pub use topic::{case_ref, parse_topic_id, topic_id, Names, TopicSeed, TopicState};

pub use impress_frames::{Handle, Value};
