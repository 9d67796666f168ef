//! Editing session
//!
//! [`CaseSession`] is the single mutator of a case document. It allocates
//! topic ids before the first mutating step of an operation, forwards the
//! document's committed events to the collaboration server, and applies
//! remote changes between operations.

use std::time::Duration;

use impress_frames::Handle;

use crate::clipboard::{self, ClipFormat};
use crate::config::CaseConfig;
use crate::document::{CaseDocument, CollabLink, IdSource};
use crate::error::{Result, TransportError};
use crate::sync::{Connection, SyncHandle, SyncNotice, Synchronizer};
use crate::topic::TopicSeed;

/// What the user interface has to do after a remote event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The current folder changed
    Refresh,
    /// The collaboration connection was lost
    Reconnect,
    /// Non-fatal problem to show to the user
    Warning(String),
}

pub struct CaseSession {
    doc: CaseDocument,
    sync: Option<SyncHandle>,
    config: CaseConfig,
    /// Last snapshot saved while collaborating
    localcase: Option<Vec<u8>>,
}

impl CaseSession {
    pub fn new(doc: CaseDocument, config: CaseConfig) -> Self {
        Self {
            doc,
            sync: None,
            config,
            localcase: None,
        }
    }

    /// Open a saved case.
    pub fn open(data: &[u8], config: CaseConfig) -> Result<Self> {
        Ok(Self::new(CaseDocument::decode(data)?, config))
    }

    pub fn document(&self) -> &CaseDocument {
        &self.doc
    }

    pub fn config(&self) -> &CaseConfig {
        &self.config
    }

    pub fn is_collaborating(&self) -> bool {
        self.sync.is_some()
    }

    /// Snapshot kept by the last save while collaborating.
    pub fn localcase(&self) -> Option<&[u8]> {
        self.localcase.as_deref()
    }

    fn clip_format(&self) -> ClipFormat {
        if self.config.clipboard.binary {
            ClipFormat::Binary
        } else {
            ClipFormat::Text
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.collab.login_timeout_secs)
    }

    /// Run a document operation and forward what it committed.
    pub fn edit<R>(&mut self, op: impl FnOnce(&mut CaseDocument) -> Result<R>) -> Result<R> {
        let result = op(&mut self.doc);
        self.publish();
        result
    }

    fn publish(&mut self) {
        let events = self.doc.take_events();
        let Some(sync) = &self.sync else {
            return;
        };
        for event in &events {
            if let Some(delta) = self.doc.delta_for(event) {
                if let Err(e) = sync.push(delta) {
                    tracing::warn!("Unable to forward {:?}: {}", event, e);
                }
            }
        }
    }

    /// Reserve `count` topic ids from the issuing authority.
    async fn allocate_ids(&mut self, count: usize) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(count);
        match (&self.sync, self.doc.id_source()) {
            (Some(sync), _) => {
                for _ in 0..count {
                    ids.push(sync.next_id().await?);
                }
            }
            (None, IdSource::Delegated) => return Err(TransportError::NotConnected.into()),
            (None, IdSource::Local) => {
                for _ in 0..count {
                    ids.push(self.doc.next_local_id()?);
                }
            }
        }
        Ok(ids)
    }

    pub async fn new_topic(&mut self, seed: TopicSeed) -> Result<Handle> {
        self.doc.check_insertable()?;
        let ids = self.allocate_ids(1).await?;
        self.edit(|doc| doc.create_topic(ids[0], seed))
    }

    pub fn copy(&self, topics: &[Handle]) -> Vec<u8> {
        clipboard::write(&self.doc, topics, self.clip_format())
    }

    /// Copy topics to a clipboard payload and delete them from the current
    /// folder.
    pub fn cut(&mut self, topics: &[Handle]) -> Result<Vec<u8>> {
        self.doc.check_writable()?;
        let payload = self.copy(topics);
        self.edit(|doc| doc.delete_topics(topics))?;
        Ok(payload)
    }

    /// Paste a clipboard payload into the current folder.
    ///
    /// Returns `Ok(None)` if the payload holds no records.
    pub async fn paste(&mut self, payload: &[u8]) -> Result<Option<Vec<Handle>>> {
        let Some(clip) = clipboard::read(payload)? else {
            return Ok(None);
        };
        self.doc.check_insertable()?;
        let ids = self.allocate_ids(self.doc.foreign_count(&clip)).await?;
        self.edit(|doc| doc.paste(&clip, &ids)).map(Some)
    }

    pub fn merge(&mut self, target: Handle, sources: &[Handle]) -> Result<()> {
        self.edit(|doc| doc.merge(target, sources))
    }

    pub fn search(&self, query: &str, exact_only: bool) -> Vec<Handle> {
        self.doc
            .search_limited(query, exact_only, None, self.config.search.max_results)
    }

    /// Purge scraps and encode the case for storage.
    ///
    /// While collaborating the snapshot is also kept as the local case.
    pub fn save(&mut self) -> Result<Vec<u8>> {
        self.doc.check_writable()?;
        self.edit(|doc| {
            doc.purge_scraps();
            Ok(())
        })?;
        self.doc.touch();

        let data = self.doc.encode(ClipFormat::Binary);
        if self.is_collaborating() {
            self.localcase = Some(data.clone());
        }
        self.doc.mark_clean();
        tracing::info!(caseid = self.doc.caseid(), bytes = data.len(), "Saved case");
        Ok(data)
    }

    /// Update sharing flags and save.
    pub fn share(&mut self, share: bool, publish: bool) -> Result<Vec<u8>> {
        self.doc.set_sharing(share, publish)?;
        self.save()
    }

    /// Turn the case into a collaboration hosted by the server behind `conn`.
    pub async fn collaborate(&mut self, conn: Connection, userid: &str) -> Result<()> {
        self.doc.check_writable()?;
        if self.is_collaborating() {
            return Err(TransportError::Remote("already collaborating".to_string()).into());
        }

        let mut sync = Synchronizer::new(conn).with_timeout(self.timeout());
        let credentials = sync
            .create(self.doc.encode(ClipFormat::Binary), userid)
            .await?;
        sync.login(self.doc.caseid(), userid, &credentials).await?;

        // The server now holds everything committed so far.
        self.doc.take_events();
        self.doc.set_collab(Some(CollabLink {
            url: self.config.collab.url.clone(),
            userid: userid.to_string(),
            credentials,
        }));
        self.doc.set_id_source(IdSource::Delegated);
        self.sync = Some(sync.spawn());
        tracing::info!(caseid = self.doc.caseid(), "Started collaboration");
        Ok(())
    }

    /// Open a shared case by logging in to its server.
    pub async fn join(
        conn: Connection,
        config: CaseConfig,
        caseid: u64,
        userid: &str,
        credentials: &str,
    ) -> Result<Self> {
        let mut session = Self::new(CaseDocument::new(caseid, ""), config);
        session.login(conn, caseid, userid, credentials).await?;
        Ok(session)
    }

    /// Redeem an invitation, then log in with the issued credentials.
    pub async fn accept_invite(
        conn: Connection,
        config: CaseConfig,
        caseid: u64,
        userid: &str,
        key: &str,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.collab.login_timeout_secs);
        let mut sync = Synchronizer::new(conn).with_timeout(timeout);
        let credentials = sync.join(caseid, userid, key).await?;
        let snapshot = sync.login(caseid, userid, &credentials).await?;

        let mut session = Self::new(CaseDocument::decode(&snapshot)?, config);
        session.attach(sync, userid, credentials);
        Ok(session)
    }

    /// Log in again after the connection was lost.
    pub async fn reconnect(&mut self, conn: Connection) -> Result<()> {
        let link = self
            .doc
            .collab()
            .cloned()
            .ok_or(TransportError::NotConnected)?;
        self.login(conn, self.doc.caseid(), &link.userid, &link.credentials)
            .await
    }

    async fn login(
        &mut self,
        conn: Connection,
        caseid: u64,
        userid: &str,
        credentials: &str,
    ) -> Result<()> {
        let mut sync = Synchronizer::new(conn).with_timeout(self.timeout());
        let snapshot = sync.login(caseid, userid, credentials).await?;
        // The server copy is authoritative.
        self.doc = CaseDocument::decode(&snapshot)?;
        self.attach(sync, userid, credentials.to_string());
        Ok(())
    }

    fn attach(&mut self, sync: Synchronizer, userid: &str, credentials: String) {
        self.doc.set_collab(Some(CollabLink {
            url: self.config.collab.url.clone(),
            userid: userid.to_string(),
            credentials,
        }));
        self.doc.set_id_source(IdSource::Delegated);
        self.doc.mark_clean();
        self.sync = Some(sync.spawn());
    }

    /// Invite another user. Returns the key to pass on to them.
    pub async fn invite(&self, participant: &str) -> Result<String> {
        let sync = self.sync.as_ref().ok_or(TransportError::NotConnected)?;
        Ok(sync.invite(participant).await?)
    }

    fn on_notice(&mut self, notice: SyncNotice) -> Option<SessionNotice> {
        match notice {
            SyncNotice::Remote(delta) => match self.doc.apply_delta(&delta) {
                Ok(true) => Some(SessionNotice::Refresh),
                Ok(false) => None,
                Err(e) => {
                    tracing::warn!("Unable to apply remote {}: {}", delta.kind(), e);
                    Some(SessionNotice::Warning(e.to_string()))
                }
            },
            SyncNotice::Error(message) => Some(SessionNotice::Warning(message)),
            SyncNotice::ConnectionLost => {
                self.sync = None;
                Some(SessionNotice::Reconnect)
            }
        }
    }

    /// Apply every remote change that has arrived.
    pub fn poll_remote(&mut self) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Some(notice) = self.sync.as_mut().and_then(SyncHandle::try_notice) {
            notices.extend(self.on_notice(notice));
        }
        notices
    }

    /// Wait for the next remote event that needs attention.
    ///
    /// Returns `None` when not collaborating.
    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        loop {
            let notice = self.sync.as_mut()?.notice().await;
            let notice = notice.unwrap_or(SyncNotice::ConnectionLost);
            if let Some(notice) = self.on_notice(notice) {
                return Some(notice);
            }
        }
    }
}

impl From<CaseSession> for CaseDocument {
    fn from(session: CaseSession) -> Self {
        session.doc
    }
}

impl std::fmt::Debug for CaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseSession")
            .field("doc", &self.doc)
            .field("collaborating", &self.is_collaborating())
            .finish()
    }
}
