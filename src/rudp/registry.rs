use crate::rudp::peer_addr::PeerKey;
use crate::rudp::session::SessionMessage;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

pub struct SessionHandle {
    /// distinguishes this session from earlier or later sessions for the same peer
    pub session_id: u64,
    pub mailbox: mpsc::Sender<SessionMessage>,
    abort_handle: AbortHandle,
}

/// Maps peer identities to the mailboxes of their session tasks. It is owned by the server, and
///  there is never more than one live session per peer.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<PeerKey, SessionHandle>>,
    next_session_id: AtomicU64,
}

impl SessionRegistry {
    /// Returns the mailbox of the peer's live session, starting a new session if there is none.
    ///  `start_session` is called with the new session's id and the receiving end of its mailbox,
    ///  and returns the handle of the spawned task.
    ///
    /// A session whose task has terminated (i.e. its mailbox is closed) is replaced, even if it
    ///  did not remove itself from the registry yet.
    pub async fn get_or_create(
        &self,
        key: PeerKey,
        mailbox_capacity: usize,
        start_session: impl FnOnce(u64, mpsc::Receiver<SessionMessage>) -> AbortHandle,
    ) -> mpsc::Sender<SessionMessage> {
        let mut sessions = self.sessions.lock().await;
        match sessions.entry(key) {
            Entry::Occupied(e) if !e.get().mailbox.is_closed() => e.get().mailbox.clone(),
            entry => {
                let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                debug!("starting session #{} for {}", session_id, key);

                let (sender, receiver) = mpsc::channel(mailbox_capacity);
                let handle = SessionHandle {
                    session_id,
                    mailbox: sender.clone(),
                    abort_handle: start_session(session_id, receiver),
                };
                match entry {
                    Entry::Occupied(mut e) => { e.insert(handle); }
                    Entry::Vacant(e) => { e.insert(handle); }
                }
                sender
            }
        }
    }

    /// Removes the peer's session if it is still the one with the given id
    pub async fn remove(&self, key: &PeerKey, session_id: u64) {
        let mut sessions = self.sessions.lock().await;
        if let Entry::Occupied(e) = sessions.entry(*key) {
            if e.get().session_id == session_id {
                debug!("removing session #{} for {}", session_id, key);
                e.remove();
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Removes all sessions, aborting their tasks
    pub async fn clear(&self) {
        let mut sessions = self.sessions.lock().await;
        for (key, handle) in sessions.drain() {
            debug!("aborting session #{} for {}", handle.session_id, key);
            handle.abort_handle.abort();
        }
    }
}
