//! Per-thread conversation memory.
//!
//! A [`MemoryStore`] maps thread ids to [`Conversation`]s. It is an owned
//! value, constructed once at startup and handed to request handlers by
//! `Arc`; there is no global session table.
//!
//! Each conversation guards its messages with its own async mutex. A whole
//! agent turn holds that lock through [`Conversation::lock`], so concurrent
//! turns on one thread are serialized while distinct threads never contend.
//! Messages are append-only: the [`TurnGuard`] API offers no way to edit or
//! remove one.
//!
//! History lives in process memory. An optional [`MemoryJournal`] receives
//! every appended message so an app can persist and later [`restore`] it.
//!
//! [`restore`]: MemoryStore::restore

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use crate::models::Message;
use crate::tools::BoxError;

/// Write-behind sink for appended messages.
///
/// Called while the conversation lock is held, so records for one thread
/// arrive in append order.
#[async_trait]
pub trait MemoryJournal: Send + Sync {
    async fn record(&self, thread_id: &str, message: &Message) -> Result<(), BoxError>;

    /// Drop everything recorded for `thread_id`.
    async fn forget(&self, thread_id: &str) -> Result<(), BoxError>;
}

/// The ordered message history of one thread.
pub struct Conversation {
    thread_id: String,
    messages: Mutex<Vec<Message>>,
    journal: Option<Arc<dyn MemoryJournal>>,
}

impl Conversation {
    fn new(
        thread_id: String,
        messages: Vec<Message>,
        journal: Option<Arc<dyn MemoryJournal>>,
    ) -> Self {
        Self {
            thread_id,
            messages: Mutex::new(messages),
            journal,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Take exclusive access for a multi-message turn.
    pub async fn lock(&self) -> TurnGuard<'_> {
        TurnGuard {
            conversation: self,
            messages: self.messages.lock().await,
        }
    }

    pub async fn append(&self, message: Message) {
        self.lock().await.push(message).await;
    }

    /// Snapshot of the history in insertion order.
    pub async fn history(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

/// Exclusive, append-only access to one conversation.
pub struct TurnGuard<'a> {
    conversation: &'a Conversation,
    messages: MutexGuard<'a, Vec<Message>>,
}

impl TurnGuard<'_> {
    pub fn thread_id(&self) -> &str {
        &self.conversation.thread_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append `message`, forwarding it to the journal if one is attached.
    ///
    /// Journal failures are logged; the in-memory history stays
    /// authoritative.
    pub async fn push(&mut self, message: Message) {
        if let Some(journal) = &self.conversation.journal {
            if let Err(e) = journal.record(&self.conversation.thread_id, &message).await {
                warn!(thread = %self.conversation.thread_id, error = %e, "failed to journal message");
            }
        }
        self.messages.push(message);
    }
}

/// Thread id to conversation map, shared across requests.
#[derive(Default)]
pub struct MemoryStore {
    threads: RwLock<HashMap<String, Arc<Conversation>>>,
    journal: Option<Arc<dyn MemoryJournal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Arc<dyn MemoryJournal>) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            journal: Some(journal),
        }
    }

    /// Return the conversation for `thread_id`, creating it on first use.
    pub async fn get_or_create(&self, thread_id: &str) -> Arc<Conversation> {
        if let Some(existing) = self.threads.read().await.get(thread_id) {
            return existing.clone();
        }
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!(thread = %thread_id, "new conversation");
                Arc::new(Conversation::new(
                    thread_id.to_string(),
                    Vec::new(),
                    self.journal.clone(),
                ))
            })
            .clone()
    }

    pub async fn get(&self, thread_id: &str) -> Option<Arc<Conversation>> {
        self.threads.read().await.get(thread_id).cloned()
    }

    pub async fn append(&self, thread_id: &str, message: Message) {
        self.get_or_create(thread_id).await.append(message).await;
    }

    /// History of `thread_id`; empty for a thread never referenced.
    pub async fn history(&self, thread_id: &str) -> Vec<Message> {
        match self.get(thread_id).await {
            Some(conversation) => conversation.history().await,
            None => Vec::new(),
        }
    }

    /// Evict `thread_id`. Returns whether it existed.
    ///
    /// A turn already holding the conversation finishes on the evicted
    /// copy; the next reference to the id starts an empty thread.
    pub async fn reset(&self, thread_id: &str) -> bool {
        let removed = self.threads.write().await.remove(thread_id).is_some();
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.forget(thread_id).await {
                warn!(thread = %thread_id, error = %e, "failed to clear journaled thread");
            }
        }
        removed
    }

    /// Install a previously persisted history without re-journaling it.
    pub async fn restore(&self, thread_id: &str, messages: Vec<Message>) {
        let conversation = Arc::new(Conversation::new(
            thread_id.to_string(),
            messages,
            self.journal.clone(),
        ));
        self.threads
            .write()
            .await
            .insert(thread_id.to_string(), conversation);
    }

    /// Known thread ids, sorted.
    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}
