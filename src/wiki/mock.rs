//! In-memory wiki backend for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::*;

/// Mock backend for testing.
///
/// Pages carry monotonically increasing revision ids; every save is recorded
/// and can be inspected afterwards.
pub struct MockWiki {
    pages: Mutex<HashMap<String, (String, u64)>>,
    users: Mutex<HashMap<String, UserInfo>>,
    blocks: Mutex<HashMap<String, Vec<BlockRecord>>>,
    categories: Mutex<HashMap<String, Vec<String>>>,
    locked: Mutex<HashSet<String>>,
    lock_failures: Mutex<HashSet<String>>,
    category_failures: Mutex<HashSet<String>>,
    refused_saves: Mutex<HashSet<String>>,
    saves: Mutex<Vec<PageEdit>>,
    next_revision: AtomicU64,
}

impl MockWiki {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            categories: Mutex::new(HashMap::new()),
            locked: Mutex::new(HashSet::new()),
            lock_failures: Mutex::new(HashSet::new()),
            category_failures: Mutex::new(HashSet::new()),
            refused_saves: Mutex::new(HashSet::new()),
            saves: Mutex::new(Vec::new()),
            next_revision: AtomicU64::new(1000),
        }
    }

    /// Create or overwrite a page with a fresh revision.
    pub fn with_page(self, title: impl Into<String>, text: impl Into<String>) -> Self {
        self.external_edit(title, text);
        self
    }

    /// Register a user or IP and its current block.
    pub fn with_user(self, info: UserInfo) -> Self {
        lock(&self.users).insert(info.name.clone(), info);
        self
    }

    pub fn with_blocks(self, name: impl Into<String>, blocks: Vec<BlockRecord>) -> Self {
        lock(&self.blocks).insert(name.into(), blocks);
        self
    }

    pub fn with_categories(self, name: impl Into<String>, categories: Vec<String>) -> Self {
        lock(&self.categories).insert(name.into(), categories);
        self
    }

    pub fn with_locked(self, name: impl Into<String>) -> Self {
        lock(&self.locked).insert(name.into());
        self
    }

    /// Make the lock lookup for `name` fail.
    pub fn with_lock_lookup_failure(self, name: impl Into<String>) -> Self {
        lock(&self.lock_failures).insert(name.into());
        self
    }

    /// Make the category lookup for `name` fail.
    pub fn with_category_lookup_failure(self, name: impl Into<String>) -> Self {
        lock(&self.category_failures).insert(name.into());
        self
    }

    /// Reject every save to `title` as an edit conflict.
    pub fn with_conflicting_saves(self, title: impl Into<String>) -> Self {
        lock(&self.refused_saves).insert(title.into());
        self
    }

    /// Simulate another editor changing a page.
    pub fn external_edit(&self, title: impl Into<String>, text: impl Into<String>) -> u64 {
        let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        lock(&self.pages).insert(title.into(), (text.into(), revision));
        revision
    }

    /// Current text of a page, if it exists.
    pub fn text(&self, title: &str) -> Option<String> {
        lock(&self.pages).get(title).map(|(text, _)| text.clone())
    }

    pub fn revision(&self, title: &str) -> Option<u64> {
        lock(&self.pages).get(title).map(|(_, revision)| *revision)
    }

    /// Every edit committed through `save_page`, oldest first.
    pub fn saves(&self) -> Vec<PageEdit> {
        lock(&self.saves).clone()
    }

    pub fn save_count(&self) -> usize {
        lock(&self.saves).len()
    }
}

impl Default for MockWiki {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl WikiBackend for MockWiki {
    async fn fetch_page(&self, title: &str) -> Result<Page, WikiError> {
        Ok(match lock(&self.pages).get(title) {
            Some((text, revision)) => Page {
                title: title.to_string(),
                text: text.clone(),
                revision: Some(*revision),
                exists: true,
            },
            None => Page::missing(title),
        })
    }

    async fn save_page(&self, edit: &PageEdit) -> Result<Option<u64>, WikiError> {
        let mut pages = lock(&self.pages);
        let Some((text, revision)) = pages.get_mut(&edit.title) else {
            return Err(WikiError::Api {
                code: "missingtitle".to_string(),
                info: format!("The page {} does not exist", edit.title),
            });
        };

        if lock(&self.refused_saves).contains(&edit.title)
            || (edit.base_revision.is_some() && edit.base_revision != Some(*revision))
        {
            return Err(WikiError::Conflict(edit.title.clone()));
        }

        lock(&self.saves).push(edit.clone());

        if *text == edit.text {
            return Ok(None);
        }

        let new_revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        *text = edit.text.clone();
        *revision = new_revision;
        Ok(Some(new_revision))
    }

    async fn user_info(&self, name: &str) -> Result<UserInfo, WikiError> {
        Ok(lock(&self.users).get(name).cloned().unwrap_or_else(|| UserInfo {
            name: name.to_string(),
            anonymous: is_anonymous_subject(name),
            block: None,
        }))
    }

    async fn list_blocks(&self, name: &str) -> Result<Vec<BlockRecord>, WikiError> {
        Ok(lock(&self.blocks).get(name).cloned().unwrap_or_default())
    }

    async fn is_locked(&self, name: &str) -> Result<bool, WikiError> {
        if lock(&self.lock_failures).contains(name) {
            return Err(WikiError::Network(format!("lock lookup for {} failed", name)));
        }
        Ok(lock(&self.locked).contains(name))
    }

    async fn user_categories(&self, name: &str) -> Result<Vec<String>, WikiError> {
        if lock(&self.category_failures).contains(name) {
            return Err(WikiError::Network(format!("category lookup for {} failed", name)));
        }
        Ok(lock(&self.categories).get(name).cloned().unwrap_or_default())
    }
}
