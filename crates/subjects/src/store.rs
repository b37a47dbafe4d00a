use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::schema::{Alias, Subject, SubjectId};

/// The identity store as seen by the resolver: a full snapshot on demand.
///
/// The resolver polls this on a time-to-live instead of subscribing to change
/// events, so implementations should return every current subject each call.
#[async_trait]
pub trait SubjectSource: Send + Sync {
    async fn list(&self) -> Result<Vec<Subject>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("subject name must not be empty")]
    EmptyName,
    #[error("subject '{0}' already exists")]
    Duplicate(SubjectId),
    #[error("subject '{0}' not found")]
    NotFound(SubjectId),
}

/// Process-local identity store.
///
/// Keeps subjects in insertion order so `list` snapshots are stable.
#[derive(Debug, Default)]
pub struct InMemorySubjectStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    subjects: Vec<Subject>,
    seen_ids: HashSet<SubjectId>,
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_subjects(subjects: impl IntoIterator<Item = Subject>) -> Self {
        let store = Self::new();
        for subject in subjects {
            // Repeated ids and blank names are dropped, as `insert` rejects
            // them.
            let _ = store.insert(subject);
        }
        store
    }

    /// Create a subject with a freshly minted id.
    pub fn create(&self, name: impl Into<String>) -> Result<Subject, StoreError> {
        let subject = Subject::new(Uuid::new_v4().to_string(), name);
        self.insert(subject.clone())?;
        Ok(subject)
    }

    pub fn insert(&self, subject: Subject) -> Result<(), StoreError> {
        if subject.name.trim().is_empty() {
            return Err(StoreError::EmptyName);
        }
        let mut inner = self.inner.write();
        if !inner.seen_ids.insert(subject.id.clone()) {
            return Err(StoreError::Duplicate(subject.id));
        }
        inner.subjects.push(subject);
        Ok(())
    }

    /// Replace the subject with the same id, or append it when new.  Returns
    /// the previous record.
    pub fn upsert(&self, subject: Subject) -> Result<Option<Subject>, StoreError> {
        if subject.name.trim().is_empty() {
            return Err(StoreError::EmptyName);
        }
        let mut inner = self.inner.write();
        if let Some(slot) = inner.subjects.iter_mut().find(|s| s.id == subject.id) {
            return Ok(Some(std::mem::replace(slot, subject)));
        }
        inner.seen_ids.insert(subject.id.clone());
        inner.subjects.push(subject);
        Ok(None)
    }

    pub fn add_alias(&self, id: &str, alias: impl Into<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let subject = inner
            .subjects
            .iter_mut()
            .find(|subject| subject.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        subject.aliases.push(Alias::new(alias));
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Subject, StoreError> {
        let mut inner = self.inner.write();
        let pos = inner
            .subjects
            .iter()
            .position(|subject| subject.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        inner.seen_ids.remove(id);
        Ok(inner.subjects.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<Subject> {
        self.inner
            .read()
            .subjects
            .iter()
            .find(|subject| subject.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubjectSource for InMemorySubjectStore {
    async fn list(&self) -> Result<Vec<Subject>> {
        Ok(self.inner.read().subjects.clone())
    }
}
