//! In-memory collaborators for hosts without a real store, and for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::SyncableRecord;
use crate::traits::{LocalRepository, ReachabilityProbe, SessionProvider};

/// Vector-backed local repository. Newest records come first.
pub struct InMemoryRepository<R> {
    records: Mutex<Vec<R>>,
    failure: Mutex<Option<String>>,
}

impl<R: SyncableRecord> InMemoryRepository<R> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Make every subsequent call fail with `Error::Internal(message)`.
    /// `None` restores normal behavior.
    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    fn check_failure(&self) -> Result<()> {
        match lock(&self.failure).as_ref() {
            Some(message) => Err(Error::Internal(message.clone())),
            None => Ok(()),
        }
    }
}

impl<R: SyncableRecord> Default for InMemoryRepository<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SyncableRecord> LocalRepository<R> for InMemoryRepository<R> {
    fn fetch_all(&self) -> Result<Vec<R>> {
        self.check_failure()?;
        Ok(lock(&self.records).clone())
    }

    fn fetch(&self, client_id: Uuid) -> Result<Option<R>> {
        self.check_failure()?;
        Ok(lock(&self.records)
            .iter()
            .find(|r| r.client_id() == client_id)
            .cloned())
    }

    fn create(&self, record: &R) -> Result<()> {
        self.check_failure()?;
        let mut records = lock(&self.records);
        if records.iter().any(|r| r.client_id() == record.client_id()) {
            return Err(Error::Internal(format!(
                "{} {} already exists",
                R::KIND,
                record.client_id()
            )));
        }
        records.insert(0, record.clone());
        Ok(())
    }

    fn update(&self, record: &R) -> Result<()> {
        self.check_failure()?;
        let mut records = lock(&self.records);
        match records
            .iter_mut()
            .find(|r| r.client_id() == record.client_id())
        {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("{} {}", R::KIND, record.client_id()))),
        }
    }

    fn delete(&self, record: &R) -> Result<()> {
        self.check_failure()?;
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.client_id() != record.client_id());
        if records.len() == before {
            return Err(Error::NotFound(format!("{} {}", R::KIND, record.client_id())));
        }
        Ok(())
    }

    fn delete_multiple(&self, targets: &[R]) -> Result<()> {
        self.check_failure()?;
        let mut records = lock(&self.records);
        let ids: Vec<Uuid> = targets.iter().map(|r| r.client_id()).collect();
        records.retain(|r| !ids.contains(&r.client_id()));
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        self.check_failure()?;
        Ok(lock(&self.records).len())
    }
}

/// Session with a settable owner id and token.
#[derive(Default)]
pub struct StaticSession {
    user_id: RwLock<Option<String>>,
    token: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let session = Self::default();
        session.sign_in(user_id);
        session
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        if let Ok(mut guard) = self.user_id.write() {
            *guard = Some(user_id.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.user_id.write() {
            *guard = None;
        }
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }
}

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().ok().and_then(|g| g.clone())
    }

    fn access_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|g| g.clone())
    }
}

/// Reachability probe toggled by the host.
pub struct StaticReachability {
    connected: AtomicBool,
}

impl StaticReachability {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl ReachabilityProbe for StaticReachability {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// A panic while holding one of these locks leaves plain data behind, so
// poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bookmark, Category};

    #[test]
    fn test_fetch_all_returns_newest_first() {
        let repo = InMemoryRepository::new();
        let first = Bookmark::new("first", "https://1.example");
        let second = Bookmark::new("second", "https://2.example");
        repo.create(&first).unwrap();
        repo.create(&second).unwrap();

        let all = repo.fetch_all().unwrap();
        assert_eq!(all[0].title, "second");
        assert_eq!(all[1].title, "first");
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_create_rejects_duplicate_client_id() {
        let repo = InMemoryRepository::new();
        let category = Category::new("Reading");
        repo.create(&category).unwrap();
        assert!(matches!(repo.create(&category), Err(Error::Internal(_))));
    }

    #[test]
    fn test_update_and_fetch() {
        let repo = InMemoryRepository::new();
        let mut bookmark = Bookmark::new("draft", "https://a.example");
        repo.create(&bookmark).unwrap();

        bookmark.title = "final".into();
        repo.update(&bookmark).unwrap();

        let stored = repo.fetch(bookmark.client_id).unwrap().unwrap();
        assert_eq!(stored.title, "final");
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let repo: InMemoryRepository<Bookmark> = InMemoryRepository::new();
        let bookmark = Bookmark::new("ghost", "https://a.example");
        assert!(matches!(repo.update(&bookmark), Err(Error::NotFound(_))));
        assert!(matches!(repo.delete(&bookmark), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_multiple() {
        let repo = InMemoryRepository::new();
        let a = Category::new("a");
        let b = Category::new("b");
        let c = Category::new("c");
        for category in [&a, &b, &c] {
            repo.create(category).unwrap();
        }

        repo.delete_multiple(&[a.clone(), c.clone()]).unwrap();
        let remaining = repo.fetch_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].client_id, b.client_id);
    }

    #[test]
    fn test_failure_injection() {
        let repo: InMemoryRepository<Category> = InMemoryRepository::new();
        repo.set_failure(Some("disk full"));
        let err = repo.create(&Category::new("x")).unwrap_err();
        assert_eq!(err.to_string(), "Internal error: disk full");

        repo.set_failure(None);
        assert!(repo.create(&Category::new("x")).is_ok());
    }

    #[test]
    fn test_static_session() {
        let session = StaticSession::signed_out();
        assert!(!session.is_authenticated());

        session.sign_in("user-1");
        session.set_access_token("jwt");
        assert_eq!(session.current_user_id().as_deref(), Some("user-1"));
        assert_eq!(session.access_token().as_deref(), Some("jwt"));

        session.sign_out();
        assert!(session.current_user_id().is_none());
        assert!(session.access_token().is_none());
    }

    #[test]
    fn test_static_reachability() {
        let probe = StaticReachability::new(false);
        assert!(!probe.is_connected());
        probe.set_connected(true);
        assert!(probe.is_connected());
    }
}
