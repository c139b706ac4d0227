//! Wiring of the sync services for one process.

use std::sync::Arc;

use keepsake_core::{
    Bookmark, Category, InMemoryRepository, LocalRepository, ReachabilityProbe, RemoteStore,
    Result, SessionProvider,
};
use keepsake_crypto::{FieldCipher, KeyManager};
use keepsake_mirror::MirrorClient;
use tracing::info;

use crate::config::SyncConfig;
use crate::dispatch::SyncDispatcher;
use crate::orchestrator::SyncOrchestrator;
use crate::repository::SyncingRepository;

/// The assembled sync engine.
///
/// `bookmarks` and `categories` are the decorated repositories the
/// application should mutate through.
pub struct SyncEngine {
    pub keys: Arc<KeyManager>,
    pub orchestrator: SyncOrchestrator,
    pub dispatcher: Arc<SyncDispatcher>,
    pub bookmarks: Arc<SyncingRepository<Bookmark>>,
    pub categories: Arc<SyncingRepository<Category>>,
}

impl SyncEngine {
    pub fn builder(
        keys: Arc<KeyManager>,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
        reachability: Arc<dyn ReachabilityProbe>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            keys,
            remote,
            session,
            reachability,
            bookmarks: None,
            categories: None,
            config: SyncConfig::default(),
            auto_sync: false,
        }
    }

    /// Stop the auto-sync timer and drain the dispatcher.
    pub async fn shutdown(&self) -> Result<()> {
        self.orchestrator.stop_auto_sync();
        self.dispatcher.shutdown().await
    }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    keys: Arc<KeyManager>,
    remote: Arc<dyn RemoteStore>,
    session: Arc<dyn SessionProvider>,
    reachability: Arc<dyn ReachabilityProbe>,
    bookmarks: Option<Arc<dyn LocalRepository<Bookmark>>>,
    categories: Option<Arc<dyn LocalRepository<Category>>>,
    config: SyncConfig,
    auto_sync: bool,
}

impl SyncEngineBuilder {
    pub fn with_bookmarks(mut self, repo: Arc<dyn LocalRepository<Bookmark>>) -> Self {
        self.bookmarks = Some(repo);
        self
    }

    pub fn with_categories(mut self, repo: Arc<dyn LocalRepository<Category>>) -> Self {
        self.categories = Some(repo);
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the auto-sync timer on build.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Assemble and start the engine. Must be called from within a Tokio
    /// runtime. Repositories not supplied default to in-memory ones.
    pub fn build(self) -> SyncEngine {
        let bookmarks: Arc<dyn LocalRepository<Bookmark>> = match self.bookmarks {
            Some(repo) => repo,
            None => Arc::new(InMemoryRepository::<Bookmark>::new()),
        };
        let categories: Arc<dyn LocalRepository<Category>> = match self.categories {
            Some(repo) => repo,
            None => Arc::new(InMemoryRepository::<Category>::new()),
        };

        let mirror = MirrorClient::new(self.remote, FieldCipher::new(self.keys.clone()));
        let orchestrator = SyncOrchestrator::new(
            mirror,
            bookmarks.clone(),
            categories.clone(),
            self.session,
            self.reachability,
            self.config.clone(),
        );
        let dispatcher = Arc::new(SyncDispatcher::start(orchestrator.clone(), &self.config));

        let enabled = self.config.enabled;
        let engine = SyncEngine {
            keys: self.keys,
            bookmarks: Arc::new(SyncingRepository::new(bookmarks, dispatcher.clone(), enabled)),
            categories: Arc::new(SyncingRepository::new(categories, dispatcher.clone(), enabled)),
            orchestrator,
            dispatcher,
        };

        if self.auto_sync {
            engine
                .orchestrator
                .start_auto_sync(self.config.auto_sync_interval());
        }

        info!(
            sync_enabled = enabled,
            auto_sync = self.auto_sync,
            "Sync engine started"
        );
        engine
    }
}
