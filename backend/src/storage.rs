use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;

use common::demo_analysis::{MatchStatistics, PlayerHeatmap};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

/// A finished match as it is persisted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredMatch {
    pub statistics: MatchStatistics,
    pub heatmaps: Vec<PlayerHeatmap>,
    pub stored_at: DateTime<Utc>,
}

impl StoredMatch {
    pub fn new(statistics: MatchStatistics, heatmaps: Vec<PlayerHeatmap>) -> Self {
        Self {
            statistics,
            heatmaps,
            stored_at: Utc::now(),
        }
    }

    pub fn match_id(&self) -> &str {
        &self.statistics.match_id
    }
}

pub trait MatchStorage: Send + Sync {
    fn store<'f, 'own>(&'own self, stored: StoredMatch) -> BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f;

    fn load<'f, 'own>(
        &'own self,
        match_id: String,
    ) -> BoxFuture<'f, Result<Option<Arc<StoredMatch>>, StorageError>>
    where
        'own: 'f;

    /// Checks that the backend is reachable.
    fn ping<'f, 'own>(&'own self) -> BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f;

    /// Removes every match stored before `cutoff`, returning how many were removed.
    fn evict_before<'f, 'own>(
        &'own self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'f, Result<usize, StorageError>>
    where
        'own: 'f;
}

#[derive(Default)]
pub struct MemoryStorage {
    matches: RwLock<HashMap<String, Arc<StoredMatch>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::Unavailable("memory storage lock poisoned".to_owned())
    }
}

impl MatchStorage for MemoryStorage {
    fn store<'f, 'own>(&'own self, stored: StoredMatch) -> BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f,
    {
        async move {
            let mut matches = self.matches.write().map_err(|_| Self::poisoned())?;
            matches.insert(stored.match_id().to_owned(), Arc::new(stored));
            Ok(())
        }
        .boxed()
    }

    fn load<'f, 'own>(
        &'own self,
        match_id: String,
    ) -> BoxFuture<'f, Result<Option<Arc<StoredMatch>>, StorageError>>
    where
        'own: 'f,
    {
        async move {
            let matches = self.matches.read().map_err(|_| Self::poisoned())?;
            Ok(matches.get(&match_id).cloned())
        }
        .boxed()
    }

    fn ping<'f, 'own>(&'own self) -> BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f,
    {
        async move {
            self.matches.read().map_err(|_| Self::poisoned())?;
            Ok(())
        }
        .boxed()
    }

    fn evict_before<'f, 'own>(
        &'own self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'f, Result<usize, StorageError>>
    where
        'own: 'f,
    {
        async move {
            let mut matches = self.matches.write().map_err(|_| Self::poisoned())?;
            let before = matches.len();
            matches.retain(|_, stored| stored.stored_at >= cutoff);
            Ok(before - matches.len())
        }
        .boxed()
    }
}

/// Keeps one JSON document per match in a folder.
pub struct FileStorage {
    folder: Arc<std::path::PathBuf>,
}

impl FileStorage {
    pub fn new<P>(folder: P) -> Self
    where
        P: Into<std::path::PathBuf>,
    {
        Self {
            folder: Arc::new(folder.into()),
        }
    }

    fn path(&self, match_id: &str) -> std::path::PathBuf {
        self.folder.join(format!("{}.json", match_id))
    }
}

impl MatchStorage for FileStorage {
    fn store<'f, 'own>(&'own self, stored: StoredMatch) -> BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f,
    {
        async move {
            if !tokio::fs::try_exists(self.folder.as_path()).await.unwrap_or(false) {
                tokio::fs::create_dir_all(self.folder.as_path()).await?;
            }

            let content = serde_json::to_vec(&stored)?;

            // Readers never see a partially written document
            let target = self.path(stored.match_id());
            let tmp = target.with_extension("json.tmp");
            tokio::fs::write(&tmp, content).await?;
            tokio::fs::rename(&tmp, &target).await?;

            Ok(())
        }
        .boxed()
    }

    fn load<'f, 'own>(
        &'own self,
        match_id: String,
    ) -> BoxFuture<'f, Result<Option<Arc<StoredMatch>>, StorageError>>
    where
        'own: 'f,
    {
        async move {
            let content = match tokio::fs::read(self.path(&match_id)).await {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let stored: StoredMatch = serde_json::from_slice(&content)?;
            Ok(Some(Arc::new(stored)))
        }
        .boxed()
    }

    fn ping<'f, 'own>(&'own self) -> BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f,
    {
        async move {
            tokio::fs::create_dir_all(self.folder.as_path())
                .await
                .map_err(|e| StorageError::Unavailable(format!("{:?}: {}", self.folder, e)))?;
            Ok(())
        }
        .boxed()
    }

    fn evict_before<'f, 'own>(
        &'own self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'f, Result<usize, StorageError>>
    where
        'own: 'f,
    {
        async move {
            let mut entries = match tokio::fs::read_dir(self.folder.as_path()).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
                Err(e) => return Err(e.into()),
            };

            let mut removed = 0;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                    continue;
                }

                let modified: DateTime<Utc> = entry.metadata().await?.modified()?.into();
                if modified < cutoff {
                    tracing::debug!(?path, "Removing expired match");
                    tokio::fs::remove_file(&path).await?;
                    removed += 1;
                }
            }

            Ok(removed)
        }
        .boxed()
    }
}

pub mod postgres {
    use super::*;

    use diesel::prelude::*;
    use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

    use crate::models::MatchRecord;
    use crate::schema::match_statistics::dsl;

    const MIGRATIONS: diesel_async_migrations::EmbeddedMigrations =
        diesel_async_migrations::embed_migrations!("../migrations/");

    pub struct PostgresStorage {
        database_url: String,
    }

    impl PostgresStorage {
        pub fn new<IS>(database_url: IS) -> Self
        where
            IS: Into<String>,
        {
            Self {
                database_url: database_url.into(),
            }
        }

        async fn connection(&self) -> Result<AsyncPgConnection, StorageError> {
            AsyncPgConnection::establish(&self.database_url)
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))
        }

        pub async fn run_migrations(&self) -> Result<(), StorageError> {
            let mut connection = self.connection().await?;
            MIGRATIONS
                .run_pending_migrations(&mut connection)
                .await
                .map_err(|e| StorageError::Unavailable(format!("running migrations: {:?}", e)))
        }
    }

    impl MatchStorage for PostgresStorage {
        fn store<'f, 'own>(
            &'own self,
            stored: StoredMatch,
        ) -> BoxFuture<'f, Result<(), StorageError>>
        where
            'own: 'f,
        {
            async move {
                let record = MatchRecord::try_from(&stored)?;
                let query = diesel::dsl::insert_into(dsl::match_statistics)
                    .values(record)
                    .on_conflict(dsl::match_id)
                    .do_update()
                    .set((
                        dsl::statistics.eq(diesel::upsert::excluded(dsl::statistics)),
                        dsl::heatmaps.eq(diesel::upsert::excluded(dsl::heatmaps)),
                        dsl::created_at.eq(diesel::upsert::excluded(dsl::created_at)),
                    ));
                tracing::trace!(match_id = stored.match_id(), "Store match query");

                query.execute(&mut self.connection().await?).await?;
                Ok(())
            }
            .boxed()
        }

        fn load<'f, 'own>(
            &'own self,
            match_id: String,
        ) -> BoxFuture<'f, Result<Option<Arc<StoredMatch>>, StorageError>>
        where
            'own: 'f,
        {
            async move {
                let query = dsl::match_statistics
                    .filter(dsl::match_id.eq(&match_id))
                    .select(MatchRecord::as_select());

                let record: Option<MatchRecord> = query
                    .first(&mut self.connection().await?)
                    .await
                    .optional()?;

                match record {
                    Some(r) => Ok(Some(Arc::new(r.try_into()?))),
                    None => Ok(None),
                }
            }
            .boxed()
        }

        fn ping<'f, 'own>(&'own self) -> BoxFuture<'f, Result<(), StorageError>>
        where
            'own: 'f,
        {
            async move {
                diesel::sql_query("SELECT 1")
                    .execute(&mut self.connection().await?)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                Ok(())
            }
            .boxed()
        }

        fn evict_before<'f, 'own>(
            &'own self,
            cutoff: DateTime<Utc>,
        ) -> BoxFuture<'f, Result<usize, StorageError>>
        where
            'own: 'f,
        {
            async move {
                let query = diesel::dsl::delete(dsl::match_statistics)
                    .filter(dsl::created_at.lt(cutoff.naive_utc()));

                Ok(query.execute(&mut self.connection().await?).await?)
            }
            .boxed()
        }
    }
}
