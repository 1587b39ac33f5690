//! # Achievement Service
//!
//! Async facade over the synchronous `AchievementWorkflow`.
//!
//! Each call runs on tokio's blocking pool under the read or write budget.
//! When the budget expires the caller gets `MeritError::Timeout`; the
//! blocking operation itself still runs to completion, so a create that
//! times out never abandons its compensation step halfway.

use crate::config::{Config, StorageBackend, TimeoutConfig};
use merit_core::{
    Achievement, AchievementContent, AchievementWorkflow, AttachmentMeta, ConsistencyChecker,
    ConsistencyReport, DetailStore, HistoryEntry, Identity, MemoryDetailStore, MemoryDirectory,
    MemoryReferenceStore, MeritError, Reference, ReferenceId, ReferenceStore, Role, Statistics,
    StudentId, StudentReport, open_data_dir,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AchievementService {
    workflow: Arc<AchievementWorkflow>,
    read_budget: Duration,
    write_budget: Duration,
}

impl std::fmt::Debug for AchievementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchievementService")
            .field("read_budget", &self.read_budget)
            .field("write_budget", &self.write_budget)
            .finish_non_exhaustive()
    }
}

impl AchievementService {
    #[must_use]
    pub fn new(workflow: AchievementWorkflow, timeouts: &TimeoutConfig) -> Self {
        Self::with_budgets(workflow, timeouts.read(), timeouts.write())
    }

    #[must_use]
    pub fn with_budgets(
        workflow: AchievementWorkflow,
        read_budget: Duration,
        write_budget: Duration,
    ) -> Self {
        Self {
            workflow: Arc::new(workflow),
            read_budget,
            write_budget,
        }
    }

    /// Wire stores and directory as configured.
    pub fn open(config: &Config) -> Result<Self, MeritError> {
        let directory = Arc::new(MemoryDirectory::from_seed(config.directory_seed()?)?);
        let (references, details): (Arc<dyn ReferenceStore>, Arc<dyn DetailStore>) =
            match config.storage.backend {
                StorageBackend::Redb => {
                    let (references, details) = open_data_dir(&config.storage.data_dir)?;
                    (Arc::new(references), Arc::new(details))
                }
                StorageBackend::Memory => {
                    tracing::warn!("memory storage selected; achievements are lost on exit");
                    (
                        Arc::new(MemoryReferenceStore::new()),
                        Arc::new(MemoryDetailStore::new()),
                    )
                }
            };
        tracing::info!(
            backend = config.storage.backend.as_str(),
            data_dir = %config.storage.data_dir.display(),
            "achievement stores opened"
        );
        Ok(Self::new(
            AchievementWorkflow::new(references, details, directory),
            &config.timeouts,
        ))
    }

    #[must_use]
    pub fn workflow(&self) -> &AchievementWorkflow {
        &self.workflow
    }

    async fn run<T, F>(&self, budget: Duration, operation: &'static str, f: F) -> Result<T, MeritError>
    where
        T: Send + 'static,
        F: FnOnce(&AchievementWorkflow) -> Result<T, MeritError> + Send + 'static,
    {
        let workflow = Arc::clone(&self.workflow);
        let task = tokio::task::spawn_blocking(move || f(&workflow));
        match tokio::time::timeout(budget, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                tracing::error!(operation, error = %join, "workflow task failed");
                Err(MeritError::Storage(format!("{} task failed: {}", operation, join)))
            }
            Err(_) => {
                tracing::warn!(operation, budget_ms = budget.as_millis() as u64, "operation timed out");
                Err(MeritError::Timeout(format!(
                    "{} did not finish within {} ms",
                    operation,
                    budget.as_millis()
                )))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub async fn create(
        &self,
        identity: Identity,
        content: AchievementContent,
    ) -> Result<Achievement, MeritError> {
        self.run(self.write_budget, "create", move |wf| wf.create(&identity, content))
            .await
    }

    pub async fn submit(&self, identity: Identity, id: ReferenceId) -> Result<Reference, MeritError> {
        self.run(self.write_budget, "submit", move |wf| wf.submit(&identity, id))
            .await
    }

    pub async fn verify(&self, identity: Identity, id: ReferenceId) -> Result<Reference, MeritError> {
        self.run(self.write_budget, "verify", move |wf| wf.verify(&identity, id))
            .await
    }

    pub async fn reject(
        &self,
        identity: Identity,
        id: ReferenceId,
        note: String,
    ) -> Result<Reference, MeritError> {
        self.run(self.write_budget, "reject", move |wf| {
            wf.reject(&identity, id, &note)
        })
        .await
    }

    pub async fn delete(&self, identity: Identity, id: ReferenceId) -> Result<Reference, MeritError> {
        self.run(self.write_budget, "delete", move |wf| wf.delete(&identity, id))
            .await
    }

    pub async fn edit(
        &self,
        identity: Identity,
        id: ReferenceId,
        content: AchievementContent,
    ) -> Result<Achievement, MeritError> {
        self.run(self.write_budget, "edit", move |wf| {
            wf.edit(&identity, id, content)
        })
        .await
    }

    pub async fn add_attachment(
        &self,
        identity: Identity,
        id: ReferenceId,
        meta: AttachmentMeta,
    ) -> Result<Achievement, MeritError> {
        self.run(self.write_budget, "add_attachment", move |wf| {
            wf.add_attachment(&identity, id, meta)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn list(&self, identity: Identity) -> Result<Vec<Achievement>, MeritError> {
        self.run(self.read_budget, "list", move |wf| wf.list(&identity))
            .await
    }

    pub async fn get(&self, identity: Identity, id: ReferenceId) -> Result<Achievement, MeritError> {
        self.run(self.read_budget, "get", move |wf| wf.get(&identity, id))
            .await
    }

    pub async fn history(
        &self,
        identity: Identity,
        id: ReferenceId,
    ) -> Result<Vec<HistoryEntry>, MeritError> {
        self.run(self.read_budget, "history", move |wf| wf.history(&identity, id))
            .await
    }

    pub async fn statistics(&self, identity: Identity) -> Result<Statistics, MeritError> {
        self.run(self.read_budget, "statistics", move |wf| {
            wf.statistics(&identity)
        })
        .await
    }

    pub async fn student_report(
        &self,
        identity: Identity,
        student: StudentId,
    ) -> Result<StudentReport, MeritError> {
        self.run(self.read_budget, "student_report", move |wf| {
            wf.student_report(&identity, &student)
        })
        .await
    }

    /// Cross-store consistency report. Admin only.
    pub async fn consistency(&self, identity: Identity) -> Result<ConsistencyReport, MeritError> {
        identity.require_role(&Role::Admin)?;
        self.run(self.read_budget, "consistency", |wf| {
            ConsistencyChecker::new(wf.references(), wf.details()).run()
        })
        .await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::directory::{LecturerEntry, StudentEntry};
    use merit_core::reference::Guard;
    use merit_core::{
        Directory, DirectorySeed, LecturerId, QueryConstraint, StatusChange, UserId,
    };

    /// Reference store that stalls on inserts and queries.
    struct SlowReferences {
        inner: MemoryReferenceStore,
        insert_delay: Duration,
        query_delay: Duration,
    }

    impl ReferenceStore for SlowReferences {
        fn insert(&self, reference: Reference) -> Result<(), MeritError> {
            std::thread::sleep(self.insert_delay);
            self.inner.insert(reference)
        }

        fn get(&self, id: ReferenceId) -> Result<Option<Reference>, MeritError> {
            self.inner.get(id)
        }

        fn compare_and_set(
            &self,
            id: ReferenceId,
            guard: &Guard,
            change: &StatusChange,
        ) -> Result<Option<Reference>, MeritError> {
            self.inner.compare_and_set(id, guard, change)
        }

        fn query(&self, constraint: &QueryConstraint) -> Result<Vec<Reference>, MeritError> {
            std::thread::sleep(self.query_delay);
            self.inner.query(constraint)
        }
    }

    fn directory() -> Arc<dyn Directory> {
        let seed = DirectorySeed {
            students: vec![StudentEntry {
                id: StudentId::new("S-01"),
                user_id: UserId::new("u-s1"),
                advisor: Some(LecturerId::new("L-01")),
            }],
            lecturers: vec![LecturerEntry {
                id: LecturerId::new("L-01"),
                user_id: UserId::new("u-l1"),
            }],
        };
        Arc::new(MemoryDirectory::from_seed(seed).expect("seed"))
    }

    fn content() -> AchievementContent {
        AchievementContent {
            achievement_type: "competition".to_string(),
            title: "Regional robotics".to_string(),
            description: String::new(),
            details: serde_json::json!({"competitionLevel": "regional"}),
            tags: Default::default(),
            points: 20,
        }
    }

    fn student() -> Identity {
        Identity::new(UserId::new("u-s1"), Role::Student)
    }

    #[tokio::test]
    async fn operations_pass_through_within_budget() {
        let workflow = AchievementWorkflow::new(
            Arc::new(MemoryReferenceStore::new()),
            Arc::new(MemoryDetailStore::new()),
            directory(),
        );
        let service = AchievementService::new(workflow, &TimeoutConfig::default());

        let created = service.create(student(), content()).await.expect("create");
        let submitted = service
            .submit(student(), created.reference.id)
            .await
            .expect("submit");
        assert_eq!(submitted.status, merit_core::Status::Submitted);

        let listed = service.list(student()).await.expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn slow_read_times_out() {
        let references = Arc::new(SlowReferences {
            inner: MemoryReferenceStore::new(),
            insert_delay: Duration::ZERO,
            query_delay: Duration::from_millis(300),
        });
        let workflow =
            AchievementWorkflow::new(references, Arc::new(MemoryDetailStore::new()), directory());
        let service = AchievementService::with_budgets(
            workflow,
            Duration::from_millis(20),
            Duration::from_secs(5),
        );

        let err = service.list(student()).await.expect_err("should time out");
        assert!(matches!(err, MeritError::Timeout(_)));
        assert_eq!(err.outcome(), merit_core::Outcome::Timeout);
    }

    #[tokio::test]
    async fn timed_out_create_still_completes() {
        let references = Arc::new(SlowReferences {
            inner: MemoryReferenceStore::new(),
            insert_delay: Duration::from_millis(200),
            query_delay: Duration::ZERO,
        });
        let workflow =
            AchievementWorkflow::new(references, Arc::new(MemoryDetailStore::new()), directory());
        let service = AchievementService::with_budgets(
            workflow,
            Duration::from_secs(5),
            Duration::from_millis(20),
        );

        let err = service
            .create(student(), content())
            .await
            .expect_err("should time out");
        assert!(matches!(err, MeritError::Timeout(_)));

        // the saga keeps running on the blocking pool
        tokio::time::sleep(Duration::from_millis(600)).await;
        let stored = service.workflow().references().scan().expect("scan");
        assert_eq!(stored.len(), 1);
        let listed = service.list(student()).await.expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn consistency_requires_admin() {
        let workflow = AchievementWorkflow::new(
            Arc::new(MemoryReferenceStore::new()),
            Arc::new(MemoryDetailStore::new()),
            directory(),
        );
        let service = AchievementService::new(workflow, &TimeoutConfig::default());

        let err = service.consistency(student()).await.expect_err("forbidden");
        assert!(matches!(err, MeritError::Forbidden(_)));

        let admin = Identity::new(UserId::new("u-admin"), Role::Admin);
        let report = service.consistency(admin).await.expect("report");
        assert!(report.is_clean());
    }

    #[test]
    fn memory_backend_opens_without_data_dir() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        let service = AchievementService::open(&config).expect("open");
        assert!(service.workflow().references().scan().expect("scan").is_empty());
    }
}
