use crate::api::{ApiClient, ApiError, ApiResult};
use crate::drafts::{purge_manual_drafts, DraftStore};
use crate::editor::tree::{reconcile, NodeKind, Reconciliation, RemovedNode};
use crate::models::{Block, Section, TreeNode};
use crate::storage::KeyValueStore;
use leptos::logging::{error, log};
use std::time::Duration;
use thiserror::Error;

/// Backend operations the synchronization walk needs.
pub(crate) trait ManualBackend {
    async fn update_manual_title(&self, manual_id: &str, title: &str) -> ApiResult<()>;
    async fn create_section(&self, manual_id: &str, title: &str, order: usize) -> ApiResult<String>;
    async fn update_section(&self, section_id: &str, title: &str, order: usize) -> ApiResult<()>;
    async fn create_subsection(&self, section_id: &str, title: &str, order: usize) -> ApiResult<String>;
    async fn update_subsection(&self, subsection_id: &str, title: &str, order: usize) -> ApiResult<()>;
    async fn create_block(&self, subsection_id: &str, block: &Block, order: usize) -> ApiResult<String>;
    async fn update_block(&self, block_id: &str, block: &Block, order: usize) -> ApiResult<()>;
    async fn delete_node(&self, node: &RemovedNode) -> ApiResult<()>;
}

impl ManualBackend for ApiClient {
    async fn update_manual_title(&self, manual_id: &str, title: &str) -> ApiResult<()> {
        self.update_manual(manual_id, title).await
    }

    async fn create_section(&self, manual_id: &str, title: &str, order: usize) -> ApiResult<String> {
        ApiClient::create_section(self, manual_id, title, order).await
    }

    async fn update_section(&self, section_id: &str, title: &str, order: usize) -> ApiResult<()> {
        ApiClient::update_section(self, section_id, title, order).await
    }

    async fn create_subsection(&self, section_id: &str, title: &str, order: usize) -> ApiResult<String> {
        ApiClient::create_subsection(self, section_id, title, order).await
    }

    async fn update_subsection(&self, subsection_id: &str, title: &str, order: usize) -> ApiResult<()> {
        ApiClient::update_subsection(self, subsection_id, title, order).await
    }

    async fn create_block(&self, subsection_id: &str, block: &Block, order: usize) -> ApiResult<String> {
        ApiClient::create_block(self, subsection_id, block, order).await
    }

    async fn update_block(&self, block_id: &str, block: &Block, order: usize) -> ApiResult<()> {
        ApiClient::update_block(self, block_id, block, order).await
    }

    async fn delete_node(&self, node: &RemovedNode) -> ApiResult<()> {
        match node.kind {
            NodeKind::Section => self.delete_section(&node.id).await,
            NodeKind::Subsection => self.delete_subsection(&node.id).await,
            NodeKind::Block => self.delete_block(&node.id).await,
        }
    }
}

/// Suspends the walk between requests.
pub(crate) trait Pacer {
    async fn pause(&self, delay: Duration);
}

/// `setTimeout`-backed sleep.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BrowserPacer;

impl Pacer for BrowserPacer {
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let (tx, rx) = futures::channel::oneshot::channel::<()>();
        leptos_dom::helpers::set_timeout(
            move || {
                let _ = tx.send(());
            },
            delay,
        );
        let _ = rx.await;
    }
}

/// Gaps inserted after each request. Creates are heavier server-side than updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SyncPacing {
    pub after_section_create: Duration,
    pub after_section_update: Duration,
    pub after_subsection_create: Duration,
    pub after_block_create: Duration,
    pub after_field_update: Duration,
    pub after_delete: Duration,
}

impl Default for SyncPacing {
    fn default() -> Self {
        Self {
            after_section_create: Duration::from_millis(600),
            after_section_update: Duration::from_millis(250),
            after_subsection_create: Duration::from_millis(400),
            after_block_create: Duration::from_millis(150),
            after_field_update: Duration::from_millis(150),
            after_delete: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub(crate) enum SyncError {
    #[error("rate limited: {0}")]
    RateLimited(ApiError),

    #[error("section create failed: {0}")]
    SectionCreate(ApiError),

    #[error("subsection create failed: {0}")]
    SubsectionCreate(ApiError),

    #[error("block create failed: {0}")]
    BlockCreate(ApiError),

    #[error("sync failed: {0}")]
    Other(ApiError),
}

impl SyncError {
    fn wrap(e: ApiError, f: impl FnOnce(ApiError) -> SyncError) -> Self {
        if e.is_rate_limited() {
            SyncError::RateLimited(e)
        } else {
            f(e)
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            SyncError::RateLimited(_) => {
                "The server is receiving too many requests. Wait a minute, then save again.".to_string()
            }
            SyncError::SectionCreate(e) => format!("Could not create a section: {e}"),
            SyncError::SubsectionCreate(e) => format!("Could not create a subsection: {e}"),
            SyncError::BlockCreate(e) => format!("Could not create a content block: {e}"),
            SyncError::Other(e) => format!("Saving the manual failed: {e}"),
        }
    }
}

/// Everything a walk needs, borrowed from the builder.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SyncRequest<'a> {
    pub manual_id: &'a str,
    /// Set when the manual title changed since it was loaded.
    pub manual_title: Option<&'a str>,
    pub sections: &'a [Section],
    pub pending_deletes: &'a [RemovedNode],
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SyncReport {
    pub reconciliation: Reconciliation,
    pub deleted: Vec<RemovedNode>,
    pub creates: usize,
    pub updates: usize,
    pub error: Option<SyncError>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Depth-first, strictly sequential persistence of one manual tree.
///
/// A parent is always created before its children so they can reference its server
/// id. The first failure stops the walk; whatever was created before it stays
/// created and is reported so the caller can keep those ids.
pub(crate) struct Synchronizer<'a, B: ManualBackend, P: Pacer> {
    backend: &'a B,
    pacer: &'a P,
    pacing: SyncPacing,
}

impl<'a, B: ManualBackend, P: Pacer> Synchronizer<'a, B, P> {
    pub fn new(backend: &'a B, pacer: &'a P, pacing: SyncPacing) -> Self {
        Self {
            backend,
            pacer,
            pacing,
        }
    }

    pub async fn run(&self, req: SyncRequest<'_>) -> SyncReport {
        let mut report = SyncReport::default();
        if let Err(e) = self.walk(req, &mut report).await {
            error!("manual {}: sync aborted: {e}", req.manual_id);
            report.error = Some(e);
        }
        report
    }

    async fn walk(&self, req: SyncRequest<'_>, report: &mut SyncReport) -> Result<(), SyncError> {
        for node in req.pending_deletes {
            self.backend
                .delete_node(node)
                .await
                .map_err(|e| SyncError::wrap(e, SyncError::Other))?;
            report.deleted.push(node.clone());
            self.pacer.pause(self.pacing.after_delete).await;
        }

        if let Some(title) = req.manual_title {
            self.backend
                .update_manual_title(req.manual_id, title)
                .await
                .map_err(|e| SyncError::wrap(e, SyncError::Other))?;
            report.updates += 1;
            self.pacer.pause(self.pacing.after_section_update).await;
        }

        for (si, section) in req.sections.iter().enumerate() {
            let section_id = if section.is_persisted() {
                self.backend
                    .update_section(&section.id, &section.title, si)
                    .await
                    .map_err(|e| SyncError::wrap(e, SyncError::Other))?;
                report.updates += 1;
                self.pacer.pause(self.pacing.after_section_update).await;
                section.id.clone()
            } else {
                let id = self
                    .backend
                    .create_section(req.manual_id, &section.title, si)
                    .await
                    .map_err(|e| SyncError::wrap(e, SyncError::SectionCreate))?;
                log!("manual {}: section {} -> {id}", req.manual_id, section.id);
                report
                    .reconciliation
                    .ids
                    .insert(section.id.clone(), id.clone());
                report.creates += 1;
                self.pacer.pause(self.pacing.after_section_create).await;
                id
            };

            for (ui, sub) in section.subsections.iter().enumerate() {
                let sub_id = if sub.is_persisted() {
                    if sub.dirty {
                        self.backend
                            .update_subsection(&sub.id, &sub.title, ui)
                            .await
                            .map_err(|e| SyncError::wrap(e, SyncError::Other))?;
                        report.reconciliation.cleaned.insert(sub.id.clone());
                        report.updates += 1;
                        self.pacer.pause(self.pacing.after_field_update).await;
                    }
                    sub.id.clone()
                } else {
                    let id = self
                        .backend
                        .create_subsection(&section_id, &sub.title, ui)
                        .await
                        .map_err(|e| SyncError::wrap(e, SyncError::SubsectionCreate))?;
                    report.reconciliation.ids.insert(sub.id.clone(), id.clone());
                    report.creates += 1;
                    self.pacer.pause(self.pacing.after_subsection_create).await;
                    id
                };

                for (bi, block) in sub.blocks.iter().enumerate() {
                    if block.is_persisted() {
                        if block.dirty {
                            self.backend
                                .update_block(&block.id, block, bi)
                                .await
                                .map_err(|e| SyncError::wrap(e, SyncError::Other))?;
                            report.reconciliation.cleaned.insert(block.id.clone());
                            report.updates += 1;
                            self.pacer.pause(self.pacing.after_field_update).await;
                        }
                        continue;
                    }

                    let id = self
                        .backend
                        .create_block(&sub_id, block, bi)
                        .await
                        .map_err(|e| SyncError::wrap(e, SyncError::BlockCreate))?;
                    report.reconciliation.ids.insert(block.id.clone(), id);
                    report.creates += 1;
                    self.pacer.pause(self.pacing.after_block_create).await;
                }
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SaveOutcome {
    pub ok: bool,
    /// User-facing failure message.
    pub message: Option<String>,
    pub reconciliation: Reconciliation,
    /// Server deletions that went through and can leave the queue.
    pub deleted: Vec<RemovedNode>,
}

/// "Persist everything now": run the walk, and on a complete pass drop the manual's
/// drafts. The caller folds `reconciliation` into its live tree either way.
pub(crate) async fn save_manual<B, P, S>(
    sync: &Synchronizer<'_, B, P>,
    drafts: &DraftStore<S>,
    req: SyncRequest<'_>,
) -> SaveOutcome
where
    B: ManualBackend,
    P: Pacer,
    S: KeyValueStore,
{
    let report = sync.run(req).await;

    if report.is_success() {
        let synced = reconcile(req.sections, &report.reconciliation);
        purge_manual_drafts(drafts, req.manual_id, &synced);
        log!(
            "manual {}: saved ({} created, {} updated, {} deleted)",
            req.manual_id,
            report.creates,
            report.updates,
            report.deleted.len()
        );
    }

    SaveOutcome {
        ok: report.is_success(),
        message: report.error.as_ref().map(SyncError::user_message),
        reconciliation: report.reconciliation,
        deleted: report.deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiErrorKind;
    use crate::drafts::{manual_draft_key, subsection_draft_key, DraftSnapshot, SubsectionDraft};
    use crate::editor::tree::{
        add_block, all_persisted, create_section, create_subsection, rename_subsection,
    };
    use crate::models::{is_temp_id, NewBlock};
    use crate::storage::MemoryStore;
    use futures::executor::block_on;
    use std::cell::RefCell;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Manual(String),
        CreateSection { manual: String, title: String, order: usize },
        UpdateSection { id: String, order: usize },
        CreateSubsection { section: String, title: String, order: usize },
        UpdateSubsection { id: String, title: String },
        CreateBlock { subsection: String, content: String, order: usize },
        UpdateBlock { id: String, content: String },
        Delete(RemovedNode),
    }

    #[derive(Default)]
    struct FakeBackend {
        calls: RefCell<Vec<Call>>,
        seq: RefCell<usize>,
        /// 1-based index of the block create call that fails.
        fail_block_at: Option<usize>,
        /// Title of the section whose create call fails.
        fail_section: Option<&'static str>,
        fail_subsection: bool,
        fail_delete: bool,
        rate_limit_sections: bool,
        blocks_seen: RefCell<usize>,
    }

    impl FakeBackend {
        fn next_id(&self, prefix: &str) -> String {
            let mut n = self.seq.borrow_mut();
            *n += 1;
            format!("{prefix}-{n}")
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn creates(&self) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| {
                    matches!(
                        c,
                        Call::CreateSection { .. }
                            | Call::CreateSubsection { .. }
                            | Call::CreateBlock { .. }
                    )
                })
                .count()
        }
    }

    impl ManualBackend for FakeBackend {
        async fn update_manual_title(&self, _manual_id: &str, title: &str) -> ApiResult<()> {
            self.calls.borrow_mut().push(Call::Manual(title.to_string()));
            Ok(())
        }

        async fn create_section(&self, manual_id: &str, title: &str, order: usize) -> ApiResult<String> {
            if self.rate_limit_sections {
                return Err(ApiError::http(429, "Too Many Requests", "Request failed"));
            }
            if self.fail_section.is_some_and(|t| t == title) {
                return Err(ApiError::http(500, "db error", "Request failed"));
            }
            self.calls.borrow_mut().push(Call::CreateSection {
                manual: manual_id.to_string(),
                title: title.to_string(),
                order,
            });
            Ok(self.next_id("sec"))
        }

        async fn update_section(&self, section_id: &str, _title: &str, order: usize) -> ApiResult<()> {
            self.calls.borrow_mut().push(Call::UpdateSection {
                id: section_id.to_string(),
                order,
            });
            Ok(())
        }

        async fn create_subsection(&self, section_id: &str, title: &str, order: usize) -> ApiResult<String> {
            assert!(!is_temp_id(section_id), "temporary id sent to backend");
            if self.fail_subsection {
                return Err(ApiError::http(500, "db error", "Request failed"));
            }
            self.calls.borrow_mut().push(Call::CreateSubsection {
                section: section_id.to_string(),
                title: title.to_string(),
                order,
            });
            Ok(self.next_id("sub"))
        }

        async fn update_subsection(&self, subsection_id: &str, title: &str, _order: usize) -> ApiResult<()> {
            self.calls.borrow_mut().push(Call::UpdateSubsection {
                id: subsection_id.to_string(),
                title: title.to_string(),
            });
            Ok(())
        }

        async fn create_block(&self, subsection_id: &str, block: &Block, order: usize) -> ApiResult<String> {
            assert!(!is_temp_id(subsection_id), "temporary id sent to backend");
            *self.blocks_seen.borrow_mut() += 1;
            if Some(*self.blocks_seen.borrow()) == self.fail_block_at {
                return Err(ApiError::http(500, "db error", "Request failed"));
            }
            self.calls.borrow_mut().push(Call::CreateBlock {
                subsection: subsection_id.to_string(),
                content: block.content.clone(),
                order,
            });
            Ok(self.next_id("blk"))
        }

        async fn update_block(&self, block_id: &str, block: &Block, _order: usize) -> ApiResult<()> {
            self.calls.borrow_mut().push(Call::UpdateBlock {
                id: block_id.to_string(),
                content: block.content.clone(),
            });
            Ok(())
        }

        async fn delete_node(&self, node: &RemovedNode) -> ApiResult<()> {
            if self.fail_delete {
                return Err(ApiError::http(500, "db error", "Request failed"));
            }
            self.calls.borrow_mut().push(Call::Delete(node.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        pauses: RefCell<Vec<Duration>>,
    }

    impl Pacer for RecordingPacer {
        async fn pause(&self, delay: Duration) {
            self.pauses.borrow_mut().push(delay);
        }
    }

    fn intro_tree() -> Vec<Section> {
        let t = create_section(&[], "Intro").unwrap();
        let t = create_subsection(&t, &t[0].id.clone(), "Step 1").unwrap();
        let sub = t[0].subsections[0].id.clone();
        add_block(&t, &sub, NewBlock::text("Hello")).unwrap()
    }

    fn request<'a>(sections: &'a [Section], deletes: &'a [RemovedNode]) -> SyncRequest<'a> {
        SyncRequest {
            manual_id: "m1",
            manual_title: None,
            sections,
            pending_deletes: deletes,
        }
    }

    fn seed_drafts(drafts: &DraftStore<MemoryStore>, tree: &[Section]) {
        drafts.write(
            &manual_draft_key("m1"),
            &DraftSnapshot {
                sections: tree.to_vec(),
                pending_deletes: vec![],
                timestamp: 1,
            },
        );
        for s in tree {
            drafts.write(
                &subsection_draft_key("m1", s.local_key()),
                &SubsectionDraft {
                    subsections: s.subsections.clone(),
                    timestamp: 1,
                },
            );
        }
    }

    #[test]
    fn test_intro_example_creates_in_dependency_order() {
        let tree = intro_tree();
        let backend = FakeBackend::default();
        let pacer = RecordingPacer::default();
        let mem = MemoryStore::default();
        let drafts = DraftStore::new(mem.clone());
        seed_drafts(&drafts, &tree);

        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());
        let out = block_on(save_manual(&sync, &drafts, request(&tree, &[])));

        assert!(out.ok);
        assert_eq!(out.message, None);
        assert_eq!(
            backend.calls(),
            vec![
                Call::CreateSection {
                    manual: "m1".to_string(),
                    title: "Intro".to_string(),
                    order: 0
                },
                Call::CreateSubsection {
                    section: "sec-1".to_string(),
                    title: "Step 1".to_string(),
                    order: 0
                },
                Call::CreateBlock {
                    subsection: "sub-2".to_string(),
                    content: "Hello".to_string(),
                    order: 0
                },
            ]
        );

        let synced = reconcile(&tree, &out.reconciliation);
        assert_eq!(synced[0].id, "sec-1");
        assert_eq!(synced[0].subsections[0].id, "sub-2");
        assert_eq!(synced[0].subsections[0].blocks[0].id, "blk-3");
        assert!(all_persisted(&synced));
        assert!(mem.keys().is_empty());
    }

    #[test]
    fn test_block_failure_aborts_walk_and_keeps_earlier_ids() {
        let t = create_section(&[], "Prep").unwrap();
        let t = create_section(&t, "Closure").unwrap();
        let prep = t[0].id.clone();
        let t = create_subsection(&t, &prep, "A").unwrap();
        let t = create_subsection(&t, &prep, "B").unwrap();
        let a = t[0].subsections[0].id.clone();
        let t = add_block(&t, &a, NewBlock::text("one")).unwrap();
        let tree = add_block(&t, &a, NewBlock::text("two")).unwrap();

        let backend = FakeBackend {
            fail_block_at: Some(2),
            ..Default::default()
        };
        let pacer = RecordingPacer::default();
        let mem = MemoryStore::default();
        let drafts = DraftStore::new(mem.clone());
        seed_drafts(&drafts, &tree);

        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());
        let out = block_on(save_manual(&sync, &drafts, request(&tree, &[])));

        assert!(!out.ok);
        let msg = out.message.clone().unwrap_or_default();
        assert!(msg.starts_with("Could not create a content block"), "{msg}");

        // Subsection B and section Closure were never attempted.
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls.iter().any(|c| matches!(c, Call::CreateSubsection { title, .. } if title == "B")));
        assert!(!calls.iter().any(|c| matches!(c, Call::CreateSection { title, .. } if title == "Closure")));

        let after = reconcile(&tree, &out.reconciliation);
        assert_eq!(after[0].id, "sec-1");
        assert_eq!(after[0].subsections[0].id, "sub-2");
        assert_eq!(after[0].subsections[0].blocks[0].id, "blk-3");
        assert!(is_temp_id(&after[0].subsections[0].blocks[1].id));
        assert!(is_temp_id(&after[0].subsections[1].id));
        assert!(is_temp_id(&after[1].id));

        // Drafts stay until a full pass succeeds.
        assert!(!mem.keys().is_empty());
    }

    #[test]
    fn test_section_failure_stops_before_its_subtree_and_later_sections() {
        let t = create_section(&[], "Prep").unwrap();
        let t = create_section(&t, "Closure").unwrap();
        let t = create_section(&t, "Aftercare").unwrap();
        let closure = t[1].id.clone();
        let tree = create_subsection(&t, &closure, "Dressing").unwrap();

        let backend = FakeBackend {
            fail_section: Some("Closure"),
            ..Default::default()
        };
        let pacer = RecordingPacer::default();
        let mem = MemoryStore::default();
        let drafts = DraftStore::new(mem.clone());
        seed_drafts(&drafts, &tree);

        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());
        let out = block_on(save_manual(&sync, &drafts, request(&tree, &[])));

        assert!(!out.ok);
        let msg = out.message.unwrap_or_default();
        assert!(msg.starts_with("Could not create a section"), "{msg}");
        assert_eq!(
            backend.calls(),
            vec![Call::CreateSection {
                manual: "m1".to_string(),
                title: "Prep".to_string(),
                order: 0
            }]
        );

        let after = reconcile(&tree, &out.reconciliation);
        assert_eq!(after[0].id, "sec-1");
        assert!(is_temp_id(&after[1].id));
        assert!(is_temp_id(&after[1].subsections[0].id));
        assert!(is_temp_id(&after[2].id));
        assert!(!mem.keys().is_empty());
    }

    #[test]
    fn test_subsection_failure_keeps_section_id_and_skips_its_blocks() {
        let tree = intro_tree();
        let backend = FakeBackend {
            fail_subsection: true,
            ..Default::default()
        };
        let pacer = RecordingPacer::default();
        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());

        let report = block_on(sync.run(request(&tree, &[])));

        assert!(matches!(report.error, Some(SyncError::SubsectionCreate(_))));
        let msg = report.error.as_ref().map(SyncError::user_message).unwrap_or_default();
        assert!(msg.starts_with("Could not create a subsection"), "{msg}");
        assert_eq!(backend.creates(), 1);
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::CreateBlock { .. })));

        let after = reconcile(&tree, &report.reconciliation);
        assert_eq!(after[0].id, "sec-1");
        assert!(is_temp_id(&after[0].subsections[0].id));
        assert!(is_temp_id(&after[0].subsections[0].blocks[0].id));
    }

    #[test]
    fn test_failed_delete_aborts_before_any_create() {
        let tree = intro_tree();
        let deletes = vec![RemovedNode {
            kind: NodeKind::Subsection,
            id: "old-4".to_string(),
        }];
        let backend = FakeBackend {
            fail_delete: true,
            ..Default::default()
        };
        let pacer = RecordingPacer::default();
        let drafts = DraftStore::new(MemoryStore::default());
        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());

        let mut req = request(&tree, &deletes);
        req.manual_title = Some("Central line");
        let out = block_on(save_manual(&sync, &drafts, req));

        assert!(!out.ok);
        assert!(out.deleted.is_empty());
        assert!(out.reconciliation.ids.is_empty());
        assert!(backend.calls().is_empty());
        assert!(pacer.pauses.borrow().is_empty());
        let msg = out.message.unwrap_or_default();
        assert!(msg.starts_with("Saving the manual failed"), "{msg}");
    }

    #[test]
    fn test_second_save_without_edits_creates_nothing() {
        let tree = intro_tree();
        let backend = FakeBackend::default();
        let pacer = RecordingPacer::default();
        let drafts = DraftStore::new(MemoryStore::default());
        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());

        let first = block_on(save_manual(&sync, &drafts, request(&tree, &[])));
        let tree = reconcile(&tree, &first.reconciliation);
        assert_eq!(backend.creates(), 3);

        let second = block_on(save_manual(&sync, &drafts, request(&tree, &[])));
        assert!(second.ok);
        assert_eq!(backend.creates(), 3);
        assert!(second.reconciliation.ids.is_empty());
        assert_eq!(
            backend.calls().last(),
            Some(&Call::UpdateSection {
                id: "sec-1".to_string(),
                order: 0
            })
        );
    }

    #[test]
    fn test_retry_after_failure_only_creates_remaining_drafts() {
        let t = intro_tree();
        let sub = t[0].subsections[0].id.clone();
        let tree = add_block(&t, &sub, NewBlock::text("World")).unwrap();

        let failing = FakeBackend {
            fail_block_at: Some(2),
            ..Default::default()
        };
        let pacer = RecordingPacer::default();
        let drafts = DraftStore::new(MemoryStore::default());
        let out = block_on(save_manual(
            &Synchronizer::new(&failing, &pacer, SyncPacing::default()),
            &drafts,
            request(&tree, &[]),
        ));
        assert!(!out.ok);
        let tree = reconcile(&tree, &out.reconciliation);

        let healthy = FakeBackend::default();
        let out = block_on(save_manual(
            &Synchronizer::new(&healthy, &pacer, SyncPacing::default()),
            &drafts,
            request(&tree, &[]),
        ));
        assert!(out.ok);
        assert_eq!(
            healthy.calls(),
            vec![
                Call::UpdateSection {
                    id: "sec-1".to_string(),
                    order: 0
                },
                Call::CreateBlock {
                    subsection: "sub-2".to_string(),
                    content: "World".to_string(),
                    order: 1
                },
            ]
        );
    }

    #[test]
    fn test_rate_limit_gets_its_own_message() {
        let tree = intro_tree();
        let backend = FakeBackend {
            rate_limit_sections: true,
            ..Default::default()
        };
        let pacer = RecordingPacer::default();
        let drafts = DraftStore::new(MemoryStore::default());
        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());

        let report = block_on(sync.run(request(&tree, &[])));
        match report.error {
            Some(SyncError::RateLimited(ref e)) => assert_eq!(e.kind, ApiErrorKind::RateLimited),
            ref other => panic!("expected rate limit, got {other:?}"),
        }

        let out = block_on(save_manual(&sync, &drafts, request(&tree, &[])));
        assert!(out.message.unwrap_or_default().contains("too many requests"));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_pending_deletes_and_title_go_first() {
        let tree = intro_tree();
        let deletes = vec![RemovedNode {
            kind: NodeKind::Section,
            id: "old-9".to_string(),
        }];
        let backend = FakeBackend::default();
        let pacer = RecordingPacer::default();
        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());

        let mut req = request(&tree, &deletes);
        req.manual_title = Some("Central line");
        let report = block_on(sync.run(req));

        assert!(report.is_success());
        assert_eq!(report.deleted, deletes);
        let calls = backend.calls();
        assert_eq!(calls[0], Call::Delete(deletes[0].clone()));
        assert_eq!(calls[1], Call::Manual("Central line".to_string()));
    }

    #[test]
    fn test_pacing_follows_each_request_and_create_waits_longer() {
        let tree = intro_tree();
        let backend = FakeBackend::default();
        let pacer = RecordingPacer::default();
        let pacing = SyncPacing::default();
        let sync = Synchronizer::new(&backend, &pacer, pacing);

        let report = block_on(sync.run(request(&tree, &[])));
        let tree = reconcile(&tree, &report.reconciliation);
        assert_eq!(
            *pacer.pauses.borrow(),
            vec![
                pacing.after_section_create,
                pacing.after_subsection_create,
                pacing.after_block_create
            ]
        );

        block_on(sync.run(request(&tree, &[])));
        assert_eq!(pacer.pauses.borrow().last(), Some(&pacing.after_section_update));
        assert!(pacing.after_section_create > pacing.after_section_update);
        assert!(pacing.after_block_create < pacing.after_subsection_create);
    }

    #[test]
    fn test_edited_persisted_subsection_is_patched_and_cleaned() {
        let tree = intro_tree();
        let backend = FakeBackend::default();
        let pacer = RecordingPacer::default();
        let sync = Synchronizer::new(&backend, &pacer, SyncPacing::default());

        let report = block_on(sync.run(request(&tree, &[])));
        let tree = reconcile(&tree, &report.reconciliation);
        let tree = rename_subsection(&tree, "sub-2", "First step").unwrap();

        let report = block_on(sync.run(request(&tree, &[])));
        assert!(backend.calls().contains(&Call::UpdateSubsection {
            id: "sub-2".to_string(),
            title: "First step".to_string()
        }));
        let tree = reconcile(&tree, &report.reconciliation);
        assert!(!tree[0].subsections[0].dirty);
    }
}
