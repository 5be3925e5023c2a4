pub(crate) mod tree;

use crate::components::ui::{Button, ButtonSize, ButtonVariant, Input, TextArea};
use crate::drafts::{
    manual_draft_key, purge_manual_drafts, store_subsection_draft, subsection_draft_key,
    DraftSnapshot, DraftStore, SubsectionDraft, DRAFT_DEBOUNCE,
};
use crate::models::{BlockKind, NewBlock, Section, Subsection, TreeNode};
use crate::state::AppContext;
use crate::util::{now_ms, BrowserScheduler, Debounced};
use leptos::logging::warn;
use leptos::prelude::*;
use leptos::task::spawn_local;
use std::collections::BTreeMap;
use tree::{
    add_block, create_section, create_subsection, delete_block, delete_section,
    delete_subsection, find_block, find_subsection, orphaned_creations, queue_removal, reconcile,
    rename_section, rename_subsection, settle_removals, update_block_content, BrowserConfirm,
    Deletion, Reconciliation, RemovedNode, TreeError, TreeResult,
};

/// Live state of the manual open in the builder, shared with every editor below it.
///
/// The tree lives in one signal; editors address nodes by local key and push whole
/// new trees through `apply`. Each accepted edit is mirrored to the manual draft,
/// section editors additionally mirror their own subsections.
#[derive(Clone, Copy)]
pub(crate) struct ManualEditorContext {
    manual_id: StoredValue<String>,
    pub sections: RwSignal<Vec<Section>>,
    /// Persisted nodes removed locally; deleted on the server at the next save.
    pub pending_deletes: RwSignal<Vec<RemovedNode>>,
    /// A save walk is running; the tree is read-only until it ends.
    pub saving: RwSignal<bool>,
    /// Set once a save went through and the page is about to leave.
    sealed: StoredValue<bool>,
    snapshot_writer: StoredValue<Option<Debounced<DraftSnapshot>>>,
    subsection_writers: StoredValue<BTreeMap<String, Debounced<SubsectionDraft>>>,
}

impl ManualEditorContext {
    pub fn new() -> Self {
        Self {
            manual_id: StoredValue::new(String::new()),
            sections: RwSignal::new(vec![]),
            pending_deletes: RwSignal::new(vec![]),
            saving: RwSignal::new(false),
            sealed: StoredValue::new(false),
            snapshot_writer: StoredValue::new(None),
            subsection_writers: StoredValue::new(BTreeMap::new()),
        }
    }

    pub fn manual_id(&self) -> String {
        self.manual_id.get_value()
    }

    /// Point the editor at a (re)loaded manual. Nothing is written to drafts.
    pub fn reset(&self, manual_id: &str, sections: Vec<Section>, pending: Vec<RemovedNode>) {
        self.cancel_drafts();
        self.manual_id.set_value(manual_id.to_string());
        self.sealed.set_value(false);
        self.snapshot_writer.set_value(Some(
            DraftStore::browser().browser_debounced(manual_draft_key(manual_id)),
        ));
        self.subsection_writers.set_value(BTreeMap::new());
        self.pending_deletes.set(pending);
        self.saving.set(false);
        self.sections.set(sections);
    }

    fn ensure_editable(&self) -> TreeResult<()> {
        if self.saving.get_untracked() {
            return Err(TreeError::SaveInProgress);
        }
        Ok(())
    }

    /// Run a tree edit against the current tree and publish the result.
    pub fn apply(
        &self,
        op: impl FnOnce(&[Section]) -> TreeResult<Vec<Section>>,
    ) -> TreeResult<()> {
        self.ensure_editable()?;
        let next = self.sections.with_untracked(|all| op(all))?;
        self.publish(next);
        Ok(())
    }

    /// Like `apply` for deletions; `Ok(false)` when the user declined.
    pub fn apply_deletion(
        &self,
        op: impl FnOnce(&[Section]) -> TreeResult<Option<Deletion>>,
    ) -> TreeResult<bool> {
        self.ensure_editable()?;
        let Some(deletion) = self.sections.with_untracked(|all| op(all))? else {
            return Ok(false);
        };
        if let Some(removed) = deletion.removed {
            self.pending_deletes
                .update(|q| *q = queue_removal(q, removed));
        }
        self.publish(deletion.sections);
        Ok(true)
    }

    /// Freeze the tree for a save walk and hand back what the walk should send.
    pub fn begin_save(&self) -> (Vec<Section>, Vec<RemovedNode>) {
        self.saving.set(true);
        self.flush_drafts();
        (
            self.sections.get_untracked(),
            self.pending_deletes.get_untracked(),
        )
    }

    /// Fold a save walk back in and unlock the tree: server ids replace temporary
    /// ones, accepted field edits are no longer dirty and acknowledged deletions
    /// leave the queue. Nodes the walk created but that are gone from the live tree
    /// are queued for deletion.
    ///
    /// Returns whether the live tree is exactly what the walk sent, reconciled.
    pub fn fold(
        &self,
        sent: &[Section],
        reconciliation: &Reconciliation,
        deleted: &[RemovedNode],
    ) -> bool {
        let (next, orphans) = self.sections.with_untracked(|live| {
            (
                reconcile(live, reconciliation),
                orphaned_creations(sent, live, reconciliation),
            )
        });
        self.pending_deletes.update(|q| {
            let mut settled = settle_removals(q, deleted);
            for removed in orphans {
                settled = queue_removal(&settled, removed);
            }
            *q = settled;
        });
        let in_step = next == reconcile(sent, reconciliation);
        self.saving.set(false);
        self.publish(next);
        in_step
    }

    fn publish(&self, next: Vec<Section>) {
        if !self.sealed.get_value() {
            let snapshot = DraftSnapshot {
                sections: next.clone(),
                pending_deletes: self.pending_deletes.get_untracked(),
                timestamp: now_ms(),
            };
            self.snapshot_writer.with_value(|w| {
                if let Some(w) = w {
                    w.set(snapshot);
                }
            });
        }
        self.sections.set(next);
    }

    /// Mirror one section's subsections into that section's own draft slot.
    pub fn mirror_subsections(&self, section_key: &str, subsections: Vec<Subsection>) {
        if self.sealed.get_value() {
            return;
        }
        let manual_id = self.manual_id.get_value();
        if manual_id.is_empty() {
            return;
        }
        let draft = SubsectionDraft {
            subsections,
            timestamp: now_ms(),
        };
        self.subsection_writers.update_value(|writers| {
            writers
                .entry(section_key.to_string())
                .or_insert_with(|| {
                    let key = subsection_draft_key(&manual_id, section_key);
                    let sink = move |draft: SubsectionDraft| {
                        store_subsection_draft(&DraftStore::browser(), &key, draft)
                    };
                    Debounced::new(DRAFT_DEBOUNCE, BrowserScheduler, sink)
                })
                .set(draft);
        });
    }

    /// A deleted section takes its subsection draft with it.
    pub fn forget_section(&self, section_key: &str) {
        self.subsection_writers.update_value(|writers| {
            if let Some(w) = writers.remove(section_key) {
                w.cancel();
            }
        });
        let manual_id = self.manual_id.get_value();
        DraftStore::browser().remove(&subsection_draft_key(&manual_id, section_key));
    }

    /// Write out every pending draft now.
    pub fn flush_drafts(&self) {
        self.snapshot_writer.with_value(|w| {
            if let Some(w) = w {
                w.flush();
            }
        });
        self.subsection_writers
            .with_value(|writers| writers.values().for_each(Debounced::flush));
    }

    fn cancel_drafts(&self) {
        self.snapshot_writer.with_value(|w| {
            if let Some(w) = w {
                w.cancel();
            }
        });
        self.subsection_writers
            .with_value(|writers| writers.values().for_each(Debounced::cancel));
    }

    /// Stop mirroring: the server now holds everything the drafts would.
    pub fn seal(&self) {
        self.cancel_drafts();
        self.sealed.set_value(true);
    }

    /// Throw away recovered drafts for this manual.
    pub fn discard_drafts(&self) {
        self.cancel_drafts();
        let manual_id = self.manual_id.get_value();
        self.sections.with_untracked(|all| {
            purge_manual_drafts(&DraftStore::browser(), &manual_id, all)
        });
    }
}

impl Default for ManualEditorContext {
    fn default() -> Self {
        Self::new()
    }
}

fn report(error: RwSignal<Option<String>>, result: TreeResult<impl Sized>) -> bool {
    match result {
        Ok(_) => {
            error.set(None);
            true
        }
        Err(e) => {
            error.set(Some(e.to_string()));
            false
        }
    }
}

/// Ordered list of sections plus the "add section" row.
#[component]
pub fn ManualOutline() -> impl IntoView {
    let ctx = expect_context::<ManualEditorContext>();

    let new_title: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let section_keys = move || {
        ctx.sections.with(|all| {
            all.iter()
                .map(|s| s.local_key().to_string())
                .collect::<Vec<_>>()
        })
    };

    let on_submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        let title = new_title.get_untracked();
        if report(error, ctx.apply(|all| create_section(all, &title))) {
            new_title.set(String::new());
        }
    };

    view! {
        // A disabled fieldset locks every control below it while a save runs.
        <fieldset class="space-y-4 disabled:opacity-70" disabled=move || ctx.saving.get()>
            <Show when=move || ctx.sections.with(|s| s.is_empty()) fallback=|| ().into_view()>
                <div class="text-sm text-muted-foreground">"No sections yet. Add the first one below."</div>
            </Show>

            <For
                each=section_keys
                key=|k| k.clone()
                children=move |k| view! { <SectionEditor section_key=k /> }
            />

            <form class="flex items-center gap-2" on:submit=on_submit>
                <Input bind_value=new_title placeholder="New section title" class="max-w-md" />
                <Button variant=ButtonVariant::Outline size=ButtonSize::Default>
                    "Add section"
                </Button>
            </form>
            <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
            </Show>
        </fieldset>
    }
}

#[component]
pub fn SectionEditor(section_key: String) -> impl IntoView {
    let ctx = expect_context::<ManualEditorContext>();
    let key = StoredValue::new(section_key);

    let section = Memo::new(move |_| {
        key.with_value(|k| ctx.sections.with(|all| all.iter().find(|s| s.matches(k)).cloned()))
    });

    let editing_title: RwSignal<bool> = RwSignal::new(false);
    let title_value: RwSignal<String> = RwSignal::new(String::new());
    let new_sub_title: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    // Subsection draft follows edits only; the first run is the initial load.
    Effect::new(move |prev: Option<()>| {
        let subs = section.with(|s| s.as_ref().map(|s| s.subsections.clone()));
        if prev.is_some() {
            if let Some(subs) = subs {
                ctx.mirror_subsections(&key.get_value(), subs);
            }
        }
    });

    let start_rename = move |_: web_sys::MouseEvent| {
        title_value.set(
            section
                .get_untracked()
                .map(|s| s.title)
                .unwrap_or_default(),
        );
        editing_title.set(true);
    };

    let commit_rename = move || {
        if !editing_title.get_untracked() {
            return;
        }
        let title = title_value.get_untracked();
        let k = key.get_value();
        if report(error, ctx.apply(|all| rename_section(all, &k, &title))) {
            editing_title.set(false);
        }
    };

    let on_delete = move |_: web_sys::MouseEvent| {
        let k = key.get_value();
        let result = ctx.apply_deletion(|all| delete_section(all, &k, &BrowserConfirm));
        if let Ok(true) = result {
            ctx.forget_section(&k);
        }
        report(error, result);
    };

    let on_add_subsection = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        let title = new_sub_title.get_untracked();
        let k = key.get_value();
        if report(error, ctx.apply(|all| create_subsection(all, &k, &title))) {
            new_sub_title.set(String::new());
        }
    };

    let subsection_keys = move || {
        section.with(|s| {
            s.as_ref()
                .map(|s| {
                    s.subsections
                        .iter()
                        .map(|ss| ss.local_key().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
    };

    let is_unsaved = move || section.with(|s| s.as_ref().is_some_and(|s| !s.is_persisted()));

    view! {
        <section class="rounded-lg border p-4 space-y-3">
            <div class="flex items-center gap-2">
                <Show
                    when=move || editing_title.get()
                    fallback=move || view! {
                        <h2 class="flex-1 text-base font-semibold cursor-text" on:dblclick=start_rename>
                            {move || section.with(|s| s.as_ref().map(|s| s.title.clone()).unwrap_or_default())}
                        </h2>
                    }
                >
                    <input
                        class="h-8 flex-1 rounded-md border border-input bg-transparent px-2 text-sm outline-none focus-visible:ring-2 focus-visible:ring-ring/50"
                        prop:value=move || title_value.get()
                        on:input=move |ev| title_value.set(event_target_value(&ev))
                        on:blur=move |_| commit_rename()
                        on:keydown=move |ev: web_sys::KeyboardEvent| {
                            match ev.key().as_str() {
                                "Enter" => {
                                    ev.prevent_default();
                                    commit_rename();
                                }
                                "Escape" => editing_title.set(false),
                                _ => {}
                            }
                        }
                    />
                </Show>
                <Show when=is_unsaved fallback=|| ().into_view()>
                    <span class="text-xs text-muted-foreground">"unsaved"</span>
                </Show>
                <Button variant=ButtonVariant::Ghost size=ButtonSize::Xs on:click=start_rename>
                    "Rename"
                </Button>
                <Button variant=ButtonVariant::Ghost size=ButtonSize::Xs class="text-destructive" on:click=on_delete>
                    "Delete"
                </Button>
            </div>

            <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
            </Show>

            <div class="space-y-3 pl-4">
                <For
                    each=subsection_keys
                    key=|k| k.clone()
                    children=move |k| view! { <SubsectionEditor subsection_key=k /> }
                />
            </div>

            <form class="flex items-center gap-2 pl-4" on:submit=on_add_subsection>
                <Input bind_value=new_sub_title placeholder="New subsection title" class="h-8 max-w-sm" />
                <Button variant=ButtonVariant::Outline size=ButtonSize::Sm>
                    "Add subsection"
                </Button>
            </form>
        </section>
    }
}

#[component]
pub fn SubsectionEditor(subsection_key: String) -> impl IntoView {
    let ctx = expect_context::<ManualEditorContext>();
    let key = StoredValue::new(subsection_key);

    let subsection = Memo::new(move |_| {
        key.with_value(|k| ctx.sections.with(|all| find_subsection(all, k).cloned()))
    });

    let editing_title: RwSignal<bool> = RwSignal::new(false);
    let title_value: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let start_rename = move |_: web_sys::MouseEvent| {
        title_value.set(
            subsection
                .get_untracked()
                .map(|s| s.title)
                .unwrap_or_default(),
        );
        editing_title.set(true);
    };

    let commit_rename = move || {
        if !editing_title.get_untracked() {
            return;
        }
        let title = title_value.get_untracked();
        let k = key.get_value();
        if report(error, ctx.apply(|all| rename_subsection(all, &k, &title))) {
            editing_title.set(false);
        }
    };

    let on_delete = move |_: web_sys::MouseEvent| {
        let k = key.get_value();
        report(
            error,
            ctx.apply_deletion(|all| delete_subsection(all, &k, &BrowserConfirm)),
        );
    };

    let block_keys = move || {
        subsection.with(|s| {
            s.as_ref()
                .map(|s| {
                    s.blocks
                        .iter()
                        .map(|b| b.local_key().to_string())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
    };

    view! {
        <div class="rounded-md border bg-muted/20 p-3 space-y-2">
            <div class="flex items-center gap-2">
                <Show
                    when=move || editing_title.get()
                    fallback=move || view! {
                        <h3 class="flex-1 text-sm font-medium cursor-text" on:dblclick=start_rename>
                            {move || subsection.with(|s| s.as_ref().map(|s| s.title.clone()).unwrap_or_default())}
                        </h3>
                    }
                >
                    <input
                        class="h-7 flex-1 rounded-md border border-input bg-transparent px-2 text-sm outline-none focus-visible:ring-2 focus-visible:ring-ring/50"
                        prop:value=move || title_value.get()
                        on:input=move |ev| title_value.set(event_target_value(&ev))
                        on:blur=move |_| commit_rename()
                        on:keydown=move |ev: web_sys::KeyboardEvent| {
                            match ev.key().as_str() {
                                "Enter" => {
                                    ev.prevent_default();
                                    commit_rename();
                                }
                                "Escape" => editing_title.set(false),
                                _ => {}
                            }
                        }
                    />
                </Show>
                <Button variant=ButtonVariant::Ghost size=ButtonSize::Xs on:click=start_rename>
                    "Rename"
                </Button>
                <Button variant=ButtonVariant::Ghost size=ButtonSize::Xs class="text-destructive" on:click=on_delete>
                    "Delete"
                </Button>
            </div>

            <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
            </Show>

            <div class="space-y-2">
                <For
                    each=block_keys
                    key=|k| k.clone()
                    children=move |k| view! { <BlockEditor block_key=k /> }
                />
            </div>

            <NewBlockForm subsection_key=key.get_value() />
        </div>
    }
}

#[component]
pub fn BlockEditor(block_key: String) -> impl IntoView {
    let ctx = expect_context::<ManualEditorContext>();
    let key = StoredValue::new(block_key);

    let block = Memo::new(move |_| {
        key.with_value(|k| ctx.sections.with(|all| find_block(all, k).cloned()))
    });
    // Re-render the body only when the kind changes, not on every keystroke.
    let kind = Memo::new(move |_| block.with(|b| b.as_ref().map(|b| b.kind)));

    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let on_input = move |ev: web_sys::Event| {
        let content = event_target_value(&ev);
        let k = key.get_value();
        report(error, ctx.apply(|all| update_block_content(all, &k, &content)));
    };

    let on_delete = move |_: web_sys::MouseEvent| {
        let k = key.get_value();
        report(
            error,
            ctx.apply_deletion(|all| delete_block(all, &k, &BrowserConfirm)),
        );
    };

    view! {
        <div class="flex items-start gap-2 rounded-md border bg-background p-2">
            <div class="min-w-0 flex-1 space-y-1">
                {move || {
                    let initial = block.get_untracked();
                    match (kind.get(), initial) {
                        (Some(BlockKind::Text), Some(b)) => view! {
                            <textarea
                                class="w-full min-h-16 resize-y rounded-md border border-input bg-transparent px-2 py-1 text-sm outline-none focus-visible:ring-2 focus-visible:ring-ring/50"
                                rows="3"
                                prop:value=b.content
                                on:input=on_input
                            ></textarea>
                        }
                        .into_any(),
                        (Some(BlockKind::Video), Some(b)) => view! {
                            <video class="w-full max-w-lg rounded-md" src=b.content controls=true></video>
                            <div class="text-xs text-muted-foreground">
                                {format!("Video {}", b.video_id.unwrap_or_default())}
                            </div>
                        }
                        .into_any(),
                        _ => ().into_any(),
                    }
                }}
                <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                    <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
                </Show>
            </div>
            <Button variant=ButtonVariant::Ghost size=ButtonSize::Xs class="text-destructive" on:click=on_delete>
                "Remove"
            </Button>
        </div>
    }
}

/// Form under a subsection that appends a text or video block.
#[component]
pub fn NewBlockForm(subsection_key: String) -> impl IntoView {
    let ctx = expect_context::<ManualEditorContext>();
    let app_state = expect_context::<AppContext>();
    let key = StoredValue::new(subsection_key);

    let kind: RwSignal<BlockKind> = RwSignal::new(BlockKind::Text);
    let text: RwSignal<String> = RwSignal::new(String::new());
    let video_id: RwSignal<String> = RwSignal::new(String::new());
    let resolving: RwSignal<bool> = RwSignal::new(false);
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let clear = move || {
        text.set(String::new());
        video_id.set(String::new());
    };

    let on_add = move |_: web_sys::MouseEvent| {
        let k = key.get_value();
        match kind.get_untracked() {
            BlockKind::Text => {
                let content = text.get_untracked();
                if report(error, ctx.apply(|all| add_block(all, &k, NewBlock::text(content)))) {
                    clear();
                }
            }
            BlockKind::Video => {
                if resolving.get_untracked() {
                    return;
                }
                let vid = video_id.get_untracked().trim().to_string();
                if vid.is_empty() {
                    error.set(Some("Video id is required".to_string()));
                    return;
                }

                resolving.set(true);
                let api_client = app_state.0.api_client.get_untracked();
                spawn_local(async move {
                    // An unresolved URL is rejected by the tree, which reports it.
                    let url = match api_client.get_video_url(&vid).await {
                        Ok(url) => url,
                        Err(e) => {
                            warn!("video {vid}: lookup failed: {e}");
                            String::new()
                        }
                    };
                    let block = NewBlock::video(vid, url);
                    if report(error, ctx.apply(|all| add_block(all, &k, block))) {
                        clear();
                    }
                    resolving.set(false);
                });
            }
        }
    };

    view! {
        <div class="flex flex-col gap-2 border-t pt-2">
            <div class="flex items-center gap-2">
                <select
                    class="h-8 rounded-md border border-input bg-transparent px-2 text-sm"
                    on:change=move |ev| kind.set(event_target_value(&ev).parse().unwrap_or_default())
                >
                    <option value="text" selected=move || kind.get() == BlockKind::Text>"Text"</option>
                    <option value="video" selected=move || kind.get() == BlockKind::Video>"Video"</option>
                </select>
                <Button
                    variant=ButtonVariant::Outline
                    size=ButtonSize::Sm
                    on:click=on_add
                    attr:disabled=move || resolving.get()
                >
                    {move || if resolving.get() { "Resolving video…" } else { "Add block" }}
                </Button>
            </div>
            {move || match kind.get() {
                BlockKind::Text => view! {
                    <TextArea bind_value=text placeholder="Step instructions" />
                }
                .into_any(),
                BlockKind::Video => view! {
                    <Input bind_value=video_id placeholder="Video library id" class="h-8 max-w-sm" />
                }
                .into_any(),
            }}
            <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
            </Show>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::tree::NodeKind;

    fn with_ctx(f: impl FnOnce(ManualEditorContext)) {
        Owner::new().with(|| f(ManualEditorContext::new()));
    }

    #[test]
    fn test_edits_are_refused_while_a_save_runs() {
        with_ctx(|ctx| {
            ctx.apply(|all| create_section(all, "Intro")).unwrap();
            let (sent, _) = ctx.begin_save();

            let err = ctx.apply(|all| create_section(all, "Prep")).unwrap_err();
            assert_eq!(err, TreeError::SaveInProgress);
            let key = sent[0].local_key().to_string();
            let err = ctx
                .apply_deletion(|all| delete_section(all, &key, &|_: &str| true))
                .unwrap_err();
            assert_eq!(err, TreeError::SaveInProgress);
            assert_eq!(ctx.sections.get_untracked(), sent);

            let mut r = Reconciliation::default();
            r.ids.insert(key, "sec-1".to_string());
            assert!(ctx.fold(&sent, &r, &[]));
            assert!(!ctx.saving.get_untracked());
            assert_eq!(ctx.sections.get_untracked()[0].id, "sec-1");

            ctx.apply(|all| create_section(all, "Prep")).unwrap();
            assert_eq!(ctx.sections.get_untracked().len(), 2);
        });
    }

    #[test]
    fn test_fold_queues_created_node_missing_from_live_tree() {
        with_ctx(|ctx| {
            ctx.apply(|all| create_section(all, "Intro")).unwrap();
            let (sent, _) = ctx.begin_save();
            let key = sent[0].local_key().to_string();

            // Something outside the editors dropped the section mid-walk.
            ctx.sections.set(vec![]);

            let mut r = Reconciliation::default();
            r.ids.insert(key, "sec-1".to_string());
            assert!(!ctx.fold(&sent, &r, &[]));
            assert_eq!(
                ctx.pending_deletes.get_untracked(),
                vec![RemovedNode {
                    kind: NodeKind::Section,
                    id: "sec-1".to_string(),
                }]
            );
        });
    }
}
