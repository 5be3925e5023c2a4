use crate::components::ui::{
    Alert, AlertDescription, AlertError, AlertTitle, Button, ButtonSize, ButtonVariant, Card,
    CardContent, CardDescription, CardFooter, CardHeader, CardTitle, Input, LoadingRow, Spinner,
};
use crate::drafts::{restore_tree, DraftStore};
use crate::editor::{ManualEditorContext, ManualOutline};
use crate::models::{BlockKind, Manual};
use crate::state::manual_sync::{save_manual, BrowserPacer, SyncRequest, Synchronizer};
use crate::state::AppContext;
use leptos::logging::log;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::{use_navigate, use_params, use_query_map};
use leptos_router::params::Params;

#[derive(Params, PartialEq, Clone, Debug)]
pub struct ManualRouteParams {
    pub manual_id: Option<String>,
}

/// Where the backend sends the browser back to after sign-in.
fn auth_callback_url() -> String {
    let origin = window().location().origin().unwrap_or_default();
    format!("{origin}/auth/callback")
}

#[component]
pub fn SignInPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();

    let login_href = move || {
        let base = app_state.0.api_client.with(|c| c.base_url.clone());
        format!(
            "{base}/auth/login?redirect_uri={}",
            urlencoding::encode(&auth_callback_url())
        )
    };

    view! {
        <div class="min-h-screen flex items-center justify-center px-4">
            <Card class="w-full max-w-sm">
                <CardHeader>
                    <CardTitle>"Clinical manuals"</CardTitle>
                    <CardDescription>"Sign in with your institution account to build and edit procedure manuals."</CardDescription>
                </CardHeader>
                <CardFooter>
                    <a
                        class="inline-flex h-9 w-full items-center justify-center rounded-md bg-primary px-4 text-sm font-medium text-primary-foreground hover:bg-primary/90"
                        href=login_href
                    >
                        "Sign in"
                    </a>
                </CardFooter>
            </Card>
        </div>
    }
}

/// Landing point of the sign-in redirect: `?token=...` becomes the bearer token.
#[component]
pub fn AuthCallbackPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let query = use_query_map();
    let navigate = StoredValue::new(use_navigate());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    Effect::new(move |_| {
        let token = query.get().get("token").unwrap_or_default();
        if token.trim().is_empty() {
            error.set(Some("Sign-in did not return a token.".to_string()));
            return;
        }

        app_state.0.api_client.update(|c| {
            c.set_token(token.trim().to_string());
            c.save_to_storage();
        });
        navigate.with_value(|nav| nav("/", Default::default()));
    });

    view! {
        <div class="min-h-screen flex items-center justify-center px-4">
            <Show when=move || error.get().is_some() fallback=|| view! { <LoadingRow label="Signing in…" /> }>
                <AlertError class="max-w-sm">
                    <AlertTitle>"Sign-in failed"</AlertTitle>
                    <AlertDescription>{move || error.get().unwrap_or_default()}</AlertDescription>
                    <a class="mt-2 inline-block text-sm underline" href="/">"Back"</a>
                </AlertError>
            </Show>
        </div>
    }
}

#[component]
pub fn AppLayout(children: ChildrenFn) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let navigate = StoredValue::new(use_navigate());

    let on_sign_out = move |_: web_sys::MouseEvent| {
        app_state.0.sign_out();
        navigate.with_value(|nav| nav("/", Default::default()));
    };

    view! {
        <div class="min-h-screen bg-background text-foreground">
            <header class="border-b">
                <div class="mx-auto flex h-12 max-w-4xl items-center gap-4 px-4">
                    <a href="/" class="text-sm font-semibold">"Clinical manuals"</a>
                    <a href="/manuals/new" class="text-sm text-muted-foreground hover:text-foreground">"New manual"</a>
                    <div class="flex-1"></div>
                    <Button variant=ButtonVariant::Ghost size=ButtonSize::Sm on:click=on_sign_out>
                        "Sign out"
                    </Button>
                </div>
            </header>
            <main class="mx-auto max-w-4xl px-4 py-6">{children()}</main>
        </div>
    }
}

#[component]
pub fn RequireAuth(children: ChildrenFn) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let is_authenticated = move || app_state.0.api_client.get().is_authenticated();

    // Store children so the view macro sees an `Fn` (not an `FnOnce`).
    let children = StoredValue::new(children);

    view! {
        <Show when=is_authenticated fallback=move || view! { <SignInPage /> }>
            <AppLayout>
                {move || children.with_value(|c| c())}
            </AppLayout>
        </Show>
    }
}

#[component]
pub fn HomePage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let last_manual = app_state.0.last_manual_id;

    view! {
        <div class="space-y-4">
            <h1 class="text-xl font-semibold">"Procedure manuals"</h1>
            <div class="flex items-center gap-2">
                <a
                    href="/manuals/new"
                    class="inline-flex h-9 items-center rounded-md bg-primary px-4 text-sm font-medium text-primary-foreground hover:bg-primary/90"
                >
                    "Create a manual"
                </a>
                {move || last_manual.get().map(|id| view! {
                    <a
                        href=format!("/manuals/{}/edit", urlencoding::encode(&id))
                        class="inline-flex h-9 items-center rounded-md border px-4 text-sm hover:bg-accent"
                    >
                        "Continue last manual"
                    </a>
                })}
            </div>
        </div>
    }
}

#[component]
pub fn RootPage() -> impl IntoView {
    view! {
        <RequireAuth>
            <HomePage />
        </RequireAuth>
    }
}

#[component]
pub fn ManualNewPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let navigate = StoredValue::new(use_navigate());

    let title: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);
    let creating: RwSignal<bool> = RwSignal::new(false);

    let on_submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        if creating.get_untracked() {
            return;
        }

        let t = title.get_untracked().trim().to_string();
        if t.is_empty() {
            error.set(Some("Title is required".to_string()));
            return;
        }

        creating.set(true);
        error.set(None);
        let api_client = app_state.0.api_client.get_untracked();
        spawn_local(async move {
            match api_client.create_manual(&t).await {
                Ok(manual) => {
                    log!("manual {}: created", manual.id);
                    app_state.0.remember_manual(&manual.id);
                    let to = format!("/manuals/{}/edit", urlencoding::encode(&manual.id));
                    navigate.with_value(|nav| nav(&to, Default::default()));
                }
                Err(e) => error.set(Some(e.to_string())),
            }
            creating.set(false);
        });
    };

    view! {
        <Card class="max-w-lg">
            <CardHeader>
                <CardTitle>"New manual"</CardTitle>
                <CardDescription>"Sections, subsections and content are added in the builder."</CardDescription>
            </CardHeader>
            <CardContent>
                <form class="flex flex-col gap-3" on:submit=on_submit>
                    <Input bind_value=title placeholder="Manual title" autofocus=true />
                    <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                        <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
                    </Show>
                    <Button attr:disabled=move || creating.get()>
                        {move || if creating.get() { "Creating…" } else { "Create and open builder" }}
                    </Button>
                </form>
            </CardContent>
        </Card>
    }
}

#[component]
pub fn ManualBuilderPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let params = use_params::<ManualRouteParams>();
    let navigate = StoredValue::new(use_navigate());

    // Use closures so params access happens inside a reactive tracking context.
    let manual_id = move || {
        params
            .get()
            .ok()
            .and_then(|p| p.manual_id)
            .unwrap_or_default()
    };

    let ctx = ManualEditorContext::new();
    provide_context(ctx);

    let loading: RwSignal<bool> = RwSignal::new(false);
    let saving = ctx.saving;
    let error: RwSignal<Option<String>> = RwSignal::new(None);
    let recovered: RwSignal<bool> = RwSignal::new(false);
    let reload_tick: RwSignal<u64> = RwSignal::new(0);

    let title_value: RwSignal<String> = RwSignal::new(String::new());
    // Title as the server last saw it; the walk only sends it when it differs.
    let title_original: RwSignal<String> = RwSignal::new(String::new());

    Effect::new(move |_| {
        reload_tick.track();
        let id = manual_id();
        if id.trim().is_empty() {
            return;
        }

        loading.set(true);
        error.set(None);

        let api_client = app_state.0.api_client.get_untracked();
        spawn_local(async move {
            match api_client.get_manual(&id).await {
                Ok(manual) => {
                    let restored = restore_tree(&DraftStore::browser(), &id, manual.sections);
                    title_value.set(manual.title.clone());
                    title_original.set(manual.title);
                    recovered.set(restored.recovered);
                    ctx.reset(&id, restored.sections, restored.pending_deletes);
                    app_state.0.remember_manual(&id);
                }
                Err(e) => error.set(Some(e.to_string())),
            }
            loading.set(false);
        });
    });

    let on_discard = move |_: web_sys::MouseEvent| {
        ctx.discard_drafts();
        ctx.reset(&ctx.manual_id(), vec![], vec![]);
        recovered.set(false);
        reload_tick.update(|n| *n += 1);
    };

    let on_save = move |_: web_sys::MouseEvent| {
        if saving.get_untracked() {
            return;
        }

        let id = params
            .get_untracked()
            .ok()
            .and_then(|p| p.manual_id)
            .unwrap_or_default();
        let title = title_value.get_untracked().trim().to_string();
        if title.is_empty() {
            error.set(Some("Manual title is required".to_string()));
            return;
        }
        let title_changed = title != title_original.get_untracked();

        error.set(None);
        let (sections, pending) = ctx.begin_save();
        let api_client = app_state.0.api_client.get_untracked();
        let pacing = app_state.0.pacing;

        spawn_local(async move {
            let pacer = BrowserPacer;
            let sync = Synchronizer::new(&api_client, &pacer, pacing);
            let req = SyncRequest {
                manual_id: &id,
                manual_title: title_changed.then_some(title.as_str()),
                sections: &sections,
                pending_deletes: &pending,
            };
            let outcome = save_manual(&sync, &DraftStore::browser(), req).await;

            let in_step = ctx.fold(&sections, &outcome.reconciliation, &outcome.deleted);

            if outcome.ok && !in_step {
                // The server has the walk's tree but the page holds something newer.
                title_original.set(title);
                error.set(Some(
                    "Saved, but the manual changed while saving. Save again to keep the latest edits."
                        .to_string(),
                ));
            } else if outcome.ok {
                ctx.seal();
                title_original.set(title);
                recovered.set(false);
                let to = format!("/manuals/{}", urlencoding::encode(&id));
                navigate.with_value(|nav| nav(&to, Default::default()));
            } else {
                error.set(outcome.message);
            }
        });
    };

    let pending_count = move || ctx.pending_deletes.with(|q| q.len());

    view! {
        <div class="space-y-4">
            <Show when=move || loading.get() fallback=|| ().into_view()>
                <LoadingRow label="Loading manual…" />
            </Show>

            <Show when=move || recovered.get() fallback=|| ().into_view()>
                <Alert>
                    <AlertTitle>"Unsaved changes recovered"</AlertTitle>
                    <AlertDescription>
                        "This manual was restored from changes kept in this browser. Save to keep them."
                    </AlertDescription>
                    <Button variant=ButtonVariant::Outline size=ButtonSize::Xs class="mt-2" on:click=on_discard>
                        "Discard recovered changes"
                    </Button>
                </Alert>
            </Show>

            <div class="flex items-center gap-2">
                <Input
                    bind_value=title_value
                    placeholder="Manual title"
                    class="text-lg font-semibold"
                    disabled=saving
                />
                <Button on:click=on_save attr:disabled=move || saving.get() || loading.get()>
                    {move || {
                        if saving.get() {
                            view! { <Spinner /> "Saving…" }.into_any()
                        } else {
                            "Save".into_any()
                        }
                    }}
                </Button>
                <a
                    class="inline-flex h-9 items-center rounded-md px-3 text-sm hover:bg-accent"
                    href=move || format!("/manuals/{}", urlencoding::encode(&manual_id()))
                >
                    "View"
                </a>
            </div>

            <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                <AlertError>
                    <AlertDescription>{move || error.get().unwrap_or_default()}</AlertDescription>
                </AlertError>
            </Show>

            <Show when=move || { pending_count() > 0 } fallback=|| ().into_view()>
                <div class="text-xs text-muted-foreground">
                    {move || format!("{} deletion(s) will be applied on save.", pending_count())}
                </div>
            </Show>

            <ManualOutline />
        </div>
    }
}

#[component]
pub fn ManualViewerPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let params = use_params::<ManualRouteParams>();

    let manual_id = move || {
        params
            .get()
            .ok()
            .and_then(|p| p.manual_id)
            .unwrap_or_default()
    };

    let manual: RwSignal<Option<Manual>> = RwSignal::new(None);
    let loading: RwSignal<bool> = RwSignal::new(false);
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    Effect::new(move |_| {
        let id = manual_id();
        if id.trim().is_empty() {
            return;
        }

        loading.set(true);
        error.set(None);
        let api_client = app_state.0.api_client.get_untracked();
        spawn_local(async move {
            match api_client.get_manual(&id).await {
                Ok(m) => manual.set(Some(m)),
                Err(e) => error.set(Some(e.to_string())),
            }
            loading.set(false);
        });
    });

    view! {
        <div class="space-y-6">
            <Show when=move || loading.get() fallback=|| ().into_view()>
                <LoadingRow label="Loading manual…" />
            </Show>
            <Show when=move || error.get().is_some() fallback=|| ().into_view()>
                <AlertError>
                    <AlertDescription>{move || error.get().unwrap_or_default()}</AlertDescription>
                </AlertError>
            </Show>

            {move || manual.get().map(|m| {
                let edit_href = format!("/manuals/{}/edit", urlencoding::encode(&m.id));
                view! {
                    <article class="space-y-6">
                        <div class="flex items-center gap-3">
                            <h1 class="flex-1 text-2xl font-semibold">{m.title}</h1>
                            <a class="text-sm underline underline-offset-2" href=edit_href>"Edit"</a>
                        </div>
                        {m.sections.into_iter().map(|s| view! {
                            <section class="space-y-3">
                                <h2 class="text-lg font-semibold">{s.title}</h2>
                                {s.subsections.into_iter().map(|ss| view! {
                                    <div class="space-y-2 pl-4">
                                        <h3 class="text-base font-medium">{ss.title}</h3>
                                        {ss.blocks.into_iter().map(|b| match b.kind {
                                            BlockKind::Text => view! {
                                                <p class="whitespace-pre-wrap text-sm">{b.content}</p>
                                            }
                                            .into_any(),
                                            BlockKind::Video => view! {
                                                <video class="w-full max-w-xl rounded-md" src=b.content controls=true></video>
                                            }
                                            .into_any(),
                                        }).collect_view()}
                                    </div>
                                }).collect_view()}
                            </section>
                        }).collect_view()}
                    </article>
                }
            })}
        </div>
    }
}
