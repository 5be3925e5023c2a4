use crate::pages::{
    AuthCallbackPage, ManualBuilderPage, ManualNewPage, ManualViewerPage, RequireAuth, RootPage,
};
use crate::state::{AppContext, AppState};
use leptos::prelude::*;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::path;

#[component]
pub fn App() -> impl IntoView {
    provide_context(AppContext(AppState::new()));

    // IMPORTANT:
    // - Leptos CSR requires the `csr` feature on `leptos`.
    // - router hooks require a <Router> context.
    view! {
        <Router>
            <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                <Route path=path!("auth/callback") view=AuthCallbackPage />
                <Route path=path!("manuals/new") view=move || view! {
                    <RequireAuth>
                        <ManualNewPage />
                    </RequireAuth>
                } />
                <Route path=path!("manuals/:manual_id/edit") view=move || view! {
                    <RequireAuth>
                        <ManualBuilderPage />
                    </RequireAuth>
                } />
                <Route path=path!("manuals/:manual_id") view=move || view! {
                    <RequireAuth>
                        <ManualViewerPage />
                    </RequireAuth>
                } />
                <Route path=path!("") view=RootPage />
            </Routes>
        </Router>
    }
}
