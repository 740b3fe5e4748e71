//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Portal sign-in and sessions
        .route("/portal/magic-link", post(handlers::request_magic_link))
        .route("/portal/validate-token", post(handlers::validate_token))
        .route("/portal/validate-session", post(handlers::validate_session))
        .route("/portal/refresh", post(handlers::refresh_session))
        .route("/portal/logout", post(handlers::logout))
        .route("/portal/setup-password", post(handlers::setup_password))
        .route("/portal/verify-password", post(handlers::verify_password))
        .route("/portal/check-exists", post(handlers::check_portal_exists))
        .route("/portal/client-slug", post(handlers::lookup_client_slug))
        // Portal client workspace
        .route(
            "/portal/files",
            get(handlers::list_portal_files).post(handlers::upload_portal_file),
        )
        .route("/portal/files/:id/approve", post(handlers::approve_portal_file))
        .route("/portal/contracts", get(handlers::list_portal_contracts))
        .route("/portal/contracts/:id/sign", post(handlers::sign_portal_contract))
        .route("/portal/invoices", get(handlers::list_portal_invoices))
        .route("/portal/forms", get(handlers::list_portal_forms))
        .route("/portal/forms/:id/submit", post(handlers::submit_portal_form))
        .route(
            "/portal/forms/:id/submission",
            get(handlers::check_portal_form_submission),
        )
        .route(
            "/portal/projects/:id/messages",
            get(handlers::list_portal_messages).post(handlers::post_portal_message),
        )
        .route(
            "/portal/projects/:id/messages/read",
            post(handlers::mark_portal_messages_read),
        )
        .route("/portals/:id/views", post(handlers::increment_portal_view))
        .route("/invoices/public/:token", get(handlers::get_public_invoice))
        .route("/forms/public/:id", post(handlers::submit_public_form))
        // Clients and portals
        .route(
            "/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route(
            "/clients/:id",
            get(handlers::get_client).patch(handlers::update_client),
        )
        .route("/clients/:id/archive", post(handlers::archive_client))
        .route(
            "/portals",
            get(handlers::list_portals).post(handlers::create_portal),
        )
        // Members
        .route(
            "/clients/:id/members",
            get(handlers::list_members).post(handlers::add_members),
        )
        .route("/members/:id", delete(handlers::deactivate_member))
        // Contracts
        .route(
            "/contracts",
            get(handlers::list_contracts).post(handlers::create_contract),
        )
        .route("/contracts/stats", get(handlers::contract_stats))
        .route("/contracts/reconcile", post(handlers::reconcile_contracts))
        .route(
            "/contracts/:id",
            get(handlers::get_contract).patch(handlers::update_contract),
        )
        .route("/contracts/:id/send", post(handlers::send_contract))
        .route("/contracts/:id/sign", post(handlers::sign_contract))
        // Files
        .route("/files/:id/review", post(handlers::review_file))
        .route("/files/:id/approvals", get(handlers::list_file_approvals))
        // Invoices
        .route(
            "/invoices",
            get(handlers::list_invoices).post(handlers::create_invoice),
        )
        .route("/invoices/:id", patch(handlers::update_invoice))
        .route("/invoices/:id/send", post(handlers::send_invoice))
        .route("/invoices/:id/paid", post(handlers::mark_invoice_paid))
        .route("/invoices/:id/share", post(handlers::share_invoice))
        // Forms
        .route("/forms", get(handlers::list_forms).post(handlers::create_form))
        .route("/forms/:id", get(handlers::get_form))
        .route("/forms/:id/status", post(handlers::set_form_status))
        .route("/forms/:id/submissions", get(handlers::list_form_submissions))
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/:id",
            get(handlers::get_project).patch(handlers::update_project),
        )
        .route(
            "/projects/:id/messages",
            get(handlers::list_project_messages).post(handlers::post_project_message),
        )
        .route(
            "/projects/:id/messages/read",
            post(handlers::mark_project_messages_read),
        )
        .route("/projects/:id/activities", get(handlers::list_project_activities))
        .route("/activities", post(handlers::log_activity))
        // Billing
        .route("/billing/checkout", post(handlers::create_checkout))
        .route("/billing/webhook", post(handlers::billing_webhook))
        // Growth
        .route(
            "/grow/brand-profile",
            get(handlers::get_brand_profile).put(handlers::save_brand_profile),
        )
        .route("/grow/plan", post(handlers::generate_plan))
        .route("/grow/posts", post(handlers::generate_posts));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(state.max_body_size))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(TraceLayer::new_for_http());

    if state.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
