mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::judging::Comparisons;

/// Shared request state: the store handle and the comparison matrix built
/// at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub comps: Arc<Comparisons>,
}

pub fn create_router(db: Database, comps: Arc<Comparisons>) -> Router {
    let api = Router::new()
        // Judge flow
        .route("/judge/next", post(handlers::next_project))
        .route("/judge/skip", post(handlers::skip_project))
        .route("/judge/break", post(handlers::take_break))
        .route("/judge/score", post(handlers::score_project))
        .route("/judge/score", put(handlers::update_score))
        .route("/judge/notes", post(handlers::update_notes))
        .route("/judge/rank", post(handlers::update_rankings))
        .route("/judge/submit-batch-ranking", post(handlers::submit_batch_ranking))
        .route("/judge/projects", get(handlers::judge_projects))
        .route("/judge/project/{id}", get(handlers::judged_project))
        .route("/judge/welcome", get(handlers::check_read_welcome))
        .route("/judge/welcome", post(handlers::set_read_welcome))
        .route("/categories", get(handlers::categories))
        .route("/brs", get(handlers::batch_ranking_size))
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects", post(handlers::create_project))
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}/prioritize", post(handlers::prioritize_project))
        .route("/projects/{id}/unprioritize", post(handlers::unprioritize_project))
        .route("/projects/{id}/hide", post(handlers::hide_project))
        .route("/projects/{id}/unhide", post(handlers::unhide_project))
        // Judges
        .route("/judges", get(handlers::list_judges))
        .route("/judges", post(handlers::create_judge))
        .route("/judges/{id}/hide", post(handlers::hide_judge))
        .route("/judges/{id}/unhide", post(handlers::unhide_judge))
        .route("/judges/{id}/notes", post(handlers::set_judge_notes))
        // Admin
        .route("/admin/flags", get(handlers::list_flags))
        .route("/admin/stats", get(handlers::stats))
        .route("/admin/min-views", post(handlers::set_min_views))
        .route("/admin/ranking-batch-size", post(handlers::set_ranking_batch_size))
        .route("/admin/end-judging", get(handlers::judging_ended))
        .route("/admin/end-judging", post(handlers::end_judging))
        .route("/admin/rankings/borda", get(handlers::borda_rankings))
        .route("/admin/rankings/copeland", get(handlers::copeland_rankings))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { db, comps })
}
