use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use http::Method;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{backups, changestream, healthcheck, records},
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(healthcheck))
        .route(
            "/customers",
            post(records::create_customer).get(records::list_customers),
        )
        .route("/customers/feedback", post(records::create_feedback))
        .route(
            "/customers/delete-all",
            delete(records::delete_all_customers),
        )
        .route(
            "/customers/:id",
            put(records::update_customer).delete(records::delete_customer),
        )
        // Sibling routes must share the parameter name; this one carries an email.
        .route(
            "/customers/:id/feedbacks",
            get(records::list_customer_feedbacks),
        )
        .route("/feedbacks", get(records::list_feedbacks))
        .route(
            "/feedbacks/:id",
            patch(records::update_feedback)
                .put(records::replace_feedback)
                .delete(records::delete_feedback),
        )
        .route(
            "/responses",
            post(records::create_response).get(records::list_responses),
        )
        .route(
            "/responses/:id",
            put(records::update_response).delete(records::delete_response),
        )
        .route("/overall-rating", get(records::overall_rating))
        .route("/backup", post(backups::create_backup))
        .route("/backups", get(backups::list_backups))
        .route(
            "/backup/:filename",
            get(backups::read_backup).delete(backups::delete_backup),
        )
        .route("/restore/:filename", post(backups::restore_backup))
        .route("/changestream/active", get(changestream::active_streams))
        .route(
            "/changestream/feedback/:id",
            get(changestream::open_feedback_stream).put(changestream::open_feedback_stream),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                ]),
        )
        .with_state(state)
}
