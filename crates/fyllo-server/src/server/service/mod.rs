//! HTTP routes.
//!
//! | route                   | response                        |
//! |-------------------------|---------------------------------|
//! | `GET /version`          | `{name, version, description}`  |
//! | `GET /api/snowflake`    | snowflake [`fyllo::IdResult`]   |
//! | `GET /api/segment`      | segment [`fyllo::IdResult`]     |
//! | `GET /api/random`       | [`fyllo::RandomResult`]         |

pub mod handler;

use axum::{Router, routing::get};
use handler::AppState;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/version", get(handler::version))
        .route("/api/snowflake", get(handler::snowflake))
        .route("/api/segment", get(handler::segment))
        .route("/api/random", get(handler::random))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
