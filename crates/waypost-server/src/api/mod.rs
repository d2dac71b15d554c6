pub mod documents;
pub mod health;
pub mod locks;
pub mod versions;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(locks::router())
        .merge(documents::router())
        .merge(versions::router())
}
