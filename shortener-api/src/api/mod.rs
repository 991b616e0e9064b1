//! HTTP surface (spec.md §6): thin adapters over [`shortener_core::Engine`].
//! No business logic lives here — every handler validates the request
//! shape, calls the core, and maps [`CoreError`] onto a status code.

pub mod fraud;
pub mod health;
pub mod short;
pub mod view;

use actix_web::web;
use shortener_core::CoreError;

/// Mounts every route at the root, mirroring the flat `/short`, `/fraud`,
/// `/view` paths spec.md §6 specifies (no `/api/v1` prefix in this service).
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::healthz)
        .service(short::create_short)
        .service(short::get_short)
        .service(fraud::get_fraud)
        .service(view::get_view);
}

/// Maps the core's abstract error taxonomy onto the status codes spec.md
/// §7 assigns them.
pub(crate) fn status_for(err: &CoreError) -> actix_web::http::StatusCode {
    use actix_web::http::StatusCode;
    match err {
        CoreError::BadInput(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::StoreUnavailable(_)
        | CoreError::CacheUnavailable(_)
        | CoreError::QueueUnavailable(_)
        | CoreError::BusUnavailable(_)
        | CoreError::IdExhausted => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: CoreError) -> actix_web::HttpResponse {
    let status = status_for(&err);
    log::error!("request failed: {err}");
    actix_web::HttpResponse::build(status).json(serde_json::json!({ "error": err.to_string() }))
}
