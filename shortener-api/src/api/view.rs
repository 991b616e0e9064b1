//! `GET /view/{id}` (spec.md §6).

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use shortener_core::Engine;

use super::error_response;

#[derive(Debug, Serialize)]
struct ViewResponse {
    count: i64,
}

#[get("/view/{id}")]
pub async fn get_view(path: web::Path<String>, engine: web::Data<Engine>) -> impl Responder {
    let id = path.into_inner();
    match engine.view_count(&id).await {
        Ok(count) => HttpResponse::Ok().json(ViewResponse { count }),
        Err(e) => error_response(e),
    }
}
