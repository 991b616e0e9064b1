use actix_web::{get, HttpResponse, Responder};

/// Liveness probe. Added by this service on top of spec.md §6's table —
/// not business logic, just the ambient health endpoint every deployed
/// actix-web service here carries.
#[get("/healthz")]
pub async fn healthz() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
