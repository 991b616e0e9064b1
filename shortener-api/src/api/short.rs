//! `POST /short` and `GET /short/{id}` (spec.md §6).

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use shortener_core::{CoreError, Engine};

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct CreateShortRequest {
    pub origin: String,
}

#[derive(Debug, Serialize)]
struct CreateShortResponse {
    id: String,
    origin: String,
    created_at: chrono::DateTime<chrono::Utc>,
    fraud: bool,
    count: i64,
}

fn has_json_content_type(req: &HttpRequest) -> bool {
    req.headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim() == "application/json")
        .unwrap_or(false)
}

#[post("/short")]
pub async fn create_short(
    req: HttpRequest,
    body: web::Bytes,
    engine: web::Data<Engine>,
) -> impl Responder {
    if !has_json_content_type(&req) {
        return error_response(CoreError::BadInput(
            "Content-Type must be application/json".into(),
        ));
    }

    let payload: CreateShortRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return error_response(CoreError::BadInput(format!("invalid body: {e}"))),
    };

    match engine.create(payload.origin).await {
        Ok(short) => HttpResponse::Ok().json(CreateShortResponse {
            id: short.id,
            origin: short.origin,
            created_at: short.created_at,
            fraud: short.fraud,
            count: short.count,
        }),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
struct GetShortResponse {
    origin: String,
}

#[get("/short/{id}")]
pub async fn get_short(path: web::Path<String>, engine: web::Data<Engine>) -> impl Responder {
    let id = path.into_inner();
    match engine.resolve(&id).await {
        Ok(origin) => HttpResponse::Ok().json(GetShortResponse { origin }),
        Err(e) => error_response(e),
    }
}
