//! `GET /fraud/{id}` (spec.md §6).

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use shortener_core::Engine;

use super::error_response;

#[derive(Debug, Serialize)]
struct FraudResponse {
    fraud: bool,
}

#[get("/fraud/{id}")]
pub async fn get_fraud(path: web::Path<String>, engine: web::Data<Engine>) -> impl Responder {
    let id = path.into_inner();
    match engine.fraud_status(&id).await {
        Ok(fraud) => HttpResponse::Ok().json(FraudResponse { fraud }),
        Err(e) => error_response(e),
    }
}
