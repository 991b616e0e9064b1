//! Per-IP token-bucket rate limiting, installed only when `RATE_LIMIT=ON`
//! (spec.md §6): 10 tokens/s per IP, keyed off `X-Forwarded-For`.
//!
//! Same `Transform`/`Service` shape as the settings API's
//! `auth_middleware::JwtAuth` — a zero-sized config type that produces a
//! middleware holding an `Rc` of shared state, rather than `from_fn`.

use std::collections::HashMap;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::{Duration, Instant};

use actix_web::body::BoxBody;
use actix_web::dev::{self, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures_util::future::LocalBoxFuture;
use parking_lot::Mutex;

const TOKENS_PER_SECOND: f64 = 10.0;
const BUCKET_CAPACITY: f64 = 10.0;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

struct Buckets {
    by_ip: Mutex<HashMap<String, Bucket>>,
}

impl Buckets {
    fn new() -> Self {
        Self {
            by_ip: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, ip: &str) -> bool {
        let mut buckets = self.by_ip.lock();
        let now = Instant::now();
        let bucket = buckets.entry(ip.to_string()).or_insert_with(|| Bucket {
            tokens: BUCKET_CAPACITY,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * TOKENS_PER_SECOND).min(BUCKET_CAPACITY);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

fn client_ip(req: &ServiceRequest) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| {
            req.peer_addr()
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
}

/// Middleware factory, wrapped onto the app with `.wrap(RateLimit::new())`.
pub struct RateLimit {
    buckets: Rc<Buckets>,
}

impl RateLimit {
    pub fn new() -> Self {
        Self {
            buckets: Rc::new(Buckets::new()),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            buckets: self.buckets.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    buckets: Rc<Buckets>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let buckets = self.buckets.clone();
        let srv = self.service.clone();
        let ip = client_ip(&req);

        if buckets.allow(&ip) {
            Box::pin(async move { Ok(srv.call(req).await?.map_into_boxed_body()) })
        } else {
            Box::pin(async move {
                let (http_req, _) = req.into_parts();
                Ok(ServiceResponse::new(
                    http_req,
                    HttpResponse::TooManyRequests().body("rate limit exceeded"),
                )
                .map_into_boxed_body())
            })
        }
    }
}
