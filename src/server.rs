use actix_web::{
    HttpRequest, HttpResponse, HttpServer, ResponseError, error, get, post, web,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::job::{JobEnvelope, JobOutput, handle_job};

/// Job endpoint: one JSON object, or NDJSON lines for streamed audio.
#[post("/run")]
pub async fn run(job: web::Json<JobEnvelope>, ctx: web::Data<WorkerContext>) -> HttpResponse {
    match handle_job(&ctx, &job).await {
        JobOutput::Audio(value) => HttpResponse::Ok().json(value),
        JobOutput::Failed(e) => e.error_response(),
        JobOutput::Chunks(chunks) => HttpResponse::Ok()
            .content_type("application/x-ndjson")
            .streaming(chunks.map(|value| {
                Ok::<_, actix_web::Error>(Bytes::from(format!("{}\n", value)))
            })),
    }
}

#[get("/health")]
pub async fn health(ctx: web::Data<WorkerContext>) -> HttpResponse {
    let backend = ctx.backend().liveness();
    if backend.is_alive() {
        HttpResponse::Ok().json(json!({ "status": "ok", "backend": backend }))
    } else {
        log::error!("Backend is no longer running: {:?}", backend);
        HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable", "backend": backend }))
    }
}

#[get("/status")]
pub async fn status(ctx: web::Data<WorkerContext>) -> HttpResponse {
    HttpResponse::Ok().json(ctx.status())
}

// Malformed envelopes get the same `{"error": ...}` shape as failed jobs.
fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::warn!("Rejected job envelope: {}", err);
    let message = format!("invalid job envelope: {}", err);
    let code = match &err {
        error::JsonPayloadError::OverflowKnownLength { .. } | error::JsonPayloadError::Overflow { .. } => {
            actix_web::http::StatusCode::PAYLOAD_TOO_LARGE
        }
        _ => actix_web::http::StatusCode::BAD_REQUEST,
    };
    error::InternalError::from_response(
        err,
        HttpResponse::build(code).json(json!({ "error": message })),
    )
    .into()
}

pub fn json_config(max_payload_size: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(max_payload_size)
        .error_handler(json_error_handler)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(run).service(health).service(status);
}

pub async fn startup(config: &WorkerConfig, ctx: web::Data<WorkerContext>) -> std::io::Result<()> {
    let max_payload_size = config.max_payload_size;
    log::info!("Starting server at {}:{}", config.host, config.port);

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(ctx.clone())
            .app_data(json_config(max_payload_size))
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
