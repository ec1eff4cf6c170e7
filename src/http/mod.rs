use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::app::AppController;
use crate::domain::{DomainError, InstallProgress, ModelSize, RequestedDevice, SessionPhase};

/// Body of `POST /start`. Every field is optional; defaults come from the
/// persisted configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub model_size: ModelSize,
    pub language: Option<String>,
    pub device: RequestedDevice,
    pub device_index: Option<usize>,
}

impl Default for StartRequest {
    fn default() -> Self {
        Self {
            model_size: ModelSize::Small,
            language: None,
            device: RequestedDevice::Auto,
            device_index: None,
        }
    }
}

/// Expected failures are carried in the body with HTTP 200, matching what
/// the desktop client parses; nothing is surfaced as a bare 4xx/5xx.
fn error_body(e: DomainError) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "error",
        "message": e.to_string(),
    }))
}

async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "app": "Sotto Backend",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(controller: web::Data<AppController>) -> impl Responder {
    let status = controller.session().status();

    let backend = if status.model_loaded {
        status.device.map(|d| d.as_str()).unwrap_or("cpu")
    } else {
        "cpu"
    };
    let model = status
        .model
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| "not_loaded".to_string());

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "backend": backend,
        "model": model,
        "recording": status.phase == SessionPhase::Recording,
        "phase": status.phase.as_str(),
    }))
}

async fn start(
    controller: web::Data<AppController>,
    payload: web::Json<StartRequest>,
) -> impl Responder {
    let request = payload.into_inner();

    let language = match request.language {
        Some(lang) if !lang.eq_ignore_ascii_case("auto") => Some(lang),
        Some(_) => None,
        None => controller.config().transcription.language_hint(),
    };

    match controller
        .session()
        .start(request.model_size, request.device, language, request.device_index)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "status": "started",
            "message": "Recording...",
            "model": outcome.model,
            "device": outcome.device,
            "model_downloaded": outcome.model_downloaded,
        })),
        Err(e) => error_body(e),
    }
}

async fn stop(controller: web::Data<AppController>) -> impl Responder {
    match controller.session().stop().await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "status": "success",
            "text": outcome.text,
            "language": outcome.language,
            "language_probability": outcome.language_probability,
            "duration": outcome.duration_secs,
            "transcription_time_ms": outcome.transcription_time_ms,
            "segments": outcome.segments,
            "model": outcome.model,
            "device": outcome.device,
        })),
        Err(e) => error_body(e),
    }
}

async fn cancel(controller: web::Data<AppController>) -> impl Responder {
    match controller.session().cancel().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "Recording canceled",
        })),
        Err(e) => error_body(e),
    }
}

async fn audio_level(controller: web::Data<AppController>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "level": controller.session().audio_level(),
    }))
}

async fn devices(controller: web::Data<AppController>) -> impl Responder {
    match controller.audio().list_devices() {
        Ok(devices) => HttpResponse::Ok().json(json!({
            "success": true,
            "devices": devices,
        })),
        Err(e) => HttpResponse::Ok().json(json!({
            "success": false,
            "error": e.to_string(),
            "devices": [],
        })),
    }
}

async fn gpu_info(controller: web::Data<AppController>) -> impl Responder {
    HttpResponse::Ok().json(controller.provisioner().info())
}

async fn gpu_install(controller: web::Data<AppController>) -> impl Responder {
    let progress: crate::ports::InstallProgressFn = Box::new(|p: InstallProgress| {
        info!(percent = p.percent, message = %p.message, "GPU install progress");
    });

    match controller.provisioner().install(Some(progress)).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "GPU libraries installed",
        })),
        Err(e) => error_body(e),
    }
}

async fn gpu_uninstall(controller: web::Data<AppController>) -> impl Responder {
    let removed = controller.provisioner().uninstall();
    HttpResponse::Ok().json(json!({
        "status": "success",
        "removed": removed,
    }))
}

/// Route table. Every route maps 1:1 to a session manager or provisioner
/// operation.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root))
        .route("/health", web::get().to(health))
        .route("/start", web::post().to(start))
        .route("/stop", web::post().to(stop))
        .route("/cancel", web::post().to(cancel))
        .route("/audio_level", web::get().to(audio_level))
        .route("/devices", web::get().to(devices))
        .service(
            web::scope("/gpu")
                .route("/info", web::get().to(gpu_info))
                .route("/install", web::post().to(gpu_install))
                .route("/uninstall", web::post().to(gpu_uninstall)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_defaults() {
        let request: StartRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.model_size, ModelSize::Small);
        assert_eq!(request.device, RequestedDevice::Auto);
        assert!(request.language.is_none());
        assert!(request.device_index.is_none());
    }

    #[test]
    fn test_start_request_cuda_alias_and_fields() {
        let request: StartRequest = serde_json::from_str(
            r#"{"model_size": "large-v3-turbo", "device": "cuda", "language": "de", "device_index": 2}"#,
        )
        .unwrap();
        assert_eq!(request.model_size, ModelSize::LargeV3Turbo);
        assert_eq!(request.device, RequestedDevice::Gpu);
        assert_eq!(request.language.as_deref(), Some("de"));
        assert_eq!(request.device_index, Some(2));
    }
}
