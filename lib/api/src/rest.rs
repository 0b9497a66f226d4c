use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use icdx_core::Error;
use icdx_suggest::{RationaleBackend, SuggestRequest, SuggestService};
use std::sync::Arc;
use tracing::{error, info};

pub type Service = SuggestService<RationaleBackend>;

pub struct RestApi;

impl RestApi {
    pub async fn start(service: Arc<Service>, port: u16) -> std::io::Result<()> {
        info!(port, "starting REST API");
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(service.clone()))
                .configure(Self::configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/healthz", web::get().to(healthz))
            .route("/suggest", web::post().to(suggest))
            .route("/codes/{code}", web::get().to(get_code))
            .route("/admin/reload", web::post().to(reload));
    }
}

async fn healthz(service: web::Data<Arc<Service>>) -> ActixResult<HttpResponse> {
    let indexes = service.indexes();
    let set = indexes.current();
    let manifest = indexes.manifest();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "entries": set.len(),
        "vector_available": set.vector().is_available(),
        "built_at": manifest.built_at,
    })))
}

async fn suggest(
    service: web::Data<Arc<Service>>,
    req: web::Json<SuggestRequest>,
) -> ActixResult<HttpResponse> {
    match service.suggest(req.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e @ Error::InvalidInput(_)) => Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": e.to_string()
        }))),
        Err(e) => {
            error!(error = %e, "suggest failed");
            Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": e.to_string()
            })))
        }
    }
}

async fn get_code(
    service: web::Data<Arc<Service>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let code = path.into_inner();
    let set = service.indexes().current();
    match set.metadata().get_by_code(&code) {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Code {} not found", code)
        }))),
    }
}

async fn reload(service: web::Data<Arc<Service>>) -> ActixResult<HttpResponse> {
    let indexes = service.indexes().clone();
    let outcome = web::block(move || indexes.reload()).await?;
    match outcome {
        Ok(manifest) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "reloaded": true,
            "manifest": manifest,
        }))),
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "reloaded": false,
            "error": e.to_string()
        }))),
    }
}
