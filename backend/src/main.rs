use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use leafscan::config::{ServerConfig, load_pipeline_config};
use leafscan::model::{ModelHandle, load_classifier};
use leafscan::pipeline::Pipeline;
use leafscan::routes::configure_routes;

fn config_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let server =
        ServerConfig::from_env().map_err(|e| config_error("Invalid server configuration", e))?;
    let pipeline_config =
        load_pipeline_config().map_err(|e| config_error("Invalid pipeline configuration", e))?;

    log::info!(
        "Normalizer v{} ({:?}, {:?}), quality table {:?}, ensemble {}",
        pipeline_config.normalizer.version,
        pipeline_config.normalizer.resize_filter,
        pipeline_config.normalizer.crop,
        pipeline_config.quality.table,
        if pipeline_config.ensemble.enabled {
            format!(
                "{:?}/{:?}",
                pipeline_config.ensemble.kind, pipeline_config.ensemble.reduction
            )
        } else {
            "off".to_string()
        }
    );

    let model = match load_classifier(&server.model_path, server.apply_softmax) {
        Ok(handle) => {
            log::info!("Model loaded from {}", server.model_path.display());
            handle
        }
        Err(e) => {
            log::error!(
                "Failed to load model from {}: {}. Serving without a classifier.",
                server.model_path.display(),
                e
            );
            ModelHandle::unloaded()
        }
    };

    let pipeline = web::Data::new(Pipeline::new(pipeline_config));
    let model = web::Data::new(model);
    let bind_address = server.bind_target();
    let server = web::Data::new(server);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .app_data(model.clone())
            .app_data(server.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
