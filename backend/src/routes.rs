use actix_multipart::{Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use futures::TryStreamExt;
use log::{error, info, warn};
use shared::{ErrorResponse, HealthResponse, LabelScore, PredictionResponse};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::model::{ClassifierError, ModelHandle};
use crate::pipeline::{CalibratedResult, Pipeline, PipelineError};

pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no image file provided")]
    NoImage,
    #[error("no image file selected")]
    EmptyFilename,
    #[error("image exceeds the {max} byte upload limit")]
    FileTooLarge { max: usize },
    #[error("malformed upload: {0}")]
    Upload(String),
}

impl From<MultipartError> for RequestError {
    fn from(err: MultipartError) -> Self {
        RequestError::Upload(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Request(RequestError::NoImage) => "NO_IMAGE",
            ApiError::Request(RequestError::EmptyFilename) => "EMPTY_FILENAME",
            ApiError::Request(RequestError::FileTooLarge { .. }) => "FILE_TOO_LARGE",
            ApiError::Request(RequestError::Upload(_)) => "UPLOAD_ERROR",
            ApiError::Pipeline(PipelineError::Decode(_)) => "DECODE_ERROR",
            ApiError::Pipeline(PipelineError::Shape { .. }) => "SHAPE_ERROR",
            ApiError::Pipeline(PipelineError::ClassifierUnavailable)
            | ApiError::Pipeline(PipelineError::Classifier(ClassifierError::NotLoaded)) => {
                "MODEL_NOT_LOADED"
            }
            ApiError::Pipeline(PipelineError::InvalidScores(_)) => "INVALID_SCORES",
            ApiError::Pipeline(PipelineError::Classifier(_)) => "INFERENCE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Request(_) | ApiError::Pipeline(PipelineError::Decode(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Pipeline(PipelineError::ClassifierUnavailable)
            | ApiError::Pipeline(PipelineError::Classifier(ClassifierError::NotLoaded)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Pipeline(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{} ({})", self, self.code());
        } else {
            warn!("{} ({})", self, self.code());
        }
        HttpResponse::build(status).json(ErrorResponse {
            status: "error".to_string(),
            code: self.code().to_string(),
            message: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/health").route(web::get().to(handle_health)));
}

async fn handle_health(model: web::Data<ModelHandle>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: model.is_loaded(),
    })
}

async fn handle_predict(
    pipeline: web::Data<Pipeline>,
    model: web::Data<ModelHandle>,
    server: web::Data<ServerConfig>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    if !model.is_loaded() {
        return Err(PipelineError::ClassifierUnavailable.into());
    }

    let request_id = Uuid::new_v4();
    let image = read_image_field(payload, server.max_upload_bytes).await?;
    info!("[{}] Received image of {} bytes", request_id, image.len());

    let result = web::block(move || pipeline.run(&image, model.get_ref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    info!(
        "[{}] Predicted {} with confidence {:.3} (raw {:.3}, quality {:.2}, uncertain: {})",
        request_id,
        result.predicted_label,
        result.calibrated_confidence,
        result.raw_confidence,
        result.quality_score,
        result.is_uncertain
    );
    Ok(HttpResponse::Ok().json(prediction_response(&result)))
}

/// Returns the bytes of the first `image` field, skipping any other fields.
async fn read_image_field(mut payload: Multipart, max: usize) -> Result<Vec<u8>, RequestError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some(IMAGE_FIELD) {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let has_filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some_and(|name| !name.is_empty());
        if !has_filename {
            return Err(RequestError::EmptyFilename);
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > max {
                return Err(RequestError::FileTooLarge { max });
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(data);
    }
    Err(RequestError::NoImage)
}

pub fn prediction_response(result: &CalibratedResult) -> PredictionResponse {
    PredictionResponse {
        status: "success".to_string(),
        prediction: result.predicted_label,
        confidence: result.calibrated_confidence,
        raw_confidence: result.raw_confidence,
        quality_score: result.quality_score,
        is_uncertain: result.is_uncertain,
        uncertainty_reason: result.uncertainty_reason,
        warning: result.warning().map(str::to_string),
        all_predictions: result
            .top_k
            .iter()
            .map(|&(label, confidence)| LabelScore { label, confidence })
            .collect(),
        quality_metrics: result.quality_metrics,
        ensemble_size: result.ensemble_size,
    }
}
