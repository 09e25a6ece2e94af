//! HTTP handler functions for the survey API.

use std::collections::BTreeSet;

use actix_web::http::header;
use actix_web::{HttpResponse, web};
use survey_map_server_models::{
    ApiCategory, ApiDeleteResponse, ApiError, ApiHealth, ApiMapView, ApiRecord,
    ApiSubmitResponse, DeleteRecordsRequest,
};
use survey_map_store::StoreError;
use survey_map_survey::export::EXPORT_FILE_NAME;
use survey_map_survey::{SubmitRequest, SurveyError};
use survey_map_survey_models::RiskFactor;

use crate::AppState;

/// Maps a survey failure to a response.
///
/// Validation problems answer 422 with the itemized messages; bad row
/// numbers answer 400; any other store failure answers 502 with the
/// underlying message.
fn error_response(context: &str, e: &SurveyError) -> HttpResponse {
    match e {
        SurveyError::Validation(errors) => HttpResponse::UnprocessableEntity().json(ApiError {
            error: "Invalid submission".to_string(),
            messages: errors.messages().to_vec(),
        }),
        SurveyError::Store(
            store @ (StoreError::InvalidRow { .. } | StoreError::InvalidColumn { .. }),
        ) => HttpResponse::BadRequest().json(ApiError::new(format!("{context}: {store}"))),
        SurveyError::Store(store) => {
            log::error!("{context}: {store}");
            HttpResponse::BadGateway().json(ApiError::new(format!("{context}: {store}")))
        }
        SurveyError::Csv(_) | SurveyError::Io(_) | SurveyError::Config { .. } => {
            log::error!("{context}: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(format!("{context}: {e}")))
        }
    }
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/categories`
///
/// Returns the risk-factor catalog in catalog order.
pub async fn categories() -> HttpResponse {
    let catalog: Vec<ApiCategory> = RiskFactor::all()
        .iter()
        .copied()
        .map(ApiCategory::from)
        .collect();
    HttpResponse::Ok().json(catalog)
}

/// `GET /api/records`
pub async fn list_records(state: web::Data<AppState>) -> HttpResponse {
    match state.survey.fetch_all().await {
        Ok(records) => {
            let api: Vec<ApiRecord> = records.iter().map(ApiRecord::from).collect();
            HttpResponse::Ok().json(api)
        }
        Err(e) => error_response("Failed to read records", &e),
    }
}

/// `POST /api/records`
pub async fn submit_record(
    state: web::Data<AppState>,
    body: web::Json<SubmitRequest>,
) -> HttpResponse {
    match state.survey.submit(&body).await {
        Ok(outcome) => HttpResponse::Created().json(ApiSubmitResponse {
            row_number: outcome.row_number,
            styled: outcome.styled,
        }),
        Err(e) => error_response("Failed to save record", &e),
    }
}

/// `DELETE /api/records`
///
/// Deletes the rows listed in the body in one store call.
pub async fn delete_records(
    state: web::Data<AppState>,
    body: web::Json<DeleteRecordsRequest>,
) -> HttpResponse {
    let rows: BTreeSet<u32> = body.rows.iter().copied().collect();
    match state.survey.delete(&rows).await {
        Ok(deleted) => HttpResponse::Ok().json(ApiDeleteResponse { deleted }),
        Err(e) => error_response("Failed to delete records", &e),
    }
}

/// `DELETE /api/records/all`
pub async fn clear_records(state: web::Data<AppState>) -> HttpResponse {
    match state.survey.clear_all().await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response("Failed to clear records", &e),
    }
}

/// `GET /api/records.csv`
pub async fn export_csv(state: web::Data<AppState>) -> HttpResponse {
    match state.survey.export_csv().await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
            ))
            .body(bytes),
        Err(e) => error_response("Failed to export records", &e),
    }
}

/// `GET /api/map`
///
/// Returns markers (one per category, jittered for multi-category
/// records), the legend and the initial viewport.
pub async fn map_view(state: web::Data<AppState>) -> HttpResponse {
    match state.survey.map_view().await {
        Ok(view) => HttpResponse::Ok().json(ApiMapView {
            center: [view.center_latitude, view.center_longitude],
            zoom: view.zoom,
            markers: view.markers,
            legend: view.legend,
            unplaced: view.unplaced,
        }),
        Err(e) => error_response("Failed to build map", &e),
    }
}
