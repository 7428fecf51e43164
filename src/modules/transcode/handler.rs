use super::dto::{BundleEntry, MultiQuery, RenditionListResponse};
use super::service::TranscodeService;
use crate::common::error::TranscodeError;
use crate::common::response::{ApiResponse, ApiSuccess, ErrorBody};
use crate::common::upload::{read_upload, split_labels};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Query, State},
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

pub const JOB_STATUS_HEADER: HeaderName = HeaderName::from_static("x-job-status");

/// Transcode to several resolutions at once
/// Every key of the response carries either the encoded file or an error
#[utoipa::path(
    post,
    path = "/transcode/multi",
    params(MultiQuery),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-resolution results", body = std::collections::BTreeMap<String, BundleEntry>),
        (status = 400, description = "Bad Request", body = ErrorBody),
        (status = 500, description = "Internal Server Error", body = ErrorBody)
    ),
    tag = "Transcode"
)]
pub async fn transcode_multi(
    State(state): State<AppState>,
    Query(query): Query<MultiQuery>,
    mut multipart: Multipart,
) -> Result<Response, TranscodeError> {
    let form = read_upload(&mut multipart, state.config.max_upload_bytes).await?;
    let video = form
        .video
        .ok_or_else(|| TranscodeError::validation("No video file provided"))?;

    let mut labels = query
        .resolutions
        .as_deref()
        .map(split_labels)
        .unwrap_or_default();
    labels.extend(form.resolutions);

    let bundle = TranscodeService::transcode_multi(state, video, labels).await?;
    info!(
        "Bundle ready with {} renditions, status {}",
        bundle.entries.len(),
        bundle.status.as_str()
    );

    Ok((
        StatusCode::OK,
        [(JOB_STATUS_HEADER, bundle.status.as_str())],
        Json(bundle.entries),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/renditions",
    responses(
        (status = 200, description = "Supported renditions", body = ApiResponse<RenditionListResponse>)
    ),
    tag = "Transcode"
)]
pub async fn list_renditions(State(state): State<AppState>) -> impl IntoResponse {
    let res = TranscodeService::renditions(&state);
    ApiSuccess(ApiResponse::success(res, "Renditions retrieved successfully"), StatusCode::OK)
}
