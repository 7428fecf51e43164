use super::dto::{SingleQuery, MP4_CONTENT_TYPE};
use super::service::{TranscodeService, DEFAULT_RESOLUTION};
use crate::common::error::TranscodeError;
use crate::common::response::ErrorBody;
use crate::common::upload::read_upload;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use tracing::info;

/// Transcode to a single resolution
/// The MP4 is streamed from scratch storage and deleted once sent
#[utoipa::path(
    post,
    path = "/transcode",
    params(SingleQuery),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Transcoded MP4 stream"),
        (status = 400, description = "Bad Request", body = ErrorBody),
        (status = 500, description = "Transcoding failed", body = ErrorBody)
    ),
    tag = "Transcode"
)]
pub async fn transcode_single(
    State(state): State<AppState>,
    Query(query): Query<SingleQuery>,
    mut multipart: Multipart,
) -> Result<Response, TranscodeError> {
    let form = read_upload(&mut multipart, state.config.max_upload_bytes).await?;
    let video = form
        .video
        .ok_or_else(|| TranscodeError::validation("No video file provided"))?;

    let label = query
        .resolution
        .or_else(|| form.resolutions.into_iter().next())
        .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string());

    let single = TranscodeService::transcode_single(state, video, &label).await?;
    info!("Transcoding completed for {}, streaming {} bytes", single.label, single.size);

    let disposition = format!("inline; filename=\"transcoded-{}.mp4\"", single.label);
    let size = single.size;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MP4_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(single.into_stream()))
        .map_err(|e| TranscodeError::Assembly(e.to_string()))
}
