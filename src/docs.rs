use crate::common::response::ErrorBody;
use crate::modules::transcode::dto::{BundleEntry, RenditionListResponse};
use crate::modules::transcode::model::{JobStatus, OutcomeStatus, RenditionProfile};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::transcode::stream_handler::transcode_single,
        crate::modules::transcode::handler::transcode_multi,
        crate::modules::transcode::handler::list_renditions,
    ),
    components(
        schemas(
            ErrorBody,
            BundleEntry,
            RenditionListResponse,
            RenditionProfile,
            JobStatus,
            OutcomeStatus,
        )
    ),
    tags(
        (name = "Transcode", description = "Video rendition transcoding")
    )
)]
pub struct ApiDoc;
