use crate::common::error::{TranscodeError, TranscodeResult};
use axum::{
    body::Bytes,
    extract::multipart::{Field, Multipart, MultipartError},
    http::StatusCode,
};
use bytes::BytesMut;
use tracing::{debug, error};

/// Fields the transcode endpoints accept.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub video: Option<Bytes>,
    pub resolutions: Vec<String>,
}

/// Accumulates an upload in memory and enforces the size cap chunk by chunk.
pub struct UploadBuffer {
    buffer: BytesMut,
    max_bytes: usize,
}

impl UploadBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_bytes,
        }
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> TranscodeResult<()> {
        if self.buffer.len() + chunk.len() > self.max_bytes {
            return Err(too_large(self.max_bytes));
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }
}

pub async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> TranscodeResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "video" => {
                let bytes = read_video_field(field, max_bytes).await?;
                debug!("Received {} byte video upload", bytes.len());
                form.video = Some(bytes);
            }
            "resolution" | "resolutions" => {
                let text = field.text().await.map_err(|e| multipart_error(e, max_bytes))?;
                form.resolutions.extend(split_labels(&text));
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_video_field(mut field: Field<'_>, max_bytes: usize) -> TranscodeResult<Bytes> {
    let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();

    // Validate request mime
    if !is_video(&content_type) {
        return Err(TranscodeError::validation(
            "Invalid content type: only video/* allowed",
        ));
    }

    let mut buffer = UploadBuffer::new(max_bytes);

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => buffer.write_chunk(&chunk)?,
            Ok(None) => break,
            Err(e) => {
                error!("Stream error: {}", e);
                return Err(multipart_error(e, max_bytes));
            }
        }
    }

    Ok(buffer.finish())
}

pub fn is_video(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::VIDEO)
        .unwrap_or(false)
}

pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> TranscodeError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        TranscodeError::validation(format!("Invalid upload: {}", e.body_text()))
    }
}

fn too_large(max_bytes: usize) -> TranscodeError {
    TranscodeError::validation(format!("File too large (max {}MB)", max_bytes / (1024 * 1024)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_enforces_limit() {
        let mut buffer = UploadBuffer::new(8);
        buffer.write_chunk(b"1234").unwrap();
        buffer.write_chunk(b"5678").unwrap();
        let err = buffer.write_chunk(b"9").unwrap_err();
        assert!(matches!(err, TranscodeError::Validation(ref m) if m.starts_with("File too large")));
    }

    #[test]
    fn only_video_content_is_accepted() {
        assert!(is_video("video/mp4"));
        assert!(is_video("video/quicktime"));
        assert!(!is_video("image/png"));
        assert!(!is_video("application/octet-stream"));
        assert!(!is_video("not a mime"));
    }

    #[test]
    fn labels_split_on_commas() {
        assert_eq!(split_labels("720p, 1080p,,bogus "), ["720p", "1080p", "bogus"]);
        assert!(split_labels(" ").is_empty());
    }
}
