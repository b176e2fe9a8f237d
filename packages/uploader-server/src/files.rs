//! File endpoints.
//!
//! Uploads are streamed from the multipart body straight into the record
//! store; downloads are streamed back out of it, with single-range support.
//!
//! - `POST   /api/file`          — Upload (auth)
//! - `GET    /api/file/:id`      — Download
//! - `GET    /api/file/:id/info` — Metadata and size
//! - `PUT    /api/file/:id`      — Rename / change note (auth)
//! - `DELETE /api/file/:id`      — Delete (auth)

use std::io::{self, Read};

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{Buf, Bytes};
use serde::Serialize;
use tokio::sync::mpsc;
use uploader_core::storage::SqliteChunks;
use uploader_core::{ChunkReader, MetadataUpdate, RecordId, RecordMetadata, UploadRecord, Whence};

use crate::auth::Authenticated;
use crate::error::{ApiError, ApiResponse};
use crate::state::AppState;
use crate::validate::{generate_record_id, parse_record_id, validate_filename, validate_note};

/// Multipart chunks buffered between the request and the store writer
const UPLOAD_QUEUE_DEPTH: usize = 8;

/// Bytes read from the store per download body frame
const DOWNLOAD_FRAME_SIZE: usize = 64 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ── Response Types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: RecordId,
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(flatten)]
    pub metadata: RecordMetadata,
    pub size: u64,
}

// ── Upload ───────────────────────────────────────────────────────────────────

/// Blocking [`Read`] over byte chunks arriving on a channel.
///
/// Lets the synchronous chunk writer consume an async request body from a
/// blocking thread. A closed channel reads as end of stream.
pub struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
}

impl ChannelReader {
    pub fn new(rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(bytes)) => self.current = bytes,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = out.len().min(self.current.len());
        out[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

#[derive(Default)]
struct Upload {
    note: String,
    stored: Option<(RecordMetadata, u64)>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Best-effort removal of a half-finished upload
async fn discard(state: &AppState, id: RecordId) {
    let store = state.store.clone();
    let key = id.clone();
    match tokio::task::spawn_blocking(move || store.delete(&key)).await {
        Ok(Ok(())) => tracing::debug!(id = id.as_str(), "Discarded failed upload"),
        Ok(Err(e)) => tracing::warn!(id = id.as_str(), error = %e, "Failed to discard upload"),
        Err(e) => tracing::warn!(id = id.as_str(), error = %e, "Discard task failed"),
    }
}

/// Pump one file field into the store under a fresh id
async fn store_field(
    state: &AppState,
    mut field: Field<'_>,
    note: &str,
) -> Result<(RecordMetadata, u64), ApiError> {
    let filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("File name is required".into()))?;
    validate_filename(&filename)?;
    let content_type = field
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let metadata = RecordMetadata::new(generate_record_id(), filename, note, content_type);

    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(UPLOAD_QUEUE_DEPTH);
    let store = state.store.clone();
    let meta = metadata.clone();
    let task = tokio::task::spawn_blocking(move || store.insert(ChannelReader::new(rx), &meta));

    let mut stream_error = None;
    loop {
        match field.chunk().await {
            Ok(Some(bytes)) => {
                // Receiver gone: the insert already failed and reports why below
                if tx.send(Ok(bytes)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(io::Error::other(e.body_text()))).await;
                stream_error = Some(e);
                break;
            }
        }
    }
    drop(tx);

    let stream_error = stream_error.map(|e| {
        tracing::warn!(id = metadata.id.as_str(), error = %e, "Upload stream failed");
        multipart_error(e)
    });
    settle_upload(state, metadata, task.await, stream_error).await
}

/// Decide the fate of a finished insert.
///
/// Any failure discards the partial record, except a conflict: then the
/// rows under that id belong to another record and are left alone.
async fn settle_upload(
    state: &AppState,
    metadata: RecordMetadata,
    stored: Result<uploader_core::Result<u64>, tokio::task::JoinError>,
    stream_error: Option<ApiError>,
) -> Result<(RecordMetadata, u64), ApiError> {
    let stored = match stored {
        Ok(Err(e)) if e.is_conflict() => {
            tracing::warn!(id = metadata.id.as_str(), "Generated record id already in use");
            return Err(e.into());
        }
        Ok(stored) => stored,
        Err(e) => {
            discard(state, metadata.id.clone()).await;
            return Err(e.into());
        }
    };

    if let Some(e) = stream_error {
        discard(state, metadata.id.clone()).await;
        return Err(e);
    }

    match stored {
        Ok(size) => Ok((metadata, size)),
        Err(e) => {
            discard(state, metadata.id.clone()).await;
            Err(e.into())
        }
    }
}

async fn receive_fields(
    state: &AppState,
    multipart: &mut Multipart,
    upload: &mut Upload,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("note") => {
                let note = field.text().await.map_err(multipart_error)?;
                validate_note(&note)?;
                upload.note = note;
            }
            Some("file") => {
                if upload.stored.is_some() {
                    return Err(ApiError::BadRequest("Only one file per upload".into()));
                }
                upload.stored = Some(store_field(state, field, &upload.note).await?);
            }
            _ => {}
        }
    }
    Ok(())
}

/// POST /api/file
///
/// Multipart body with a `file` field and an optional `note` field.
pub async fn upload_file(
    State(state): State<AppState>,
    _auth: Authenticated,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = Upload::default();

    if let Err(e) = receive_fields(&state, &mut multipart, &mut upload).await {
        if let Some((metadata, _)) = upload.stored {
            discard(&state, metadata.id).await;
        }
        return Err(e);
    }

    let Some((metadata, size)) = upload.stored else {
        return Err(ApiError::BadRequest("No file uploaded".into()));
    };

    if size == 0 {
        discard(&state, metadata.id).await;
        return Err(ApiError::BadRequest("Empty file".into()));
    }

    // The note field came after the file
    if upload.note != metadata.note {
        let store = state.store.clone();
        let id = metadata.id.clone();
        let update = MetadataUpdate {
            filename: metadata.filename.clone(),
            note: upload.note.clone(),
        };
        let result = tokio::task::spawn_blocking(move || store.update_metadata(&id, &update)).await;
        if !matches!(result, Ok(Ok(()))) {
            discard(&state, metadata.id.clone()).await;
        }
        result??;
    }

    tracing::info!(
        id = metadata.id.as_str(),
        filename = metadata.filename.as_str(),
        size,
        "File uploaded"
    );

    Ok((
        StatusCode::CREATED,
        ApiResponse::success(UploadResponse {
            id: metadata.id,
            filename: metadata.filename,
            size,
        }),
    )
        .into_response())
}

// ── Download ─────────────────────────────────────────────────────────────────

/// A single `Range: bytes=` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteRange {
    /// `start-` or `start-end` (inclusive)
    From { start: u64, end: Option<u64> },
    /// `-n`: the last n bytes
    Suffix(u64),
}

/// Parse a Range header. Anything other than one well-formed byte range
/// is ignored and the whole file is served.
fn parse_range(value: &str) -> Option<ByteRange> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(ByteRange::Suffix);
    }

    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    if end.is_some_and(|end| end < start) {
        return None;
    }
    Some(ByteRange::From { start, end })
}

/// Inclusive byte bounds of `range` within a file of `length` bytes
fn resolve_range(range: ByteRange, length: u64) -> Result<(u64, u64), ApiError> {
    let unsatisfiable = ApiError::RangeNotSatisfiable { length };
    match range {
        ByteRange::From { start, end } => {
            if start >= length {
                return Err(unsatisfiable);
            }
            let end = end.map_or(length - 1, |end| end.min(length - 1));
            Ok((start, end))
        }
        ByteRange::Suffix(n) => {
            if n == 0 || length == 0 {
                return Err(unsatisfiable);
            }
            Ok((length - n.min(length), length - 1))
        }
    }
}

/// Stream `remaining` bytes from the reader's current position
fn body_stream(reader: ChunkReader<SqliteChunks>, remaining: u64) -> Body {
    let stream = futures::stream::try_unfold((reader, remaining), |(reader, remaining)| async move {
        if remaining == 0 {
            return Ok::<_, io::Error>(None);
        }
        let want = remaining.min(DOWNLOAD_FRAME_SIZE as u64) as usize;

        let (reader, frame) = tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut frame = vec![0u8; want];
            let n = reader.read(&mut frame)?;
            frame.truncate(n);
            Ok::<_, uploader_core::Error>((reader, frame))
        })
        .await
        .map_err(io::Error::other)??;

        if frame.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record {} ended {} bytes early", reader.id(), remaining),
            ));
        }

        let left = remaining - frame.len() as u64;
        Ok(Some((Bytes::from(frame), (reader, left))))
    });
    Body::from_stream(stream)
}

fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let value = format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

/// GET /api/file/:id
pub async fn download_file(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = parse_record_id(&raw_id)?;
    let store = state.store.clone();
    let UploadRecord {
        metadata,
        mut content,
    } = tokio::task::spawn_blocking(move || store.get(&id)).await??;

    let length = content.len();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&metadata.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
        )
        .header(header::CONTENT_DISPOSITION, content_disposition(&metadata.filename));

    let body_length = match range {
        Some(range) => {
            let (start, end) = resolve_range(range, length)?;
            // Positioning is lazy; nothing is fetched until the body is polled
            match range {
                ByteRange::Suffix(_) => content.seek_to((length - start) as i64, Whence::End)?,
                ByteRange::From { .. } => content.seek_to(start as i64, Whence::Start)?,
            };
            builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, length));
            end - start + 1
        }
        None => {
            builder = builder.status(StatusCode::OK);
            length
        }
    };

    tracing::debug!(id = metadata.id.as_str(), length, body_length, "Serving file");

    builder
        .header(header::CONTENT_LENGTH, body_length)
        .body(body_stream(content, body_length))
        .map_err(|e| ApiError::Task(e.to_string()))
}

// ── Metadata ─────────────────────────────────────────────────────────────────

/// GET /api/file/:id/info
pub async fn file_info(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<FileInfo>>, ApiError> {
    let id = parse_record_id(&raw_id)?;
    let store = state.store.clone();
    let info = tokio::task::spawn_blocking(move || {
        let metadata = store.get_metadata(&id)?;
        let size = store.content_length(&id)?;
        Ok::<_, uploader_core::Error>(FileInfo { metadata, size })
    })
    .await??;

    Ok(ApiResponse::success(info))
}

/// PUT /api/file/:id
///
/// JSON body: `{"filename": "...", "note": "..."}`. Both are replaced.
pub async fn update_file(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(raw_id): Path<String>,
    body: Result<Json<MetadataUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<RecordMetadata>>, ApiError> {
    let id = parse_record_id(&raw_id)?;
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_filename(&update.filename)?;
    validate_note(&update.note)?;

    let store = state.store.clone();
    let metadata = tokio::task::spawn_blocking(move || {
        store.update_metadata(&id, &update)?;
        store.get_metadata(&id)
    })
    .await??;

    Ok(ApiResponse::success(metadata))
}

/// DELETE /api/file/:id
pub async fn delete_file(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let id = parse_record_id(&raw_id)?;
    let store = state.store.clone();
    let key = id.clone();
    tokio::task::spawn_blocking(move || store.delete(&key)).await??;

    Ok(ApiResponse::success(serde_json::json!({ "id": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use crate::test_support::{session_cookie, test_state};
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    const BOUNDARY: &str = "uploaderTestBoundary";
    const CONTENT: &str = "hello chunked world";

    enum Part<'a> {
        File { filename: &'a str, content: &'a str },
        Note(&'a str),
    }

    fn multipart_body(parts: &[Part<'_>]) -> String {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match part {
                Part::File { filename, content } => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                     Content-Type: text/plain\r\n\r\n{}\r\n",
                    filename, content
                )),
                Part::Note(note) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"note\"\r\n\r\n{}\r\n",
                    note
                )),
            }
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    fn upload_request(parts: &[Part<'_>], cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/file")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(multipart_body(parts))).unwrap()
    }

    fn get_request(uri: &str, range: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(resp).await).unwrap()
    }

    /// Upload `CONTENT` and return the new id
    async fn upload(app: &Router, cookie: &str, parts: &[Part<'_>]) -> String {
        let resp = app
            .clone()
            .oneshot(upload_request(parts, Some(cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        body["data"]["id"].as_str().unwrap().to_string()
    }

    fn setup() -> (Router, String) {
        let state = test_state();
        let cookie = session_cookie(&state);
        (router(state), cookie)
    }

    // ── ChannelReader ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_channel_reader_reassembles_stream() {
        let (tx, rx) = mpsc::channel(4);
        let reader = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            ChannelReader::new(rx).read_to_end(&mut out).map(|_| out)
        });
        for part in ["ab", "", "cde", "f"] {
            tx.send(Ok(Bytes::from(part))).await.unwrap();
        }
        drop(tx);
        assert_eq!(reader.await.unwrap().unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_channel_reader_surfaces_errors() {
        let (tx, rx) = mpsc::channel(4);
        let reader = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            ChannelReader::new(rx).read_to_end(&mut out)
        });
        tx.send(Ok(Bytes::from_static(b"partial"))).await.unwrap();
        tx.send(Err(io::Error::other("client went away"))).await.unwrap();
        let err = reader.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "client went away");
    }

    // ── Ranges ───────────────────────────────────────────────────────────

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse_range("bytes=0-99"),
            Some(ByteRange::From { start: 0, end: Some(99) })
        );
        assert_eq!(
            parse_range("bytes=100-"),
            Some(ByteRange::From { start: 100, end: None })
        );
        assert_eq!(parse_range("bytes=-500"), Some(ByteRange::Suffix(500)));
        assert_eq!(parse_range("bytes=0-1,5-6"), None);
        assert_eq!(parse_range("bytes=9-3"), None);
        assert_eq!(parse_range("items=0-1"), None);
        assert_eq!(parse_range("bytes=abc"), None);
    }

    #[test]
    fn test_resolve_range() {
        let from = |start, end| ByteRange::From { start, end };
        assert_eq!(resolve_range(from(0, Some(9)), 19).unwrap(), (0, 9));
        assert_eq!(resolve_range(from(5, Some(500)), 19).unwrap(), (5, 18));
        assert_eq!(resolve_range(from(18, None), 19).unwrap(), (18, 18));
        assert_eq!(resolve_range(ByteRange::Suffix(5), 19).unwrap(), (14, 18));
        assert_eq!(resolve_range(ByteRange::Suffix(50), 19).unwrap(), (0, 18));

        assert!(resolve_range(from(19, None), 19).is_err());
        assert!(resolve_range(ByteRange::Suffix(0), 19).is_err());
        assert!(resolve_range(ByteRange::Suffix(3), 0).is_err());
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("report.pdf"),
            "inline; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        assert_eq!(
            content_disposition("résumé 1.txt"),
            "inline; filename=\"r_sum_ 1.txt\"; filename*=UTF-8''r%C3%A9sum%C3%A9%201.txt"
        );
    }

    // ── Endpoints ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_upload_requires_session() {
        let (app, _) = setup();
        let parts = [Part::File { filename: "a.txt", content: CONTENT }];

        let resp = app.clone().oneshot(upload_request(&parts, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(upload_request(&parts, Some("authSecret=forged")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let (app, cookie) = setup();
        let resp = app
            .clone()
            .oneshot(upload_request(
                &[Part::Note("first"), Part::File { filename: "hello.txt", content: CONTENT }],
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["size"], CONTENT.len());
        assert_eq!(body["data"]["filename"], "hello.txt");
        let id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 10);

        let resp = app
            .clone()
            .oneshot(get_request(&format!("/api/file/{}", id), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "19");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(resp.headers()[header::ACCEPT_RANGES], "bytes");
        assert!(resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("hello.txt"));
        assert_eq!(body_bytes(resp).await, CONTENT.as_bytes());

        let resp = app
            .oneshot(get_request(&format!("/api/file/{}/info", id), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let info = json_body(resp).await;
        assert_eq!(info["data"]["id"], id.as_str());
        assert_eq!(info["data"]["filename"], "hello.txt");
        assert_eq!(info["data"]["note"], "first");
        assert_eq!(info["data"]["contentType"], "text/plain");
        assert_eq!(info["data"]["size"], 19);
        assert!(info["data"]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_note_after_file_is_applied() {
        let (app, cookie) = setup();
        let id = upload(
            &app,
            &cookie,
            &[Part::File { filename: "late.txt", content: CONTENT }, Part::Note("late note")],
        )
        .await;

        let resp = app
            .oneshot(get_request(&format!("/api/file/{}/info", id), None))
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["data"]["note"], "late note");
    }

    #[tokio::test]
    async fn test_range_downloads() {
        let (app, cookie) = setup();
        let id = upload(&app, &cookie, &[Part::File { filename: "r.txt", content: CONTENT }]).await;
        let uri = format!("/api/file/{}", id);

        let cases = [
            ("bytes=6-12", "chunked", "bytes 6-12/19"),
            ("bytes=-5", "world", "bytes 14-18/19"),
            ("bytes=15-", "orld", "bytes 15-18/19"),
            ("bytes=0-0", "h", "bytes 0-0/19"),
        ];
        for (range, expected, content_range) in cases {
            let resp = app.clone().oneshot(get_request(&uri, Some(range))).await.unwrap();
            assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT, "{range}");
            assert_eq!(resp.headers()[header::CONTENT_RANGE], content_range);
            assert_eq!(
                resp.headers()[header::CONTENT_LENGTH],
                expected.len().to_string().as_str()
            );
            assert_eq!(body_bytes(resp).await, expected.as_bytes(), "{range}");
        }

        let resp = app.clone().oneshot(get_request(&uri, Some("bytes=50-"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes */19");

        // Multiple ranges fall back to the whole file
        let resp = app.oneshot(get_request(&uri, Some("bytes=0-1,4-5"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_bytes(resp).await, CONTENT.as_bytes());
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let (app, cookie) = setup();

        let cases: [&[Part<'_>]; 4] = [
            &[Part::Note("no file here")],
            &[Part::File { filename: "empty.txt", content: "" }],
            &[Part::File { filename: "bad|name.txt", content: CONTENT }],
            &[Part::Note("<script>alert(1)</script>"), Part::File { filename: "a.txt", content: CONTENT }],
        ];
        for parts in cases {
            let resp = app
                .clone()
                .oneshot(upload_request(parts, Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(resp).await["ok"], false);
        }

        let resp = app
            .oneshot(upload_request(
                &[
                    Part::File { filename: "a.txt", content: CONTENT },
                    Part::File { filename: "b.txt", content: CONTENT },
                ],
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_uploads_leave_no_rows() {
        let state = test_state();
        let cookie = session_cookie(&state);
        let app = router(state.clone());

        let resp = app
            .oneshot(upload_request(
                &[
                    Part::File { filename: "a.txt", content: CONTENT },
                    Part::Note("undefined"),
                ],
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.purge_orphaned_chunks().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_id_conflict_keeps_existing_record() {
        let state = test_state();
        let existing = RecordMetadata::new("abcdefghij".into(), "mine.txt", "", "text/plain");
        state.store.insert(&b"original"[..], &existing).unwrap();

        let incoming = RecordMetadata::new("abcdefghij".into(), "theirs.txt", "", "text/plain");
        let store = state.store.clone();
        let meta = incoming.clone();
        let stored = tokio::task::spawn_blocking(move || store.insert(&b"injected"[..], &meta)).await;

        let err = settle_upload(
            &state,
            incoming,
            stored,
            Some(ApiError::BadRequest("stream reset".into())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let mut record = state.store.get(&"abcdefghij".into()).unwrap();
        let mut content = Vec::new();
        record.content.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"original");
        assert_eq!(record.metadata.filename, "mine.txt");
    }

    #[tokio::test]
    async fn test_failed_stream_discards_partial_record() {
        let state = test_state();
        let incoming = RecordMetadata::new("abcdefghij".into(), "part.txt", "", "text/plain");
        let store = state.store.clone();
        let meta = incoming.clone();
        let stored = tokio::task::spawn_blocking(move || store.insert(&b"partial data"[..], &meta)).await;

        let err = settle_upload(
            &state,
            incoming,
            stored,
            Some(ApiError::BadRequest("stream reset".into())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(state
            .store
            .get_metadata(&"abcdefghij".into())
            .unwrap_err()
            .is_not_found());
        assert_eq!(state.store.content_length(&"abcdefghij".into()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_download_errors() {
        let (app, _) = setup();

        let resp = app.clone().oneshot(get_request("/api/file/abcdefghij", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"], "File not found");

        let resp = app.clone().oneshot(get_request("/api/file/short", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.oneshot(get_request("/api/file/abcdefghij/info", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    fn put_request(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("PUT")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let (app, cookie) = setup();
        let id = upload(&app, &cookie, &[Part::File { filename: "old.txt", content: CONTENT }]).await;
        let uri = format!("/api/file/{}", id);

        let resp = app
            .clone()
            .oneshot(put_request(&uri, r#"{"filename":"new.txt","note":"renamed"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(put_request(&uri, r#"{"filename":"new.txt","note":"renamed"}"#, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["filename"], "new.txt");
        assert_eq!(body["data"]["note"], "renamed");

        let resp = app
            .clone()
            .oneshot(put_request(&uri, r#"{"filename":"new.txt","note":"null"}"#, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(put_request(&uri, r#"{"filename":"new.txt"}"#, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(put_request(
                "/api/file/abcdefghij",
                r#"{"filename":"x.txt","note":""}"#,
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // Content is untouched by a rename
        let resp = app.oneshot(get_request(&uri, None)).await.unwrap();
        assert_eq!(body_bytes(resp).await, CONTENT.as_bytes());
    }

    #[tokio::test]
    async fn test_delete() {
        let (app, cookie) = setup();
        let id = upload(&app, &cookie, &[Part::File { filename: "gone.txt", content: CONTENT }]).await;
        let uri = format!("/api/file/{}", id);

        let delete = |cookie: Option<&str>| {
            let mut builder = Request::builder().method("DELETE").uri(&uri);
            if let Some(cookie) = cookie {
                builder = builder.header(header::COOKIE, cookie);
            }
            builder.body(Body::empty()).unwrap()
        };

        let resp = app.clone().oneshot(delete(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(delete(Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["data"]["id"], id.as_str());

        let resp = app.clone().oneshot(get_request(&uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // Deleting again is not an error
        let resp = app.oneshot(delete(Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
