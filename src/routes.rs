//! HTTP surface: an info page, a health check, a chapter preview and the
//! conversion endpoint that streams back the finished book.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use http::{HeaderMap, HeaderName, HeaderValue, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::error::{ConvertError, Result};
use crate::models::{ChapterTemplate, ConversionRequest, CoverImage};
use crate::services::chapterizer;
use crate::services::decoder;
use crate::services::epub::{EpubBuilder, MIMETYPE};
use crate::utils::attachment_disposition;

const CHAPTER_COUNT_HEADER: HeaderName = HeaderName::from_static("x-chapter-count");
const SOURCE_ENCODING_HEADER: HeaderName = HeaderName::from_static("x-source-encoding");
const DECODE_WARNING_HEADER: HeaderName = HeaderName::from_static("x-decode-warning");

/// Number of prefix/suffix pairs accepted from the form (`prefix1`, `suffix1`, ...).
const TEMPLATE_SLOTS: usize = 2;

#[derive(Clone)]
pub struct AppState {
    builder: Arc<EpubBuilder>,
}

impl AppState {
    pub fn new(builder: EpubBuilder) -> Self {
        Self {
            builder: Arc::new(builder),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/preview", post(preview))
        .route("/convert", post(convert))
        .route("/upload", post(convert))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

async fn index() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>TXT to EPUB</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .info-box { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
    </style>
</head>
<body>
    <h1>TXT to EPUB</h1>

    <div class="info-box">
        <h2>Service Information</h2>
        <p>Upload a plain-text novel and get back an EPUB with one entry per chapter.</p>
        <p>UTF-8, GBK/GB18030, Big5 and Shift_JIS sources are detected automatically.</p>
    </div>

    <h2>Available Endpoints:</h2>
    <div class="endpoint">GET / - This information page</div>
    <div class="endpoint">GET /health - Health check</div>
    <div class="endpoint">POST /preview - List the chapters that would be created</div>
    <div class="endpoint">POST /convert - Convert a text file to EPUB (alias: POST /upload)</div>

    <h2>Form Fields:</h2>
    <p><code>title</code>, <code>author</code> and <code>text_file</code> are required.
    Optional: <code>cover</code> (image file) or <code>cover_data_url</code>,
    <code>encoding</code>, and custom heading patterns
    <code>prefix1</code>/<code>suffix1</code>, <code>prefix2</code>/<code>suffix2</code>.</p>
</body>
</html>
"#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn preview(mut multipart: Multipart) -> Result<Json<serde_json::Value>> {
    let request = read_form(&mut multipart).await?;
    if request.source.is_empty() {
        return Err(ConvertError::Validation("source text file is required".into()));
    }

    let (decoded, result) = tokio::task::spawn_blocking(move || {
        let decoded = decoder::decode(&request.source, request.encoding_hint.as_deref());
        let result = chapterizer::process_text(&decoded.text, &request.templates);
        (decoded, result)
    })
    .await?;
    debug!(
        strategy = result.strategy,
        chapters = result.chapters.len(),
        "preview generated"
    );

    let chapters: Vec<serde_json::Value> = result
        .chapters
        .iter()
        .map(|chapter| {
            serde_json::json!({
                "order": chapter.order,
                "title": chapter.title,
                "kind": chapter.kind,
                "length": chapter.body.chars().count(),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "encoding": decoded.encoding,
        "garbled": decoded.error.is_some(),
        "warning": decoded.error.map(|e| e.to_string()),
        "strategy": result.strategy,
        "chapter_count": chapters.len(),
        "chapters": chapters,
    })))
}

async fn convert(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response> {
    let request = read_form(&mut multipart).await?;
    info!(
        title = request.title.trim(),
        bytes = request.source.len(),
        "conversion requested"
    );

    let disposition = attachment_disposition(&request.title, &request.author);

    // Decoding, detection and deflate are CPU-bound; keep them off the runtime.
    let builder = Arc::clone(&state.builder);
    let conversion =
        tokio::task::spawn_blocking(move || chapterizer::convert(&request, &builder)).await??;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(MIMETYPE));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"book.epub\"")),
    );
    headers.insert(CHAPTER_COUNT_HEADER, HeaderValue::from(conversion.chapter_count));
    headers.insert(
        SOURCE_ENCODING_HEADER,
        HeaderValue::from_static(conversion.encoding),
    );
    if let Some(warning) = &conversion.warning {
        if let Ok(value) = HeaderValue::from_str(&warning.to_string()) {
            headers.insert(DECODE_WARNING_HEADER, value);
        }
    }

    Ok((headers, conversion.book.data).into_response())
}

/// Collect the multipart form into a request. Unknown fields are skipped;
/// required-field checks are left to [`ConversionRequest::validate`].
async fn read_form(multipart: &mut Multipart) -> Result<ConversionRequest> {
    let mut request = ConversionRequest::default();
    let mut prefixes: [String; TEMPLATE_SLOTS] = Default::default();
    let mut suffixes: [String; TEMPLATE_SLOTS] = Default::default();
    let mut cover_file = None;
    let mut cover_url = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => request.title = field.text().await.map_err(invalid_form)?,
            "author" => request.author = field.text().await.map_err(invalid_form)?,
            "text_file" => request.source = field.bytes().await.map_err(invalid_form)?.to_vec(),
            "encoding" => {
                let hint = field.text().await.map_err(invalid_form)?;
                request.encoding_hint = Some(hint).filter(|h| !h.trim().is_empty());
            }
            "cover" => {
                let data = field.bytes().await.map_err(invalid_form)?;
                if !data.is_empty() {
                    cover_file = Some(CoverImage::Bytes(data.to_vec()));
                }
            }
            "cover_data_url" => {
                let url = field.text().await.map_err(invalid_form)?;
                if !url.trim().is_empty() {
                    cover_url = Some(CoverImage::DataUrl(url));
                }
            }
            other => match template_slot(other) {
                Some((true, slot)) => prefixes[slot] = field.text().await.map_err(invalid_form)?,
                Some((false, slot)) => suffixes[slot] = field.text().await.map_err(invalid_form)?,
                None => debug!("ignoring form field {:?}", other),
            },
        }
    }

    request.cover = cover_file.or(cover_url);
    request.templates = prefixes
        .into_iter()
        .zip(suffixes)
        .map(|(prefix, suffix)| ChapterTemplate::new(prefix, suffix))
        .filter(|template| !template.is_empty())
        .collect();

    Ok(request)
}

/// `prefix2` -> `Some((true, 1))`, `suffix1` -> `Some((false, 0))`.
fn template_slot(name: &str) -> Option<(bool, usize)> {
    let (is_prefix, index) = if let Some(index) = name.strip_prefix("prefix") {
        (true, index)
    } else {
        (false, name.strip_prefix("suffix")?)
    };
    let slot = index.parse::<usize>().ok()?.checked_sub(1)?;
    (slot < TEMPLATE_SLOTS).then_some((is_prefix, slot))
}

fn invalid_form(err: axum::extract::multipart::MultipartError) -> ConvertError {
    ConvertError::Validation(format!("invalid form data: {}", err))
}
