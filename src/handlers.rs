use crate::{
    card::PostCard,
    errors::AppError,
    feed::UploadForm,
    models::{Comment, MediaFile, MediaType, Meme},
    AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

/// Comment visibility as the viewer currently sees it.
#[derive(Deserialize, Default)]
pub struct ToggleQuery {
    #[serde(default)]
    pub open: bool,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Serialize)]
pub struct LikeResponse {
    pub likes_count: u64,
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub open: bool,
    pub comments: Vec<Comment>,
}

#[derive(Serialize)]
pub struct ShareResponse {
    pub link: String,
}

async fn card(state: &AppState, id_str: &str) -> Result<Arc<PostCard>, AppError> {
    let meme_id = Uuid::parse_str(id_str)?;
    state
        .board
        .card(meme_id)
        .await
        .ok_or(AppError::MemeNotFound(meme_id))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Current feed as last loaded.
pub async fn list_memes(State(state): State<Arc<AppState>>) -> Json<Vec<Meme>> {
    Json(state.board.feed().memes().await)
}

pub async fn refresh_memes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Meme>>, AppError> {
    let feed = state.board.feed();
    feed.load_feed().await?;
    Ok(Json(feed.memes().await))
}

/// Multipart fields: `title`, `media_url`, `media_type` and the file part `file`.
pub async fn upload_meme(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "title" => form.title = field.text().await.map_err(|e| AppError::InvalidInput(format!("Failed to read title: {}", e)))?,
            "media_url" => form.media_url = field.text().await.map_err(|e| AppError::InvalidInput(format!("Failed to read media_url: {}", e)))?,
            "media_type" => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    form.media_type = MediaType::parse(&raw)
                        .ok_or_else(|| AppError::InvalidInput(format!("Unknown media_type: {}", raw)))?;
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(|m| m.to_string());
                let data = field.bytes().await?.to_vec();
                if !data.is_empty() {
                    form.file = Some(MediaFile::new(file_name, content_type, data));
                }
            }
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    let meme = state.board.feed_session().submit_upload(form).await?;
    Ok((StatusCode::CREATED, Json(meme)))
}

pub async fn clear_memes(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordRequest>,
) -> Result<Json<ClearResponse>, AppError> {
    let removed = state.board.feed_session().clear_all(&payload.password).await?;
    Ok(Json(ClearResponse { removed }))
}

pub async fn delete_meme(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(payload): Json<PasswordRequest>,
) -> Result<StatusCode, AppError> {
    let card = card(&state, &id_str).await?;
    card.request_delete(&payload.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_meme(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<LikeResponse>, AppError> {
    let card = card(&state, &id_str).await?;
    let likes_count = card.like().await?;
    Ok(Json(LikeResponse { likes_count }))
}

/// Flips the visibility the viewer reports in `?open=`; expanding returns the comments.
pub async fn toggle_comments(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<ToggleResponse>, AppError> {
    let card = card(&state, &id_str).await?;
    card.set_comments_open(query.open);
    let open = card.toggle_comments().await?;
    Ok(Json(ToggleResponse {
        open,
        comments: card.comments().await,
    }))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let card = card(&state, &id_str).await?;
    Ok(Json(card.load_comments().await?))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let card = card(&state, &id_str).await?;
    match card.add_comment(&payload.content).await? {
        Some(comment) => Ok((StatusCode::CREATED, Json(comment))),
        None => Err(AppError::InvalidInput("comment cannot be empty".to_string())),
    }
}

pub async fn share_meme(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<ShareResponse>, AppError> {
    let card = card(&state, &id_str).await?;
    Ok(Json(ShareResponse {
        link: card.copy_share_link(),
    }))
}

/// Handler for GET /media/{*key}
pub async fn get_media(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(object_key = %key, "Fetching media file via handler");

    let object = state.backend.storage.download(&key).await?;
    let content_type = object
        .content_type
        .or_else(|| mime_guess::from_path(&key).first_raw().map(|s| s.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(object.data))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build media response: {}", e)))
}
