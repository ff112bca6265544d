use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::auth::{self, Auth};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::mail::Mailer;
use crate::models::*;
use crate::render::render;
use crate::repo::{Repo, RepoError};
use crate::storage::{extension_allowed, sanitize_filename, FileStore, FileStoreError};
use crate::summary::{Summarizer, SummaryError};
use crate::tokens;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/forgot_password").route(web::post().to(forgot_password)))
            .service(
                web::resource("/reset_password/{token}").route(web::post().to(reset_password)),
            )
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{slug}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(
                web::resource("/posts/{slug}/summary").route(web::get().to(generate_summary)),
            )
            .service(web::resource("/upload_image").route(web::post().to(upload_image))),
    );
    // Public reads live outside the /api scope: no bearer token needed.
    cfg.route("/", web::get().to(index));
    cfg.route("/post/{slug}", web::get().to(view_post));
    cfg.route("/post/{slug}/summary", web::get().to(generate_summary));
    cfg.route("/uploads/{filename}", web::get().to(serve_upload));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub files: Arc<dyn FileStore>,
    pub mailer: Arc<Mailer>,
    pub summarizer: Arc<Summarizer>,
    pub config: Arc<AppConfig>,
}

// ---------------- Request / response bodies -----------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct UserSummary {
    pub id: Id,
    pub username: String,
    pub email: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub hero_banner_url: Option<String>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct UpdatePostRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub hero_banner_url: Option<String>,
    #[serde(default)]
    pub remove_hero_banner: bool,
}

/// The post as API clients see it: raw content plus the rendered HTML, with
/// the historical `timestamp` / `last_updated` field names kept for clients.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct PostResponse {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub parsed_content: String,
    pub tags: Vec<String>,
    pub hero_banner_url: Option<String>,
    pub author_id: Id,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(p: Post) -> Self {
        let parsed_content = render(&p.content);
        Self {
            id: p.id,
            title: p.title,
            slug: p.slug,
            content: p.content,
            parsed_content,
            tags: p.tags,
            hero_banner_url: p.hero_banner_url,
            author_id: p.author_id,
            author: p.author_username,
            timestamp: p.created_at,
            last_updated: p.updated_at,
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

// ---------------- Validation ---------------------------------------

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters long".into(),
        ));
    }
    Ok(())
}

// ---------------- Account handlers ----------------------------------

#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failure")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = payload.username.trim();
    if username.len() < 3 {
        return Err(ApiError::BadRequest(
            "Username must be at least 3 characters long".into(),
        ));
    }
    let email = payload.email.trim();
    if !EMAIL_RE.is_match(email) {
        return Err(ApiError::BadRequest("Invalid email address".into()));
    }
    validate_password(&payload.password)?;

    if data.repo.get_user_by_username(username).await.is_ok() {
        return Err(ApiError::BadRequest("Username already exists".into()));
    }
    if data.repo.get_user_by_email(email).await.is_ok() {
        return Err(ApiError::BadRequest("Email already registered".into()));
    }

    let password_hash =
        auth::hash_password(&payload.password).map_err(|_| ApiError::Internal)?;
    let user = data
        .repo
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with an identical registration.
            RepoError::Conflict => ApiError::BadRequest("Username already exists".into()),
            other => other.into(),
        })?;

    let token = auth::create_jwt(user.id, &user.username).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Created().json(AuthResponse {
        token,
        user: UserSummary {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    // One message for every failure mode so callers cannot probe usernames.
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());
    let user = data
        .repo
        .get_user_by_username(payload.username.trim())
        .await
        .map_err(|_| invalid())?;
    if !user.is_active || !auth::verify_password(&payload.password, &user.password_hash) {
        return Err(invalid());
    }
    let token = auth::create_jwt(user.id, &user.username).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user: UserSummary {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}

const FORGOT_PASSWORD_MESSAGE: &str =
    "If that email address is in our system, you will receive a password reset email.";

#[utoipa::path(
    post,
    path = "/api/forgot_password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Accepted (whether or not the address exists)", body = MessageResponse),
        (status = 503, description = "Mail could not be sent")
    )
)]
pub async fn forgot_password(
    data: web::Data<AppState>,
    payload: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = payload.email.trim();
    // Unknown addresses get the same reply as known ones.
    let user = match data.repo.get_user_by_email(email).await {
        Ok(user) => user,
        Err(_) => {
            return Ok(HttpResponse::Ok().json(MessageResponse {
                message: FORGOT_PASSWORD_MESSAGE.into(),
            }))
        }
    };

    if !data.mailer.is_configured() {
        return Err(ApiError::ServiceUnavailable(
            "Error sending email. Please try again later.".into(),
        ));
    }
    let token = tokens::issue(data.repo.as_ref(), user.id).await?;
    if let Err(e) = data.mailer.send_reset_email(&user.email, &token).await {
        log::error!("password reset mail failed: {e}");
        // The unsent token is useless; drop it.
        let _ = tokens::consume(data.repo.as_ref(), &token).await;
        return Err(ApiError::ServiceUnavailable(
            "Error sending email. Please try again later.".into(),
        ));
    }
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: FORGOT_PASSWORD_MESSAGE.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/reset_password/{token}",
    request_body = ResetPasswordRequest,
    params(("token" = String, Path, description = "Reset token from the email link")),
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid token or password")
    )
)]
pub async fn reset_password(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    if payload.password != payload.confirm_password {
        return Err(ApiError::BadRequest("Passwords must match".into()));
    }
    validate_password(&payload.password)?;

    let token = path.into_inner();
    let user_id = tokens::validate(data.repo.as_ref(), &token)
        .await
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token.".into()))?;

    let password_hash =
        auth::hash_password(&payload.password).map_err(|_| ApiError::Internal)?;
    data.repo.update_password(user_id, &password_hash).await?;
    tokens::consume(data.repo.as_ref(), &token).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Your password has been updated!".into(),
    }))
}

// ---------------- Post handlers --------------------------------------

#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "All posts, newest first", body = [PostResponse]))
)]
pub async fn list_posts(
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts().await?;
    let body: Vec<PostResponse> = posts.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Missing title")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let post = data
        .repo
        .create_post(NewPost {
            title: payload.title,
            content: payload.content,
            tags: payload.tags,
            hero_banner_url: payload.hero_banner_url,
            author_id: auth.user_id()?,
            author_username: auth.0.username.clone(),
        })
        .await?;
    Ok(HttpResponse::Created().json(PostResponse::from(post)))
}

#[utoipa::path(
    get,
    path = "/api/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Post", body = PostResponse),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PostResponse::from(post)))
}

#[utoipa::path(
    put,
    path = "/api/posts/{slug}",
    request_body = UpdatePostRequest,
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    if post.author_id != auth.user_id()? {
        return Err(ApiError::Forbidden(
            "You can only edit your own posts".into(),
        ));
    }
    let payload = payload.into_inner();
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let updated = data
        .repo
        .update_post(
            post.id,
            UpdatePost {
                title: payload.title,
                content: payload.content,
                tags: payload.tags,
                hero_banner_url: payload.hero_banner_url,
                remove_hero_banner: payload.remove_hero_banner,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(PostResponse::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    if post.author_id != auth.user_id()? {
        return Err(ApiError::Forbidden(
            "You can only delete your own posts".into(),
        ));
    }
    let deleted = data.repo.delete_post(post.id).await?;
    // Orphaned hero files are cleaned up opportunistically; a failure here
    // never turns a successful delete into an error.
    if let Some(url) = deleted.hero_banner_url {
        if let Some(name) = url.strip_prefix("/uploads/") {
            if let Err(e) = data.files.delete(name).await {
                log::warn!("hero banner cleanup failed for '{name}': {e}");
            }
        }
    }
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Post deleted".into(),
    }))
}

// ---------------- Public reads ----------------------------------------

pub async fn index(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts().await?;
    let body: Vec<PostResponse> = posts.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(body))
}

pub async fn view_post(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PostResponse::from(post)))
}

// ---------------- Upload handling --------------------------------------

const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[utoipa::path(
    post,
    path = "/api/upload_image",
    responses(
        (status = 200, description = "Stored; body carries the public URL", body = UploadResponse),
        (status = 400, description = "Missing file, bad name, or disallowed type"),
        (status = 413, description = "Payload too large")
    )
)]
pub async fn upload_image(
    _auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let filename = field
            .content_disposition()
            .get_filename()
            .map(sanitize_filename)
            .unwrap_or_default();
        if filename.is_empty() {
            return Err(ApiError::BadRequest("Invalid filename".into()));
        }
        if !extension_allowed(&filename, &data.config.allowed_extensions) {
            return Err(ApiError::BadRequest("File type not allowed".into()));
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut field_stream = field;
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            bytes.extend_from_slice(&chunk);
        }

        // The extension check can be fooled by renaming; the content sniff
        // cannot.
        let is_image = infer::get(&bytes)
            .map(|t| t.mime_type().starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::BadRequest("File type not allowed".into()));
        }

        data.files.save(&filename, &bytes).await.map_err(|e| {
            log::error!("upload save error: {e}");
            ApiError::Internal
        })?;
        return Ok(HttpResponse::Ok().json(UploadResponse {
            url: format!("/uploads/{filename}"),
        }));
    }
    Err(ApiError::BadRequest("No file provided".into()))
}

pub async fn serve_upload(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let filename = sanitize_filename(&path.into_inner());
    if filename.is_empty() {
        return Err(ApiError::NotFound);
    }
    match data.files.load(&filename).await {
        Ok(bytes) => {
            let mime = infer::get(&bytes)
                .map(|t| t.mime_type().to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            Ok(HttpResponse::Ok()
                .insert_header(("Content-Type", mime))
                .body(bytes))
        }
        Err(FileStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("upload load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

// ---------------- Summaries ---------------------------------------------

#[utoipa::path(
    get,
    path = "/api/posts/{slug}/summary",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Generated summary", body = SummaryResponse),
        (status = 400, description = "Content too short"),
        (status = 404, description = "Post not found"),
        (status = 503, description = "Summarizer not configured")
    )
)]
pub async fn generate_summary(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    if !data.summarizer.is_configured() {
        return Err(ApiError::ServiceUnavailable(
            "AI service not available".into(),
        ));
    }
    match data.summarizer.summarize(&post.title, &post.content).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(SummaryResponse { summary })),
        Err(SummaryError::TooShort) => Err(ApiError::BadRequest(
            "Content too short for summary".into(),
        )),
        Err(SummaryError::NotConfigured) => Err(ApiError::ServiceUnavailable(
            "AI service not available".into(),
        )),
        Err(SummaryError::Upstream(e)) => {
            log::error!("summary upstream error: {e}");
            Err(ApiError::Internal)
        }
    }
}
