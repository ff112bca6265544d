use crate::models::{NewPost, Post, ResetToken, UpdatePost, User};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::forgot_password,
        crate::routes::reset_password,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::upload_image,
        crate::routes::generate_summary,
    ),
    components(schemas(
        Post, NewPost, UpdatePost, User, ResetToken,
        crate::routes::RegisterRequest, crate::routes::LoginRequest,
        crate::routes::AuthResponse, crate::routes::UserSummary,
        crate::routes::ForgotPasswordRequest, crate::routes::ResetPasswordRequest,
        crate::routes::CreatePostRequest, crate::routes::UpdatePostRequest,
        crate::routes::PostResponse, crate::routes::UploadResponse,
        crate::routes::SummaryResponse, crate::routes::MessageResponse,
    )),
    tags(
        (name = "accounts", description = "Registration, login, password reset"),
        (name = "posts", description = "Post operations"),
        (name = "uploads", description = "Image uploads"),
    )
)]
pub struct ApiDoc;
