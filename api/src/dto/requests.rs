use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Validate, Deserialize)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 40, message = "Name must be 3-40 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, max = 100, message = "Password must be 8-100 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

/// Text fields of the create-post multipart form, validated before any
/// side effect runs.
#[derive(Debug, Validate)]
pub struct CreatePostInput {
    #[validate(length(min = 5, message = "Title must be at least 5 characters long"))]
    pub title: String,
    #[validate(length(min = 5, message = "Content must be at least 5 characters long"))]
    pub content: String,
}

/// Update form fields. Omission means "unchanged".
#[derive(Debug, Default, Validate)]
pub struct UpdatePostInput {
    #[validate(length(min = 5, message = "Title must be at least 5 characters long"))]
    pub title: Option<String>,
    #[validate(length(min = 5, message = "Content must be at least 5 characters long"))]
    pub content: Option<String>,
}
