mod requests;
mod responses;

pub use requests::{CreatePostInput, LoginRequest, SignupRequest, UpdatePostInput};
pub use responses::{
    AuthResponse, CreatorView, MessageResponse, PostCreatedResponse, PostListResponse,
    PostResponse, PostView, UserResponse,
};
