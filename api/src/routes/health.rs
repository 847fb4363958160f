use axum::Json;
use chrono::Utc;

/// GET /
pub async fn index() -> &'static str {
    "Social feed API is running"
}

/// GET /health
/// Response: 200 OK with JSON
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
      "status": "healthy",
      "timestamp": Utc::now().timestamp()
    }))
}
