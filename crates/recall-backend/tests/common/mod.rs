use axum::Router;

pub async fn create_test_app() -> Router {
    recall_backend::create_app().await
}
