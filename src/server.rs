//! Static file servers for the build output and for mocked backend
//! fixtures. Both rewrite the request path before it reaches `ServeDir`.

use std::{net::SocketAddr, path::Path};

use axum::{Router, extract::Request, http::Uri, middleware::map_request};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::{
    error::{DevflowError, Result},
    util::has_extension,
};

pub const MOCK_BACKEND_PORT: u16 = 8081;

/// Client-side routes have no extension; they all get the root page.
pub fn spa_rewrite(path: &str) -> Option<String> {
    (!has_extension(path)).then(|| "/".to_string())
}

/// Fixtures are stored as `<path>.json`. Extensionless paths fall back to
/// the fixture root.
pub fn mock_rewrite(path: &str) -> Option<String> {
    if has_extension(path) {
        Some(format!("{}.json", path))
    } else {
        Some("/".to_string())
    }
}

fn rewrite_uri(request: &mut Request, rewrite: fn(&str) -> Option<String>) {
    let Some(target) = rewrite(request.uri().path()) else {
        return;
    };
    if target == request.uri().path() {
        return;
    }

    match target.parse::<Uri>() {
        Ok(uri) => {
            tracing::trace!("rewrite {} -> {}", request.uri(), uri);
            *request.uri_mut() = uri;
        }
        Err(e) => tracing::warn!("Cannot rewrite {} to {}: {}", request.uri(), target, e),
    }
}

async fn rewrite_asset_request(mut request: Request) -> Request {
    rewrite_uri(&mut request, spa_rewrite);
    request
}

async fn rewrite_mock_request(mut request: Request) -> Request {
    rewrite_uri(&mut request, mock_rewrite);
    request
}

pub fn asset_router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(map_request(rewrite_asset_request))
}

pub fn mock_router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(map_request(rewrite_mock_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Binds on loopback. Done before the server task is spawned so that a
/// taken port fails the task that asked for it.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| DevflowError::Server(format!("Failed to bind to {}: {}", addr, e)))
}

pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
    axum::serve(listener, router)
        .await
        .map_err(|e| DevflowError::Server(format!("Server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{StatusCode, header},
    };
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .header(header::ORIGIN, "http://localhost:8080")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn rewrite_rules() {
        assert_eq!(spa_rewrite("/posts/create").as_deref(), Some("/"));
        assert_eq!(spa_rewrite("/js/bundle.js"), None);

        assert_eq!(mock_rewrite("/posts/5").as_deref(), Some("/"));
        assert_eq!(mock_rewrite("/").as_deref(), Some("/"));
        assert_eq!(
            mock_rewrite("/api/v3/users.me").as_deref(),
            Some("/api/v3/users.me.json")
        );
    }

    #[tokio::test]
    async fn asset_server_falls_back_to_index() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        fs::write(dir.path().join("js/bundle.js"), "bundle();").unwrap();

        let (status, body) = get(asset_router(dir.path()), "/views/settings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>app</html>");

        let (status, body) = get(asset_router(dir.path()), "/js/bundle.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "bundle();");

        let (status, _) = get(asset_router(dir.path()), "/js/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mock_backend_serves_json_fixtures() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("api/v3/posts")).unwrap();
        fs::write(dir.path().join("index.html"), "root").unwrap();
        fs::write(dir.path().join("api/v3/posts/5.json"), "{\"id\":5}").unwrap();
        fs::write(dir.path().join("api/v3/users.me.json"), "{\"id\":1}").unwrap();

        let (status, body) = get(mock_router(dir.path()), "/api/v3/users.me").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{\"id\":1}");

        // extensionless paths never reach a fixture
        let (status, body) = get(mock_router(dir.path()), "/api/v3/posts/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "root");
    }

    #[tokio::test]
    async fn mock_backend_allows_any_origin() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "root").unwrap();

        let response = mock_router(dir.path())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, "http://localhost:8080")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
