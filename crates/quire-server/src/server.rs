//! Static file server for the generated site.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    extract::{Request, State},
    http::{StatusCode, Uri},
    middleware::map_request_with_state,
    Router,
};
use tower_http::services::ServeDir;

/// Configuration for the file server.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Generated site, served at `/`
    pub output_dir: PathBuf,

    /// Static assets, served at `/assets`
    pub assets_dir: PathBuf,

    /// Address to listen on
    pub addr: SocketAddr,

    /// Open browser on start
    pub open: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated"),
            assets_dir: PathBuf::from("assets"),
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            open: false,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Server error: {0}")]
    ServeError(String),
}

/// Request path rewriting in front of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRule {
    /// Paths ending with this are refused
    pub forbidden_suffix: &'static str,

    /// Appended to paths whose last segment has no extension
    pub default_ext: Option<&'static str>,
}

/// Pretty URLs for the site: `/post/hello` serves `post/hello.html`, and the bare
/// post directory is hidden.
pub const SITE_RULE: PathRule = PathRule {
    forbidden_suffix: "/post/",
    default_ext: Some(".html"),
};

/// Assets are served as-is, without directory listings.
pub const ASSETS_RULE: PathRule = PathRule {
    forbidden_suffix: "/",
    default_ext: None,
};

impl PathRule {
    /// Rewrite a request path. `None` means the path is refused.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        if path.ends_with(self.forbidden_suffix) {
            return None;
        }

        let last = path.rsplit('/').next().unwrap_or("");
        match self.default_ext {
            Some(ext) if !last.is_empty() && !last.contains('.') => Some(format!("{path}{ext}")),
            _ => Some(path.to_string()),
        }
    }
}

async fn apply_rule(State(rule): State<PathRule>, mut request: Request) -> Result<Request, StatusCode> {
    tracing::info!("{} {}", request.method(), request.uri());

    let path = rule.rewrite(request.uri().path()).ok_or(StatusCode::NOT_FOUND)?;
    if path != request.uri().path() {
        let path_and_query = match request.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };
        let mut parts = request.uri().clone().into_parts();
        parts.path_and_query = Some(path_and_query.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
        *request.uri_mut() = Uri::from_parts(parts).map_err(|_| StatusCode::BAD_REQUEST)?;
    }

    Ok(request)
}

/// Static file server over the output and assets directories.
pub struct FileServer {
    config: ServeConfig,
}

impl FileServer {
    pub fn new(config: ServeConfig) -> Self {
        Self { config }
    }

    /// Build the router. Anything not found on disk is a 404.
    pub fn router(&self) -> Router {
        let assets = Router::new()
            .fallback_service(ServeDir::new(&self.config.assets_dir))
            .layer(map_request_with_state(ASSETS_RULE, apply_rule));

        let site = Router::new()
            .fallback_service(ServeDir::new(&self.config.output_dir))
            .layer(map_request_with_state(SITE_RULE, apply_rule));

        Router::new().nest_service("/assets", assets).merge(site)
    }

    /// Serve until the process is terminated.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr = self.config.addr;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        tracing::info!("Serving {} at http://{}", self.config.output_dir.display(), addr);

        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn server() -> (TempDir, FileServer) {
        let temp = tempdir().unwrap();
        let output_dir = temp.path().join("generated");
        let assets_dir = temp.path().join("assets");
        fs::create_dir_all(output_dir.join("post")).unwrap();
        fs::create_dir_all(assets_dir.join("css")).unwrap();
        fs::write(output_dir.join("index.html"), "<h1>Index</h1>").unwrap();
        fs::write(output_dir.join("index.xml"), "<rss/>").unwrap();
        fs::write(output_dir.join("post/hello.html"), "<h1>Hello</h1>").unwrap();
        fs::write(assets_dir.join("css/site.css"), "body {}").unwrap();

        let config = ServeConfig {
            output_dir,
            assets_dir,
            ..ServeConfig::default()
        };
        (temp, FileServer::new(config))
    }

    async fn get(server: &FileServer, uri: &str) -> (StatusCode, String) {
        let request = axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn site_rule_appends_html() {
        assert_eq!(SITE_RULE.rewrite("/post/hello").as_deref(), Some("/post/hello.html"));
        assert_eq!(SITE_RULE.rewrite("/post/hello.html").as_deref(), Some("/post/hello.html"));
        assert_eq!(SITE_RULE.rewrite("/index.xml").as_deref(), Some("/index.xml"));
        assert_eq!(SITE_RULE.rewrite("/").as_deref(), Some("/"));
        assert_eq!(SITE_RULE.rewrite("/post/"), None);
    }

    #[test]
    fn assets_rule_refuses_directories() {
        assert_eq!(ASSETS_RULE.rewrite("/css/site.css").as_deref(), Some("/css/site.css"));
        assert_eq!(ASSETS_RULE.rewrite("/logo").as_deref(), Some("/logo"));
        assert_eq!(ASSETS_RULE.rewrite("/css/"), None);
        assert_eq!(ASSETS_RULE.rewrite("/"), None);
    }

    #[tokio::test]
    async fn serves_index_and_feed() {
        let (_temp, server) = server();

        assert_eq!(get(&server, "/").await, (StatusCode::OK, "<h1>Index</h1>".into()));
        assert_eq!(get(&server, "/index.xml").await, (StatusCode::OK, "<rss/>".into()));
    }

    #[tokio::test]
    async fn serves_pretty_post_urls() {
        let (_temp, server) = server();

        assert_eq!(get(&server, "/post/hello").await, (StatusCode::OK, "<h1>Hello</h1>".into()));
        assert_eq!(get(&server, "/post/hello.html").await.0, StatusCode::OK);
        assert_eq!(get(&server, "/post/missing").await.0, StatusCode::NOT_FOUND);
        assert_eq!(get(&server, "/post/").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_assets() {
        let (_temp, server) = server();

        assert_eq!(get(&server, "/assets/css/site.css").await, (StatusCode::OK, "body {}".into()));
        assert_eq!(get(&server, "/assets/css/").await.0, StatusCode::NOT_FOUND);
        assert_eq!(get(&server, "/assets/nope.css").await.0, StatusCode::NOT_FOUND);
    }
}
