//! API document loading and structural validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::document::OpenApiDocument;
use crate::error::{OpenApiError, OpenApiResult};

/// Serialization format of an API document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// JSON.
    Json,
    /// YAML.
    Yaml,
}

impl DocumentFormat {
    /// Picks the format from a file extension, if it is a known one.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("json") => Some(Self::Json),
            Some("yaml" | "yml") => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Guesses the format from the content itself.
    #[must_use]
    pub fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Yaml
        }
    }
}

/// Where an API document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiDocSource {
    /// A local file (`.json`, `.yaml` or `.yml`).
    File(PathBuf),
    /// An `http://` or `https://` URL.
    Url(String),
    /// A document held in memory.
    Inline {
        /// Document text.
        content: String,
        /// Its format.
        format: DocumentFormat,
    },
}

impl ApiDocSource {
    /// Interprets a reference as a URL when it has an HTTP scheme and as a
    /// file path otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// use apiary_openapi::ApiDocSource;
    ///
    /// assert!(matches!(ApiDocSource::parse("https://example.com/api.yaml"), ApiDocSource::Url(_)));
    /// assert!(matches!(ApiDocSource::parse("./api/openapi.yaml"), ApiDocSource::File(_)));
    /// ```
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            Self::Url(reference.to_string())
        } else {
            Self::File(PathBuf::from(reference))
        }
    }

    /// An inline JSON document.
    pub fn json(content: impl Into<String>) -> Self {
        Self::Inline {
            content: content.into(),
            format: DocumentFormat::Json,
        }
    }

    /// An inline YAML document.
    pub fn yaml(content: impl Into<String>) -> Self {
        Self::Inline {
            content: content.into(),
            format: DocumentFormat::Yaml,
        }
    }
}

impl From<&str> for ApiDocSource {
    fn from(reference: &str) -> Self {
        Self::parse(reference)
    }
}

impl From<PathBuf> for ApiDocSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl std::fmt::Display for ApiDocSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
            Self::Inline { .. } => write!(f, "<inline>"),
        }
    }
}

/// Loads API documents from files, URLs or memory.
pub struct DocumentLoader;

impl DocumentLoader {
    /// Loads and parses a document.
    pub async fn load(source: &ApiDocSource) -> OpenApiResult<OpenApiDocument> {
        match source {
            ApiDocSource::File(path) => Self::from_file(path).await,
            ApiDocSource::Url(url) => Self::from_url(url).await,
            ApiDocSource::Inline { content, format } => Self::parse(content, *format),
        }
    }

    /// Loads a document from a file.
    pub async fn from_file(path: impl AsRef<Path>) -> OpenApiResult<OpenApiDocument> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading API document from file");

        let content = fs::read_to_string(path).await.map_err(|e| {
            OpenApiError::Load(format!("failed to read {}: {}", path.display(), e))
        })?;

        let format = DocumentFormat::from_path(path).unwrap_or_else(|| DocumentFormat::sniff(&content));
        Self::parse(&content, format)
    }

    /// Fetches a document over HTTP.
    pub async fn from_url(url: &str) -> OpenApiResult<OpenApiDocument> {
        info!(url, "loading API document from url");

        let response = reqwest::get(url)
            .await
            .map_err(|e| OpenApiError::Load(format!("failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(OpenApiError::Load(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| OpenApiError::Load(format!("failed to read {url}: {e}")))?;

        let format = DocumentFormat::from_path(Path::new(url)).unwrap_or_else(|| DocumentFormat::sniff(&content));
        Self::parse(&content, format)
    }

    /// Parses document text.
    pub fn parse(content: &str, format: DocumentFormat) -> OpenApiResult<OpenApiDocument> {
        let document: OpenApiDocument = match format {
            DocumentFormat::Json => {
                serde_json::from_str(content).map_err(|e| OpenApiError::Parse(e.to_string()))?
            }
            DocumentFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| OpenApiError::Parse(e.to_string()))?
            }
        };

        debug!(
            title = %document.info.title,
            version = %document.info.version,
            paths = document.paths.len(),
            "API document parsed"
        );

        Ok(document)
    }
}

/// Checks the structural rules routing relies on.
///
/// Every violation is collected; the error lists all of them.
///
/// - `openapi` is a 3.x version
/// - at least one path is declared, and every path starts with `/`
/// - every operation has a non-empty, unique `operationId`
/// - every parameter, request body and response reference resolves
pub fn validate_document(document: &OpenApiDocument) -> OpenApiResult<()> {
    let mut errors = Vec::new();

    if !document.openapi.starts_with("3.") {
        errors.push(format!(
            "unsupported openapi version '{}', expected 3.x",
            document.openapi
        ));
    }

    if document.paths.is_empty() {
        errors.push("document declares no paths".to_string());
    }

    let mut seen = HashSet::new();
    for (path, item) in &document.paths {
        if !path.starts_with('/') {
            errors.push(format!("path '{path}' must start with '/'"));
        }

        for parameter in &item.parameters {
            if let Err(e) = document.resolve_parameter(parameter) {
                errors.push(format!("{path}: {e}"));
            }
        }

        for (method, operation) in item.operations() {
            let location = format!("{method} {path}");

            match operation.operation_id.as_deref() {
                None | Some("") => errors.push(format!("{location}: missing operationId")),
                Some(id) => {
                    if !seen.insert(id.to_string()) {
                        errors.push(format!("{location}: duplicate operationId '{id}'"));
                    }
                }
            }

            for parameter in &operation.parameters {
                if let Err(e) = document.resolve_parameter(parameter) {
                    errors.push(format!("{location}: {e}"));
                }
            }

            if let Some(body) = &operation.request_body {
                if let Err(e) = document.resolve_request_body(body) {
                    errors.push(format!("{location}: {e}"));
                }
            }

            if operation.responses.is_empty() {
                errors.push(format!("{location}: no responses declared"));
            }
            for response in operation.responses.values() {
                if let Err(e) = document.resolve_response(response) {
                    errors.push(format!("{location}: {e}"));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(OpenApiError::InvalidDocument { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r"
openapi: 3.0.3
info:
  title: Users
  version: 1.0.0
paths:
  /users:
    post:
      operationId: createUser
      responses:
        '201':
          description: created
";

    #[test]
    fn test_source_parse() {
        assert_eq!(
            ApiDocSource::parse("http://localhost/api.json"),
            ApiDocSource::Url("http://localhost/api.json".to_string())
        );
        assert_eq!(
            ApiDocSource::from("openapi.yaml"),
            ApiDocSource::File(PathBuf::from("openapi.yaml"))
        );
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("api.YML")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("api.json")),
            Some(DocumentFormat::Json)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("api")), None);
        assert_eq!(DocumentFormat::sniff("  {\"openapi\":\"3.0.0\"}"), DocumentFormat::Json);
        assert_eq!(DocumentFormat::sniff("openapi: 3.0.0"), DocumentFormat::Yaml);
    }

    #[test]
    fn test_parse_yaml() {
        let doc = DocumentLoader::parse(YAML, DocumentFormat::Yaml).unwrap();
        assert_eq!(doc.info.title, "Users");
        assert!(validate_document(&doc).is_ok());
    }

    #[test]
    fn test_parse_error() {
        let result = DocumentLoader::parse("{ not json", DocumentFormat::Json);
        assert!(matches!(result, Err(OpenApiError::Parse(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let source = ApiDocSource::File(file.path().to_path_buf());
        let doc = DocumentLoader::load(&source).await.unwrap();
        assert_eq!(doc.paths.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let source = ApiDocSource::parse("/definitely/not/here.yaml");
        let result = DocumentLoader::load(&source).await;
        assert!(matches!(result, Err(OpenApiError::Load(_))));
    }

    #[test]
    fn test_load_inline() {
        let source = ApiDocSource::yaml(YAML);
        let doc = tokio_test::block_on(DocumentLoader::load(&source)).unwrap();
        assert_eq!(doc.openapi, "3.0.3");
    }

    #[test]
    fn test_validate_collects_every_violation() {
        let json = r##"{
            "openapi": "2.0",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "users": {
                    "get": { "responses": { "200": { "description": "ok" } } }
                },
                "/a": {
                    "get": { "operationId": "dup", "responses": { "200": { "description": "ok" } } },
                    "post": {
                        "operationId": "dup",
                        "parameters": [{ "$ref": "#/components/parameters/Missing" }],
                        "responses": {}
                    }
                }
            }
        }"##;
        let doc = DocumentLoader::parse(json, DocumentFormat::Json).unwrap();

        let Err(OpenApiError::InvalidDocument { errors }) = validate_document(&doc) else {
            panic!("expected an invalid document");
        };
        assert!(errors.iter().any(|e| e.contains("unsupported openapi version")));
        assert!(errors.iter().any(|e| e.contains("path 'users' must start with '/'")));
        assert!(errors.iter().any(|e| e.contains("GET users: missing operationId")));
        assert!(errors.iter().any(|e| e.contains("duplicate operationId 'dup'")));
        assert!(errors.iter().any(|e| e.contains("unresolved reference")));
        assert!(errors.iter().any(|e| e.contains("POST /a: no responses declared")));
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let json = r#"{ "openapi": "3.1.0", "info": { "title": "t", "version": "1" } }"#;
        let doc = DocumentLoader::parse(json, DocumentFormat::Json).unwrap();
        assert!(validate_document(&doc).is_err());
    }
}
