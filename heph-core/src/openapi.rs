//! Generates OpenAPI 3.0 documents for mock API services and writes them
//! to host-side spec files the container runtime can mount.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::model::Endpoint;

const OPENAPI_VERSION: &str = "3.0.0";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Host-side directory (under the system temp dir) for generated specs.
const SPEC_DIR: &str = "heph-specs";

const VALID_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

#[derive(Debug, Error)]
pub enum OpenApiError {
    #[error("unsupported HTTP method: {0:?}")]
    UnsupportedMethod(String),
    #[error("serialize spec: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write spec file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Serialize)]
struct Spec {
    openapi: &'static str,
    info: Info,
    paths: BTreeMap<String, BTreeMap<String, Operation>>,
}

#[derive(Serialize)]
struct Info {
    title: String,
    version: &'static str,
}

#[derive(Serialize)]
struct Operation {
    summary: String,
    responses: BTreeMap<String, Response>,
}

#[derive(Serialize)]
struct Response {
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<BTreeMap<&'static str, MediaType>>,
}

#[derive(Serialize)]
struct MediaType {
    schema: Value,
}

/// Converts endpoint definitions into a pretty-printed OpenAPI 3.0.0 JSON
/// document. Operations are grouped by path; the title goes into
/// `info.title`.
pub fn generate_document(endpoints: &[Endpoint], title: &str) -> Result<Vec<u8>, OpenApiError> {
    let mut paths: BTreeMap<String, BTreeMap<String, Operation>> = BTreeMap::new();

    for endpoint in endpoints {
        let method = endpoint.method.to_lowercase();
        if !VALID_METHODS.contains(&method.as_str()) {
            return Err(OpenApiError::UnsupportedMethod(endpoint.method.clone()));
        }

        let schema = parse_response_schema(&endpoint.response_schema);

        let mut responses = BTreeMap::new();
        responses.insert(
            "200".to_string(),
            Response {
                description: "Successful response",
                content: Some(BTreeMap::from([(CONTENT_TYPE_JSON, MediaType { schema })])),
            },
        );

        let operation = Operation {
            summary: format!("{} {}", method.to_uppercase(), endpoint.path),
            responses,
        };

        paths
            .entry(endpoint.path.clone())
            .or_default()
            .insert(method, operation);
    }

    let doc = Spec {
        openapi: OPENAPI_VERSION,
        info: Info {
            title: title.to_string(),
            version: "1.0.0",
        },
        paths,
    };

    Ok(serde_json::to_vec_pretty(&doc)?)
}

/// Converts an operator-supplied response schema string into a JSON Schema
/// value. Empty input becomes a bare object schema; a JSON object is
/// embedded verbatim; anything else is wrapped as a string example.
fn parse_response_schema(raw: &str) -> Value {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return json!({"type": "object"});
    }

    if let Ok(obj) = serde_json::from_str::<Map<String, Value>>(trimmed) {
        return Value::Object(obj);
    }

    json!({"type": "string", "example": trimmed})
}

/// Directory where generated spec files live.
pub fn spec_dir() -> PathBuf {
    std::env::temp_dir().join(SPEC_DIR)
}

/// Writes a spec document to `<temp-dir>/heph-specs/<name>.json`,
/// overwriting any previous deploy's file, and returns the absolute path.
/// The directory is 0755 and the file 0644, independent of the process
/// umask, so the container runtime can read the mount.
pub fn write_spec_file(name: &str, bytes: &[u8]) -> Result<PathBuf, OpenApiError> {
    let dir = spec_dir();
    fs::create_dir_all(&dir).map_err(|source| OpenApiError::Write {
        path: dir.clone(),
        source,
    })?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).map_err(|source| {
        OpenApiError::Write {
            path: dir.clone(),
            source,
        }
    })?;

    let path = dir.join(format!("{name}.json"));
    fs::write(&path, bytes).map_err(|source| OpenApiError::Write {
        path: path.clone(),
        source,
    })?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).map_err(|source| {
        OpenApiError::Write {
            path: path.clone(),
            source,
        }
    })?;

    Ok(path)
}
