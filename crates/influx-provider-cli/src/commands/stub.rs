//! In-process InfluxDB v2 server for command tests

use super::Context;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use influx_provider::ProviderConfig;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
pub struct Influx {
    pub buckets: Vec<Value>,
    pub mappings: Vec<Value>,
    pub authorizations: Vec<Value>,
    next_id: u32,
    pub fail_bucket_create: bool,
    pub fail_bucket_patch: bool,
    pub fail_mapping_delete: bool,
    pub fail_authorization_patch: bool,
}

impl Influx {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:016x}", self.next_id)
    }
}

pub type Shared = Arc<Mutex<Influx>>;

fn status(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({ "code": "error", "message": message }))).into_response()
}

fn position(items: &[Value], id: &str) -> Option<usize> {
    items.iter().position(|item| item["id"] == id)
}

async fn orgs() -> Response {
    Json(json!({ "orgs": [{ "id": "o1", "name": "acme" }] })).into_response()
}

async fn create_bucket(State(influx): State<Shared>, Json(request): Json<Value>) -> Response {
    let mut influx = influx.lock().unwrap();
    if influx.fail_bucket_create {
        return status(StatusCode::INTERNAL_SERVER_ERROR, "bucket create failed");
    }
    let bucket = json!({
        "id": influx.next_id(),
        "orgID": request["orgID"],
        "name": request["name"],
        "description": request.get("description").cloned().unwrap_or(Value::Null),
        "retentionRules": request["retentionRules"],
    });
    influx.buckets.push(bucket.clone());
    (StatusCode::CREATED, Json(bucket)).into_response()
}

async fn get_bucket(State(influx): State<Shared>, Path(id): Path<String>) -> Response {
    let influx = influx.lock().unwrap();
    match position(&influx.buckets, &id) {
        Some(i) => Json(influx.buckets[i].clone()).into_response(),
        None => status(StatusCode::NOT_FOUND, "bucket not found"),
    }
}

async fn patch_bucket(
    State(influx): State<Shared>,
    Path(id): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    let mut influx = influx.lock().unwrap();
    if influx.fail_bucket_patch {
        return status(StatusCode::INTERNAL_SERVER_ERROR, "bucket update failed");
    }
    let Some(i) = position(&influx.buckets, &id) else {
        return status(StatusCode::NOT_FOUND, "bucket not found");
    };
    let bucket = &mut influx.buckets[i];
    for field in ["name", "description", "retentionRules"] {
        bucket[field] = request[field].clone();
    }
    Json(bucket.clone()).into_response()
}

async fn delete_bucket(State(influx): State<Shared>, Path(id): Path<String>) -> Response {
    let mut influx = influx.lock().unwrap();
    match position(&influx.buckets, &id) {
        Some(i) => {
            influx.buckets.remove(i);
            StatusCode::NO_CONTENT.into_response()
        }
        None => status(StatusCode::NOT_FOUND, "bucket not found"),
    }
}

async fn create_dbrp(State(influx): State<Shared>, Json(mut mapping): Json<Value>) -> Response {
    let mut influx = influx.lock().unwrap();
    mapping["id"] = json!(influx.next_id());
    influx.mappings.push(mapping.clone());
    (StatusCode::CREATED, Json(json!({ "content": mapping }))).into_response()
}

async fn list_dbrps(
    State(influx): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let influx = influx.lock().unwrap();
    let bucket_id = params.get("bucketID").cloned().unwrap_or_default();
    let content: Vec<Value> = influx
        .mappings
        .iter()
        .filter(|m| m["bucketID"] == bucket_id.as_str())
        .cloned()
        .collect();
    Json(json!({ "content": content })).into_response()
}

async fn patch_dbrp(
    State(influx): State<Shared>,
    Path(id): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    let mut influx = influx.lock().unwrap();
    let Some(i) = position(&influx.mappings, &id) else {
        return status(StatusCode::NOT_FOUND, "dbrp not found");
    };
    let mapping = &mut influx.mappings[i];
    mapping["retention_policy"] = request["retention_policy"].clone();
    Json(json!({ "content": mapping.clone() })).into_response()
}

async fn delete_dbrp(State(influx): State<Shared>, Path(id): Path<String>) -> Response {
    let mut influx = influx.lock().unwrap();
    if influx.fail_mapping_delete {
        return status(StatusCode::INTERNAL_SERVER_ERROR, "dbrp delete failed");
    }
    match position(&influx.mappings, &id) {
        Some(i) => {
            influx.mappings.remove(i);
            StatusCode::NO_CONTENT.into_response()
        }
        None => status(StatusCode::NOT_FOUND, "dbrp not found"),
    }
}

async fn create_authorization(
    State(influx): State<Shared>,
    Json(mut authorization): Json<Value>,
) -> Response {
    let mut influx = influx.lock().unwrap();
    authorization["id"] = json!(influx.next_id());
    authorization["org"] = json!("acme");
    authorization["token"] = json!("generated-token");
    influx.authorizations.push(authorization.clone());
    (StatusCode::CREATED, Json(authorization)).into_response()
}

async fn list_authorizations(State(influx): State<Shared>) -> Response {
    let influx = influx.lock().unwrap();
    Json(json!({ "authorizations": influx.authorizations })).into_response()
}

async fn patch_authorization(
    State(influx): State<Shared>,
    Path(id): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    let mut influx = influx.lock().unwrap();
    if influx.fail_authorization_patch {
        return status(StatusCode::INTERNAL_SERVER_ERROR, "authorization update failed");
    }
    let Some(i) = position(&influx.authorizations, &id) else {
        return status(StatusCode::NOT_FOUND, "authorization not found");
    };
    let authorization = &mut influx.authorizations[i];
    authorization["status"] = request["status"].clone();
    Json(authorization.clone()).into_response()
}

async fn delete_authorization(State(influx): State<Shared>, Path(id): Path<String>) -> Response {
    let mut influx = influx.lock().unwrap();
    match position(&influx.authorizations, &id) {
        Some(i) => {
            influx.authorizations.remove(i);
            StatusCode::NO_CONTENT.into_response()
        }
        None => status(StatusCode::NOT_FOUND, "authorization not found"),
    }
}

/// Serve a fresh stub and return a command context with an empty state dir
pub async fn start() -> (Context, Shared, TempDir) {
    let influx = Shared::default();

    let app = Router::new()
        .route("/api/v2/orgs", get(orgs))
        .route("/api/v2/buckets", post(create_bucket))
        .route(
            "/api/v2/buckets/{id}",
            get(get_bucket).patch(patch_bucket).delete(delete_bucket),
        )
        .route("/api/v2/dbrps", post(create_dbrp))
        .route("/api/v2/dbrps/", get(list_dbrps))
        .route("/api/v2/dbrps/{id}", patch(patch_dbrp).delete(delete_dbrp))
        .route(
            "/api/v2/authorizations",
            post(create_authorization).get(list_authorizations),
        )
        .route(
            "/api/v2/authorizations/{id}",
            patch(patch_authorization).delete(delete_authorization),
        )
        .with_state(influx.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::new(ProviderConfig::new(url, "test-token"), dir.path());
    (ctx, influx, dir)
}
