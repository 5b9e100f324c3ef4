//! InfluxDB v2 HTTP client
//!
//! Every request is sent to `<url>/api/v2/...` with an
//! `Authorization: Token <token>` header. Responses are checked against the
//! status the endpoint documents; 404 becomes [`ApiError::NotFound`] so
//! callers can match on absence without comparing messages.

pub mod authorizations;
pub mod buckets;
pub mod dbrps;

pub use authorizations::{
    AuthorizationApi, AuthorizationRecord, AuthorizationStatus, NewAuthorization, Permission,
    PermissionAction, PermissionResource,
};
pub use buckets::{BucketApi, BucketRecord, BucketUpdate, NewBucket};
pub use dbrps::{DbrpApi, DbrpMapping, NewDbrpMapping};

use crate::error::{ApiError, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

const API_PREFIX: &str = "api/v2/";

/// InfluxDB API client
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    server_url: String,
    api_url: Url,
    token: String,
}

impl std::fmt::Debug for InfluxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxClient")
            .field("server_url", &self.server_url)
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Organization as returned by `GET /api/v2/orgs`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Organizations {
    #[serde(default)]
    orgs: Vec<Organization>,
}

/// Error body returned by InfluxDB (`{"code": "...", "message": "..."}`)
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl InfluxClient {
    /// Create a client for the server at `server_url`
    pub fn new(server_url: &str, token: impl Into<String>) -> Result<Self> {
        let base = Url::parse(server_url)?;
        let api_url = Url::parse(&format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            API_PREFIX
        ))?;

        Ok(Self {
            http: reqwest::Client::new(),
            server_url: server_url.to_string(),
            api_url,
            token: token.into(),
        })
    }

    /// The server URL as configured
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Base URL of the v2 API, always ending in `/api/v2/`
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// List organizations visible to the token, in server order
    pub async fn organizations(&self) -> Result<Vec<Organization>> {
        let url = self.endpoint("orgs", &[])?;
        let orgs: Organizations = self
            .send_json(self.http.get(url), &[StatusCode::OK])
            .await?;
        Ok(orgs.orgs)
    }

    /// Resolve a path relative to the API base and append query parameters
    pub(crate) fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.api_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// `<collection>/<id>`, with `id` percent-encoded as a single path segment
    pub(crate) fn item_endpoint(
        &self,
        collection: &str,
        id: &str,
        query: &[(&str, &str)],
    ) -> Result<Url> {
        if matches!(id.trim(), "" | "." | "..") {
            return Err(ApiError::InvalidId(id.to_string()));
        }

        let mut url = self.endpoint(collection, query)?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidId(id.to_string()))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        self.http.get(url)
    }

    pub(crate) fn post(&self, url: Url) -> RequestBuilder {
        self.http.post(url)
    }

    pub(crate) fn patch(&self, url: Url) -> RequestBuilder {
        self.http.patch(url)
    }

    pub(crate) fn delete(&self, url: Url) -> RequestBuilder {
        self.http.delete(url)
    }

    /// Send an authorized request and check its status
    pub(crate) async fn send(
        &self,
        request: RequestBuilder,
        expected: &[StatusCode],
    ) -> Result<Response> {
        let request = request
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .build()?;
        let method = request.method().to_string();
        let url = request.url().to_string();

        tracing::debug!("{} {}", method, url);
        let response = self.http.execute(request).await?;
        let status = response.status();

        if expected.contains(&status) {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(error_message(&body)));
        }

        Err(ApiError::Status {
            method,
            url,
            status: status.as_u16(),
            body,
        })
    }

    /// Send an authorized request and decode its JSON body
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expected: &[StatusCode],
    ) -> Result<T> {
        let response = self.send(request, expected).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Prefer the server's message over the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if !err.message.is_empty() && !err.code.is_empty() => {
            format!("{}: {}", err.code, err.message)
        }
        Ok(err) if !err.message.is_empty() => err.message,
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_normalization() {
        for server in ["http://localhost:8086", "http://localhost:8086/"] {
            let client = InfluxClient::new(server, "token").unwrap();
            assert_eq!(client.api_url().as_str(), "http://localhost:8086/api/v2/");
            assert_eq!(client.server_url(), server);
        }

        let proxied = InfluxClient::new("https://example.com/influx", "token").unwrap();
        assert_eq!(
            proxied.api_url().as_str(),
            "https://example.com/influx/api/v2/"
        );
    }

    #[test]
    fn test_endpoint_query() {
        let client = InfluxClient::new("http://localhost:8086", "token").unwrap();

        let url = client
            .endpoint("dbrps/", &[("orgID", "o1"), ("bucketID", "b1")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8086/api/v2/dbrps/?orgID=o1&bucketID=b1"
        );

        let url = client.item_endpoint("buckets", "abc", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8086/api/v2/buckets/abc");

        let url = client.item_endpoint("dbrps", "m1", &[("orgID", "o1")]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8086/api/v2/dbrps/m1?orgID=o1");
    }

    #[test]
    fn test_item_endpoint_keeps_id_in_one_segment() {
        let client = InfluxClient::new("http://localhost:8086", "token").unwrap();

        let url = client
            .item_endpoint("dbrps", "../orgs/o1?force=true#x", &[("orgID", "o1")])
            .unwrap();
        let segments: Vec<_> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(&segments[..3], ["api", "v2", "dbrps"]);
        assert_eq!(url.query(), Some("orgID=o1"));
        assert_eq!(url.fragment(), None);

        for id in ["", "..", "."] {
            assert!(matches!(
                client.item_endpoint("buckets", id, &[]),
                Err(ApiError::InvalidId(_))
            ));
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            InfluxClient::new("not a url", "token"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"code":"not found","message":"bucket not found"}"#),
            "not found: bucket not found"
        );
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = InfluxClient::new("http://localhost:8086", "s3cr3t").unwrap();
        assert!(!format!("{:?}", client).contains("s3cr3t"));
    }
}
