//! PocketBase client.
//!
//! Signs in once as a superuser and reuses the token for every request of the
//! run. List endpoints are followed page by page. HTTP 429 answers are retried
//! with exponential backoff; anything else that goes wrong is reported as
//! [`ReduxError::BackendUnavailable`].

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::TrailBackend;
use crate::config::PocketBaseConfig;
use crate::error::{ReduxError, Result};
use crate::model::{Category, Comment, NotificationAuthor, Trail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const PER_PAGE: u32 = 500;
const GPX_MIME: &str = "application/gpx+xml";

const TRAILS: &str = "trails";
const CATEGORIES: &str = "categories";
const ACTORS: &str = "activitypub_actors";
const COMMENTS: &str = "comments";

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    identity: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

/// One page of `GET /api/collections/{name}/records`.
#[derive(Debug, Deserialize)]
struct ListPage<T> {
    #[serde(default)]
    page: u32,
    #[serde(rename = "totalPages", default)]
    total_pages: u32,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Backoff before retry number `attempt` (1-based): 500ms, 1s, 2s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1 << attempt.saturating_sub(1).min(3)))
}

fn transport_error(e: reqwest::Error) -> ReduxError {
    ReduxError::BackendUnavailable {
        message: e.to_string(),
        status_code: e.status().map(|s| s.as_u16()),
    }
}

/// Authenticated PocketBase session.
pub struct PocketBaseClient {
    client: Client,
    base_url: String,
    token: String,
}

impl PocketBaseClient {
    /// Build the HTTP client and authenticate.
    pub async fn connect(config: &PocketBaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReduxError::backend(format!("failed to create HTTP client: {}", e)))?;
        let base_url = config.url.trim_end_matches('/').to_string();

        let body = AuthRequest {
            identity: &config.admin_email,
            password: &config.admin_password,
        };
        let auth_url = format!("{}/api/collections/_superusers/auth-with-password", base_url);
        let response = send_with_retry("auth", || Ok(client.post(&auth_url).json(&body))).await?;
        let auth: AuthResponse = response.json().await.map_err(transport_error)?;

        info!("[PocketBase] Authenticated against {}", base_url);
        Ok(Self {
            client,
            base_url,
            token: auth.token,
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", &self.token)
    }

    /// Fetch every record of a collection, following pagination.
    async fn list_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Option<&str>,
    ) -> Result<Vec<T>> {
        let url = self.url(&format!("api/collections/{}/records", collection));
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("perPage", PER_PAGE.to_string()),
            ];
            if let Some(filter) = filter {
                query.push(("filter", filter.to_string()));
            }

            let response = send_with_retry(collection, || {
                Ok(self.authorized(self.client.get(&url).query(&query)))
            })
            .await?;
            let body: ListPage<T> = response.json().await.map_err(transport_error)?;
            records.extend(body.items);

            debug!(
                "[PocketBase] {} page {}/{} ({} records so far)",
                collection,
                body.page.max(page),
                body.total_pages,
                records.len()
            );
            if page >= body.total_pages {
                break;
            }
            page += 1;
        }
        Ok(records)
    }
}

impl TrailBackend for PocketBaseClient {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.list_records(CATEGORIES, None).await
    }

    async fn list_public_trails(&self) -> Result<Vec<Trail>> {
        self.list_records(TRAILS, Some("public=true")).await
    }

    async fn find_notification_author(&self, name: &str) -> Result<Option<String>> {
        let actors: Vec<NotificationAuthor> =
            self.list_records(ACTORS, Some("isLocal=true")).await?;
        Ok(actors
            .into_iter()
            .find(|actor| actor.username == name)
            .map(|actor| actor.id))
    }

    async fn download_trail_file(&self, trail: &Trail) -> Result<Vec<u8>> {
        let url = self.url(&format!("api/files/{}/{}/{}", TRAILS, trail.id, trail.gpx));
        let response =
            send_with_retry(&trail.id, || Ok(self.authorized(self.client.get(&url)))).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn upload_trail_file(&self, trail: &Trail, data: Vec<u8>, file_name: &str) -> Result<()> {
        let url = self.url(&format!("api/collections/{}/records/{}", TRAILS, trail.id));
        send_with_retry(&trail.id, || {
            let part = Part::bytes(data.clone())
                .file_name(file_name.to_string())
                .mime_str(GPX_MIME)
                .map_err(transport_error)?;
            Ok(self.authorized(self.client.patch(&url).multipart(Form::new().part("gpx", part))))
        })
        .await?;
        debug!("[PocketBase] Uploaded {} for trail {}", file_name, trail.id);
        Ok(())
    }

    async fn create_notification(&self, trail_id: &str, author_id: &str, text: &str) -> Result<()> {
        let url = self.url(&format!("api/collections/{}/records", COMMENTS));
        let comment = Comment::new(trail_id, author_id, text);
        send_with_retry(trail_id, || {
            Ok(self.authorized(self.client.post(&url).json(&comment)))
        })
        .await?;
        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Send a request, retrying on 429. `build` is called once per attempt since
/// request bodies are consumed by sending.
async fn send_with_retry<F>(label: &str, build: F) -> Result<Response>
where
    F: Fn() -> Result<RequestBuilder>,
{
    let start = Instant::now();
    let mut retries = 0;
    loop {
        let response = build()?.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            retries += 1;
            if retries > MAX_RETRIES {
                return Err(ReduxError::BackendUnavailable {
                    message: format!("{}: max retries exceeded", label),
                    status_code: Some(status.as_u16()),
                });
            }
            let wait = backoff(retries);
            warn!(
                "[PocketBase] {} got 429 after {:?}, retry {} with {:?} backoff",
                label,
                start.elapsed(),
                retries,
                wait
            );
            tokio::time::sleep(wait).await;
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReduxError::BackendUnavailable {
                message: format!("{}: {}", label, body.trim()),
                status_code: Some(status.as_u16()),
            });
        }
        return Ok(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://trails.example.org/", "/api/collections/trails/records"),
            "https://trails.example.org/api/collections/trails/records"
        );
        assert_eq!(join_url("http://localhost:8090", "api/health"), "http://localhost:8090/api/health");
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_list_page_deserialize() {
        let json = r#"{
            "page": 1,
            "perPage": 500,
            "totalItems": 2,
            "totalPages": 1,
            "items": [
                { "id": "c1", "collectionId": "x", "name": "Hiking" },
                { "id": "c2", "collectionId": "x", "name": "Biking" }
            ]
        }"#;
        let page: ListPage<Category> = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].name, "Biking");
    }

    #[test]
    fn test_empty_list_page() {
        let page: ListPage<Category> =
            serde_json::from_str(r#"{ "page": 1, "totalPages": 0, "items": [] }"#).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_actor_record() {
        let actor: NotificationAuthor = serde_json::from_str(
            r#"{ "id": "act1", "username": "trailbot", "isLocal": true, "iri": "https://x/u/trailbot" }"#,
        )
        .unwrap();
        assert_eq!(actor.username, "trailbot");
    }

    #[tokio::test]
    async fn test_connect_unreachable_backend() {
        let config = PocketBaseConfig {
            url: "http://127.0.0.1:9".into(),
            admin_email: "admin@example.org".into(),
            admin_password: "secret".into(),
        };
        match PocketBaseClient::connect(&config).await {
            Err(ReduxError::BackendUnavailable { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
