//! Kitsu REST connector
//!
//! Implements `EntityClient` against the Kitsu (Zou) API. Every path below
//! is relative to the API host, `<site>/api`.

use async_trait::async_trait;
use bridge_traits::entity::{
    Asset, AssetType, Comment, EntityClient, EntityClientFactory, Episode, FrameRange, ListScope,
    NewAsset, Person, PreviewFile, Project, Sequence, Shot, Task, TaskStatus, TaskType,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::metadata::EntityData;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{KitsuError, Result};
use crate::types::{
    AssetUpdateBody, AuthenticatedResponse, CommentBody, LoginRequest, LoginResponse, NameBody,
    NewAssetBody, NewSequenceBody, NewShotBody, NewTaskBody, ShotUpdateBody,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Name Kitsu gives the default task of an entity.
const DEFAULT_TASK_NAME: &str = "main";

/// Turn a site URL as typed by a user into the API host.
///
/// `https://kitsu.studio.test/` and `https://kitsu.studio.test/api` both
/// become `https://kitsu.studio.test/api`.
pub fn api_host_from_site(site: &str) -> Result<String> {
    let trimmed = site.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(KitsuError::InvalidHost("site URL is empty".to_string()));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(KitsuError::InvalidHost(format!(
            "site URL must start with http:// or https://: {}",
            trimmed
        )));
    }
    if trimmed.ends_with("/api") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}/api", trimmed))
    }
}

fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "exr" => "image/x-exr",
        _ => "application/octet-stream",
    }
}

/// Kitsu API connector
///
/// Holds the access token obtained by [`EntityClient::log_in`]. Every request
/// is sent once by default. With a retry policy from
/// [`KitsuConnector::with_retry_policy`], GETs are retried with exponential
/// backoff on 429, 5xx and transport failures. Writes are always sent once.
///
/// # Example
///
/// ```ignore
/// use provider_kitsu::KitsuConnector;
/// use bridge_traits::entity::EntityClient;
///
/// let kitsu = KitsuConnector::new(http_client, "https://kitsu.studio.test")?;
/// kitsu.log_in("ana@studio.test", &password).await?;
/// let project = kitsu.find_project("Demo").await?;
/// ```
pub struct KitsuConnector {
    http_client: Arc<dyn HttpClient>,
    api_host: String,
    access_token: RwLock<Option<String>>,
    retry_policy: RetryPolicy,
}

impl KitsuConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, site: &str) -> Result<Self> {
        Ok(Self {
            http_client,
            api_host: api_host_from_site(site)?,
            access_token: RwLock::new(None),
            retry_policy: RetryPolicy::no_retry(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_host, path.trim_start_matches('/'))
    }

    async fn authorized(&self, request: HttpRequest) -> Result<HttpRequest> {
        let token = self.access_token.read().await;
        match token.as_deref() {
            Some(token) => Ok(request.bearer_token(token)),
            None => Err(KitsuError::NotLoggedIn),
        }
    }

    fn check_status(path: &str, response: HttpResponse) -> Result<HttpResponse> {
        match response.status {
            status if (200..300).contains(&status) => Ok(response),
            401 => Err(KitsuError::AuthenticationFailed(format!(
                "access token rejected for {}",
                path
            ))),
            404 => Err(KitsuError::NotFound {
                path: path.to_string(),
            }),
            status => Err(KitsuError::ApiError {
                status_code: status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }),
        }
    }

    /// Send an authorized request. Only GETs are retried, and only when the
    /// retry policy allows more than one attempt.
    #[instrument(skip(self, request), fields(method = request.method.as_str()))]
    async fn send(&self, path: &str, request: HttpRequest) -> Result<HttpResponse> {
        let request = self.authorized(request).await?;
        let max_attempts = if request.method == HttpMethod::Get {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 0;

        loop {
            match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "Kitsu request failed (attempt {}/{}): status={}, retrying in {}ms",
                        attempt,
                        max_attempts,
                        response.status,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    debug!(status = response.status, "Kitsu request finished");
                    return Self::check_status(path, response);
                }
                Err(e) if attempt + 1 < max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "Kitsu request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Get, self.url(path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);
        let response = self.send(path, request).await?;
        response
            .json()
            .map_err(|e| KitsuError::ParseError(format!("{}: {}", path, e)))
    }

    async fn fetch_first<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let items: Vec<T> = self.get(&with_query(path, params)).await?;
        Ok(items.into_iter().next())
    }

    async fn send_json<T, B>(&self, method: HttpMethod, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let request = HttpRequest::new(method, self.url(path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(body)?;
        let response = self.send(path, request).await?;
        response
            .json()
            .map_err(|e| KitsuError::ParseError(format!("{}: {}", path, e)))
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        self.send_json(HttpMethod::Post, path, body).await
    }

    async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        self.send_json(HttpMethod::Put, path, body).await
    }

    fn scoped(scope: ListScope, path: String) -> String {
        match scope {
            ListScope::Project => format!("data/{}", path),
            ListScope::AssignedToMe => format!("data/user/{}", path),
        }
    }
}

#[async_trait]
impl EntityClient for KitsuConnector {
    #[instrument(skip(self, password))]
    async fn log_in(&self, email: &str, password: &str) -> bridge_traits::error::Result<Person> {
        let path = "auth/login";
        let request = HttpRequest::new(HttpMethod::Post, self.url(path))
            .timeout(REQUEST_TIMEOUT)
            .json(&LoginRequest { email, password })?;
        let response = self.http_client.execute(request).await?;

        if matches!(response.status, 400 | 401 | 403) {
            return Err(KitsuError::AuthenticationFailed(format!(
                "Kitsu refused the login for {}",
                email
            ))
            .into());
        }
        let response = Self::check_status(path, response)?;
        let login: LoginResponse = response
            .json()
            .map_err(|e| KitsuError::ParseError(format!("{}: {}", path, e)))?;

        *self.access_token.write().await = Some(login.access_token);
        info!(host = %self.api_host, "Logged in to Kitsu");
        Ok(login.user)
    }

    async fn current_user(&self) -> bridge_traits::error::Result<Person> {
        let response: AuthenticatedResponse = self.get("auth/authenticated").await?;
        if !response.authenticated {
            return Err(KitsuError::AuthenticationFailed("session expired".to_string()).into());
        }
        Ok(response.user)
    }

    async fn find_project(&self, name: &str) -> bridge_traits::error::Result<Option<Project>> {
        Ok(self.fetch_first("data/projects", &[("name", name)]).await?)
    }

    async fn find_episode(
        &self,
        project: &Project,
        name: &str,
    ) -> bridge_traits::error::Result<Option<Episode>> {
        Ok(self
            .fetch_first(
                "data/episodes",
                &[("project_id", project.id.as_str()), ("name", name)],
            )
            .await?)
    }

    #[instrument(skip(self, project), fields(project = %project.name))]
    async fn create_episode(
        &self,
        project: &Project,
        name: &str,
    ) -> bridge_traits::error::Result<Episode> {
        let path = format!("data/projects/{}/episodes", project.id);
        Ok(self.post(&path, &NameBody { name }).await?)
    }

    async fn list_episodes(
        &self,
        project: &Project,
        scope: ListScope,
    ) -> bridge_traits::error::Result<Vec<Episode>> {
        let path = Self::scoped(scope, format!("projects/{}/episodes", project.id));
        Ok(self.get(&path).await?)
    }

    async fn find_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> bridge_traits::error::Result<Option<Sequence>> {
        let mut params = vec![("project_id", project.id.as_str()), ("name", name)];
        if let Some(episode) = episode {
            params.push(("parent_id", episode.id.as_str()));
        }
        Ok(self.fetch_first("data/sequences", &params).await?)
    }

    #[instrument(skip(self, project, episode), fields(project = %project.name))]
    async fn create_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> bridge_traits::error::Result<Sequence> {
        let path = format!("data/projects/{}/sequences", project.id);
        let body = NewSequenceBody {
            name,
            episode_id: episode.map(|e| e.id.as_str()),
        };
        Ok(self.post(&path, &body).await?)
    }

    async fn list_sequences(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        scope: ListScope,
    ) -> bridge_traits::error::Result<Vec<Sequence>> {
        let path = match episode {
            Some(episode) => Self::scoped(scope, format!("episodes/{}/sequences", episode.id)),
            None => Self::scoped(scope, format!("projects/{}/sequences", project.id)),
        };
        Ok(self.get(&path).await?)
    }

    async fn find_shot(
        &self,
        sequence: &Sequence,
        name: &str,
    ) -> bridge_traits::error::Result<Option<Shot>> {
        Ok(self
            .fetch_first(
                "data/shots/all",
                &[("sequence_id", sequence.id.as_str()), ("name", name)],
            )
            .await?)
    }

    #[instrument(skip(self, project, sequence, data), fields(sequence = %sequence.name))]
    async fn create_shot(
        &self,
        project: &Project,
        sequence: &Sequence,
        name: &str,
        range: Option<FrameRange>,
        data: &EntityData,
    ) -> bridge_traits::error::Result<Shot> {
        let mut data = data.clone();
        if let Some(range) = range {
            data.frame_in = Some(range.start());
            data.frame_out = Some(range.end());
        }
        let path = format!("data/projects/{}/shots", project.id);
        let body = NewShotBody {
            name,
            sequence_id: &sequence.id,
            nb_frames: range.map(|r| r.nb_frames()),
            data: &data,
        };
        Ok(self.post(&path, &body).await?)
    }

    #[instrument(skip(self, shot), fields(shot = %shot.name))]
    async fn update_shot(&self, shot: &Shot) -> bridge_traits::error::Result<Shot> {
        let path = format!("data/entities/{}", shot.id);
        let body = ShotUpdateBody {
            name: &shot.name,
            nb_frames: shot.nb_frames,
            data: &shot.data,
        };
        Ok(self.put(&path, &body).await?)
    }

    async fn list_shots(
        &self,
        sequence: &Sequence,
        scope: ListScope,
    ) -> bridge_traits::error::Result<Vec<Shot>> {
        let path = Self::scoped(scope, format!("sequences/{}/shots", sequence.id));
        Ok(self.get(&path).await?)
    }

    async fn find_asset_type(&self, name: &str) -> bridge_traits::error::Result<Option<AssetType>> {
        Ok(self.fetch_first("data/entity-types", &[("name", name)]).await?)
    }

    #[instrument(skip(self))]
    async fn create_asset_type(&self, name: &str) -> bridge_traits::error::Result<AssetType> {
        Ok(self.post("data/entity-types", &NameBody { name }).await?)
    }

    async fn list_asset_types(
        &self,
        project: &Project,
        scope: ListScope,
    ) -> bridge_traits::error::Result<Vec<AssetType>> {
        let path = Self::scoped(scope, format!("projects/{}/asset-types", project.id));
        Ok(self.get(&path).await?)
    }

    async fn find_asset(
        &self,
        project: &Project,
        name: &str,
    ) -> bridge_traits::error::Result<Option<Asset>> {
        Ok(self
            .fetch_first(
                "data/assets/all",
                &[("project_id", project.id.as_str()), ("name", name)],
            )
            .await?)
    }

    #[instrument(
        skip(self, project, asset_type, asset),
        fields(asset = %asset.name, asset_type = %asset_type.name)
    )]
    async fn create_asset(
        &self,
        project: &Project,
        asset_type: &AssetType,
        asset: &NewAsset,
    ) -> bridge_traits::error::Result<Asset> {
        let path = format!(
            "data/projects/{}/asset-types/{}/assets/new",
            project.id, asset_type.id
        );
        let body = NewAssetBody {
            name: &asset.name,
            description: asset.description.as_deref().unwrap_or_default(),
            data: &asset.data,
            episode_id: asset.episode_id.as_deref(),
        };
        Ok(self.post(&path, &body).await?)
    }

    #[instrument(skip(self, asset), fields(asset = %asset.name))]
    async fn update_asset(&self, asset: &Asset) -> bridge_traits::error::Result<Asset> {
        let path = format!("data/entities/{}", asset.id);
        let body = AssetUpdateBody {
            name: &asset.name,
            description: asset.description.as_deref(),
            data: &asset.data,
        };
        Ok(self.put(&path, &body).await?)
    }

    async fn list_assets(
        &self,
        project: &Project,
        asset_type: &AssetType,
        scope: ListScope,
    ) -> bridge_traits::error::Result<Vec<Asset>> {
        let path = Self::scoped(
            scope,
            format!("projects/{}/asset-types/{}/assets", project.id, asset_type.id),
        );
        Ok(self.get(&path).await?)
    }

    async fn find_task_type(&self, name: &str) -> bridge_traits::error::Result<Option<TaskType>> {
        Ok(self.fetch_first("data/task-types", &[("name", name)]).await?)
    }

    async fn find_task_status(
        &self,
        short_name: &str,
    ) -> bridge_traits::error::Result<Option<TaskStatus>> {
        Ok(self
            .fetch_first("data/task-status", &[("short_name", short_name)])
            .await?)
    }

    async fn find_task(
        &self,
        entity_id: &str,
        task_type: &TaskType,
    ) -> bridge_traits::error::Result<Option<Task>> {
        Ok(self
            .fetch_first(
                "data/tasks",
                &[
                    ("entity_id", entity_id),
                    ("task_type_id", task_type.id.as_str()),
                    ("name", DEFAULT_TASK_NAME),
                ],
            )
            .await?)
    }

    async fn create_task(
        &self,
        project: &Project,
        entity_id: &str,
        task_type: &TaskType,
    ) -> bridge_traits::error::Result<Task> {
        let body = NewTaskBody {
            project_id: &project.id,
            task_type_id: &task_type.id,
            entity_id,
            name: DEFAULT_TASK_NAME,
        };
        Ok(self.post("data/tasks", &body).await?)
    }

    #[instrument(
        skip(self, task, status, text, author),
        fields(task = %task.id, status = %status.short_name)
    )]
    async fn add_comment(
        &self,
        task: &Task,
        status: &TaskStatus,
        text: &str,
        author: Option<&Person>,
    ) -> bridge_traits::error::Result<Comment> {
        let path = format!("actions/tasks/{}/comment", task.id);
        let body = CommentBody {
            task_status_id: &status.id,
            comment: text,
            person_id: author.map(|p| p.id.as_str()),
        };
        Ok(self.post(&path, &body).await?)
    }

    #[instrument(
        skip(self, task, comment, contents),
        fields(task = %task.id, size = contents.len())
    )]
    async fn add_preview(
        &self,
        task: &Task,
        comment: &Comment,
        file_name: &str,
        contents: Bytes,
    ) -> bridge_traits::error::Result<PreviewFile> {
        let path = format!("actions/tasks/{}/comments/{}/add-preview", task.id, comment.id);
        let preview: PreviewFile = self.post(&path, &serde_json::json!({})).await?;

        let upload_path = format!("pictures/preview-files/{}", preview.id);
        let request = HttpRequest::new(HttpMethod::Post, self.url(&upload_path))
            .timeout(Duration::from_secs(300))
            .multipart_file("file", file_name, content_type_for(file_name), &contents);
        let response = self.send(&upload_path, request).await?;
        let uploaded = response.json::<PreviewFile>().unwrap_or(preview);

        info!(preview = %uploaded.id, "Uploaded preview to Kitsu");
        Ok(uploaded)
    }

    async fn set_main_preview(&self, preview: &PreviewFile) -> bridge_traits::error::Result<()> {
        let path = format!("actions/preview-files/{}/set-main-preview", preview.id);
        let _: serde_json::Value = self.put(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn get_preview_file(&self, id: &str) -> bridge_traits::error::Result<PreviewFile> {
        Ok(self.get(&format!("data/preview-files/{}", id)).await?)
    }

    async fn download_preview_thumbnail(&self, id: &str) -> bridge_traits::error::Result<Bytes> {
        let path = format!("pictures/thumbnails/preview-files/{}.png", id);
        let request = HttpRequest::new(HttpMethod::Get, self.url(&path)).timeout(REQUEST_TIMEOUT);
        let response = self.send(&path, request).await?;
        Ok(response.body)
    }
}

/// Builds a fresh [`KitsuConnector`] for every session.
#[derive(Clone)]
pub struct KitsuClientFactory {
    http_client: Arc<dyn HttpClient>,
    retry_policy: RetryPolicy,
}

impl KitsuClientFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            retry_policy: RetryPolicy::no_retry(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl EntityClientFactory for KitsuClientFactory {
    fn connect(&self, site: &str) -> bridge_traits::error::Result<Arc<dyn EntityClient>> {
        let connector = KitsuConnector::new(self.http_client.clone(), site)?
            .with_retry_policy(self.retry_policy.clone());
        debug!(api_host = %connector.api_host(), "Opened Kitsu connector");
        Ok(Arc::new(connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::*;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(
                &self,
                request: HttpRequest,
            ) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn mock_login(mock_http: &mut MockHttpClient) {
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("/api/auth/login"))
            .times(1)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"login": true, "user": {"id": "u1", "email": "ana@studio.test"}, "access_token": "jwt"}"#,
                ))
            });
    }

    /// Logged-in connector with a fast opt-in retry policy.
    async fn logged_in(mut mock_http: MockHttpClient) -> KitsuConnector {
        mock_login(&mut mock_http);
        let connector = KitsuConnector::new(Arc::new(mock_http), "https://kitsu.studio.test/")
            .unwrap()
            .with_retry_policy(fast_retry());
        connector.log_in("ana@studio.test", "secret").await.unwrap();
        connector
    }

    fn project() -> Project {
        Project {
            id: "p1".to_string(),
            name: "Demo".to_string(),
            production_type: Default::default(),
        }
    }

    #[test]
    fn test_api_host_from_site() {
        assert_eq!(
            api_host_from_site("https://kitsu.studio.test/").unwrap(),
            "https://kitsu.studio.test/api"
        );
        assert_eq!(
            api_host_from_site("https://kitsu.studio.test/api").unwrap(),
            "https://kitsu.studio.test/api"
        );
        assert!(api_host_from_site("").is_err());
        assert!(api_host_from_site("kitsu.studio.test").is_err());
    }

    #[test]
    fn test_query_is_encoded() {
        assert_eq!(
            with_query("data/projects", &[("name", "My Show")]),
            "data/projects?name=My%20Show"
        );
    }

    #[tokio::test]
    async fn test_requests_before_login_fail() {
        let connector =
            KitsuConnector::new(Arc::new(MockHttpClient::new()), "https://kitsu.studio.test")
                .unwrap();
        let err = connector.find_project("Demo").await.unwrap_err();
        assert!(matches!(err, bridge_traits::BridgeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(400, r#"{"login": false}"#)));

        let connector =
            KitsuConnector::new(Arc::new(mock_http), "https://kitsu.studio.test").unwrap();
        let err = connector.log_in("ana@studio.test", "wrong").await.unwrap_err();
        assert!(matches!(err, bridge_traits::BridgeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_find_project_uses_token_and_query() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                req.url == "https://kitsu.studio.test/api/data/projects?name=Demo"
                    && req.headers.get("Authorization") == Some(&"Bearer jwt".to_string())
            })
            .times(1)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"[{"id": "p1", "name": "Demo", "production_type": "tvshow"}]"#,
                ))
            });

        let connector = logged_in(mock_http).await;
        let project = connector.find_project("Demo").await.unwrap().unwrap();
        assert_eq!(project.id, "p1");
        assert!(project.production_type.has_episodes());
    }

    #[tokio::test]
    async fn test_missing_sequence_is_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.url.contains("data/sequences?project_id=p1&name=SQ010"))
            .times(1)
            .returning(|_| Ok(json_response(200, "[]")));

        let connector = logged_in(mock_http).await;
        let sequence = connector
            .find_sequence(&project(), None, "SQ010")
            .await
            .unwrap();
        assert!(sequence.is_none());
    }

    #[tokio::test]
    async fn test_create_shot_sends_frame_range() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                if !req.url.ends_with("/api/data/projects/p1/shots") {
                    return false;
                }
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                body["nb_frames"] == 99
                    && body["data"]["frame_in"] == 1001
                    && body["sequence_id"] == "q1"
            })
            .times(1)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"id": "s1", "name": "SH010", "parent_id": "q1", "nb_frames": 99,
                        "data": {"frame_in": 1001, "frame_out": 1100}}"#,
                ))
            });

        let connector = logged_in(mock_http).await;
        let sequence = Sequence {
            id: "q1".to_string(),
            name: "SQ010".to_string(),
            project_id: Some("p1".to_string()),
            parent_id: None,
            canceled: false,
        };
        let range = FrameRange::new(1001, 1100).unwrap();
        let shot = connector
            .create_shot(&project(), &sequence, "SH010", Some(range), &EntityData::default())
            .await
            .unwrap();
        assert_eq!(shot.frame_range(), Some(range));
    }

    #[tokio::test]
    async fn test_opted_in_get_retries_server_errors() {
        let mut mock_http = MockHttpClient::new();
        let mut calls = 0;
        mock_http
            .expect_execute()
            .withf(|req| req.url.contains("data/task-types"))
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok(json_response(503, "unavailable"))
                } else {
                    Ok(json_response(200, r#"[{"id": "tt1", "name": "Animation"}]"#))
                }
            });

        let connector = logged_in(mock_http).await;
        let task_type = connector.find_task_type("Animation").await.unwrap();
        assert_eq!(task_type.unwrap().id, "tt1");
    }

    #[tokio::test]
    async fn test_get_is_sent_once_by_default() {
        let mut mock_http = MockHttpClient::new();
        mock_login(&mut mock_http);
        mock_http
            .expect_execute()
            .withf(|req| req.url.contains("data/task-types"))
            .times(1)
            .returning(|_| Ok(json_response(503, "unavailable")));

        let connector =
            KitsuConnector::new(Arc::new(mock_http), "https://kitsu.studio.test").unwrap();
        connector.log_in("ana@studio.test", "secret").await.unwrap();
        let err = connector.find_task_type("Animation").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_failed_shot_update_is_not_resent() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("data/entities/s1") && req.method == HttpMethod::Put)
            .times(1)
            .returning(|_| Ok(json_response(503, "unavailable")));

        // Even an opted-in policy never resends writes.
        let connector = logged_in(mock_http).await;
        let shot: Shot = serde_json::from_str(
            r#"{"id": "s1", "name": "SH010", "nb_frames": 49, "data": {"frame_in": 1, "frame_out": 50}}"#,
        )
        .unwrap();
        let err = connector.update_shot(&shot).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("data/entity-types"))
            .times(1)
            .returning(|_| Ok(json_response(502, "bad gateway")));

        let connector = logged_in(mock_http).await;
        let err = connector.create_asset_type("Props").await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_add_preview_uploads_file() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("actions/tasks/t1/comments/c1/add-preview"))
            .times(1)
            .returning(|_| Ok(json_response(201, r#"{"id": "pf1"}"#)));
        mock_http
            .expect_execute()
            .withf(|req| {
                req.url.ends_with("pictures/preview-files/pf1")
                    && req
                        .headers
                        .get("Content-Type")
                        .map(|v| v.starts_with("multipart/form-data"))
                        .unwrap_or(false)
            })
            .times(1)
            .returning(|_| Ok(json_response(201, r#"{"id": "pf1", "extension": "mp4"}"#)));

        let connector = logged_in(mock_http).await;
        let task = Task {
            id: "t1".to_string(),
            name: Some("main".to_string()),
            entity_id: "s1".to_string(),
            task_type_id: "tt1".to_string(),
            task_status_id: None,
        };
        let comment = Comment {
            id: "c1".to_string(),
            text: None,
        };
        let preview = connector
            .add_preview(&task, &comment, "sh010_anm_v003.mp4", Bytes::from_static(b"MP4"))
            .await
            .unwrap();
        assert_eq!(preview.extension.as_deref(), Some("mp4"));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_operation_failed() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .with(function(|req: &HttpRequest| req.url.contains("data/preview-files/gone")))
            .times(1)
            .returning(|_| Ok(json_response(404, "{}")));

        let connector = logged_in(mock_http).await;
        let err = connector.get_preview_file("gone").await.unwrap_err();
        assert!(matches!(err, bridge_traits::BridgeError::OperationFailed(_)));
    }

    #[test]
    fn test_factory_validates_site() {
        let factory = KitsuClientFactory::new(Arc::new(MockHttpClient::new()));
        assert!(matches!(
            factory.connect("kitsu.studio.test"),
            Err(bridge_traits::BridgeError::InvalidInput(_))
        ));
        assert!(factory.connect("https://kitsu.studio.test").is_ok());
    }
}
