use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use aerohub_types::listing::{LiveryFilter, SortSpec};
use aerohub_types::models::{Livery, LiveryId, LiveryPatch, NewLivery, UserProfile};

use crate::{
    EngagementTotals, Gateway, GatewayConfig, GatewayError, Result, Session, Toggled,
    require_session,
};

const USER_COLUMNS: &str = "id,username,image_url,likes,saves";

/// Gateway backed by the hosted PostgREST API and object storage.
///
/// Created anonymous; [`HttpGateway::authenticated`] produces a copy that
/// sends the session's token instead of the anonymous key.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: Arc<GatewayConfig>,
    session: Option<Session>,
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn failure(self, message: String) -> GatewayError {
        match self {
            Self::Read => GatewayError::Query(message),
            Self::Write => GatewayError::Mutation(message),
        }
    }
}

/// Counter columns of one livery row; null counters read as zero.
#[derive(Debug, Deserialize)]
struct CounterRow {
    likes: Option<u64>,
    saves: Option<u64>,
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Query(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            session: None,
        })
    }

    pub fn authenticated(&self, session: Session) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            session: Some(session),
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self
            .session
            .as_ref()
            .map_or(self.config.anon_key.as_str(), |s| s.token.as_str());

        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        access: Access,
        entity: &'static str,
        id: &str,
    ) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| access.failure(format!("transport error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify(status, &body, access, entity, id);
        warn!("Store request for {} {} failed: {}", entity, id, err);
        Err(err)
    }

    async fn count(&self, pairs: &[(&'static str, String)]) -> Result<u64> {
        let builder = self
            .request(Method::HEAD, &self.rest_url("liveries"))
            .query(&[("select", "id")])
            .query(pairs)
            .header("Prefer", "count=exact");

        let response = self.send(builder, Access::Read, "liveries", "count").await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| GatewayError::Query("response carried no row count".into()))
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        body: serde_json::Value,
        access: Access,
        entity: &'static str,
        id: &str,
    ) -> Result<T> {
        let builder = self
            .request(Method::POST, &self.rest_url(&format!("rpc/{function}")))
            .json(&body);
        let response = self.send(builder, access, entity, id).await?;
        decode(response, access).await
    }

    /// Upload request for one object. `x-upsert` lets a re-upload replace the
    /// object instead of failing with a duplicate.
    fn upload_request(
        &self,
        object_path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<RequestBuilder> {
        let upload_url = self.storage_url(false, object_path)?;
        Ok(self
            .request(Method::POST, upload_url.as_str())
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes))
    }

    /// `{base}/storage/v1/object[/public]/{bucket}/{path}`, each segment encoded.
    fn storage_url(&self, public: bool, object_path: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.config.base_url)
            .map_err(|e| GatewayError::Validation(format!("invalid store URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GatewayError::Validation("store URL cannot hold a path".into()))?;
            segments.pop_if_empty().extend(["storage", "v1", "object"]);
            if public {
                segments.push("public");
            }
            segments.push(&self.config.image_bucket);
            segments.extend(object_path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn upgrade(&self, session: Session) -> Arc<dyn Gateway> {
        Arc::new(self.authenticated(session))
    }

    async fn count_liveries(&self, filter: &LiveryFilter) -> Result<u64> {
        self.count(&filter_pairs(filter)).await
    }

    async fn fetch_liveries(
        &self,
        filter: &LiveryFilter,
        sort: SortSpec,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Livery>> {
        let order = format!("{}.{}", sort.field.as_str(), sort.order.as_str());
        let builder = self
            .request(Method::GET, &self.rest_url("liveries"))
            .query(&[("select", "*")])
            .query(&filter_pairs(filter))
            .query(&[("order", order)])
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())]);

        let response = self.send(builder, Access::Read, "liveries", "page").await?;
        let rows: Vec<Livery> = decode(response, Access::Read).await?;
        debug!("Fetched {} liveries at offset {}", rows.len(), offset);
        Ok(rows)
    }

    async fn get_livery(&self, id: LiveryId) -> Result<Livery> {
        let builder = self
            .request(Method::GET, &self.rest_url("liveries"))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);

        let response = self.send(builder, Access::Read, "livery", &id.to_string()).await?;
        let rows: Vec<Livery> = decode(response, Access::Read).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found("livery", id))
    }

    async fn insert_livery(&self, livery: &NewLivery) -> Result<Livery> {
        require_session(self)?;

        let builder = self
            .request(Method::POST, &self.rest_url("liveries"))
            .header("Prefer", "return=representation")
            .json(livery);

        let response = self.send(builder, Access::Write, "livery", "new").await?;
        let rows: Vec<Livery> = decode(response, Access::Write).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::Mutation("insert returned no row".into()))
    }

    async fn update_livery(&self, id: LiveryId, patch: &LiveryPatch) -> Result<Livery> {
        require_session(self)?;
        if patch.is_empty() {
            return self.get_livery(id).await;
        }

        let builder = self
            .request(Method::PATCH, &self.rest_url("liveries"))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch);

        let response = self.send(builder, Access::Write, "livery", &id.to_string()).await?;
        let rows: Vec<Livery> = decode(response, Access::Write).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found("livery", id))
    }

    async fn delete_livery(&self, id: LiveryId) -> Result<()> {
        require_session(self)?;

        let builder = self
            .request(Method::DELETE, &self.rest_url("liveries"))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");

        let response = self.send(builder, Access::Write, "livery", &id.to_string()).await?;
        let rows: Vec<Livery> = decode(response, Access::Write).await?;
        if rows.is_empty() {
            return Err(GatewayError::not_found("livery", id));
        }
        Ok(())
    }

    async fn toggle_like(&self, id: LiveryId) -> Result<Toggled> {
        require_session(self)?;
        self.rpc(
            "toggle_like_livery",
            json!({ "livery_id_input": id }),
            Access::Write,
            "livery",
            &id.to_string(),
        )
        .await
    }

    async fn toggle_save(&self, id: LiveryId) -> Result<Toggled> {
        require_session(self)?;
        self.rpc(
            "toggle_save_livery",
            json!({ "livery_id_input": id }),
            Access::Write,
            "livery",
            &id.to_string(),
        )
        .await
    }

    async fn increment_view(&self, id: LiveryId) -> Result<u64> {
        self.rpc(
            "increment_views",
            json!({ "livery_id": id }),
            Access::Write,
            "livery",
            &id.to_string(),
        )
        .await
    }

    async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        let builder = self
            .request(Method::GET, &self.rest_url("users"))
            .query(&[("select", USER_COLUMNS.to_string()), ("id", format!("eq.{user_id}"))]);

        let response = self.send(builder, Access::Read, "user", user_id).await?;
        let rows: Vec<UserProfile> = decode(response, Access::Read).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found("user", user_id))
    }

    async fn count_user_liveries(&self, user_id: &str) -> Result<u64> {
        self.count(&[("user_id", format!("eq.{user_id}"))]).await
    }

    async fn total_user_likes(&self, user_id: &str) -> Result<u64> {
        let total: Option<u64> = self
            .rpc(
                "get_total_user_likes",
                json!({ "user_id_param": user_id }),
                Access::Read,
                "user",
                user_id,
            )
            .await?;
        Ok(total.unwrap_or(0))
    }

    async fn total_user_saves(&self, user_id: &str) -> Result<u64> {
        let total: Option<u64> = self
            .rpc(
                "get_total_user_saves",
                json!({ "user_id_param": user_id }),
                Access::Read,
                "user",
                user_id,
            )
            .await?;
        Ok(total.unwrap_or(0))
    }

    async fn sum_user_engagement(&self, user_id: &str) -> Result<EngagementTotals> {
        let builder = self
            .request(Method::GET, &self.rest_url("liveries"))
            .query(&[("select", "likes,saves".to_string()), ("user_id", format!("eq.{user_id}"))]);

        let response = self.send(builder, Access::Read, "user", user_id).await?;
        let rows: Vec<CounterRow> = decode(response, Access::Read).await?;
        Ok(rows.iter().fold(EngagementTotals::default(), |acc, row| EngagementTotals {
            likes: acc.likes + row.likes.unwrap_or(0),
            saves: acc.saves + row.saves.unwrap_or(0),
        }))
    }

    async fn upload_image(
        &self,
        object_path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String> {
        require_session(self)?;

        let size = bytes.len();
        let builder = self.upload_request(object_path, bytes, content_type)?;
        self.send(builder, Access::Write, "image", object_path).await?;

        debug!("Uploaded {} ({} bytes)", object_path, size);
        Ok(self.storage_url(true, object_path)?.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response, access: Access) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| access.failure(format!("malformed response: {e}")))
}

/// Query pairs for a listing predicate.
fn filter_pairs(filter: &LiveryFilter) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(search) = &filter.search {
        pairs.push(("title", format!("ilike.*{}*", escape_like(search))));
    }
    if let Some(vehicle) = &filter.vehicle_name {
        pairs.push(("vehicle_name", format!("eq.{vehicle}")));
    }
    pairs
}

/// Escape LIKE metacharacters; `*` is PostgREST's wildcard and is dropped.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '*' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Total from `Content-Range: 0-19/45` or `*/0`.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn classify(
    status: StatusCode,
    body: &str,
    access: Access,
    entity: &'static str,
    id: &str,
) -> GatewayError {
    let detail = serde_json::from_str::<PostgrestError>(body).ok();
    let code = detail
        .as_ref()
        .and_then(|d| d.code.clone())
        .unwrap_or_default();
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.to_string());

    // 42501: insufficient_privilege (row-level security), P0002: no_data_found
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || code == "42501" {
        GatewayError::Auth(message)
    } else if status == StatusCode::NOT_FOUND || code == "P0002" {
        GatewayError::not_found(entity, id)
    } else {
        access.failure(format!("{status}: {message}"))
    }
}
