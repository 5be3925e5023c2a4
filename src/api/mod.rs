use crate::models::{Block, BlockKind, Manual, Section, Subsection};
use crate::storage::TOKEN_KEY;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    Unauthorized,
    RateLimited,
    Network,
    Http,
    Parse,
}

#[derive(Clone, Debug)]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: e.to_string(),
        }
    }

    pub(crate) fn parse(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: e.to_string(),
        }
    }

    fn unauthorized() -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            message: "Unauthorized".to_string(),
        }
    }

    pub(crate) fn http(status: u16, body: &str, ctx: &str) -> Self {
        // Some gateways answer throttling with a 5xx/4xx and a text hint instead of 429.
        let kind = if status == 429 || body.to_ascii_lowercase().contains("too many requests") {
            ApiErrorKind::RateLimited
        } else {
            ApiErrorKind::Http
        };
        Self {
            kind,
            message: format!("{ctx} ({status}): {body}"),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ApiErrorKind::RateLimited
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct EnvConfig {
    pub api_url: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        let default_api_url = "http://localhost:4000/api".to_string();

        // `window.ENV.API_URL` is the documented key; `api_url` is accepted too.
        if let Some(window) = web_sys::window() {
            if let Some(env) = window.get("ENV") {
                if !env.is_undefined() && env.is_object() {
                    for k in ["API_URL", "api_url"] {
                        if let Ok(v) = js_sys::Reflect::get(&env, &k.into()) {
                            if let Some(url) = v.as_string() {
                                return Self {
                                    api_url: url.trim_end_matches('/').to_string(),
                                };
                            }
                        }
                    }
                }
            }
        }

        Self {
            api_url: default_api_url,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Clone, Debug)]
pub(crate) struct CreateManualRequest {
    pub title: String,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_id: Option<String>,
    pub title: String,
    pub order: usize,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubsectionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub title: String,
    pub order: usize,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlockRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub order: usize,
}

impl BlockRequest {
    pub fn from_block(subsection_id: Option<&str>, block: &Block, order: usize) -> Self {
        Self {
            subsection_id: subsection_id.map(str::to_string),
            kind: block.kind,
            content: block.content.clone(),
            video_id: block.video_id.clone(),
            order,
        }
    }
}

#[derive(Clone)]
pub(crate) struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
}

impl ApiClient {
    #[cfg(test)]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            token: None,
        }
    }

    pub fn load_from_storage() -> Self {
        let base_url = EnvConfig::new().api_url;
        let token = web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .and_then(|s| s.get_item(TOKEN_KEY).ok().flatten());

        Self { base_url, token }
    }

    pub fn save_to_storage(&self) {
        if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
            if let Some(token) = &self.token {
                let _ = storage.set_item(TOKEN_KEY, token);
            }
        }
    }

    pub fn clear_storage() {
        if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
            let _ = storage.remove_item(TOKEN_KEY);
        }
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn logout(&mut self) {
        self.token = None;
        Self::clear_storage();
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> ApiResult<Value> {
        let client = reqwest::Client::new();
        let mut req = client.request(method, self.url(path));
        if let Some(h) = self.auth_header() {
            req = req.header("Authorization", h);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req.send().await.map_err(ApiError::network)?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(ApiError::parse)
        } else if status.as_u16() == 401 {
            Err(ApiError::unauthorized())
        } else {
            Err(ApiError::http(status.as_u16(), &text, "Request failed"))
        }
    }

    // ------------------------------------------------------------- manuals

    pub async fn create_manual(&self, title: &str) -> ApiResult<Manual> {
        let data = self
            .request(
                reqwest::Method::POST,
                "/manuals",
                Some(&CreateManualRequest {
                    title: title.to_string(),
                }),
            )
            .await?;
        let id = require_entity_id(&data, "manual")?;
        Ok(Manual {
            id,
            title: title.to_string(),
            sections: vec![],
        })
    }

    pub async fn update_manual(&self, manual_id: &str, title: &str) -> ApiResult<()> {
        self.request(
            reqwest::Method::PATCH,
            &format!("/manuals/{}", urlencoding::encode(manual_id)),
            Some(&serde_json::json!({ "title": title })),
        )
        .await
        .map(|_| ())
    }

    pub async fn get_manual(&self, manual_id: &str) -> ApiResult<Manual> {
        let data = self
            .request(
                reqwest::Method::GET,
                &format!("/manuals/{}", urlencoding::encode(manual_id)),
                None::<&()>,
            )
            .await?;
        parse_manual_response(data, manual_id)
    }

    // ------------------------------------------------------------ sections

    pub async fn create_section(&self, manual_id: &str, title: &str, order: usize) -> ApiResult<String> {
        let data = self
            .request(
                reqwest::Method::POST,
                "/manuals/section",
                Some(&SectionRequest {
                    manual_id: Some(manual_id.to_string()),
                    title: title.to_string(),
                    order,
                }),
            )
            .await?;
        require_entity_id(&data, "section")
    }

    pub async fn update_section(&self, section_id: &str, title: &str, order: usize) -> ApiResult<()> {
        self.request(
            reqwest::Method::PATCH,
            &format!("/manuals/section/{}", urlencoding::encode(section_id)),
            Some(&SectionRequest {
                manual_id: None,
                title: title.to_string(),
                order,
            }),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_section(&self, section_id: &str) -> ApiResult<()> {
        self.delete(&format!("/manuals/section/{}", urlencoding::encode(section_id)))
            .await
    }

    // --------------------------------------------------------- subsections

    pub async fn create_subsection(&self, section_id: &str, title: &str, order: usize) -> ApiResult<String> {
        let data = self
            .request(
                reqwest::Method::POST,
                "/manuals/subsection",
                Some(&SubsectionRequest {
                    section_id: Some(section_id.to_string()),
                    title: title.to_string(),
                    order,
                }),
            )
            .await?;
        require_entity_id(&data, "subsection")
    }

    pub async fn update_subsection(&self, subsection_id: &str, title: &str, order: usize) -> ApiResult<()> {
        self.request(
            reqwest::Method::PATCH,
            &format!("/manuals/subsection/{}", urlencoding::encode(subsection_id)),
            Some(&SubsectionRequest {
                section_id: None,
                title: title.to_string(),
                order,
            }),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_subsection(&self, subsection_id: &str) -> ApiResult<()> {
        self.delete(&format!("/manuals/subsection/{}", urlencoding::encode(subsection_id)))
            .await
    }

    // -------------------------------------------------------------- blocks

    pub async fn create_block(&self, subsection_id: &str, block: &Block, order: usize) -> ApiResult<String> {
        let data = self
            .request(
                reqwest::Method::POST,
                "/manuals/block",
                Some(&BlockRequest::from_block(Some(subsection_id), block, order)),
            )
            .await?;
        require_entity_id(&data, "block")
    }

    pub async fn update_block(&self, block_id: &str, block: &Block, order: usize) -> ApiResult<()> {
        self.request(
            reqwest::Method::PATCH,
            &format!("/manuals/block/{}", urlencoding::encode(block_id)),
            Some(&BlockRequest::from_block(None, block, order)),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_block(&self, block_id: &str) -> ApiResult<()> {
        self.delete(&format!("/manuals/block/{}", urlencoding::encode(block_id)))
            .await
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        self.request(reqwest::Method::DELETE, path, None::<&()>)
            .await
            .map(|_| ())
    }

    // -------------------------------------------------------------- videos

    /// Resolve a library video id to something a `<video>` element can play.
    pub async fn get_video_url(&self, video_id: &str) -> ApiResult<String> {
        let data = self
            .request(
                reqwest::Method::GET,
                &format!("/videos/{}", urlencoding::encode(video_id)),
                None::<&()>,
            )
            .await?;
        Ok(parse_video_url(&data).unwrap_or_default())
    }
}

/// Create/update responses arrive either bare or under a `data` envelope.
pub(crate) fn unwrap_data(v: &Value) -> &Value {
    match v.get("data") {
        Some(inner) if inner.is_object() || inner.is_array() => inner,
        _ => v,
    }
}

fn id_from(v: &Value) -> Option<String> {
    let raw = v.get("id").or_else(|| v.get("_id"))?;
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn entity_id(v: &Value) -> Option<String> {
    id_from(unwrap_data(v)).or_else(|| id_from(v))
}

fn require_entity_id(v: &Value, what: &str) -> ApiResult<String> {
    entity_id(v).ok_or_else(|| {
        ApiError::parse(format!(
            "Create {what} succeeded but response is missing an id: {v}"
        ))
    })
}

pub(crate) fn parse_video_url(v: &Value) -> Option<String> {
    let body = unwrap_data(v);
    ["url", "videoUrl", "playbackUrl"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|u| u.as_str()))
        .filter(|u| !u.trim().is_empty())
        .map(str::to_string)
}

fn get_s(v: &Value, k: &str) -> String {
    v.get(k)
        .and_then(|x| x.as_str())
        .unwrap_or_default()
        .to_string()
}

fn get_order(v: &Value) -> i64 {
    v.get("order").and_then(|o| o.as_i64()).unwrap_or(i64::MAX)
}

fn sorted_children<'a>(v: &'a Value, key: &str) -> Vec<&'a Value> {
    let mut items: Vec<&Value> = v
        .get(key)
        .and_then(|x| x.as_array())
        .map(|a| a.iter().collect())
        .unwrap_or_default();
    // Stable sort: items without `order` keep server sequence at the end.
    items.sort_by_key(|i| get_order(i));
    items
}

/// Lenient parse of `GET /manuals/{id}`; entries without an id are dropped.
pub(crate) fn parse_manual_response(data: Value, manual_id: &str) -> ApiResult<Manual> {
    let m = unwrap_data(&data);
    if !m.is_object() {
        return Err(ApiError::parse(format!("Unexpected manual payload: {data}")));
    }

    let sections = sorted_children(m, "sections")
        .into_iter()
        .filter_map(|s| {
            Some(Section {
                id: id_from(s)?,
                title: get_s(s, "title"),
                temp_id: None,
                subsections: sorted_children(s, "subsections")
                    .into_iter()
                    .filter_map(|ss| {
                        Some(Subsection {
                            id: id_from(ss)?,
                            title: get_s(ss, "title"),
                            temp_id: None,
                            dirty: false,
                            blocks: sorted_children(ss, "blocks")
                                .into_iter()
                                .filter_map(|b| {
                                    let kind = b
                                        .get("type")
                                        .and_then(|t| t.as_str())
                                        .and_then(|t| t.parse::<BlockKind>().ok())
                                        .unwrap_or_default();
                                    Some(Block {
                                        id: id_from(b)?,
                                        kind,
                                        content: get_s(b, "content"),
                                        video_id: b
                                            .get("videoId")
                                            .and_then(|x| x.as_str())
                                            .map(str::to_string),
                                        dirty: false,
                                        temp_id: None,
                                    })
                                })
                                .collect(),
                        })
                    })
                    .collect(),
            })
        })
        .collect();

    Ok(Manual {
        id: id_from(m).unwrap_or_else(|| manual_id.to_string()),
        title: get_s(m, "title"),
        sections,
    })
}
