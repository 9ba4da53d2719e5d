// src/backend/obs_http.rs
//
// OBS through an obs-websocket HTTP bridge: every request is
// `POST {url}/call/{RequestType}` with the request data as the JSON body.

use super::SceneBackend;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub struct ObsHttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallResponse {
    request_status: Option<RequestStatus>,
    response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    comment: Option<String>,
}

impl ObsHttpBackend {
    pub fn new(url: &str, password: Option<&str>, timeout: Duration) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: url.trim_end_matches('/').to_string(),
            password: password.map(str::to_string),
        })
    }

    /// Issue one request; returns its `responseData` (Null when absent).
    async fn call(&self, request_type: &str, data: Option<Value>) -> BackendResult<Value> {
        let url = format!("{}/call/{}", self.base_url, request_type);
        debug!("OBS request {}", request_type);

        let mut request = self.http_client.post(&url);
        if let Some(password) = &self.password {
            request = request.header(reqwest::header::AUTHORIZATION, password);
        }
        if let Some(data) = &data {
            request = request.json(data);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let parsed: CallResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::Malformed(format!("{}: {}", request_type, e)))?;

        if let Some(status) = parsed.request_status {
            if !status.result {
                return Err(BackendError::Rejected(format!(
                    "{} failed (code {}): {}",
                    request_type,
                    status.code.unwrap_or_default(),
                    status.comment.unwrap_or_default()
                )));
            }
        }

        Ok(parsed.response_data.unwrap_or(Value::Null))
    }
}

/// Scene names from a `GetSceneList` payload, reversed into UI order.
/// OBS reports scenes bottom-up relative to its scene list widget.
fn scene_names(data: &Value) -> BackendResult<Vec<String>> {
    let scenes = data
        .get("scenes")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Malformed("GetSceneList: missing 'scenes'".to_string()))?;

    let mut names = scenes
        .iter()
        .map(|scene| {
            scene
                .get("sceneName")
                .and_then(Value::as_str)
                .or_else(|| scene.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    BackendError::Malformed(format!("GetSceneList: unexpected entry {}", scene))
                })
        })
        .collect::<BackendResult<Vec<_>>>()?;

    names.reverse();
    Ok(names)
}

#[async_trait]
impl SceneBackend for ObsHttpBackend {
    async fn list_scenes(&self) -> BackendResult<Vec<String>> {
        let data = self.call("GetSceneList", None).await?;
        let names = scene_names(&data)?;
        info!("Retrieved {} scenes from OBS", names.len());
        Ok(names)
    }

    async fn current_scene(&self) -> BackendResult<String> {
        let data = self.call("GetCurrentProgramScene", None).await?;
        data.get("currentProgramSceneName")
            .or_else(|| data.get("sceneName"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::Malformed("GetCurrentProgramScene: missing scene name".to_string())
            })
    }

    async fn switch_scene(&self, scene: &str) -> BackendResult<()> {
        self.call("SetCurrentProgramScene", Some(json!({ "sceneName": scene })))
            .await?;
        Ok(())
    }
}
