//! RunPod control API client
//!
//! Pods live behind the REST API, the GPU catalogue behind GraphQL. Each
//! trait call is exactly one HTTP request with a bounded timeout.

use async_trait::async_trait;
use podctl_core::{
    CloudClient, CloudError, DeploymentRequest, GpuOffering, RawGpu, RawInstance,
    Result as CloudResult,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const GPU_TYPES_QUERY: &str =
    "query GpuTypes { gpuTypes { id displayName memoryInGb communitySpotPrice secureSpotPrice } }";

/// RunPod REST + GraphQL client
pub struct RunPodClient {
    client: Client,
    api_key: String,
    rest_url: String,
    graphql_url: String,
}

impl RunPodClient {
    /// Create a client against explicit endpoints
    pub fn new(
        api_key: impl Into<String>,
        rest_url: impl Into<String>,
        graphql_url: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into().trim().to_string(),
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            graphql_url: graphql_url.into(),
        })
    }

    /// Create a client from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_key, &config.rest_url, &config.graphql_url)
    }

    fn rest(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.rest_url, path);
        debug!(%method, %url, "RunPod request");
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder, pod_id: Option<&str>) -> CloudResult<Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| CloudError::transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, body, pod_id))
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> CloudResult<T> {
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CloudError::transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| CloudError::decode(e.to_string()))
    }
}

/// Map a non-success HTTP status to the boundary error
fn status_error(status: StatusCode, body: String, pod_id: Option<&str>) -> CloudError {
    match status {
        StatusCode::NOT_FOUND => match pod_id {
            Some(id) => CloudError::NotFound(id.to_string()),
            None => CloudError::api(status.as_u16(), body),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CloudError::Auth(format!("{}: {}", status.as_u16(), body))
        }
        _ => CloudError::api(status.as_u16(), body),
    }
}

/// JSON body for `POST /pods`
fn create_body(request: &DeploymentRequest, gpu: &GpuOffering) -> Value {
    let cloud_type = gpu
        .effective_price()
        .map(|(_, cloud)| cloud.as_str())
        .unwrap_or("COMMUNITY");

    let mut body = json!({
        "name": request.name,
        "imageName": request.image_name,
        "gpuTypeIds": [gpu.id],
        "gpuCount": 1,
        "cloudType": cloud_type,
        "interruptible": true,
        "containerDiskInGb": request.container_disk_gb,
        "env": request.env_vars,
        "ports": request.ports,
    });

    // Volume size only applies without a network volume
    match &request.volume_id {
        Some(volume_id) => body["networkVolumeId"] = json!(volume_id),
        None => body["volumeInGb"] = json!(request.disk_size_gb),
    }

    body
}

#[derive(Debug, Deserialize)]
struct CreatedPod {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GpuTypesData>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GpuTypesData {
    #[serde(default)]
    gpu_types: Vec<RawGpu>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

impl GraphQlResponse {
    fn into_gpus(self) -> CloudResult<Vec<RawGpu>> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(CloudError::GraphQl(messages.join("; ")));
        }

        self.data
            .map(|d| d.gpu_types)
            .ok_or_else(|| CloudError::decode("GraphQL response has no data"))
    }
}

#[async_trait]
impl CloudClient for RunPodClient {
    async fn list_instances(&self) -> CloudResult<Vec<RawInstance>> {
        let resp = self.send(self.rest(Method::GET, "/pods"), None).await?;
        Self::decode(resp).await
    }

    async fn get_instance(&self, id: &str) -> CloudResult<RawInstance> {
        let path = format!("/pods/{}", id);
        let resp = self.send(self.rest(Method::GET, &path), Some(id)).await?;
        Self::decode(resp).await
    }

    async fn create_instance(
        &self,
        request: &DeploymentRequest,
        gpu: &GpuOffering,
    ) -> CloudResult<String> {
        let body = create_body(request, gpu);
        debug!(name = %request.name, gpu = %gpu.id, "Creating pod");

        let resp = self
            .send(self.rest(Method::POST, "/pods").json(&body), None)
            .await?;
        let created: CreatedPod = Self::decode(resp).await?;

        Ok(created.id)
    }

    async fn start_instance(&self, id: &str) -> CloudResult<()> {
        let path = format!("/pods/{}/start", id);
        self.send(self.rest(Method::POST, &path), Some(id)).await?;
        Ok(())
    }

    async fn stop_instance(&self, id: &str) -> CloudResult<()> {
        let path = format!("/pods/{}/stop", id);
        self.send(self.rest(Method::POST, &path), Some(id)).await?;
        Ok(())
    }

    async fn delete_instance(&self, id: &str) -> CloudResult<()> {
        let path = format!("/pods/{}", id);
        self.send(self.rest(Method::DELETE, &path), Some(id)).await?;
        Ok(())
    }

    async fn list_gpu_offerings(&self) -> CloudResult<Vec<RawGpu>> {
        let request = self
            .client
            .post(&self.graphql_url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": GPU_TYPES_QUERY }));

        let resp = self.send(request, None).await?;
        let parsed: GraphQlResponse = Self::decode(resp).await?;
        let gpus = parsed.into_gpus()?;

        if gpus.is_empty() {
            warn!("GPU catalogue came back empty");
        }
        Ok(gpus)
    }
}
