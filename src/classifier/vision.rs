// 视觉标签识别服务实现 - images:annotate 接口（LABEL_DETECTION）

use super::{ClassificationRequest, Classifier, LabelAnnotation};
use crate::models::ClassifierSettings;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 视觉识别服务
pub struct VisionClassifier {
    api_key: Option<String>,
    endpoint: String,
    timeout: Duration,
    client: Client,
}

impl VisionClassifier {
    /// 创建新的识别服务（接受共享的HTTP客户端以复用连接池）
    pub fn new(client: Client, settings: &ClassifierSettings) -> Self {
        Self {
            api_key: settings.resolved_api_key(),
            endpoint: settings.endpoint.clone(),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            client,
        }
    }

    /// 构建请求体
    fn build_request_body(&self, request: &ClassificationRequest) -> Value {
        let content = general_purpose::STANDARD.encode(&request.image_png);
        json!({
            "requests": [{
                "image": { "content": content },
                "features": [{
                    "type": "LABEL_DETECTION",
                    "maxResults": request.max_results,
                }]
            }]
        })
    }
}

/// 服务响应
#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
struct AnnotateImageResponse {
    #[serde(rename = "labelAnnotations", default)]
    label_annotations: Vec<RawLabel>,
    #[serde(default)]
    error: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    description: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Deserialize)]
struct ServiceStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// 解析响应体为标签列表
fn parse_annotate_response(body: &str) -> Result<Vec<LabelAnnotation>> {
    let response: AnnotateResponse =
        serde_json::from_str(body).context("识别服务响应格式错误")?;

    let first = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("识别服务响应缺少 responses"))?;

    if let Some(status) = first.error {
        return Err(anyhow!(
            "识别服务返回错误 {}: {}",
            status.code,
            status.message
        ));
    }

    Ok(first
        .label_annotations
        .into_iter()
        .map(|raw| LabelAnnotation::new(raw.description, raw.score))
        .collect())
}

#[async_trait]
impl Classifier for VisionClassifier {
    fn name(&self) -> &str {
        "vision"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn classify(&self, request: ClassificationRequest) -> Result<Vec<LabelAnnotation>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("API key未配置"))?;

        let body = self.build_request_body(&request);
        debug!(
            "发送识别请求: {} 字节图片, maxResults={}",
            request.image_png.len(),
            request.max_results
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("识别请求发送失败")?;

        let status = response.status();
        let text = response.text().await.context("读取识别响应失败")?;
        if !status.is_success() {
            warn!("识别服务返回状态 {}", status);
            return Err(anyhow!("识别请求失败 ({}): {}", status, text));
        }

        let labels = parse_annotate_response(&text)?;
        info!("识别服务返回 {} 个标签", labels.len());
        Ok(labels)
    }
}
