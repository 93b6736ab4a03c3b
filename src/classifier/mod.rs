// 分类服务模块 - 定义识别服务接口和结果映射

pub mod vision;

pub use vision::VisionClassifier;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 识别出的标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAnnotation {
    pub label: String,
    /// 置信度（0-1）
    pub confidence: f32,
}

impl LabelAnnotation {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// 分类请求
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// PNG编码的画布
    pub image_png: Vec<u8>,
    /// 最多返回的标签数
    pub max_results: u32,
}

/// 分类服务接口
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 获取服务名称
    fn name(&self) -> &str;

    /// 检查服务是否已配置
    fn is_configured(&self) -> bool;

    /// 识别图片，返回按服务排序的标签列表（可能为空）
    async fn classify(&self, request: ClassificationRequest) -> Result<Vec<LabelAnnotation>>;
}

/// 识别结果
#[derive(Debug, Clone, PartialEq)]
pub enum GuessOutcome {
    /// 识别成功
    Detected(LabelAnnotation),
    /// 没有足够可信的标签
    NothingRecognized,
    /// 请求失败
    Failed(String),
}

impl GuessOutcome {
    /// 根据服务返回值得到结果，取置信度最高的标签
    pub fn from_labels(result: Result<Vec<LabelAnnotation>>, min_confidence: f32) -> Self {
        match result {
            Ok(labels) => labels
                .into_iter()
                .filter(|label| label.confidence >= min_confidence && !label.label.trim().is_empty())
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(Ordering::Equal)
                })
                .map(Self::Detected)
                .unwrap_or(Self::NothingRecognized),
            Err(e) => Self::Failed(format!("{:#}", e)),
        }
    }

    /// 显示给用户的文本
    pub fn display_text(&self) -> String {
        match self {
            Self::Detected(annotation) => format!("Detected: {}", annotation.label),
            Self::NothingRecognized => "Nothing recognized in the drawing".to_string(),
            Self::Failed(_) => "Could not analyze drawing".to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
