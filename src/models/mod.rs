// 数据模型模块 - 定义配置、输入事件和画笔相关的数据结构

use serde::{Deserialize, Serialize};

/// 默认静默间隔（毫秒）
pub const DEFAULT_QUIET_INTERVAL_MS: u64 = 1500;

/// 应用配置（部分更新）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 画布设置
    pub canvas: Option<CanvasSettings>,
    /// 猜测触发设置
    pub guess: Option<GuessSettings>,
    /// 分类服务设置
    pub classifier: Option<ClassifierSettings>,
    /// 历史设置
    pub history: Option<HistorySettings>,
    /// 日志设置
    pub logger_settings: Option<LoggerSettings>,
}

/// 持久化的应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedAppConfig {
    #[serde(default)]
    pub canvas: CanvasSettings,
    #[serde(default)]
    pub guess: GuessSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger_settings: Option<LoggerSettings>,
}

/// 画布设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasSettings {
    pub width: u32,
    pub height: u32,
    /// 背景色 RGBA
    pub background: [u8; 4],
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
            background: [255, 255, 255, 255],
        }
    }
}

/// 猜测触发设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessSettings {
    /// 停笔多久后发起识别（毫秒）
    pub quiet_interval_ms: u64,
    /// 请求的最大标签数
    pub max_results: u32,
    /// 低于该置信度的标签视为未识别
    pub min_confidence: f32,
}

impl Default for GuessSettings {
    fn default() -> Self {
        Self {
            quiet_interval_ms: DEFAULT_QUIET_INTERVAL_MS,
            max_results: 5,
            min_confidence: 0.5,
        }
    }
}

/// 分类服务设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API密钥，未配置时回退到 VISION_API_KEY 环境变量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://vision.googleapis.com/v1/images:annotate".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClassifierSettings {
    /// 环境变量名
    pub const API_KEY_ENV: &'static str = "VISION_API_KEY";

    /// 获取实际使用的API密钥（配置优先，其次环境变量）
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(Self::API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// 历史设置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistorySettings {
    /// 最多保留的快照数，0 表示不限制
    pub max_entries: usize,
}

/// 日志设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// 日志级别: trace/debug/info/warn/error
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 画布坐标（像素）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 绘图工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Pencil,
    Eraser,
}

/// 笔触样式
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: [u8; 4],
    pub width: f32,
}

impl ToolKind {
    /// 根据工具和背景色得到笔触样式，橡皮擦用背景色覆盖
    pub fn style(&self, background: [u8; 4]) -> StrokeStyle {
        match self {
            Self::Pencil => StrokeStyle {
                color: [0, 0, 0, 255],
                width: 2.0,
            },
            Self::Eraser => StrokeStyle {
                color: background,
                width: 12.0,
            },
        }
    }
}

/// 用户输入事件（回放脚本格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    PointerLeave,
    SelectTool { tool: ToolKind },
    Undo,
    Redo,
    ClearAll,
    /// 回放时暂停指定毫秒
    Wait { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_script_deserialization() {
        let json = r#"[
            {"type": "pointer_down", "x": 10, "y": 12.5},
            {"type": "pointer_move", "x": 20, "y": 30},
            {"type": "pointer_up"},
            {"type": "select_tool", "tool": "eraser"},
            {"type": "wait", "ms": 2000},
            {"type": "clear_all"}
        ]"#;

        let events: Vec<InputEvent> = serde_json::from_str(json).expect("解析失败");
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], InputEvent::PointerDown { x: 10.0, y: 12.5 });
        assert_eq!(
            events[3],
            InputEvent::SelectTool {
                tool: ToolKind::Eraser
            }
        );
        assert_eq!(events[4], InputEvent::Wait { ms: 2000 });
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PersistedAppConfig =
            serde_json::from_str(r#"{"guess": {"quiet_interval_ms": 800, "max_results": 3, "min_confidence": 0.2}}"#)
                .unwrap();
        assert_eq!(config.guess.quiet_interval_ms, 800);
        assert_eq!(config.canvas.width, 600);
        assert_eq!(config.canvas.height, 400);
        assert_eq!(config.classifier.timeout_secs, 15);
        assert_eq!(config.history.max_entries, 0);
    }

    #[test]
    fn test_eraser_paints_background() {
        let background = [250, 250, 240, 255];
        assert_eq!(ToolKind::Eraser.style(background).color, background);
        assert_eq!(ToolKind::Pencil.style(background).color, [0, 0, 0, 255]);
    }

    #[test]
    fn test_configured_api_key_wins() {
        let settings = ClassifierSettings {
            api_key: Some("from-config".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.resolved_api_key().as_deref(), Some("from-config"));
    }
}
