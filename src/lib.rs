// 涂鸦识别 - 带撤销/重做的绘图会话，停笔后自动识别画的内容

pub mod actors;
pub mod canvas;
pub mod cli;
pub mod classifier;
pub mod event_bus;
pub mod history;
pub mod logger;
pub mod models;
pub mod replay;
pub mod settings;
pub mod trigger;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use actors::{SessionActor, SessionHandle, SessionOptions};
use canvas::{PixelCanvas, RasterSurface};
use classifier::VisionClassifier;
use cli::Cli;
use event_bus::{AppEvent, EventBus};
use settings::SettingsManager;

/// 配置文件路径环境变量
pub const CONFIG_ENV: &str = "DOODLE_GUESSER_CONFIG";

// ==================== 路径 ====================

/// 获取应用数据目录
pub fn data_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join("Library/Application Support/doodle-guesser")
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("doodle-guesser")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".local/share/doodle-guesser")
    }
}

/// 配置文件路径，环境变量优先
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => data_dir().join("config").join("doodle-guesser.json"),
    }
}

// ==================== 会话 ====================

/// 按配置创建会话并在后台运行
pub fn spawn_session(
    config: &models::PersistedAppConfig,
    event_bus: Arc<EventBus>,
) -> Result<SessionHandle> {
    let canvas = PixelCanvas::new(&config.canvas)?;

    let client = reqwest::Client::builder()
        .build()
        .context("HTTP客户端创建失败")?;
    let classifier = Arc::new(VisionClassifier::new(client, &config.classifier));

    let (actor, handle) = SessionActor::new(
        canvas,
        classifier,
        event_bus,
        SessionOptions::from_config(config),
    );
    tokio::spawn(actor.run());
    Ok(handle)
}

/// 在日志中输出会话事件
fn spawn_event_logger(event_bus: &EventBus) {
    let mut receiver = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(AppEvent::GuessUpdated { text, timestamp }) => {
                    info!("[{}] 猜测: {}", timestamp.format("%H:%M:%S%.3f"), text);
                }
                Ok(AppEvent::GuessDiscarded { generation }) => {
                    info!("丢弃过期的识别结果 (generation {})", generation);
                }
                Ok(AppEvent::RestoreFailed { error }) => {
                    warn!("快照恢复失败: {}", error);
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("事件日志落后，跳过 {} 条事件", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn write_final_canvas(handle: &SessionHandle, path: &Path) -> Result<()> {
    let snapshot = handle.export_snapshot().await?;
    let frame = PixelCanvas::decode_snapshot(&snapshot)?;
    frame
        .save(path)
        .with_context(|| format!("保存画布失败: {:?}", path))?;
    let (width, height) = snapshot.dimensions();
    info!("最终画布 ({}x{}) 已保存到 {:?}", width, height, path);
    Ok(())
}

// ==================== 应用入口 ====================

/// 回放输入脚本并输出最终的会话状态
pub async fn run(cli: Cli) -> Result<()> {
    let settings = SettingsManager::new(cli.config.unwrap_or_else(config_path)).await?;
    let config = settings.get().await;
    logger::init(&config.logger_settings.clone().unwrap_or_default())?;

    info!("初始化涂鸦识别会话...");
    let event_bus = Arc::new(EventBus::new(256));
    spawn_event_logger(&event_bus);
    let handle = spawn_session(&config, event_bus)?;

    let script = replay::load_script(&cli.script).await?;
    replay::replay_script(&handle, &script).await?;

    // 给最后一次识别留出时间
    let settle = Duration::from_millis(config.guess.quiet_interval_ms)
        + Duration::from_secs(config.classifier.timeout_secs);
    let deadline = tokio::time::Instant::now() + settle;
    loop {
        let state = handle.state().await?;
        if state.guess_phase == "idle" && !state.restoring {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("等待识别结果超时，当前阶段: {}", state.guess_phase);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if let Some(path) = cli.output {
        write_final_canvas(&handle, &path).await?;
    }

    let state = handle.state().await?;
    info!(
        "会话结束: 历史 {} 条，游标 {}，猜测: {}",
        state.history_len,
        state.cursor,
        state.guess_text.as_deref().unwrap_or("")
    );
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersistedAppConfig;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_path() {
        let path = data_dir().join("config").join("doodle-guesser.json");
        assert!(path.ends_with("config/doodle-guesser.json"));
        assert!(data_dir().to_string_lossy().contains("doodle-guesser"));
    }

    #[tokio::test]
    async fn test_spawn_session_with_defaults() {
        let config = PersistedAppConfig::default();
        let handle = spawn_session(&config, Arc::new(EventBus::new(16))).unwrap();
        assert!(handle.health_check().await);

        let state = handle.state().await.unwrap();
        assert_eq!(state.cursor, -1);
        assert_eq!(state.guess_phase, "idle");
    }

    #[tokio::test]
    async fn test_write_final_canvas() {
        let config = PersistedAppConfig::default();
        let handle = spawn_session(&config, Arc::new(EventBus::new(16))).unwrap();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("final.png");

        write_final_canvas(&handle, &path).await.unwrap();
        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (600, 400));
    }
}
