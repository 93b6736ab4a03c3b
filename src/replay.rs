// 回放驱动 - 读取录制的输入脚本并逐条发送给会话

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::actors::SessionHandle;
use crate::models::{InputEvent, Point};

/// 从JSON文件加载输入脚本
pub async fn load_script(path: &Path) -> Result<Vec<InputEvent>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取输入脚本失败: {:?}", path))?;
    parse_script(&content)
}

pub fn parse_script(content: &str) -> Result<Vec<InputEvent>> {
    serde_json::from_str(content).context("输入脚本格式无效")
}

/// 发送单条输入事件
pub async fn replay_event(handle: &SessionHandle, event: &InputEvent) -> Result<()> {
    match event {
        InputEvent::PointerDown { x, y } => handle.pointer_down(Point::new(*x, *y)).await,
        InputEvent::PointerMove { x, y } => handle.pointer_move(Point::new(*x, *y)).await,
        InputEvent::PointerUp => handle.pointer_up().await,
        InputEvent::PointerLeave => handle.pointer_leave().await,
        InputEvent::SelectTool { tool } => handle.select_tool(*tool).await,
        InputEvent::Undo => handle.undo().await,
        InputEvent::Redo => handle.redo().await,
        InputEvent::ClearAll => handle.clear_all().await,
        InputEvent::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(())
        }
    }
}

/// 按顺序回放整个脚本
pub async fn replay_script(handle: &SessionHandle, events: &[InputEvent]) -> Result<()> {
    info!("开始回放 {} 条输入事件", events.len());
    for (index, event) in events.iter().enumerate() {
        debug!("回放事件 #{}: {:?}", index, event);
        replay_event(handle, event).await?;
    }
    info!("输入脚本回放完成");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{SessionActor, SessionOptions};
    use crate::canvas::PixelCanvas;
    use crate::classifier::{ClassificationRequest, Classifier, LabelAnnotation};
    use crate::event_bus::{AppEvent, EventBus};
    use crate::models::CanvasSettings;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FixedClassifier;

    #[async_trait]
    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn classify(&self, _request: ClassificationRequest) -> Result<Vec<LabelAnnotation>> {
            Ok(vec![LabelAnnotation::new("cat", 0.9)])
        }
    }

    #[test]
    fn test_parse_script_rejects_unknown_event() {
        assert!(parse_script(r#"[{"type": "teleport"}]"#).is_err());
        assert_eq!(parse_script("[]").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_load_script_missing_file() {
        let temp_dir = tempdir().unwrap();
        assert!(load_script(&temp_dir.path().join("missing.json")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_stroke_produces_guess() {
        let bus = Arc::new(EventBus::new(64));
        let mut events = bus.subscribe();
        let canvas = PixelCanvas::new(&CanvasSettings::default()).unwrap();
        let (actor, handle) = SessionActor::new(
            canvas,
            Arc::new(FixedClassifier),
            bus.clone(),
            SessionOptions::default(),
        );
        tokio::spawn(actor.run());

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("script.json");
        tokio::fs::write(
            &path,
            r#"[
                {"type": "pointer_down", "x": 10, "y": 10},
                {"type": "pointer_move", "x": 60, "y": 40},
                {"type": "pointer_up"},
                {"type": "wait", "ms": 2000}
            ]"#,
        )
        .await
        .unwrap();

        let script = load_script(&path).await.unwrap();
        replay_script(&handle, &script).await.unwrap();

        let text = loop {
            match events.recv().await.unwrap() {
                AppEvent::GuessUpdated { text, .. } => break text,
                _ => continue,
            }
        };
        assert_eq!(text, "Detected: cat");

        let state = handle.state().await.unwrap();
        assert_eq!(state.history_len, 1, "一次笔画应该提交一个快照");
        assert_eq!(state.guess_text.as_deref(), Some("Detected: cat"));
    }
}
