// Actor模块 - 使用Actor模式管理会话状态
//
// 画布、历史和识别触发器由会话Actor独占，外部只通过Handle发送消息

pub mod session;

pub use session::{SessionActor, SessionCommand, SessionHandle, SessionOptions, SessionState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelCanvas;
    use crate::classifier::VisionClassifier;
    use crate::event_bus::EventBus;
    use crate::models::{CanvasSettings, ClassifierSettings};
    use std::sync::Arc;

    fn new_session() -> (SessionActor<PixelCanvas>, SessionHandle) {
        let canvas = PixelCanvas::new(&CanvasSettings::default()).unwrap();
        let classifier = Arc::new(VisionClassifier::new(
            reqwest::Client::new(),
            &ClassifierSettings::default(),
        ));
        SessionActor::new(
            canvas,
            classifier,
            Arc::new(EventBus::new(16)),
            SessionOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_session_actor_health_check() {
        let (actor, handle) = new_session();

        tokio::spawn(async move {
            actor.run().await;
        });

        let is_healthy = handle.health_check().await;
        assert!(is_healthy, "SessionActor应该是健康的");
    }

    #[tokio::test]
    async fn test_health_check_after_actor_dropped() {
        // 创建Actor但不运行，直接drop
        let (actor, handle) = new_session();
        drop(actor);

        let is_healthy = handle.health_check().await;
        assert!(!is_healthy, "停止的Actor应该健康检查失败");
        assert!(handle.state().await.is_err());
        assert!(handle.undo().await.is_err());
    }
}
