// 事件总线 - 用于会话与界面/观察者之间的解耦通信
//
// 使用 tokio::sync::broadcast 实现发布/订阅模式

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// 会话事件枚举
#[derive(Debug, Clone)]
pub enum AppEvent {
    // --- 历史事件 ---

    /// 笔画完成并提交快照
    StrokeCommitted {
        cursor: usize,
        history_len: usize,
    },

    /// 撤销/重做后游标移动（恢复开始）
    HistoryMoved {
        cursor: usize,
    },

    /// 快照已绘制到画布
    SnapshotRestored {
        cursor: Option<usize>,
    },

    /// 快照恢复失败
    RestoreFailed {
        error: String,
    },

    /// 画布已清空
    CanvasCleared,

    // --- 识别事件 ---

    /// 识别请求已发出
    GuessRequested {
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// 猜测文本已更新
    GuessUpdated {
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// 过期的识别结果已丢弃
    GuessDiscarded {
        generation: u64,
    },
}

/// 事件总线
///
/// 支持多个订阅者同时接收事件
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// - `capacity`: 事件缓冲区大小
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 如果没有订阅者,事件会被丢弃
    pub fn publish(&self, event: AppEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// 获取当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new(100);
        let mut receiver = bus.subscribe();

        bus.publish(AppEvent::GuessDiscarded { generation: 3 });

        match receiver.recv().await {
            Ok(AppEvent::GuessDiscarded { generation }) => {
                assert_eq!(generation, 3);
            }
            _ => panic!("未收到预期事件"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(AppEvent::StrokeCommitted {
            cursor: 0,
            history_len: 1,
        });

        assert!(receiver1.try_recv().is_ok());
        assert!(receiver2.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(AppEvent::CanvasCleared);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
