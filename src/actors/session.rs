// Session Actor - 使用Actor模式管理一次绘图会话
//
// 画布、历史和识别触发器都由Actor独占，输入通过消息传递进入
// 快照解码和识别请求在Actor之外运行，完成后以信号形式回到Actor

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::canvas::{RasterSurface, Snapshot};
use crate::classifier::{ClassificationRequest, Classifier, GuessOutcome, LabelAnnotation};
use crate::event_bus::{AppEvent, EventBus};
use crate::history::HistoryManager;
use crate::models::{PersistedAppConfig, Point, ToolKind};
use crate::trigger::{GuessTicket, GuessTrigger, Verdict};

/// 会话参数
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 停笔后的静默间隔
    pub quiet_interval: Duration,
    /// 请求的最大标签数
    pub max_results: u32,
    /// 最低置信度
    pub min_confidence: f32,
    /// 历史上限，0 表示不限制
    pub max_history: usize,
}

impl SessionOptions {
    pub fn from_config(config: &PersistedAppConfig) -> Self {
        Self {
            quiet_interval: Duration::from_millis(config.guess.quiet_interval_ms),
            max_results: config.guess.max_results,
            min_confidence: config.guess.min_confidence,
            max_history: config.history.max_entries,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&PersistedAppConfig::default())
    }
}

/// 会话命令
pub enum SessionCommand {
    /// 按下指针，开始笔画
    PointerDown { point: Point },

    /// 按住移动，继续笔画
    PointerMove { point: Point },

    /// 松开指针，结束笔画
    PointerUp,

    /// 指针离开画布，结束笔画
    PointerLeave,

    /// 选择工具
    SelectTool { tool: ToolKind },

    /// 撤销
    Undo,

    /// 重做
    Redo,

    /// 清空画布
    ClearAll,

    /// 获取会话状态
    GetState { reply: oneshot::Sender<SessionState> },

    /// 导出当前画布
    ExportSnapshot {
        reply: oneshot::Sender<Result<Snapshot>>,
    },

    /// 健康检查（Ping）
    HealthCheck { reply: oneshot::Sender<()> },
}

/// 会话状态
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: String,
    /// 历史游标，空历史为 -1
    pub cursor: i64,
    pub history_len: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub tool: ToolKind,
    pub drawing: bool,
    /// 是否有快照正在恢复
    pub restoring: bool,
    pub guess_phase: String,
    pub guess_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Undo,
    Redo,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undo => write!(f, "撤销"),
            Self::Redo => write!(f, "重做"),
        }
    }
}

/// 后台任务完成后回传给Actor的信号
enum SessionSignal<F> {
    RestoreFinished {
        epoch: u64,
        step: Step,
        cursor: Option<usize>,
        result: Result<F>,
    },
    GuessResolved {
        ticket: GuessTicket,
        result: Result<Vec<LabelAnnotation>>,
    },
}

/// 会话Actor
pub struct SessionActor<S: RasterSurface> {
    id: String,
    receiver: mpsc::Receiver<SessionCommand>,
    signal_tx: mpsc::UnboundedSender<SessionSignal<S::Frame>>,
    signal_rx: mpsc::UnboundedReceiver<SessionSignal<S::Frame>>,
    surface: S,
    history: HistoryManager<Snapshot>,
    trigger: GuessTrigger,
    classifier: Arc<dyn Classifier>,
    event_bus: Arc<EventBus>,
    options: SessionOptions,
    tool: ToolKind,
    /// 笔画进行中时为上一个点
    last_point: Option<Point>,
    /// 清空画布时递增，使进行中的恢复失效
    restore_epoch: u64,
    restoring: bool,
    in_flight: Option<JoinHandle<()>>,
    guess_text: Option<String>,
}

impl<S: RasterSurface> SessionActor<S> {
    /// 创建新的Actor
    pub fn new(
        surface: S,
        classifier: Arc<dyn Classifier>,
        event_bus: Arc<EventBus>,
        options: SessionOptions,
    ) -> (Self, SessionHandle) {
        let (sender, receiver) = mpsc::channel(256);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let actor = Self {
            id: uuid::Uuid::new_v4().to_string(),
            receiver,
            signal_tx,
            signal_rx,
            surface,
            history: HistoryManager::new(options.max_history),
            trigger: GuessTrigger::new(options.quiet_interval),
            classifier,
            event_bus,
            options,
            tool: ToolKind::default(),
            last_point: None,
            restore_epoch: 0,
            restoring: false,
            in_flight: None,
            guess_text: None,
        };
        let handle = SessionHandle { sender };
        (actor, handle)
    }

    /// 运行Actor（在单独的任务中运行）
    pub async fn run(mut self) {
        info!(
            "Session Actor 已启动: {} (识别服务: {}, 静默间隔 {:?})",
            self.id,
            self.classifier.name(),
            self.trigger.quiet_interval()
        );
        if !self.classifier.is_configured() {
            warn!("识别服务 {} 未配置，猜测将显示失败信息", self.classifier.name());
        }

        loop {
            let deadline = self.trigger.deadline();
            tokio::select! {
                biased;

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },

                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),

                _ = wait_until(deadline) => self.fire_guess(),
            }
        }

        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        info!("Session Actor 已停止: {}", self.id);
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::PointerDown { point } => self.start_stroke(point),

            SessionCommand::PointerMove { point } => self.continue_stroke(point),

            SessionCommand::PointerUp | SessionCommand::PointerLeave => self.end_stroke(),

            SessionCommand::SelectTool { tool } => {
                self.tool = tool;
                debug!("已切换工具: {:?}", tool);
            }

            SessionCommand::Undo => self.step_history(Step::Undo),

            SessionCommand::Redo => self.step_history(Step::Redo),

            SessionCommand::ClearAll => self.clear_all(),

            SessionCommand::GetState { reply } => {
                let _ = reply.send(self.state());
            }

            SessionCommand::ExportSnapshot { reply } => {
                let _ = reply.send(self.surface.export_snapshot());
            }

            SessionCommand::HealthCheck { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn state(&self) -> SessionState {
        SessionState {
            session_id: self.id.clone(),
            cursor: self.history.position(),
            history_len: self.history.len(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            tool: self.tool,
            drawing: self.last_point.is_some(),
            restoring: self.restoring,
            guess_phase: self.trigger.phase().name().to_string(),
            guess_text: self.guess_text.clone(),
        }
    }

    // --- 笔画 ---

    fn start_stroke(&mut self, point: Point) {
        if self.restoring {
            debug!("快照恢复中，忽略落笔");
            return;
        }
        if self.last_point.is_some() {
            // 没有收到抬笔事件，先结束上一笔
            self.end_stroke();
        }
        self.last_point = Some(point);
    }

    fn continue_stroke(&mut self, point: Point) {
        let Some(from) = self.last_point else {
            return;
        };
        let style = self.tool.style(self.surface.background());
        self.surface.paint_segment(from, point, style);
        self.last_point = Some(point);
        self.trigger.notify_activity(Instant::now());
    }

    fn end_stroke(&mut self) {
        if self.last_point.take().is_none() {
            return;
        }

        match self.surface.export_snapshot() {
            Ok(snapshot) => {
                self.history.commit(snapshot);
                let cursor = self.history.cursor().unwrap_or_default();
                debug!("笔画已提交: 游标 {}, 历史 {} 条", cursor, self.history.len());
                self.event_bus.publish(AppEvent::StrokeCommitted {
                    cursor,
                    history_len: self.history.len(),
                });
            }
            Err(e) => {
                warn!("导出快照失败，本次笔画不记录历史: {:#}", e);
            }
        }
    }

    // --- 撤销/重做 ---

    fn step_history(&mut self, step: Step) {
        if self.restoring {
            debug!("快照恢复中，忽略{}", step);
            return;
        }
        if self.last_point.is_some() {
            debug!("笔画进行中，忽略{}", step);
            return;
        }

        let snapshot = match step {
            Step::Undo => self.history.undo(),
            Step::Redo => self.history.redo(),
        };
        let Some(snapshot) = snapshot else {
            debug!("没有可{}的内容", step);
            return;
        };

        let cursor = self.history.cursor();
        self.restoring = true;
        if let Some(cursor) = cursor {
            self.event_bus.publish(AppEvent::HistoryMoved { cursor });
        }

        let epoch = self.restore_epoch;
        let signal_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || S::decode_snapshot(&snapshot))
                .await
            {
                Ok(result) => result,
                Err(e) => Err(anyhow!("快照解码任务失败: {}", e)),
            };
            let _ = signal_tx.send(SessionSignal::RestoreFinished {
                epoch,
                step,
                cursor,
                result,
            });
        });
    }

    fn finish_restore(
        &mut self,
        epoch: u64,
        step: Step,
        cursor: Option<usize>,
        result: Result<S::Frame>,
    ) {
        if epoch != self.restore_epoch {
            debug!("画布已清空，丢弃过期的快照恢复");
            return;
        }
        self.restoring = false;

        match result.and_then(|frame| self.surface.apply_frame(frame)) {
            Ok(()) => {
                debug!("{}完成，游标 {:?}", step, cursor);
                self.event_bus.publish(AppEvent::SnapshotRestored { cursor });
            }
            Err(e) => {
                // 画布没有变化，游标退回原位
                warn!("{}失败: {:#}", step, e);
                match step {
                    Step::Undo => self.history.redo(),
                    Step::Redo => self.history.undo(),
                };
                self.event_bus.publish(AppEvent::RestoreFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    // --- 清空 ---

    fn clear_all(&mut self) {
        self.surface.clear();
        self.history.clear();

        if self.trigger.cancel() {
            debug!("已取消待处理的识别 (代数 {})", self.trigger.generation());
        }
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }

        self.restore_epoch += 1;
        self.restoring = false;
        self.last_point = None;
        self.guess_text = None;

        info!("画布已清空");
        self.event_bus.publish(AppEvent::CanvasCleared);
    }

    // --- 识别 ---

    fn fire_guess(&mut self) {
        let Some(ticket) = self.trigger.fire(Instant::now()) else {
            return;
        };

        let snapshot = match self.surface.export_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let _ = self.signal_tx.send(SessionSignal::GuessResolved {
                    ticket,
                    result: Err(e),
                });
                return;
            }
        };

        let request = ClassificationRequest {
            image_png: snapshot.png_bytes().to_vec(),
            max_results: self.options.max_results,
        };

        info!("发起识别请求 (代数 {})", ticket.generation);
        self.event_bus.publish(AppEvent::GuessRequested {
            generation: ticket.generation,
            timestamp: chrono::Utc::now(),
        });

        let classifier = self.classifier.clone();
        let signal_tx = self.signal_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = classifier.classify(request).await;
            let _ = signal_tx.send(SessionSignal::GuessResolved { ticket, result });
        }));
    }

    fn finish_guess(&mut self, ticket: GuessTicket, result: Result<Vec<LabelAnnotation>>) {
        match self.trigger.resolve(ticket, Instant::now()) {
            Verdict::Stale => {
                trace!("丢弃过期的识别结果 (代数 {})", ticket.generation);
                self.event_bus.publish(AppEvent::GuessDiscarded {
                    generation: ticket.generation,
                });
            }
            Verdict::Accepted => {
                self.in_flight = None;
                let outcome = GuessOutcome::from_labels(result, self.options.min_confidence);
                if outcome.is_failure() {
                    warn!("识别失败: {:?}", outcome);
                } else {
                    info!("识别结果: {:?}", outcome);
                }

                let text = outcome.display_text();
                self.guess_text = Some(text.clone());
                self.event_bus.publish(AppEvent::GuessUpdated {
                    text,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }

    fn handle_signal(&mut self, signal: SessionSignal<S::Frame>) {
        match signal {
            SessionSignal::RestoreFinished {
                epoch,
                step,
                cursor,
                result,
            } => self.finish_restore(epoch, step, cursor, result),
            SessionSignal::GuessResolved { ticket, result } => self.finish_guess(ticket, result),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// 会话Handle（用于与Actor通信，可克隆）
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| anyhow!("Actor通道已关闭"))
    }

    /// 落笔
    pub async fn pointer_down(&self, point: Point) -> Result<()> {
        self.send(SessionCommand::PointerDown { point }).await
    }

    /// 移动
    pub async fn pointer_move(&self, point: Point) -> Result<()> {
        self.send(SessionCommand::PointerMove { point }).await
    }

    /// 抬笔
    pub async fn pointer_up(&self) -> Result<()> {
        self.send(SessionCommand::PointerUp).await
    }

    /// 指针离开画布
    pub async fn pointer_leave(&self) -> Result<()> {
        self.send(SessionCommand::PointerLeave).await
    }

    /// 选择工具
    pub async fn select_tool(&self, tool: ToolKind) -> Result<()> {
        self.send(SessionCommand::SelectTool { tool }).await
    }

    /// 撤销
    pub async fn undo(&self) -> Result<()> {
        self.send(SessionCommand::Undo).await
    }

    /// 重做
    pub async fn redo(&self) -> Result<()> {
        self.send(SessionCommand::Redo).await
    }

    /// 清空画布
    pub async fn clear_all(&self) -> Result<()> {
        self.send(SessionCommand::ClearAll).await
    }

    /// 获取会话状态
    pub async fn state(&self) -> Result<SessionState> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::GetState { reply }).await?;
        rx.await.map_err(|_| anyhow!("Actor已停止"))
    }

    /// 导出当前画布
    pub async fn export_snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ExportSnapshot { reply }).await?;
        rx.await.map_err(|_| anyhow!("Actor已停止"))?
    }

    /// 健康检查
    /// 返回true表示Actor正常运行，false表示Actor无响应或已停止
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();

        if self
            .sender
            .send(SessionCommand::HealthCheck { reply })
            .await
            .is_err()
        {
            warn!("Session Actor 健康检查失败: 通道已关闭");
            return false;
        }

        match tokio::time::timeout(Duration::from_secs(5), rx).await {
            Ok(Ok(())) => {
                debug!("Session Actor 健康检查成功");
                true
            }
            Ok(Err(_)) => {
                warn!("Session Actor 健康检查失败: Actor已停止");
                false
            }
            Err(_) => {
                warn!("Session Actor 健康检查失败: 超时(5秒)");
                false
            }
        }
    }
}
