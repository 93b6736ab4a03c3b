// 识别触发器 - 防抖 + 可取消的分类请求状态机
//
// 状态: Idle -> Armed -> InFlight -> Idle
// 代数(generation)在取消时递增，用于丢弃过期的响应

use std::time::Duration;
use tokio::time::Instant;

/// 触发器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessPhase {
    /// 空闲
    Idle,
    /// 计时中，到期后发起请求
    Armed { deadline: Instant },
    /// 请求进行中；rearm 为真时请求结束后立即重新计时
    InFlight { generation: u64, rearm: bool },
}

impl GuessPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed { .. } => "armed",
            Self::InFlight { rearm: false, .. } => "in_flight",
            Self::InFlight { rearm: true, .. } => "in_flight_rearm",
        }
    }
}

/// 已发出请求的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessTicket {
    pub generation: u64,
}

/// 请求结束后的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 结果可以显示
    Accepted,
    /// 结果已过期，丢弃
    Stale,
}

/// 识别触发器
#[derive(Debug)]
pub struct GuessTrigger {
    quiet_interval: Duration,
    phase: GuessPhase,
    generation: u64,
}

impl GuessTrigger {
    pub fn new(quiet_interval: Duration) -> Self {
        Self {
            quiet_interval,
            phase: GuessPhase::Idle,
            generation: 0,
        }
    }

    pub fn phase(&self) -> GuessPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn quiet_interval(&self) -> Duration {
        self.quiet_interval
    }

    /// 记录一次绘图活动
    pub fn notify_activity(&mut self, now: Instant) {
        match &mut self.phase {
            GuessPhase::InFlight { rearm, .. } => *rearm = true,
            _ => {
                self.phase = GuessPhase::Armed {
                    deadline: now + self.quiet_interval,
                }
            }
        }
    }

    /// 当前计时器的到期时间
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            GuessPhase::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// 计时器到期：进入请求中状态并返回凭据
    pub fn fire(&mut self, now: Instant) -> Option<GuessTicket> {
        match self.phase {
            GuessPhase::Armed { deadline } if now >= deadline => {
                self.phase = GuessPhase::InFlight {
                    generation: self.generation,
                    rearm: false,
                };
                Some(GuessTicket {
                    generation: self.generation,
                })
            }
            _ => None,
        }
    }

    /// 请求结束（成功或失败）
    pub fn resolve(&mut self, ticket: GuessTicket, now: Instant) -> Verdict {
        if ticket.generation != self.generation {
            return Verdict::Stale;
        }

        match self.phase {
            GuessPhase::InFlight { generation, rearm } if generation == ticket.generation => {
                self.phase = if rearm {
                    GuessPhase::Armed {
                        deadline: now + self.quiet_interval,
                    }
                } else {
                    GuessPhase::Idle
                };
                Verdict::Accepted
            }
            _ => Verdict::Stale,
        }
    }

    /// 取消计时和进行中的请求；返回取消前是否有待处理的猜测
    pub fn cancel(&mut self) -> bool {
        let pending = self.phase != GuessPhase::Idle;
        self.generation += 1;
        self.phase = GuessPhase::Idle;
        pending
    }
}
