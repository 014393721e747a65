use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::engine::{CheckinEngine, EngineEvent, KioskClock, KioskDisplay};
use crate::feedback::FeedbackDevices;
use crate::model::{CheckinOutcome, CheckinRequest, FailureReason, KioskSettings};
use crate::net::{NetCommand, NetError};
use crate::scanner::ScannerDevice;
use crate::status::StatusBoard;

/// 签到机的通道集合（引擎事件、网络命令）。
pub struct KioskChannels {
    pub engine_tx: Sender<EngineEvent>,
    pub engine_rx: Receiver<EngineEvent>,
    pub net_tx: Sender<NetCommand>,
    pub net_rx: Receiver<NetCommand>,
}

impl KioskChannels {
    /// 创建默认的 mpsc 通道。
    pub fn new() -> Self {
        let (engine_tx, engine_rx) = mpsc::channel();
        let (net_tx, net_rx) = mpsc::channel();
        Self {
            engine_tx,
            engine_rx,
            net_tx,
            net_rx,
        }
    }
}

impl Default for KioskChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// 正在等待后端响应的提交。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InFlight {
    pub attempt: u32,
    pub key: String,
    pub registration_id: String,
    pub deadline_ms: u64,
}

/// 一次提交得出结果后的收尾信息。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub key: String,
    pub outcome: CheckinOutcome,
    pub resume_at_ms: u64,
}

/// 闸门放行后的下一步。
#[derive(Debug)]
pub enum PipelineStep {
    /// 需要网络线程执行的签到请求。
    Submit(NetCommand),
    /// 本地校验失败，已得出结果。
    Completed(Completion),
}

/// 签到提交流程：校验 → 请求 → 结果 → 安排恢复扫码。
pub struct CheckinPipeline {
    validation_cooldown_ms: u64,
    network_cooldown_ms: u64,
    request_timeout_ms: u64,
    next_attempt: u32,
    in_flight: Option<InFlight>,
    resume_at: Option<u64>,
}

impl CheckinPipeline {
    pub fn new(settings: &KioskSettings) -> Self {
        Self {
            validation_cooldown_ms: settings.validation_cooldown_ms,
            network_cooldown_ms: settings.network_cooldown_ms,
            request_timeout_ms: settings.request_timeout_ms,
            next_attempt: 1,
            in_flight: None,
            resume_at: None,
        }
    }

    /// 开始一次提交；调用方需先暂停扫码器。
    pub fn begin(
        &mut self,
        key: String,
        registration_id: Option<String>,
        event_id: Option<&str>,
        now: u64,
    ) -> PipelineStep {
        let Some(registration_id) = registration_id else {
            return PipelineStep::Completed(self.finish(
                key,
                CheckinOutcome::Failure(FailureReason::InvalidPayload),
                now,
            ));
        };
        let Some(event_id) = event_id.filter(|id| !id.trim().is_empty()) else {
            return PipelineStep::Completed(self.finish(
                key,
                CheckinOutcome::Failure(FailureReason::MissingEvent),
                now,
            ));
        };
        let attempt = self.next_attempt;
        self.next_attempt = self.next_attempt.wrapping_add(1).max(1);
        self.in_flight = Some(InFlight {
            attempt,
            key,
            registration_id: registration_id.clone(),
            deadline_ms: now.saturating_add(self.request_timeout_ms),
        });
        PipelineStep::Submit(NetCommand::Checkin {
            attempt,
            request: CheckinRequest {
                event_id: event_id.trim().to_string(),
                registration_id,
            },
        })
    }

    /// 网络结果回传；attempt 不匹配（已超时或已取消）时忽略。
    pub fn complete(
        &mut self,
        attempt: u32,
        result: Result<String, NetError>,
        now: u64,
    ) -> Option<Completion> {
        match self.in_flight.as_ref() {
            Some(flight) if flight.attempt == attempt => {}
            _ => {
                log::warn!("Ignoring stale check-in result for attempt {}", attempt);
                return None;
            }
        }
        let flight = self.in_flight.take()?;
        let outcome = match result {
            Ok(message) => CheckinOutcome::Success(message),
            Err(err) => CheckinOutcome::Failure(err.into_failure()),
        };
        Some(self.finish(flight.key, outcome, now))
    }

    /// 超过请求期限仍无响应时判定为超时失败。
    pub fn expire(&mut self, now: u64) -> Option<Completion> {
        if !self.in_flight.as_ref().is_some_and(|f| now >= f.deadline_ms) {
            return None;
        }
        let flight = self.in_flight.take()?;
        log::warn!(
            "Check-in attempt {} for {} timed out",
            flight.attempt,
            flight.registration_id
        );
        Some(self.finish(flight.key, CheckinOutcome::Failure(FailureReason::Timeout), now))
    }

    /// 请求无法交给网络线程时直接以失败收尾。
    pub fn abort(&mut self, reason: FailureReason, now: u64) -> Option<Completion> {
        let flight = self.in_flight.take()?;
        Some(self.finish(flight.key, CheckinOutcome::Failure(reason), now))
    }

    /// 冷却结束时返回 true（只触发一次）。
    pub fn take_resume_due(&mut self, now: u64) -> bool {
        if self.resume_at.is_some_and(|at| now >= at) {
            self.resume_at = None;
            return true;
        }
        false
    }

    /// 丢弃进行中的提交与冷却（停止扫码时）。
    pub fn cancel(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            log::info!("Dropping in-flight check-in attempt {}", flight.attempt);
        }
        self.resume_at = None;
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_cooling_down(&self) -> bool {
        self.resume_at.is_some()
    }

    /// 提交中或冷却中。
    pub fn is_active(&self) -> bool {
        self.is_in_flight() || self.is_cooling_down()
    }

    pub fn resume_at(&self) -> Option<u64> {
        self.resume_at
    }

    fn finish(&mut self, key: String, outcome: CheckinOutcome, now: u64) -> Completion {
        let cooldown = if outcome.is_network_backed() {
            self.network_cooldown_ms
        } else {
            self.validation_cooldown_ms
        };
        let resume_at_ms = now.saturating_add(cooldown);
        self.resume_at = Some(resume_at_ms);
        Completion {
            key,
            outcome,
            resume_at_ms,
        }
    }
}

/// 引擎主循环：消费事件、推进计时器并发布状态，直到关闭或通道断开。
pub fn run_engine_loop<S, F, D>(
    mut engine: CheckinEngine<S, F, D>,
    events: Receiver<EngineEvent>,
    board: StatusBoard,
    clock: KioskClock,
) where
    S: ScannerDevice,
    F: FeedbackDevices,
    D: KioskDisplay,
{
    let tick = Duration::from_millis(engine.settings().tick_ms.max(10));
    board.publish(engine.status());
    loop {
        let keep_running = match events.recv_timeout(tick) {
            Ok(event) => engine.handle(event, clock.now_ms()),
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        };
        if !keep_running {
            break;
        }
        engine.tick(clock.now_ms());
        board.publish(engine.status());
    }
    engine.teardown();
    board.publish(engine.status());
    log::info!("Check-in engine stopped");
}
