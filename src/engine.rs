use std::fmt;
use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::api::normalize_backend_url;
use crate::feedback::{best_effort, FeedbackDevices, FeedbackPresenter, FeedbackState};
use crate::gate::ScanGate;
use crate::history::CheckinHistory;
use crate::model::{FailureReason, KioskSettings, ScanPayload, ScanSource, ScreenState};
use crate::net::{NetCommand, NetError};
use crate::pipeline::{CheckinPipeline, Completion, PipelineStep};
use crate::resolver::resolve;
use crate::scanner::{ScannerController, ScannerDevice};
use crate::status::{FeedbackView, HistoryView, KioskStatus};

/// 引擎消费的全部事件（解码、交互、网络回传、操作员指令）。
#[derive(Debug)]
pub enum EngineEvent {
    Decoded(ScanPayload),
    /// 全局用户交互（触摸/按键/滚动/指针）。
    Activity,
    StartScanning,
    StopScanning,
    SetEvent { event_id: String },
    SetBackend { base_url: String },
    CheckinFinished { attempt: u32, result: Result<String, NetError> },
    EventLoaded { event_id: String, title: String },
    EventLoadFailed { event_id: String, reason: String },
    Shutdown,
}

/// 全屏展示（尽力而为）。
pub trait KioskDisplay {
    type Error: fmt::Debug;

    fn enter_fullscreen(&mut self) -> Result<(), Self::Error>;

    fn exit_fullscreen(&mut self) -> Result<(), Self::Error>;
}

/// 单调时钟（毫秒，自启动起算），可在线程间复制。
#[derive(Clone, Copy, Debug)]
pub struct KioskClock {
    origin: Instant,
}

impl KioskClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for KioskClock {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前活动上下文。
#[derive(Clone, Debug, Default)]
pub struct EventContext {
    pub event_id: Option<String>,
    pub title: Option<String>,
}

/// 签到引擎：一次签到会话的全部状态，只在引擎线程上被修改。
pub struct CheckinEngine<S, F, D>
where
    S: ScannerDevice,
    F: FeedbackDevices,
    D: KioskDisplay,
{
    settings: KioskSettings,
    scanner: ScannerController<S>,
    gate: ScanGate,
    pipeline: CheckinPipeline,
    presenter: FeedbackPresenter<F>,
    display: D,
    fullscreen_requested: bool,
    event: EventContext,
    history: CheckinHistory,
    net_tx: Sender<NetCommand>,
    backend_base_url: String,
    backend_reachable: Option<bool>,
    torn_down: bool,
}

impl<S, F, D> CheckinEngine<S, F, D>
where
    S: ScannerDevice,
    F: FeedbackDevices,
    D: KioskDisplay,
{
    pub fn new(
        settings: KioskSettings,
        scanner: S,
        feedback: F,
        display: D,
        net_tx: Sender<NetCommand>,
    ) -> Self {
        Self {
            scanner: ScannerController::new(scanner, settings.idle_timeout_ms),
            gate: ScanGate::new(settings.debounce_ms, settings.dedup_window_ms),
            pipeline: CheckinPipeline::new(&settings),
            presenter: FeedbackPresenter::new(
                feedback,
                settings.feedback_fade_ms,
                settings.feedback_dismiss_ms,
            ),
            history: CheckinHistory::new(settings.history_max),
            settings,
            display,
            fullscreen_requested: false,
            event: EventContext::default(),
            net_tx,
            backend_base_url: String::new(),
            backend_reachable: None,
            torn_down: false,
        }
    }

    /// 处理一个事件；返回 false 表示引擎应当关闭。
    pub fn handle(&mut self, event: EngineEvent, now: u64) -> bool {
        match event {
            EngineEvent::Decoded(payload) => self.on_decoded(payload, now),
            EngineEvent::Activity => self.scanner.note_activity(now),
            EngineEvent::StartScanning => self.start_scanning(now),
            EngineEvent::StopScanning => self.stop_scanning(),
            EngineEvent::SetEvent { event_id } => self.set_event(&event_id),
            EngineEvent::SetBackend { base_url } => self.set_backend(base_url),
            EngineEvent::CheckinFinished { attempt, result } => {
                self.backend_reachable = Some(match &result {
                    Ok(_) => true,
                    Err(err) => !err.is_unreachable(),
                });
                if let Some(done) = self.pipeline.complete(attempt, result, now) {
                    self.finish(done, now);
                }
            }
            EngineEvent::EventLoaded { event_id, title } => {
                if self.event.event_id.as_deref() == Some(event_id.as_str()) {
                    log::info!("Event {} loaded: {}", event_id, title);
                    self.event.title = Some(title);
                }
            }
            EngineEvent::EventLoadFailed { event_id, reason } => {
                log::warn!("Event {} metadata unavailable: {}", event_id, reason);
            }
            EngineEvent::Shutdown => return false,
        }
        true
    }

    /// 推进所有计时器：请求超时、冷却恢复、反馈渐隐、空闲看门狗。
    pub fn tick(&mut self, now: u64) {
        if let Some(done) = self.pipeline.expire(now) {
            self.finish(done, now);
        }
        if self.pipeline.take_resume_due(now) {
            match self.scanner.resume(now) {
                Ok(()) => self.gate.release(),
                Err(err) => log::warn!("Scanner resume failed: {}", err),
            }
        }
        self.presenter.tick(now);
        let busy = self.pipeline.is_active() || self.gate.is_processing();
        if self.scanner.check_idle(now, busy) {
            self.gate.reset();
        }
    }

    /// 会话结束：停止扫码器、退出全屏（任意状态下均可调用，只执行一次）。
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.pipeline.cancel();
        self.scanner.stop();
        if self.fullscreen_requested {
            best_effort("fullscreen exit", self.display.exit_fullscreen());
            self.fullscreen_requested = false;
        }
        self.presenter.hide();
        log::info!("Check-in session torn down");
    }

    /// 切换活动；非空时拉取活动标题。
    pub fn set_event(&mut self, event_id: &str) {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            self.event = EventContext::default();
            return;
        }
        if self.event.event_id.as_deref() == Some(event_id) && self.event.title.is_some() {
            return;
        }
        self.event = EventContext {
            event_id: Some(event_id.to_string()),
            title: None,
        };
        log::info!("Event context set to {}", event_id);
        let cmd = NetCommand::FetchEvent {
            event_id: event_id.to_string(),
        };
        if self.net_tx.send(cmd).is_err() {
            log::warn!("Network task unavailable, event title not fetched");
        }
    }

    pub fn set_backend(&mut self, base_url: String) {
        let normalized = normalize_backend_url(base_url);
        if normalized.is_empty() {
            return;
        }
        self.backend_base_url = normalized.clone();
        self.backend_reachable = None;
        if self.net_tx.send(NetCommand::SetBackend { base_url: normalized }).is_err() {
            log::warn!("Network task unavailable, backend not updated");
        }
    }

    fn on_decoded(&mut self, payload: ScanPayload, now: u64) {
        // 暂停期间仍在通道中的解码结果直接丢弃
        if payload.source == ScanSource::Scanner && !self.scanner.is_delivering() {
            log::debug!("Dropping scan while not delivering: {}", payload);
            return;
        }
        let resolved = resolve(&payload.text);
        let key = match self.gate.accept(&payload.text, resolved.as_deref(), now) {
            Ok(key) => key,
            Err(rejection) => {
                log::debug!("Scan rejected ({}): {}", rejection.as_str(), payload);
                return;
            }
        };
        log::info!("Scan accepted {} -> {:?}", payload, resolved);
        // 先暂停再发起任何 I/O
        self.scanner.pause();
        self.scanner.note_activity(now);

        let event_id = self.event.event_id.clone();
        match self.pipeline.begin(key, resolved, event_id.as_deref(), now) {
            PipelineStep::Completed(done) => self.finish(done, now),
            PipelineStep::Submit(cmd) => {
                if self.net_tx.send(cmd).is_err() {
                    log::warn!("Network task unavailable, failing check-in");
                    let reason = FailureReason::Transport("网络任务已停止".to_string());
                    if let Some(done) = self.pipeline.abort(reason, now) {
                        self.finish(done, now);
                    }
                }
            }
        }
    }

    fn finish(&mut self, done: Completion, now: u64) {
        log::info!(
            "Check-in {} -> {} ({}), resume at {}",
            done.key,
            done.outcome.kind().as_str(),
            done.outcome.message(),
            done.resume_at_ms
        );
        self.gate.mark_handled(&done.key, now);
        self.history.record(&done.key, &done.outcome, now);
        self.presenter
            .show(done.outcome.kind(), done.outcome.message(), now);
    }

    fn start_scanning(&mut self, now: u64) {
        if self.scanner.is_running() {
            self.scanner.note_activity(now);
            return;
        }
        // 操作员显式重新开始：重置闸门
        self.gate.reset();
        self.pipeline.cancel();
        if self.scanner.start(now).is_err() {
            return;
        }
        if !self.fullscreen_requested {
            self.fullscreen_requested = true;
            best_effort("fullscreen enter", self.display.enter_fullscreen());
        }
    }

    fn stop_scanning(&mut self) {
        self.pipeline.cancel();
        self.scanner.stop();
        self.gate.reset();
    }

    /// 当前屏幕状态。
    pub fn screen(&self) -> ScreenState {
        if !self.scanner.is_running() {
            if let Some(err) = self.scanner.last_error() {
                return ScreenState::CameraError(err.to_string());
            }
        }
        if self.pipeline.is_in_flight() {
            return ScreenState::Processing;
        }
        if self.pipeline.is_cooling_down() {
            return ScreenState::Cooldown;
        }
        if self.scanner.is_running() {
            ScreenState::Scanning
        } else {
            ScreenState::Waiting
        }
    }

    /// 生成供页面展示的状态快照。
    pub fn status(&self) -> KioskStatus {
        let screen = self.screen();
        let camera_error = match &screen {
            ScreenState::CameraError(message) => Some(message.clone()),
            _ => None,
        };
        let feedback = match self.presenter.state() {
            FeedbackState::Hidden => None,
            FeedbackState::Visible {
                kind,
                message,
                fading,
            } => Some(FeedbackView {
                kind: kind.as_str(),
                css_class: kind.css_class(),
                label: kind.label(),
                message: message.clone(),
                fading: *fading,
                nonce: self.presenter.nonce(),
            }),
        };
        KioskStatus {
            kiosk_id: self.settings.kiosk_id.clone(),
            screen: screen.as_str(),
            screen_label: screen.label(),
            camera_error,
            idle_stopped: self.scanner.is_idle_stopped() && !self.scanner.is_running(),
            event_id: self.event.event_id.clone(),
            event_title: self.event.title.clone(),
            feedback,
            success_count: self.history.success_count(),
            failure_count: self.history.failure_count(),
            recent: self
                .history
                .recent()
                .map(|entry| HistoryView {
                    key: entry.key.clone(),
                    kind: entry.kind.as_str(),
                    message: entry.message.clone(),
                    at_ms: entry.at_ms,
                })
                .collect(),
            backend_base_url: self.backend_base_url.clone(),
            backend_reachable: self.backend_reachable,
        }
    }

    pub fn settings(&self) -> &KioskSettings {
        &self.settings
    }

    pub fn event(&self) -> &EventContext {
        &self.event
    }

    pub fn gate(&self) -> &ScanGate {
        &self.gate
    }

    pub fn pipeline(&self) -> &CheckinPipeline {
        &self.pipeline
    }

    pub fn scanner(&self) -> &ScannerController<S> {
        &self.scanner
    }

    pub fn presenter(&self) -> &FeedbackPresenter<F> {
        &self.presenter
    }

    pub fn history(&self) -> &CheckinHistory {
        &self.history
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}

impl<S, F, D> Drop for CheckinEngine<S, F, D>
where
    S: ScannerDevice,
    F: FeedbackDevices,
    D: KioskDisplay,
{
    fn drop(&mut self) {
        self.teardown();
    }
}
