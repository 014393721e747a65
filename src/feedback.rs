use std::fmt;

use smart_leds::RGB8;

use crate::model::FeedbackKind;

/// 反馈展示状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedbackState {
    Hidden,
    Visible {
        kind: FeedbackKind,
        message: String,
        fading: bool,
    },
}

/// 反馈外设（提示音 + 指示灯），具体实现由固件或模拟器提供。
pub trait FeedbackDevices {
    type Error: fmt::Debug;

    fn play_cue(&mut self, kind: FeedbackKind) -> Result<(), Self::Error>;

    fn set_indicator(&mut self, color: RGB8) -> Result<(), Self::Error>;
}

/// 尽力而为的副作用：失败只记日志，不影响扫码流程。
pub fn best_effort<E: fmt::Debug>(label: &str, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            log::warn!("{} failed (ignored): {:?}", label, err);
            false
        }
    }
}

/// 将反馈类型映射到指示灯颜色。
pub fn feedback_color(kind: FeedbackKind) -> RGB8 {
    match kind {
        FeedbackKind::Success => RGB8 { r: 0, g: 255, b: 0 },
        FeedbackKind::Failure => RGB8 { r: 255, g: 0, b: 0 },
    }
}

/// 蜂鸣节奏（响/停，毫秒）：成功一长声，失败三短声。
pub fn cue_pattern(kind: FeedbackKind) -> &'static [(u32, u32)] {
    match kind {
        FeedbackKind::Success => &[(180, 0)],
        FeedbackKind::Failure => &[(70, 60), (70, 60), (70, 0)],
    }
}

/// 定时反馈展示器：显示 → 渐隐 → 隐藏。
pub struct FeedbackPresenter<F: FeedbackDevices> {
    devices: F,
    state: FeedbackState,
    fade_after_ms: u64,
    dismiss_after_ms: u64,
    fade_at: Option<u64>,
    hide_at: Option<u64>,
    nonce: u32,
}

impl<F: FeedbackDevices> FeedbackPresenter<F> {
    pub fn new(devices: F, fade_after_ms: u64, dismiss_after_ms: u64) -> Self {
        Self {
            devices,
            state: FeedbackState::Hidden,
            fade_after_ms,
            dismiss_after_ms,
            fade_at: None,
            hide_at: None,
            nonce: 0,
        }
    }

    /// 展示一次反馈；会取消上一次尚未触发的渐隐/隐藏计时。
    pub fn show(&mut self, kind: FeedbackKind, message: impl Into<String>, now: u64) {
        self.fade_at = None;
        self.hide_at = None;
        best_effort("audio cue", self.devices.play_cue(kind));
        best_effort("indicator", self.devices.set_indicator(feedback_color(kind)));
        self.state = FeedbackState::Visible {
            kind,
            message: message.into(),
            fading: false,
        };
        self.fade_at = Some(now.saturating_add(self.fade_after_ms));
        self.hide_at = Some(now.saturating_add(self.dismiss_after_ms));
        self.nonce = self.nonce.wrapping_add(1);
    }

    /// 推进计时器。
    pub fn tick(&mut self, now: u64) {
        if self.hide_at.is_some_and(|at| now >= at) {
            self.hide();
            return;
        }
        if self.fade_at.is_some_and(|at| now >= at) {
            self.fade_at = None;
            if let FeedbackState::Visible { fading, .. } = &mut self.state {
                *fading = true;
            }
        }
    }

    /// 立即隐藏并熄灭指示灯。
    pub fn hide(&mut self) {
        self.fade_at = None;
        self.hide_at = None;
        if self.state != FeedbackState::Hidden {
            self.state = FeedbackState::Hidden;
            best_effort("indicator", self.devices.set_indicator(RGB8::default()));
        }
    }

    pub fn state(&self) -> &FeedbackState {
        &self.state
    }

    /// 每次 show 自增，便于页面识别新反馈。
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn devices(&self) -> &F {
        &self.devices
    }
}
