use std::fmt;

use serde::Serialize;

/// 签到成功但服务端未返回文案时的默认提示。
pub const DEFAULT_SUCCESS_MESSAGE: &str = "签到成功";

/// 扫码来源（扫码模组 / 操作员手动输入）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanSource {
    Scanner,
    Manual,
}

impl ScanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSource::Scanner => "scanner",
            ScanSource::Manual => "manual",
        }
    }
}

/// 一次成功解码的原始载荷。
#[derive(Clone, Debug)]
pub struct ScanPayload {
    pub text: String,
    pub received_at_ms: u64,
    pub source: ScanSource,
}

impl ScanPayload {
    pub fn new(text: impl Into<String>, received_at_ms: u64, source: ScanSource) -> Self {
        Self {
            text: text.into(),
            received_at_ms,
            source,
        }
    }
}

/// 反馈类型（成功/失败）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Failure,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Success => "success",
            FeedbackKind::Failure => "failure",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            FeedbackKind::Success => "tone-success",
            FeedbackKind::Failure => "tone-error",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedbackKind::Success => "成功",
            FeedbackKind::Failure => "失败",
        }
    }
}

/// 签到失败原因。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// 无法从二维码中解析出报名编号。
    InvalidPayload,
    /// 未配置活动编号。
    MissingEvent,
    /// 服务端拒绝（非 2xx 或业务失败）。
    Rejected(String),
    /// 传输层错误。
    Transport(String),
    Timeout,
    /// 服务端未返回可用响应。
    NoResponse,
}

impl FailureReason {
    /// 面向操作员/参会者的提示文案。
    pub fn message(&self) -> String {
        match self {
            FailureReason::InvalidPayload => "无效二维码".to_string(),
            FailureReason::MissingEvent => "缺少活动信息".to_string(),
            FailureReason::Rejected(message) => message.clone(),
            FailureReason::Transport(message) => format!("网络错误：{}", message),
            FailureReason::Timeout => "请求超时".to_string(),
            FailureReason::NoResponse => "服务器无有效响应".to_string(),
        }
    }

    /// 本地校验失败（未发起网络请求）。
    pub fn is_validation(&self) -> bool {
        matches!(self, FailureReason::InvalidPayload | FailureReason::MissingEvent)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// 一次签到的最终结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckinOutcome {
    Success(String),
    Failure(FailureReason),
}

impl CheckinOutcome {
    pub fn kind(&self) -> FeedbackKind {
        match self {
            CheckinOutcome::Success(_) => FeedbackKind::Success,
            CheckinOutcome::Failure(_) => FeedbackKind::Failure,
        }
    }

    pub fn message(&self) -> String {
        match self {
            CheckinOutcome::Success(message) => message.clone(),
            CheckinOutcome::Failure(reason) => reason.message(),
        }
    }

    /// 是否经过了网络请求（决定冷却时长）。
    pub fn is_network_backed(&self) -> bool {
        match self {
            CheckinOutcome::Success(_) => true,
            CheckinOutcome::Failure(reason) => !reason.is_validation(),
        }
    }
}

/// POST /checkins 请求体。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckinRequest {
    pub event_id: String,
    pub registration_id: String,
}

/// 签到屏幕状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreenState {
    Waiting,
    Scanning,
    Processing,
    Cooldown,
    CameraError(String),
}

impl ScreenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenState::Waiting => "waiting",
            ScreenState::Scanning => "scanning",
            ScreenState::Processing => "processing",
            ScreenState::Cooldown => "cooldown",
            ScreenState::CameraError(_) => "camera_error",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScreenState::Waiting => "等待开始",
            ScreenState::Scanning => "请出示二维码",
            ScreenState::Processing => "正在签到…",
            ScreenState::Cooldown => "请稍候",
            ScreenState::CameraError(_) => "扫码器异常",
        }
    }
}

/// 签到机运行参数（可配置项，单位毫秒）。
#[derive(Clone, Debug)]
pub struct KioskSettings {
    pub kiosk_id: String,
    pub debounce_ms: u64,
    pub dedup_window_ms: u64,
    pub idle_timeout_ms: u64,
    pub validation_cooldown_ms: u64,
    pub network_cooldown_ms: u64,
    pub feedback_fade_ms: u64,
    pub feedback_dismiss_ms: u64,
    pub request_timeout_ms: u64,
    pub tick_ms: u64,
    pub history_max: usize,
}

impl KioskSettings {
    /// 使用指定签到机 ID 构建默认参数。
    pub fn with_kiosk_id(id: impl Into<String>) -> Self {
        Self {
            kiosk_id: id.into(),
            debounce_ms: 1_200,
            dedup_window_ms: 6_000,
            idle_timeout_ms: 180_000,
            validation_cooldown_ms: 1_000,
            network_cooldown_ms: 3_000,
            feedback_fade_ms: 4_500,
            feedback_dismiss_ms: 5_000,
            request_timeout_ms: 10_000,
            tick_ms: 100,
            history_max: 20,
        }
    }
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self::with_kiosk_id("kiosk-unknown")
    }
}

impl fmt::Display for ScanPayload {
    /// 便于日志输出（截断过长载荷）。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.text.chars().take(48).collect();
        write!(
            f,
            "[{}@{}] {:?}{}",
            self.source.as_str(),
            self.received_at_ms,
            preview,
            if self.text.chars().count() > 48 { "…" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_validation_is_not_network_backed() {
        let invalid = CheckinOutcome::Failure(FailureReason::InvalidPayload);
        let missing = CheckinOutcome::Failure(FailureReason::MissingEvent);
        let timeout = CheckinOutcome::Failure(FailureReason::Timeout);
        let ok = CheckinOutcome::Success("欢迎".to_string());
        assert!(!invalid.is_network_backed());
        assert!(!missing.is_network_backed());
        assert!(timeout.is_network_backed());
        assert!(ok.is_network_backed());
        assert_eq!(invalid.kind(), FeedbackKind::Failure);
        assert_eq!(missing.message(), "缺少活动信息");
    }

    #[test]
    fn request_serializes_wire_field_names() {
        let request = CheckinRequest {
            event_id: "E1".to_string(),
            registration_id: "R9".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, serde_json::json!({"event_id": "E1", "registration_id": "R9"}));
    }
}
