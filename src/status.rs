use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::engine::KioskDisplay;

/// 当前反馈横幅。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedbackView {
    pub kind: &'static str,
    pub css_class: &'static str,
    pub label: &'static str,
    pub message: String,
    pub fading: bool,
    pub nonce: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryView {
    pub key: String,
    pub kind: &'static str,
    pub message: String,
    pub at_ms: u64,
}

/// 引擎发布的状态快照（只由引擎线程写入）。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KioskStatus {
    pub kiosk_id: String,
    pub screen: &'static str,
    pub screen_label: &'static str,
    pub camera_error: Option<String>,
    pub idle_stopped: bool,
    pub event_id: Option<String>,
    pub event_title: Option<String>,
    pub feedback: Option<FeedbackView>,
    pub success_count: u32,
    pub failure_count: u32,
    pub recent: Vec<HistoryView>,
    pub backend_base_url: String,
    pub backend_reachable: Option<bool>,
}

impl KioskStatus {
    /// 是否在等待操作员开始（等待或扫码器异常）。
    pub fn awaiting_operator(&self) -> bool {
        self.screen == "waiting" || self.screen == "camera_error"
    }
}

impl Default for KioskStatus {
    fn default() -> Self {
        Self {
            kiosk_id: String::new(),
            screen: "waiting",
            screen_label: "等待开始",
            camera_error: None,
            idle_stopped: false,
            event_id: None,
            event_title: None,
            feedback: None,
            success_count: 0,
            failure_count: 0,
            recent: Vec::new(),
            backend_base_url: String::new(),
            backend_reachable: None,
        }
    }
}

/// 页面读取的完整快照（引擎状态 + 外围状态）。
#[derive(Clone, Debug, Default, Serialize)]
pub struct BoardSnapshot {
    #[serde(flatten)]
    pub status: KioskStatus,
    pub fullscreen: bool,
    pub wifi_connected: bool,
}

#[derive(Debug)]
pub struct BoardPoisoned;

#[derive(Default)]
struct BoardInner {
    status: KioskStatus,
    fullscreen: bool,
    wifi_connected: bool,
}

/// 状态看板：引擎写、Web 服务读。
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: KioskStatus) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.status = status;
        }
    }

    pub fn set_fullscreen(&self, fullscreen: bool) -> Result<(), BoardPoisoned> {
        let mut inner = self.inner.lock().map_err(|_| BoardPoisoned)?;
        inner.fullscreen = fullscreen;
        Ok(())
    }

    pub fn set_wifi_connected(&self, connected: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.wifi_connected = connected;
        }
    }

    /// 读取快照；锁异常时返回默认状态。
    pub fn snapshot(&self) -> BoardSnapshot {
        match self.inner.lock() {
            Ok(inner) => BoardSnapshot {
                status: inner.status.clone(),
                fullscreen: inner.fullscreen,
                wifi_connected: inner.wifi_connected,
            },
            Err(_) => BoardSnapshot::default(),
        }
    }

    /// 序列化为 /status 接口的 JSON。
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 通过看板通知页面进入/退出全屏（页面脚本负责实际请求）。
#[derive(Clone)]
pub struct BoardDisplay {
    board: StatusBoard,
}

impl BoardDisplay {
    pub fn new(board: StatusBoard) -> Self {
        Self { board }
    }
}

impl KioskDisplay for BoardDisplay {
    type Error = BoardPoisoned;

    fn enter_fullscreen(&mut self) -> Result<(), Self::Error> {
        self.board.set_fullscreen(true)
    }

    fn exit_fullscreen(&mut self) -> Result<(), Self::Error> {
        self.board.set_fullscreen(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_display_toggles_fullscreen_flag() {
        let board = StatusBoard::new();
        let mut display = BoardDisplay::new(board.clone());
        display.enter_fullscreen().unwrap();
        assert!(board.snapshot().fullscreen);
        display.exit_fullscreen().unwrap();
        assert!(!board.snapshot().fullscreen);
    }

    #[test]
    fn awaiting_operator_only_when_idle_or_broken() {
        let mut status = KioskStatus::default();
        assert!(status.awaiting_operator());
        status.screen = "camera_error";
        assert!(status.awaiting_operator());
        status.screen = "cooldown";
        assert!(!status.awaiting_operator());
    }

    #[test]
    fn snapshot_json_is_flat() {
        let board = StatusBoard::new();
        board.publish(KioskStatus {
            kiosk_id: "hall-a".to_string(),
            screen: "scanning",
            ..KioskStatus::default()
        });
        board.set_fullscreen(true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&board.to_json_string()).unwrap();
        assert_eq!(value["kiosk_id"], "hall-a");
        assert_eq!(value["screen"], "scanning");
        assert_eq!(value["fullscreen"], true);
        assert_eq!(value["wifi_connected"], false);
        assert!(value["feedback"].is_null());
    }
}
