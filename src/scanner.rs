use std::fmt;

/// 扫码器外设（摄像头/解码模组）需要提供的生命周期操作。
pub trait ScannerDevice {
    type Error: fmt::Debug;

    /// 获取设备并开始持续解码。
    fn start(&mut self) -> Result<(), Self::Error>;

    /// 暂停投递解码结果，不释放设备。
    fn pause(&mut self) -> Result<(), Self::Error>;

    fn resume(&mut self) -> Result<(), Self::Error>;

    /// 释放设备。
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// 设备句柄是否仍然有效。
    fn is_acquired(&self) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScannerError {
    Acquire(String),
}

impl fmt::Display for ScannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerError::Acquire(message) => write!(f, "扫码器启动失败：{}", message),
        }
    }
}

/// 扫码会话（挂载时创建，卸载时销毁）。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScannerSession {
    pub running: bool,
    pub paused: bool,
    pub last_activity_at: u64,
}

/// 扫码器生命周期控制器，独占设备句柄并负责空闲看门狗。
pub struct ScannerController<D: ScannerDevice> {
    device: D,
    session: ScannerSession,
    idle_timeout_ms: u64,
    idle_stopped: bool,
    last_error: Option<String>,
}

impl<D: ScannerDevice> ScannerController<D> {
    pub fn new(device: D, idle_timeout_ms: u64) -> Self {
        Self {
            device,
            session: ScannerSession::default(),
            idle_timeout_ms,
            idle_stopped: false,
            last_error: None,
        }
    }

    /// 启动扫码并武装看门狗；已在运行时直接返回。
    pub fn start(&mut self, now: u64) -> Result<(), ScannerError> {
        if self.session.running {
            return Ok(());
        }
        if let Err(err) = self.device.start() {
            let message = format!("{:?}", err);
            log::warn!("Scanner start failed: {}", message);
            self.last_error = Some(message.clone());
            return Err(ScannerError::Acquire(message));
        }
        log::info!("Scanner started");
        self.session = ScannerSession {
            running: true,
            paused: false,
            last_activity_at: now,
        };
        self.idle_stopped = false;
        self.last_error = None;
        Ok(())
    }

    /// 冻结解码投递（提交期间防止同一胸牌被重复解码）。
    pub fn pause(&mut self) {
        if !self.session.running || self.session.paused {
            return;
        }
        if let Err(err) = self.device.pause() {
            log::warn!("Scanner pause failed: {:?}", err);
        }
        self.session.paused = true;
    }

    /// 恢复投递；设备句柄丢失时退回完整 start。
    pub fn resume(&mut self, now: u64) -> Result<(), ScannerError> {
        if !self.session.running {
            return Ok(());
        }
        if !self.device.is_acquired() {
            log::warn!("Scanner handle missing on resume, restarting");
            self.session.running = false;
            return self.start(now);
        }
        if let Err(err) = self.device.resume() {
            log::warn!("Scanner resume failed: {:?}, restarting", err);
            self.release_device();
            self.session.running = false;
            return self.start(now);
        }
        self.session.paused = false;
        Ok(())
    }

    /// 释放设备并清除看门狗。
    pub fn stop(&mut self) {
        if self.session.running || self.device.is_acquired() {
            self.release_device();
            log::info!("Scanner stopped");
        }
        self.session.running = false;
        self.session.paused = false;
    }

    /// 用户交互信号：重置看门狗。
    pub fn note_activity(&mut self, now: u64) {
        if self.session.running && !self.idle_stopped {
            self.session.last_activity_at = now;
        }
    }

    /// 检查空闲超时；超时则停止扫码并返回 true。
    ///
    /// `busy` 为 true（提交或冷却中）时不触发。
    pub fn check_idle(&mut self, now: u64, busy: bool) -> bool {
        if !self.session.running || busy {
            return false;
        }
        if now.saturating_sub(self.session.last_activity_at) < self.idle_timeout_ms {
            return false;
        }
        log::info!(
            "No activity for {} ms, idling scanner",
            now.saturating_sub(self.session.last_activity_at)
        );
        self.stop();
        self.idle_stopped = true;
        true
    }

    pub fn is_running(&self) -> bool {
        self.session.running
    }

    /// 是否应当接收解码结果（运行中且未暂停）。
    pub fn is_delivering(&self) -> bool {
        self.session.running && !self.session.paused
    }

    pub fn is_idle_stopped(&self) -> bool {
        self.idle_stopped
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session(&self) -> &ScannerSession {
        &self.session
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn release_device(&mut self) {
        if let Err(err) = self.device.stop() {
            log::warn!("Scanner release failed: {:?}", err);
        }
    }
}

impl<D: ScannerDevice> Drop for ScannerController<D> {
    fn drop(&mut self) {
        // 任何退出路径都必须释放设备
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Probe {
        calls: Vec<&'static str>,
        acquired: bool,
        fail_start: bool,
    }

    #[derive(Clone, Default)]
    struct FakeScanner(Rc<RefCell<Probe>>);

    impl ScannerDevice for FakeScanner {
        type Error = &'static str;

        fn start(&mut self) -> Result<(), Self::Error> {
            let mut probe = self.0.borrow_mut();
            probe.calls.push("start");
            if probe.fail_start {
                return Err("no camera");
            }
            probe.acquired = true;
            Ok(())
        }

        fn pause(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().calls.push("pause");
            Ok(())
        }

        fn resume(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().calls.push("resume");
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Self::Error> {
            let mut probe = self.0.borrow_mut();
            probe.calls.push("stop");
            probe.acquired = false;
            Ok(())
        }

        fn is_acquired(&self) -> bool {
            self.0.borrow().acquired
        }
    }

    fn controller() -> (ScannerController<FakeScanner>, FakeScanner) {
        let device = FakeScanner::default();
        (ScannerController::new(device.clone(), 180_000), device)
    }

    #[test]
    fn pause_and_resume_keep_device() {
        let (mut ctl, probe) = controller();
        ctl.start(0).unwrap();
        ctl.pause();
        assert!(ctl.is_running());
        assert!(!ctl.is_delivering());
        ctl.resume(10).unwrap();
        assert!(ctl.is_delivering());
        assert_eq!(probe.0.borrow().calls, vec!["start", "pause", "resume"]);
    }

    #[test]
    fn resume_without_handle_restarts() {
        let (mut ctl, probe) = controller();
        ctl.start(0).unwrap();
        ctl.pause();
        probe.0.borrow_mut().acquired = false;
        ctl.resume(50).unwrap();
        assert!(ctl.is_delivering());
        assert_eq!(probe.0.borrow().calls, vec!["start", "pause", "start"]);
    }

    #[test]
    fn resume_after_stop_does_not_restart() {
        let (mut ctl, probe) = controller();
        ctl.start(0).unwrap();
        ctl.stop();
        ctl.resume(10).unwrap();
        assert!(!ctl.is_running());
        assert_eq!(probe.0.borrow().calls, vec!["start", "stop"]);
    }

    #[test]
    fn start_failure_is_persistent_until_retry() {
        let (mut ctl, probe) = controller();
        probe.0.borrow_mut().fail_start = true;
        assert!(ctl.start(0).is_err());
        assert!(!ctl.is_running());
        assert_eq!(ctl.last_error(), Some("\"no camera\""));
        probe.0.borrow_mut().fail_start = false;
        ctl.start(5).unwrap();
        assert_eq!(ctl.last_error(), None);
    }

    #[test]
    fn idle_watchdog_stops_camera() {
        let (mut ctl, probe) = controller();
        ctl.start(0).unwrap();
        ctl.note_activity(60_000);
        assert!(!ctl.check_idle(239_999, false));
        assert!(ctl.check_idle(240_000, false));
        assert!(!ctl.is_running());
        assert!(ctl.is_idle_stopped());
        assert!(!probe.0.borrow().acquired);
    }

    #[test]
    fn idle_watchdog_waits_while_busy() {
        let (mut ctl, _probe) = controller();
        ctl.start(0).unwrap();
        assert!(!ctl.check_idle(200_000, true));
        assert!(ctl.is_running());
    }

    #[test]
    fn drop_releases_device() {
        let (mut ctl, probe) = controller();
        ctl.start(0).unwrap();
        drop(ctl);
        assert!(!probe.0.borrow().acquired);
        assert_eq!(probe.0.borrow().calls.last(), Some(&"stop"));
    }
}
