use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::json;
use smart_leds::RGB8;

use checkin_kiosk::engine::{CheckinEngine, EngineEvent, KioskClock, KioskDisplay};
use checkin_kiosk::feedback::FeedbackDevices;
use checkin_kiosk::model::{CheckinRequest, FeedbackKind, KioskSettings, ScanPayload, ScanSource};
use checkin_kiosk::net::{NetCommand, NetError};
use checkin_kiosk::pipeline::{run_engine_loop, KioskChannels};
use checkin_kiosk::scanner::ScannerDevice;
use checkin_kiosk::status::StatusBoard;

const UUID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

#[derive(Default)]
struct ScannerProbe {
    starts: u32,
    pauses: u32,
    resumes: u32,
    stops: u32,
    acquired: bool,
    fail_start: bool,
}

#[derive(Clone, Default)]
struct FakeScanner(Arc<Mutex<ScannerProbe>>);

impl ScannerDevice for FakeScanner {
    type Error = &'static str;

    fn start(&mut self) -> Result<(), Self::Error> {
        let mut probe = self.0.lock().unwrap();
        if probe.fail_start {
            return Err("camera busy");
        }
        probe.starts += 1;
        probe.acquired = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), Self::Error> {
        self.0.lock().unwrap().pauses += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Self::Error> {
        self.0.lock().unwrap().resumes += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        let mut probe = self.0.lock().unwrap();
        probe.stops += 1;
        probe.acquired = false;
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.0.lock().unwrap().acquired
    }
}

#[derive(Clone, Default)]
struct FakeIndicators(Arc<Mutex<Vec<FeedbackKind>>>);

impl FeedbackDevices for FakeIndicators {
    type Error = &'static str;

    fn play_cue(&mut self, kind: FeedbackKind) -> Result<(), Self::Error> {
        self.0.lock().unwrap().push(kind);
        Ok(())
    }

    fn set_indicator(&mut self, _color: RGB8) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Default)]
struct DisplayProbe {
    enters: u32,
    exits: u32,
}

#[derive(Clone, Default)]
struct FakeDisplay(Arc<Mutex<DisplayProbe>>);

impl KioskDisplay for FakeDisplay {
    type Error = &'static str;

    fn enter_fullscreen(&mut self) -> Result<(), Self::Error> {
        self.0.lock().unwrap().enters += 1;
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<(), Self::Error> {
        self.0.lock().unwrap().exits += 1;
        Ok(())
    }
}

type TestEngine = CheckinEngine<FakeScanner, FakeIndicators, FakeDisplay>;

struct Kiosk {
    engine: TestEngine,
    net_rx: Receiver<NetCommand>,
    scanner: FakeScanner,
    cues: FakeIndicators,
    display: FakeDisplay,
}

impl Kiosk {
    fn new(event_id: Option<&str>) -> Self {
        let (net_tx, net_rx) = mpsc::channel();
        let scanner = FakeScanner::default();
        let cues = FakeIndicators::default();
        let display = FakeDisplay::default();
        let mut engine = CheckinEngine::new(
            KioskSettings::with_kiosk_id("test-kiosk"),
            scanner.clone(),
            cues.clone(),
            display.clone(),
            net_tx,
        );
        if let Some(event_id) = event_id {
            engine.handle(
                EngineEvent::SetEvent {
                    event_id: event_id.to_string(),
                },
                0,
            );
        }
        let kiosk = Self {
            engine,
            net_rx,
            scanner,
            cues,
            display,
        };
        kiosk.drain();
        kiosk
    }

    fn started(event_id: Option<&str>) -> Self {
        let mut kiosk = Self::new(event_id);
        kiosk.engine.handle(EngineEvent::StartScanning, 0);
        kiosk
    }

    fn scan(&mut self, text: &str, now: u64) {
        let payload = ScanPayload::new(text, now, ScanSource::Scanner);
        self.engine.handle(EngineEvent::Decoded(payload), now);
    }

    fn manual(&mut self, text: &str, now: u64) {
        let payload = ScanPayload::new(text, now, ScanSource::Manual);
        self.engine.handle(EngineEvent::Decoded(payload), now);
    }

    fn finish(&mut self, attempt: u32, result: Result<String, NetError>, now: u64) {
        self.engine
            .handle(EngineEvent::CheckinFinished { attempt, result }, now);
    }

    fn drain(&self) -> Vec<NetCommand> {
        self.net_rx.try_iter().collect()
    }

    fn next_checkin(&self) -> Option<(u32, CheckinRequest)> {
        self.drain().into_iter().find_map(|cmd| match cmd {
            NetCommand::Checkin { attempt, request } => Some((attempt, request)),
            _ => None,
        })
    }

    fn screen(&self) -> &'static str {
        self.engine.screen().as_str()
    }

    fn banner(&self) -> Option<(&'static str, String)> {
        self.engine
            .status()
            .feedback
            .map(|feedback| (feedback.kind, feedback.message))
    }
}

#[test]
fn uuid_badge_checks_in_and_resumes_after_network_cooldown() {
    let mut kiosk = Kiosk::started(Some("E1"));
    assert_eq!(kiosk.screen(), "scanning");

    kiosk.scan(&format!("https://checkin.example.org/r/{}", UUID), 1_000);
    assert_eq!(kiosk.screen(), "processing");
    assert_eq!(kiosk.scanner.0.lock().unwrap().pauses, 1);

    let (attempt, request) = kiosk.next_checkin().expect("check-in submitted");
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({"event_id": "E1", "registration_id": UUID})
    );

    kiosk.finish(attempt, Ok("欢迎参加".to_string()), 1_500);
    assert_eq!(kiosk.screen(), "cooldown");
    assert_eq!(kiosk.engine.pipeline().resume_at(), Some(4_500));
    assert_eq!(kiosk.banner(), Some(("success", "欢迎参加".to_string())));
    assert_eq!(*kiosk.cues.0.lock().unwrap(), vec![FeedbackKind::Success]);

    kiosk.engine.tick(4_499);
    assert_eq!(kiosk.screen(), "cooldown");
    kiosk.engine.tick(4_500);
    assert_eq!(kiosk.screen(), "scanning");
    assert!(!kiosk.engine.gate().is_processing());
    assert_eq!(kiosk.scanner.0.lock().unwrap().resumes, 1);
    assert_eq!(kiosk.engine.status().success_count, 1);
}

#[test]
fn unresolvable_payload_fails_locally_with_short_cooldown() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.scan("hello world", 1_000);

    assert!(kiosk.drain().is_empty());
    assert_eq!(kiosk.screen(), "cooldown");
    assert_eq!(kiosk.engine.pipeline().resume_at(), Some(2_000));
    assert_eq!(kiosk.banner(), Some(("failure", "无效二维码".to_string())));

    kiosk.engine.tick(2_000);
    assert_eq!(kiosk.screen(), "scanning");
}

#[test]
fn missing_event_fails_without_request() {
    let mut kiosk = Kiosk::started(None);
    kiosk.scan("12345", 500);

    assert!(kiosk.drain().is_empty());
    assert_eq!(kiosk.banner(), Some(("failure", "缺少活动信息".to_string())));
    assert_eq!(kiosk.engine.pipeline().resume_at(), Some(1_500));
}

#[test]
fn rescans_inside_debounce_window_are_ignored() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.scan("hello", 0);
    kiosk.engine.tick(1_000);
    assert_eq!(kiosk.screen(), "scanning");

    kiosk.scan("2002", 1_100);
    assert!(kiosk.next_checkin().is_none());
    assert_eq!(kiosk.screen(), "scanning");

    kiosk.scan("2002", 1_300);
    let (_, request) = kiosk.next_checkin().expect("accepted after debounce");
    assert_eq!(request.registration_id, "2002");
}

#[test]
fn same_badge_is_suppressed_after_failure_until_window_passes() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.scan("1001", 0);
    let (attempt, _) = kiosk.next_checkin().unwrap();
    kiosk.finish(attempt, Err(NetError::HttpStatus(409, Some("已签到".to_string()))), 500);
    assert_eq!(kiosk.banner(), Some(("failure", "已签到".to_string())));

    kiosk.engine.tick(3_500);
    assert_eq!(kiosk.screen(), "scanning");

    kiosk.scan("1001", 4_000);
    assert!(kiosk.next_checkin().is_none());

    kiosk.scan("1001", 6_600);
    assert!(kiosk.next_checkin().is_some());
}

#[test]
fn only_one_checkin_in_flight() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.scan("1001", 0);
    assert!(kiosk.next_checkin().is_some());

    // 扫码器已暂停；手动输入同样被闸门挡住
    kiosk.scan("2002", 2_000);
    kiosk.manual("2002", 2_000);
    assert!(kiosk.next_checkin().is_none());
    assert_eq!(kiosk.screen(), "processing");
}

#[test]
fn slow_backend_times_out_and_late_reply_is_ignored() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.scan("1001", 0);
    let (attempt, _) = kiosk.next_checkin().unwrap();

    kiosk.engine.tick(9_999);
    assert_eq!(kiosk.screen(), "processing");
    kiosk.engine.tick(10_000);
    assert_eq!(kiosk.banner(), Some(("failure", "请求超时".to_string())));
    assert_eq!(kiosk.engine.pipeline().resume_at(), Some(13_000));

    kiosk.finish(attempt, Ok("迟到的成功".to_string()), 11_000);
    let status = kiosk.engine.status();
    assert_eq!(status.success_count, 0);
    assert_eq!(status.failure_count, 1);
}

#[test]
fn idle_watchdog_stops_scanner_and_activity_extends_it() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.engine.handle(EngineEvent::Activity, 100_000);
    kiosk.engine.tick(180_000);
    assert_eq!(kiosk.screen(), "scanning");

    kiosk.engine.tick(280_000);
    assert_eq!(kiosk.screen(), "waiting");
    assert!(kiosk.engine.status().idle_stopped);
    assert!(!kiosk.scanner.0.lock().unwrap().acquired);

    // 停止后到达的解码结果不再处理
    kiosk.scan("1001", 281_000);
    assert!(kiosk.next_checkin().is_none());

    kiosk.engine.handle(EngineEvent::StartScanning, 300_000);
    assert_eq!(kiosk.screen(), "scanning");
    assert!(!kiosk.engine.status().idle_stopped);
}

#[test]
fn camera_failure_is_reported_and_retry_recovers() {
    let mut kiosk = Kiosk::new(Some("E1"));
    kiosk.scanner.0.lock().unwrap().fail_start = true;
    kiosk.engine.handle(EngineEvent::StartScanning, 0);

    let status = kiosk.engine.status();
    assert_eq!(status.screen, "camera_error");
    assert!(status.camera_error.unwrap().contains("camera busy"));
    assert_eq!(kiosk.display.0.lock().unwrap().enters, 0);

    kiosk.scanner.0.lock().unwrap().fail_start = false;
    kiosk.engine.handle(EngineEvent::StartScanning, 1_000);
    assert_eq!(kiosk.screen(), "scanning");
    assert_eq!(kiosk.display.0.lock().unwrap().enters, 1);
}

#[test]
fn stopping_mid_request_discards_the_result() {
    let mut kiosk = Kiosk::started(Some("E1"));
    kiosk.scan("1001", 0);
    let (attempt, _) = kiosk.next_checkin().unwrap();

    kiosk.engine.handle(EngineEvent::StopScanning, 200);
    kiosk.finish(attempt, Ok("欢迎".to_string()), 400);
    assert_eq!(kiosk.screen(), "waiting");
    assert!(kiosk.banner().is_none());
}

#[test]
fn teardown_releases_scanner_and_exits_fullscreen_once() {
    let mut kiosk = Kiosk::started(Some("E1"));
    assert_eq!(kiosk.display.0.lock().unwrap().enters, 1);

    kiosk.engine.teardown();
    kiosk.engine.teardown();
    assert!(!kiosk.scanner.0.lock().unwrap().acquired);
    assert_eq!(kiosk.display.0.lock().unwrap().exits, 1);

    let display = kiosk.display.clone();
    drop(kiosk);
    assert_eq!(display.0.lock().unwrap().exits, 1);
}

#[test]
fn dropping_engine_releases_scanner() {
    let kiosk = Kiosk::started(Some("E1"));
    let scanner = kiosk.scanner.clone();
    let display = kiosk.display.clone();
    drop(kiosk);
    assert!(!scanner.0.lock().unwrap().acquired);
    assert_eq!(display.0.lock().unwrap().exits, 1);
}

#[test]
fn engine_loop_publishes_status_until_shutdown() {
    let KioskChannels {
        engine_tx,
        engine_rx,
        net_tx,
        net_rx,
    } = KioskChannels::new();
    let scanner = FakeScanner::default();
    let engine = CheckinEngine::new(
        KioskSettings::with_kiosk_id("loop-kiosk"),
        scanner.clone(),
        FakeIndicators::default(),
        FakeDisplay::default(),
        net_tx,
    );
    let board = StatusBoard::new();
    let loop_board = board.clone();
    let handle = thread::spawn(move || {
        run_engine_loop(engine, engine_rx, loop_board, KioskClock::new());
    });

    engine_tx
        .send(EngineEvent::SetEvent {
            event_id: "E7".to_string(),
        })
        .unwrap();
    engine_tx.send(EngineEvent::StartScanning).unwrap();
    engine_tx.send(EngineEvent::Shutdown).unwrap();
    handle.join().unwrap();

    let snapshot = board.snapshot();
    assert_eq!(snapshot.status.kiosk_id, "loop-kiosk");
    assert_eq!(snapshot.status.event_id.as_deref(), Some("E7"));
    assert_eq!(snapshot.status.screen, "waiting");
    assert!(!scanner.0.lock().unwrap().acquired);
    assert!(net_rx
        .try_iter()
        .any(|cmd| matches!(cmd, NetCommand::FetchEvent { event_id } if event_id == "E7")));
}
