//! 主机控制台模拟器：标准输入的每一行视为一次扫码，后端为本地演练客户端。
//!
//! 指令：`:start` `:stop` `:event <id>` `:manual <code>` `:status` `:quit`。
use std::collections::HashSet;
use std::convert::Infallible;
use std::io::{self, BufRead};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use smart_leds::RGB8;

use checkin_kiosk::api::ApiConfig;
use checkin_kiosk::engine::{CheckinEngine, EngineEvent, KioskClock};
use checkin_kiosk::feedback::{cue_pattern, FeedbackDevices};
use checkin_kiosk::model::{FeedbackKind, KioskSettings, ScanPayload, ScanSource};
use checkin_kiosk::net::{spawn_network_loop, CheckinClient, HttpReply, NetError};
use checkin_kiosk::pipeline::{run_engine_loop, KioskChannels};
use checkin_kiosk::scanner::ScannerDevice;
use checkin_kiosk::status::{BoardDisplay, StatusBoard};

const DRY_RUN_BACKEND: &str = "http://dry-run.local";

pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = KioskSettings::with_kiosk_id("host-sim");
    let clock = KioskClock::new();
    let board = StatusBoard::new();
    let KioskChannels {
        engine_tx,
        engine_rx,
        net_tx,
        net_rx,
    } = KioskChannels::new();

    let _net_handle = spawn_network_loop(
        DryRunBackend::default(),
        ApiConfig::new(DRY_RUN_BACKEND),
        net_rx,
        engine_tx.clone(),
    );
    let _console_handle = spawn_console_task(board.clone());
    let _stdin_handle = spawn_stdin_task(engine_tx.clone(), board.clone(), clock);

    let _ = engine_tx.send(EngineEvent::SetBackend {
        base_url: DRY_RUN_BACKEND.to_string(),
    });
    let _ = engine_tx.send(EngineEvent::SetEvent {
        event_id: "demo".to_string(),
    });
    drop(engine_tx);

    println!("签到模拟器已就绪：输入 :start 开始扫码，:quit 退出");
    let engine = CheckinEngine::new(
        settings,
        ConsoleScanner::default(),
        ConsoleIndicators,
        BoardDisplay::new(board.clone()),
        net_tx,
    );
    run_engine_loop(engine, engine_rx, board, clock);
}

/// 将一行输入翻译为引擎事件。
fn parse_line(line: &str, now_ms: u64) -> Option<EngineEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (command, arg) = match line.strip_prefix(':') {
        Some(rest) => match rest.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (rest, ""),
        },
        None => {
            return Some(EngineEvent::Decoded(ScanPayload::new(line, now_ms, ScanSource::Scanner)));
        }
    };
    match command {
        "start" => Some(EngineEvent::StartScanning),
        "stop" => Some(EngineEvent::StopScanning),
        "event" => Some(EngineEvent::SetEvent {
            event_id: arg.to_string(),
        }),
        "manual" => Some(EngineEvent::Decoded(ScanPayload::new(arg, now_ms, ScanSource::Manual))),
        "quit" => Some(EngineEvent::Shutdown),
        _ => None,
    }
}

fn spawn_stdin_task(
    engine_tx: Sender<EngineEvent>,
    board: StatusBoard,
    clock: KioskClock,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim() == ":status" {
                println!("{}", board.to_json_string());
                continue;
            }
            let Some(event) = parse_line(&line, clock.now_ms()) else {
                println!("未知指令：{}", line);
                continue;
            };
            // 输入本身也算一次用户活动
            if engine_tx.send(EngineEvent::Activity).is_err() || engine_tx.send(event).is_err() {
                return;
            }
        }
        let _ = engine_tx.send(EngineEvent::Shutdown);
    })
}

/// 轮询看板，把屏幕状态与新反馈打印到控制台。
fn spawn_console_task(board: StatusBoard) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_screen = "";
        let mut last_nonce = 0;
        loop {
            let snapshot = board.snapshot();
            let status = &snapshot.status;
            if status.screen != last_screen {
                last_screen = status.screen;
                match &status.camera_error {
                    Some(err) => println!("[屏幕] {}：{}", status.screen_label, err),
                    None => println!("[屏幕] {}", status.screen_label),
                }
            }
            if let Some(feedback) = &status.feedback {
                if feedback.nonce != last_nonce {
                    last_nonce = feedback.nonce;
                    println!("[{}] {}", feedback.label, feedback.message);
                }
            }
            thread::sleep(Duration::from_millis(100));
        }
    })
}

#[derive(Default)]
struct ConsoleScanner {
    acquired: bool,
}

impl ScannerDevice for ConsoleScanner {
    type Error = Infallible;

    fn start(&mut self) -> Result<(), Self::Error> {
        self.acquired = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.acquired = false;
        Ok(())
    }

    fn is_acquired(&self) -> bool {
        self.acquired
    }
}

struct ConsoleIndicators;

impl FeedbackDevices for ConsoleIndicators {
    type Error = Infallible;

    fn play_cue(&mut self, kind: FeedbackKind) -> Result<(), Self::Error> {
        let beeps = cue_pattern(kind).len();
        log::debug!("cue {} ({} beep(s))", kind.as_str(), beeps);
        Ok(())
    }

    fn set_indicator(&mut self, color: RGB8) -> Result<(), Self::Error> {
        log::debug!("indicator rgb({}, {}, {})", color.r, color.g, color.b);
        Ok(())
    }
}

/// 本地演练后端：同一报名编号第二次签到返回 409。
#[derive(Default)]
struct DryRunBackend {
    checked_in: HashSet<String>,
}

impl CheckinClient for DryRunBackend {
    fn post_json(&mut self, _url: &str, body: &str) -> Result<HttpReply, NetError> {
        let request: Value = serde_json::from_str(body)?;
        let registration_id = request["registration_id"].as_str().unwrap_or_default().to_string();
        if self.checked_in.insert(registration_id.clone()) {
            let reply = json!({"success": true, "message": format!("欢迎，{}", registration_id)});
            Ok(HttpReply::new(200, reply.to_string()))
        } else {
            Ok(HttpReply::new(409, json!({"message": "该报名已签到"}).to_string()))
        }
    }

    fn get(&mut self, url: &str) -> Result<HttpReply, NetError> {
        let event_id = url.rsplit('/').next().unwrap_or_default();
        Ok(HttpReply::new(200, json!({"title": format!("演练活动 {}", event_id)}).to_string()))
    }
}

