use std::sync::mpsc::Sender;

use embedded_svc::http::Method;
use embedded_svc::io::Write as _;
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::io::EspIOError;

use checkin_kiosk::engine::{EngineEvent, KioskClock};
use checkin_kiosk::status::StatusBoard;
use checkin_kiosk::web::{parse_action, render_index};

/// 启动内置 HTTP 服务（签到页 + 操作接口）。
pub fn start_server(
    board: StatusBoard,
    engine_tx: Sender<EngineEvent>,
    clock: KioskClock,
) -> Result<EspHttpServer<'static>, EspIOError> {
    let mut server = EspHttpServer::new(&Configuration {
        stack_size: 10240,
        ..Default::default()
    })?;

    // 首页：签到屏
    let board_root = board.clone();
    server.fn_handler("/", Method::Get, move |req| {
        let page = render_index(&board_root.snapshot());
        req.into_response(200, Some("OK"), &[("content-type", "text/html; charset=utf-8")])?
            .write_all(page.as_bytes())
            .map(|_| ())
    })?;

    // 状态接口：页面每秒轮询
    let board_status = board.clone();
    server.fn_handler("/status", Method::Get, move |req| {
        let body = board_status.to_json_string();
        req.into_response(
            200,
            Some("OK"),
            &[("content-type", "application/json"), ("cache-control", "no-store")],
        )?
        .write_all(body.as_bytes())
        .map(|_| ())
    })?;

    // 操作接口：开始/停止/切换活动/切换后端/手动签到
    let action_tx = engine_tx.clone();
    server.fn_handler("/action", Method::Get, move |req| {
        if let Some(query) = req.uri().splitn(2, '?').nth(1) {
            match parse_action(query) {
                Some(action) => {
                    log::info!("Operator action: {:?}", action);
                    let _ = action_tx.send(EngineEvent::Activity);
                    let _ = action_tx.send(action.into_event(clock.now_ms()));
                }
                None => log::warn!("Ignoring unknown action query: {}", query),
            }
        }
        req.into_response(303, Some("See Other"), &[("Location", "/")])?
            .write_all(b"")
            .map(|_| ())
    })?;

    // 页面上的触摸/按键/滚动统一上报为活动
    let activity_tx = engine_tx;
    server.fn_handler("/activity", Method::Post, move |req| {
        let _ = activity_tx.send(EngineEvent::Activity);
        req.into_response(204, Some("No Content"), &[])?
            .write_all(b"")
            .map(|_| ())
    })?;

    Ok(server)
}
