use std::sync::mpsc::Sender;
use std::thread;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, PinDriver, Pull};
use esp_idf_hal::sys::EspError;

use checkin_kiosk::engine::EngineEvent;
use checkin_kiosk::status::StatusBoard;

const POLL_MS: u32 = 30;

/// 柜台按键（BOOT 键）：等待/异常时开始扫码，其余时候视为用户活动。
pub fn spawn_button_task(
    pin: AnyIOPin,
    engine_tx: Sender<EngineEvent>,
    board: StatusBoard,
) -> Result<thread::JoinHandle<()>, EspError> {
    let mut button = PinDriver::input(pin)?;
    button.set_pull(Pull::Up)?;
    Ok(thread::spawn(move || {
        let mut was_pressed = false;
        loop {
            let pressed = button.is_low();
            if pressed && !was_pressed {
                let event = if board.snapshot().status.awaiting_operator() {
                    EngineEvent::StartScanning
                } else {
                    EngineEvent::Activity
                };
                log::info!("Button pressed -> {:?}", event);
                if engine_tx.send(event).is_err() {
                    break;
                }
            }
            was_pressed = pressed;
            FreeRtos::delay_ms(POLL_MS);
        }
    }))
}
