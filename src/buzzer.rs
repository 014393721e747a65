use std::sync::mpsc::{self, Sender};
use std::thread;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_hal::sys::EspError;

use checkin_kiosk::feedback::cue_pattern;
use checkin_kiosk::model::FeedbackKind;

#[derive(Debug)]
pub enum BuzzerError {
    TaskStopped,
}

/// 有源蜂鸣器：独立线程按节奏鸣响，不阻塞引擎。
pub struct Buzzer {
    tx: Sender<FeedbackKind>,
}

impl Buzzer {
    pub fn spawn(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut driver = PinDriver::output(pin)?;
        driver.set_low()?;
        let (tx, rx) = mpsc::channel::<FeedbackKind>();
        thread::spawn(move || {
            while let Ok(kind) = rx.recv() {
                for &(on_ms, off_ms) in cue_pattern(kind) {
                    if let Err(err) = driver.set_high() {
                        log::warn!("Buzzer drive failed: {:?}", err);
                        break;
                    }
                    FreeRtos::delay_ms(on_ms);
                    let _ = driver.set_low();
                    if off_ms > 0 {
                        FreeRtos::delay_ms(off_ms);
                    }
                }
            }
        });
        Ok(Self { tx })
    }

    pub fn play(&self, kind: FeedbackKind) -> Result<(), BuzzerError> {
        self.tx.send(kind).map_err(|_| BuzzerError::TaskStopped)
    }
}
