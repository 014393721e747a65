use std::time::Duration;

use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::rmt::{config::TransmitConfig, FixedLengthSignal, PinState, Pulse, TxRmtDriver};
use esp_idf_hal::sys::EspError;
use esp_idf_hal::{peripheral::Peripheral, rmt::RmtChannel};
use smart_leds::{SmartLedsWrite, RGB8};

use checkin_kiosk::feedback::FeedbackDevices;
use checkin_kiosk::model::FeedbackKind;

use crate::buzzer::{Buzzer, BuzzerError};

// 亮度缩放（约 40%），柜台近距离观看。
const BRIGHTNESS_SCALE: u8 = 102;

/// 单颗 WS2812 状态灯（RMT 发送）。
pub struct SmartLed<'d> {
    tx: TxRmtDriver<'d>,
}

impl<'d> SmartLed<'d> {
    pub fn new<C, P, Ch, Pin>(channel: C, pin: P) -> Result<Self, EspError>
    where
        C: Peripheral<P = Ch> + 'd,
        P: Peripheral<P = Pin> + 'd,
        Ch: RmtChannel,
        Pin: OutputPin,
    {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config)?;
        Ok(Self { tx })
    }

    pub fn set_color(&mut self, color: RGB8) -> Result<(), EspError> {
        self.write([color])
    }

    fn scaled(color: RGB8) -> RGB8 {
        let scale = |v: u8| ((v as u16 * BRIGHTNESS_SCALE as u16) / 255) as u8;
        RGB8 {
            r: scale(color.r),
            g: scale(color.g),
            b: scale(color.b),
        }
    }

    /// GRB 顺序、高位先发的 24bit 脉冲序列。
    fn encode(&self, color: RGB8) -> Result<FixedLengthSignal<24>, EspError> {
        let color = Self::scaled(color);
        let grb = u32::from_be_bytes([0, color.g, color.r, color.b]);
        let hz = self.tx.counter_clock()?;
        let zero = (
            Pulse::new_with_duration(hz, PinState::High, &Duration::from_nanos(350))?,
            Pulse::new_with_duration(hz, PinState::Low, &Duration::from_nanos(800))?,
        );
        let one = (
            Pulse::new_with_duration(hz, PinState::High, &Duration::from_nanos(700))?,
            Pulse::new_with_duration(hz, PinState::Low, &Duration::from_nanos(600))?,
        );
        let mut signal = FixedLengthSignal::<24>::new();
        for slot in 0..24usize {
            let bit = grb & (1 << (23 - slot)) != 0;
            signal.set(slot, if bit { &one } else { &zero })?;
        }
        Ok(signal)
    }
}

impl SmartLedsWrite for SmartLed<'_> {
    type Color = RGB8;
    type Error = EspError;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let color = iterator.into_iter().next().map(Into::into).unwrap_or_default();
        let signal = self.encode(color)?;
        self.tx.start_blocking(&signal)
    }
}

#[derive(Debug)]
pub enum IndicatorError {
    Led(EspError),
    Buzzer(BuzzerError),
    /// 启动时未能初始化该外设。
    Missing(&'static str),
}

/// 签到反馈外设：状态灯 + 蜂鸣器，任一缺失都不影响签到。
pub struct KioskIndicators {
    led: Option<SmartLed<'static>>,
    buzzer: Option<Buzzer>,
}

impl KioskIndicators {
    pub fn new(led: Option<SmartLed<'static>>, buzzer: Option<Buzzer>) -> Self {
        Self { led, buzzer }
    }
}

impl FeedbackDevices for KioskIndicators {
    type Error = IndicatorError;

    fn play_cue(&mut self, kind: FeedbackKind) -> Result<(), Self::Error> {
        let buzzer = self.buzzer.as_ref().ok_or(IndicatorError::Missing("buzzer"))?;
        buzzer.play(kind).map_err(IndicatorError::Buzzer)
    }

    fn set_indicator(&mut self, color: RGB8) -> Result<(), Self::Error> {
        let led = self.led.as_mut().ok_or(IndicatorError::Missing("status LED"))?;
        led.set_color(color).map_err(IndicatorError::Led)
    }
}
