use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use esp_idf_hal::delay;
use esp_idf_hal::sys::EspError;
use esp_idf_hal::uart::{UartRxDriver, UartTxDriver};

use checkin_kiosk::engine::{EngineEvent, KioskClock};
use checkin_kiosk::model::{ScanPayload, ScanSource};
use checkin_kiosk::scan_proto::{ScanFrame, ScanLineCodec, ZoneWrite};
use checkin_kiosk::scanner::ScannerDevice;

// 模组应答等待时间。
const ACK_TIMEOUT: Duration = Duration::from_millis(400);

/// 收发线程共享的链路标志。
#[derive(Default)]
pub struct LinkFlags {
    /// 是否把解码结果投递给引擎（暂停时丢弃）。
    delivering: AtomicBool,
    /// 最近一次写命令是否收到应答。
    acked: AtomicBool,
}

#[derive(Debug)]
pub enum ScanLinkError {
    Uart(EspError),
    /// 模组无应答（未接线或未上电）。
    NoAck,
}

impl From<EspError> for ScanLinkError {
    fn from(err: EspError) -> Self {
        ScanLinkError::Uart(err)
    }
}

/// 串口扫码模组：开始 = 切换连续扫码，停止 = 切回手动模式。
pub struct UartScanner {
    tx: UartTxDriver<'static>,
    flags: Arc<LinkFlags>,
    acquired: bool,
}

impl UartScanner {
    pub fn new(tx: UartTxDriver<'static>, flags: Arc<LinkFlags>) -> Self {
        Self {
            tx,
            flags,
            acquired: false,
        }
    }

    fn write_zone(&mut self, command: ZoneWrite) -> Result<(), ScanLinkError> {
        let bytes = command.to_bytes();
        log_bytes("UART TX:", &bytes);
        self.flags.acked.store(false, Ordering::SeqCst);
        self.tx.write(&bytes)?;
        self.tx.wait_done(delay::BLOCK)?;
        let deadline = Instant::now() + ACK_TIMEOUT;
        while Instant::now() < deadline {
            if self.flags.acked.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }
        Err(ScanLinkError::NoAck)
    }
}

impl ScannerDevice for UartScanner {
    type Error = ScanLinkError;

    fn start(&mut self) -> Result<(), Self::Error> {
        self.write_zone(ZoneWrite::continuous())?;
        self.acquired = true;
        self.flags.delivering.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), Self::Error> {
        self.flags.delivering.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Self::Error> {
        self.flags.delivering.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.flags.delivering.store(false, Ordering::SeqCst);
        self.acquired = false;
        self.write_zone(ZoneWrite::manual())
    }

    fn is_acquired(&self) -> bool {
        self.acquired
    }
}

/// 串口接收线程：拆分扫码行，投递时转为解码事件。
pub fn spawn_scan_rx_task(
    rx: UartRxDriver<'static>,
    flags: Arc<LinkFlags>,
    engine_tx: Sender<EngineEvent>,
    clock: KioskClock,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut codec = ScanLineCodec::new();
        let mut buf = [0u8; 128];
        loop {
            let count = match rx.read(&mut buf, delay::BLOCK) {
                Ok(count) => count,
                Err(err) => {
                    log::warn!("UART RX error: {:?}", err);
                    continue;
                }
            };
            for &byte in &buf[..count] {
                match codec.push(byte) {
                    Some(ScanFrame::Ack) => flags.acked.store(true, Ordering::SeqCst),
                    Some(ScanFrame::Line(text)) => {
                        if !flags.delivering.load(Ordering::SeqCst) {
                            log::debug!("Scan dropped while paused");
                            continue;
                        }
                        let payload = ScanPayload::new(text, clock.now_ms(), ScanSource::Scanner);
                        if engine_tx.send(EngineEvent::Decoded(payload)).is_err() {
                            log::warn!("Engine gone, scanner RX task exiting");
                            return;
                        }
                    }
                    None => {}
                }
            }
        }
    })
}

fn log_bytes(prefix: &str, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let mut line = String::with_capacity(prefix.len() + bytes.len() * 3);
    line.push_str(prefix);
    for byte in bytes {
        let _ = write!(line, " {:02X}", byte);
    }
    log::debug!("{}", line);
}
