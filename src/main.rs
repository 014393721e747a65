// 模块划分：Wi-Fi、HTTP 客户端、扫码串口、指示灯、按键与 Web 服务；主机上运行控制台模拟器
#[cfg(target_os = "espidf")]
mod button;
#[cfg(target_os = "espidf")]
mod buzzer;
#[cfg(target_os = "espidf")]
mod http_client;
#[cfg(target_os = "espidf")]
mod scan_link;
#[cfg(target_os = "espidf")]
mod smart_led;
#[cfg(target_os = "espidf")]
mod web_server;
#[cfg(target_os = "espidf")]
mod wifi;

#[cfg(not(target_os = "espidf"))]
mod sim;

#[cfg(target_os = "espidf")]
fn main() {
    use std::sync::Arc;
    use std::thread;

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin};
    use esp_idf_hal::prelude::*;
    use esp_idf_hal::uart;

    use checkin_kiosk::api::ApiConfig;
    use checkin_kiosk::engine::{CheckinEngine, EngineEvent, KioskClock};
    use checkin_kiosk::model::KioskSettings;
    use checkin_kiosk::net::spawn_network_loop;
    use checkin_kiosk::pipeline::{run_engine_loop, KioskChannels};
    use checkin_kiosk::status::{BoardDisplay, StatusBoard};

    // ESP-IDF 运行时初始化（链接补丁 & 日志）
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("Check-in kiosk booting (ESP-IDF)...");

    // 外设初始化：扫码模组 UART1（GM65 默认 9600 波特）
    let peripherals = Peripherals::take().unwrap();
    let pins = peripherals.pins;
    let modem = peripherals.modem;
    let rmt_channel = peripherals.rmt.channel0;
    let uart_config = uart::config::Config::new().baudrate(Hertz(9_600));
    let uart = uart::UartDriver::new(
        peripherals.uart1,
        pins.gpio17,
        pins.gpio18,
        AnyInputPin::none(),
        AnyOutputPin::none(),
        &uart_config,
    )
    .unwrap();
    let (uart_tx, uart_rx) = uart.into_split();

    let settings = KioskSettings::with_kiosk_id(option_env!("KIOSK_ID").unwrap_or("kiosk-01"));
    let clock = KioskClock::new();
    let board = StatusBoard::new();
    let KioskChannels {
        engine_tx,
        engine_rx,
        net_tx,
        net_rx,
    } = KioskChannels::new();

    // 扫码串口：接收线程常驻，投递开关由引擎控制
    let link_flags = Arc::new(scan_link::LinkFlags::default());
    let _scan_rx_handle =
        scan_link::spawn_scan_rx_task(uart_rx, link_flags.clone(), engine_tx.clone(), clock);
    let scanner = scan_link::UartScanner::new(uart_tx, link_flags);

    // 反馈外设：初始化失败则降级为无灯/无声
    let led = match smart_led::SmartLed::new(rmt_channel, pins.gpio48) {
        Ok(led) => Some(led),
        Err(err) => {
            log::warn!("Status LED init failed: {:?}", err);
            None
        }
    };
    let buzzer = match buzzer::Buzzer::spawn(pins.gpio4.into()) {
        Ok(buzzer) => Some(buzzer),
        Err(err) => {
            log::warn!("Buzzer init failed: {:?}", err);
            None
        }
    };
    let indicators = smart_led::KioskIndicators::new(led, buzzer);

    // 连接 Wi-Fi（失败不阻塞主流程，签到会以网络错误反馈）
    let _wifi = match wifi::connect_wifi(modem) {
        Ok(wifi) => {
            board.set_wifi_connected(true);
            Some(wifi)
        }
        Err(err) => {
            log::warn!("Wi-Fi connect failed: {:?}", err);
            None
        }
    };

    // 网络线程
    let backend = env!("BACKEND_BASE_URL");
    let client = http_client::EspCheckinClient::new(settings.request_timeout_ms);
    let _net_handle = spawn_network_loop(client, ApiConfig::new(backend), net_rx, engine_tx.clone());

    // 签到引擎线程：独占引擎状态，按事件驱动
    let engine_board = board.clone();
    let _engine_handle = thread::Builder::new()
        .name("checkin-engine".into())
        .stack_size(16 * 1024)
        .spawn(move || {
            let display = BoardDisplay::new(engine_board.clone());
            let engine = CheckinEngine::new(settings, scanner, indicators, display, net_tx);
            run_engine_loop(engine, engine_rx, engine_board, clock);
        })
        .unwrap();

    let _ = engine_tx.send(EngineEvent::SetBackend {
        base_url: backend.to_string(),
    });
    if let Some(event_id) = option_env!("DEFAULT_EVENT_ID").filter(|id| !id.trim().is_empty()) {
        let _ = engine_tx.send(EngineEvent::SetEvent {
            event_id: event_id.to_string(),
        });
    }

    let _button_handle =
        match button::spawn_button_task(pins.gpio0.into(), engine_tx.clone(), board.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!("Button init failed: {:?}", err);
                None
            }
        };
    let _server = match web_server::start_server(board.clone(), engine_tx.clone(), clock) {
        Ok(server) => Some(server),
        Err(err) => {
            log::warn!("Web server start failed: {:?}", err);
            None
        }
    };

    // 主循环保持任务存活
    loop {
        FreeRtos::delay_ms(1000);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    sim::run();
}
