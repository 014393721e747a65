use core::convert::TryInto;

use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::modem::Modem;
use esp_idf_hal::sys::EspError;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

const WIFI_SSID: &str = env!("WIFI_SSID");
const WIFI_PASS: &str = env!("WIFI_PASS");

#[derive(Debug)]
pub enum WifiError {
    Esp(EspError),
    /// SSID/密码超出驱动允许的长度。
    InvalidCredentials,
}

impl From<EspError> for WifiError {
    fn from(err: EspError) -> Self {
        WifiError::Esp(err)
    }
}

/// 以 STA 模式连接会场 Wi-Fi，阻塞直到拿到地址。
pub fn connect_wifi(modem: Modem) -> Result<BlockingWifi<EspWifi<'static>>, WifiError> {
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take().ok();
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), nvs)?, sys_loop)?;

    let auth_method = if WIFI_PASS.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let client = ClientConfiguration {
        ssid: WIFI_SSID.try_into().map_err(|_| WifiError::InvalidCredentials)?,
        password: WIFI_PASS.try_into().map_err(|_| WifiError::InvalidCredentials)?,
        auth_method,
        ..Default::default()
    };

    wifi.set_configuration(&Configuration::Client(client))?;
    wifi.start()?;
    wifi.connect()?;
    log::info!("Wi-Fi associated with {}", WIFI_SSID);
    wifi.wait_netif_up()?;
    let ip = wifi.wifi().sta_netif().get_ip_info()?;
    log::info!("Wi-Fi netif up, kiosk reachable at http://{}/", ip.ip);
    Ok(wifi)
}
