use std::time::Duration;

use embedded_svc::http::client::Client as HttpClient;
use embedded_svc::http::Method;
use embedded_svc::io::{Read as _, Write as _};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use esp_idf_svc::io::EspIOError;
use esp_idf_svc::sys;

use checkin_kiosk::net::{CheckinClient, HttpReply, NetError};

/// 基于 esp_http_client 的签到客户端；每次请求新建连接。
pub struct EspCheckinClient {
    timeout: Duration,
}

impl EspCheckinClient {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn connect(&self) -> Result<HttpClient<EspHttpConnection>, NetError> {
        let connection = EspHttpConnection::new(&Configuration {
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|err| io_error(EspIOError(err)))?;
        Ok(HttpClient::wrap(connection))
    }
}

impl CheckinClient for EspCheckinClient {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpReply, NetError> {
        let content_length = body.len().to_string();
        let headers = [
            ("content-type", "application/json"),
            ("accept", "application/json"),
            ("content-length", content_length.as_str()),
        ];
        let mut client = self.connect()?;
        let mut request = client.request(Method::Post, url, &headers).map_err(io_error)?;
        request.write_all(body.as_bytes()).map_err(io_error)?;
        request.flush().map_err(io_error)?;
        let mut response = request.submit().map_err(io_error)?;
        let status = response.status();
        let body = read_response_body(&mut response).map_err(io_error)?;
        Ok(HttpReply::new(status, body))
    }

    fn get(&mut self, url: &str) -> Result<HttpReply, NetError> {
        let headers = [("accept", "application/json")];
        let mut client = self.connect()?;
        let request = client.request(Method::Get, url, &headers).map_err(io_error)?;
        let mut response = request.submit().map_err(io_error)?;
        let status = response.status();
        let body = read_response_body(&mut response).map_err(io_error)?;
        Ok(HttpReply::new(status, body))
    }
}

fn io_error(err: EspIOError) -> NetError {
    if err.0.code() == sys::ESP_ERR_TIMEOUT as i32 {
        NetError::Timeout
    } else {
        NetError::Transport(format!("{}", err.0))
    }
}

fn read_response_body(
    response: &mut embedded_svc::http::client::Response<&mut EspHttpConnection>,
) -> Result<Vec<u8>, EspIOError> {
    let mut body = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let len = response.read(&mut buf)?;
        if len == 0 {
            break;
        }
        body.extend_from_slice(&buf[..len]);
    }
    Ok(body)
}
