#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
}

pub const CHECKINS_PATH: &str = "/checkins";
pub const EVENTS_PATH: &str = "/events";

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_backend_url(base_url.into()),
        }
    }

    pub fn checkins_url(&self) -> String {
        format!("{}{}", self.base_url, CHECKINS_PATH)
    }

    pub fn event_url(&self, event_id: &str) -> String {
        format!("{}{}/{}", self.base_url, EVENTS_PATH, encode_path_segment(event_id))
    }
}

/// 规范化后端地址（自动补齐协议/去尾斜杠）。
pub fn normalize_backend_url(input: String) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut url = trimmed.to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{}", url);
    }
    url.trim_end_matches('/').to_string()
}

/// 路径段百分号编码（保留非保留字符）。
fn encode_path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
