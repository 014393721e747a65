use std::fmt;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use serde_json::Value;

use crate::api::ApiConfig;
use crate::engine::EngineEvent;
use crate::model::{CheckinRequest, FailureReason, DEFAULT_SUCCESS_MESSAGE};

/// 网络线程命令。
#[derive(Clone, Debug)]
pub enum NetCommand {
    Checkin { attempt: u32, request: CheckinRequest },
    FetchEvent { event_id: String },
    SetBackend { base_url: String },
}

#[derive(Debug)]
pub enum NetError {
    Transport(String),
    Timeout,
    Json(serde_json::Error),
    HttpStatus(u16, Option<String>),
    Api(String),
    /// 2xx 但响应体为空。
    EmptyResponse,
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Json(err)
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Transport(message) => write!(f, "transport error: {}", message),
            NetError::Timeout => f.write_str("request timed out"),
            NetError::Json(err) => write!(f, "invalid json: {}", err),
            NetError::HttpStatus(status, Some(message)) => write!(f, "http {}: {}", status, message),
            NetError::HttpStatus(status, None) => write!(f, "http {}", status),
            NetError::Api(message) => write!(f, "api error: {}", message),
            NetError::EmptyResponse => f.write_str("empty response"),
        }
    }
}

impl NetError {
    /// 是否为连不上后端一类的错误（用于健康状态）。
    pub fn is_unreachable(&self) -> bool {
        matches!(self, NetError::Transport(_) | NetError::Timeout)
    }

    /// 转换为面向操作员的失败原因。
    pub fn into_failure(self) -> FailureReason {
        match self {
            NetError::Transport(message) => FailureReason::Transport(message),
            NetError::Timeout => FailureReason::Timeout,
            NetError::Json(_) => FailureReason::Rejected("响应格式无效".to_string()),
            NetError::HttpStatus(_, Some(message)) => FailureReason::Rejected(message),
            NetError::HttpStatus(status, None) => {
                FailureReason::Rejected(format!("服务器错误（HTTP {}）", status))
            }
            NetError::Api(message) => FailureReason::Rejected(message),
            NetError::EmptyResponse => FailureReason::NoResponse,
        }
    }
}

/// 原始 HTTP 响应。
#[derive(Clone, Debug)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP 客户端抽象（设备上为 EspHttpConnection，主机上为模拟后端）。
pub trait CheckinClient {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpReply, NetError>;

    fn get(&mut self, url: &str) -> Result<HttpReply, NetError>;
}

/// 启动网络线程：执行命令并把结果回送给签到引擎。
pub fn spawn_network_loop<C>(
    mut client: C,
    mut api: ApiConfig,
    command_rx: Receiver<NetCommand>,
    engine_tx: Sender<EngineEvent>,
) -> thread::JoinHandle<()>
where
    C: CheckinClient + Send + 'static,
{
    thread::spawn(move || {
        while let Ok(cmd) = command_rx.recv() {
            let event = match cmd {
                NetCommand::Checkin { attempt, request } => {
                    let result = submit_checkin(&mut client, &api, &request);
                    if let Err(ref err) = result {
                        log::warn!("Check-in {} failed: {}", request.registration_id, err);
                    }
                    EngineEvent::CheckinFinished { attempt, result }
                }
                NetCommand::FetchEvent { event_id } => {
                    match fetch_event_title(&mut client, &api, &event_id) {
                        Ok(title) => EngineEvent::EventLoaded { event_id, title },
                        Err(err) => {
                            log::warn!("Event {} fetch failed: {}", event_id, err);
                            EngineEvent::EventLoadFailed {
                                event_id,
                                reason: err.to_string(),
                            }
                        }
                    }
                }
                NetCommand::SetBackend { base_url } => {
                    api = ApiConfig::new(base_url);
                    log::info!("Backend set to {}", api.base_url);
                    continue;
                }
            };
            if engine_tx.send(event).is_err() {
                break;
            }
        }
    })
}

/// 提交签到请求，成功时返回服务端文案。
pub fn submit_checkin<C: CheckinClient>(
    client: &mut C,
    api: &ApiConfig,
    request: &CheckinRequest,
) -> Result<String, NetError> {
    let body = serde_json::to_string(request)?;
    let url = api.checkins_url();
    log::info!("Posting check-in to {}", url);
    let reply = client.post_json(&url, &body)?;
    log::info!("Check-in response status {}", reply.status);
    interpret_checkin(&reply)
}

/// 解释签到响应：2xx 且为 JSON 对象视为成功（可带 message）。
pub fn interpret_checkin(reply: &HttpReply) -> Result<String, NetError> {
    if !reply.is_success() {
        return Err(NetError::HttpStatus(reply.status, error_message(&reply.body)));
    }
    if reply.body.iter().all(u8::is_ascii_whitespace) {
        return Err(NetError::EmptyResponse);
    }
    let value: Value = serde_json::from_slice(&reply.body)?;
    let Some(object) = value.as_object() else {
        return Err(NetError::Api("响应格式无效".to_string()));
    };
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    if object.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(NetError::Api(message.unwrap_or_else(|| "签到失败".to_string())));
    }
    Ok(message.unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string()))
}

/// 拉取活动标题（仅用于页面展示）。
pub fn fetch_event_title<C: CheckinClient>(
    client: &mut C,
    api: &ApiConfig,
    event_id: &str,
) -> Result<String, NetError> {
    let reply = client.get(&api.event_url(event_id))?;
    interpret_event(&reply)
}

/// 解析活动元数据中的 title/name（兼容 data 包裹）。
pub fn interpret_event(reply: &HttpReply) -> Result<String, NetError> {
    if !reply.is_success() {
        return Err(NetError::HttpStatus(reply.status, error_message(&reply.body)));
    }
    if reply.body.iter().all(u8::is_ascii_whitespace) {
        return Err(NetError::EmptyResponse);
    }
    let value: Value = serde_json::from_slice(&reply.body)?;
    let event = value.get("data").filter(|d| d.is_object()).unwrap_or(&value);
    ["title", "name"]
        .iter()
        .find_map(|field| event.get(*field).and_then(Value::as_str))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| NetError::Api("活动信息缺少标题".to_string()))
}

/// 从错误响应体中提取可读信息。
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        reply: Option<HttpReply>,
        posted: Vec<(String, String)>,
    }

    impl CheckinClient for Scripted {
        fn post_json(&mut self, url: &str, body: &str) -> Result<HttpReply, NetError> {
            self.posted.push((url.to_string(), body.to_string()));
            self.reply.clone().ok_or(NetError::Timeout)
        }

        fn get(&mut self, _url: &str) -> Result<HttpReply, NetError> {
            self.reply.clone().ok_or(NetError::Transport("offline".to_string()))
        }
    }

    #[test]
    fn success_uses_server_message_or_default() {
        let reply = HttpReply::new(201, r#"{"message":"欢迎，张三"}"#);
        assert_eq!(interpret_checkin(&reply).unwrap(), "欢迎，张三");
        let reply = HttpReply::new(200, r#"{"data":{}}"#);
        assert_eq!(interpret_checkin(&reply).unwrap(), DEFAULT_SUCCESS_MESSAGE);
    }

    #[test]
    fn non_2xx_carries_server_reason() {
        let reply = HttpReply::new(409, r#"{"message":"已签到"}"#);
        let err = interpret_checkin(&reply).unwrap_err();
        assert_eq!(err.into_failure(), FailureReason::Rejected("已签到".to_string()));
        let reply = HttpReply::new(502, "<html>bad gateway</html>");
        let err = interpret_checkin(&reply).unwrap_err();
        assert_eq!(
            err.into_failure(),
            FailureReason::Rejected("服务器错误（HTTP 502）".to_string())
        );
    }

    #[test]
    fn unusable_bodies_are_failures() {
        assert!(matches!(
            interpret_checkin(&HttpReply::new(200, "")),
            Err(NetError::EmptyResponse)
        ));
        assert!(matches!(
            interpret_checkin(&HttpReply::new(200, "ok")),
            Err(NetError::Json(_))
        ));
        assert!(matches!(
            interpret_checkin(&HttpReply::new(200, "[]")),
            Err(NetError::Api(_))
        ));
        assert!(matches!(
            interpret_checkin(&HttpReply::new(200, r#"{"success":false,"message":"未报名"}"#)),
            Err(NetError::Api(ref m)) if m == "未报名"
        ));
    }

    #[test]
    fn submit_posts_wire_body() {
        let mut client = Scripted {
            reply: Some(HttpReply::new(200, "{}")),
            posted: Vec::new(),
        };
        let api = ApiConfig::new("http://backend");
        let request = CheckinRequest {
            event_id: "E1".to_string(),
            registration_id: "R1".to_string(),
        };
        submit_checkin(&mut client, &api, &request).unwrap();
        let (url, body) = &client.posted[0];
        assert_eq!(url, "http://backend/checkins");
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!({"event_id": "E1", "registration_id": "R1"}));
    }

    #[test]
    fn event_title_accepts_wrapped_and_flat_shapes() {
        let wrapped = HttpReply::new(200, r#"{"success":true,"data":{"title":"RustConf"}}"#);
        assert_eq!(interpret_event(&wrapped).unwrap(), "RustConf");
        let flat = HttpReply::new(200, r#"{"name":" 年会 "}"#);
        assert_eq!(interpret_event(&flat).unwrap(), "年会");
        assert!(interpret_event(&HttpReply::new(200, "{}")).is_err());
    }

    #[test]
    fn transport_errors_mark_backend_unreachable() {
        let mut client = Scripted {
            reply: None,
            posted: Vec::new(),
        };
        let api = ApiConfig::new("backend");
        let err = fetch_event_title(&mut client, &api, "E1").unwrap_err();
        assert!(err.is_unreachable());
        assert!(!NetError::HttpStatus(500, None).is_unreachable());
    }
}
