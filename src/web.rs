use crate::engine::EngineEvent;
use crate::model::{ScanPayload, ScanSource};
use crate::status::BoardSnapshot;

/// 操作员动作（由 Web 页面触发）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorAction {
    Start,
    Stop,
    SetEvent { event_id: String },
    SetBackend { base_url: String },
    /// 手动输入报名编号（走与扫码相同的闸门）。
    Manual { code: String },
}

impl OperatorAction {
    /// 转换为引擎事件。
    pub fn into_event(self, now_ms: u64) -> EngineEvent {
        match self {
            OperatorAction::Start => EngineEvent::StartScanning,
            OperatorAction::Stop => EngineEvent::StopScanning,
            OperatorAction::SetEvent { event_id } => EngineEvent::SetEvent { event_id },
            OperatorAction::SetBackend { base_url } => EngineEvent::SetBackend { base_url },
            OperatorAction::Manual { code } => {
                EngineEvent::Decoded(ScanPayload::new(code, now_ms, ScanSource::Manual))
            }
        }
    }
}

/// 渲染签到页面（手工拼接 HTML，避免引入模板引擎）。
pub fn render_index(snapshot: &BoardSnapshot) -> String {
    let status = &snapshot.status;
    let event_title = status
        .event_title
        .as_deref()
        .or(status.event_id.as_deref())
        .unwrap_or("未设置活动");
    let (banner_class, banner_text) = match &status.feedback {
        Some(feedback) => (feedback.css_class, feedback.message.as_str()),
        None => ("tone-idle", status.screen_label),
    };

    let mut html = String::new();
    html.push_str("<!doctype html><html><head><meta charset=\"utf-8\">");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">");
    html.push_str("<title>Check-in Kiosk</title>");
    html.push_str("<style>");
    html.push_str(":root{--bg:#0f172a;--panel:#0b1220;--text:#f8fafc;--muted:#94a3b8;");
    html.push_str("--accent:#f59e0b;--stroke:rgba(148,163,184,0.25);--ok:#10b981;--error:#ef4444;}");
    html.push_str("*{box-sizing:border-box}body{margin:0;font-family:\"Source Han Sans SC\",\"Noto Sans SC\",\"PingFang SC\",\"Microsoft YaHei\",sans-serif;");
    html.push_str("color:var(--text);background:linear-gradient(180deg,#0b1220,#111827);}h2{margin:0 0 12px 0;font-weight:600}");
    html.push_str(".screen{padding:24px 20px;border-bottom:1px solid var(--stroke);min-height:56vh;display:flex;flex-direction:column;gap:16px;transition:opacity .5s;}");
    html.push_str(".tone-idle{background:linear-gradient(135deg,#0b1220,#111827);}");
    html.push_str(".tone-success{background:linear-gradient(135deg,rgba(16,185,129,0.6),rgba(15,23,42,0.95));}");
    html.push_str(".tone-error{background:linear-gradient(135deg,rgba(239,68,68,0.6),rgba(15,23,42,0.95));}");
    html.push_str(".fading{opacity:.35}");
    html.push_str(".event{font-size:28px;font-weight:700;}.state{color:var(--muted);font-size:16px;}");
    html.push_str(".banner{font-size:40px;font-weight:700;}.sub{color:var(--muted);font-size:14px;}");
    html.push_str(".alert{padding:12px 16px;border-radius:12px;background:rgba(239,68,68,0.25);}");
    html.push_str(".operator{padding:20px 20px 28px;display:flex;flex-direction:column;gap:16px;background:var(--panel);}");
    html.push_str(".grid{display:grid;gap:12px;grid-template-columns:repeat(auto-fit,minmax(160px,1fr));}");
    html.push_str(".card{padding:12px;border-radius:12px;border:1px solid var(--stroke);background:rgba(2,6,23,0.6);}");
    html.push_str(".value{font-size:26px;font-weight:700;}");
    html.push_str("button{padding:10px 14px;border-radius:12px;border:1px solid var(--stroke);background:#111827;color:var(--text);font-weight:600;}");
    html.push_str("button.primary{background:var(--accent);color:#0b1220;border-color:transparent;}");
    html.push_str("form{display:flex;flex-wrap:wrap;gap:8px;align-items:center;}");
    html.push_str("input{padding:10px 12px;border-radius:10px;border:1px solid var(--stroke);background:#0f172a;color:var(--text);min-width:160px;}");
    html.push_str("ul{margin:0;padding-left:18px}li{margin:4px 0}.ok{color:var(--ok)}.bad{color:var(--error)}");
    html.push_str("</style>");
    html.push_str("</head><body>");

    html.push_str("<section id=\"screen\" class=\"screen ");
    html.push_str(banner_class);
    html.push_str("\">");
    html.push_str("<div class=\"event\" id=\"event-title\">");
    push_escaped(&mut html, event_title);
    html.push_str("</div>");
    html.push_str("<div class=\"state\" id=\"screen-state\">");
    html.push_str(status.screen_label);
    html.push_str("</div>");
    html.push_str("<div class=\"banner\" id=\"banner\">");
    push_escaped(&mut html, banner_text);
    html.push_str("</div>");
    html.push_str("<div class=\"alert\" id=\"camera-error\"");
    if status.camera_error.is_none() {
        html.push_str(" hidden");
    }
    html.push_str(">");
    if let Some(error) = status.camera_error.as_deref() {
        push_escaped(&mut html, error);
    }
    html.push_str("</div>");
    html.push_str("<div id=\"waiting\"");
    if status.screen != "waiting" && status.screen != "camera_error" {
        html.push_str(" hidden");
    }
    html.push_str("><button class=\"primary\" onclick=\"startScan()\">开始签到</button></div>");
    html.push_str("</section>");

    html.push_str("<section class=\"operator\">");
    html.push_str("<h2>签到控制面板</h2>");
    html.push_str("<div class=\"grid\">");
    html.push_str("<div class=\"card\"><div class=\"sub\">签到机</div><div class=\"value\">");
    push_escaped(&mut html, &status.kiosk_id);
    html.push_str("</div></div>");
    html.push_str("<div class=\"card\"><div class=\"sub\">活动编号</div><div class=\"value\" id=\"event-id\">");
    push_escaped(&mut html, status.event_id.as_deref().unwrap_or("—"));
    html.push_str("</div></div>");
    html.push_str("<div class=\"card\"><div class=\"sub\">成功</div><div class=\"value ok\" id=\"success-count\">");
    html.push_str(&status.success_count.to_string());
    html.push_str("</div></div>");
    html.push_str("<div class=\"card\"><div class=\"sub\">失败</div><div class=\"value bad\" id=\"failure-count\">");
    html.push_str(&status.failure_count.to_string());
    html.push_str("</div></div>");
    html.push_str("<div class=\"card\"><div class=\"sub\">Wi-Fi</div><div id=\"wifi-text\">");
    html.push_str(if snapshot.wifi_connected { "已连接" } else { "未连接" });
    html.push_str("</div></div>");
    html.push_str("<div class=\"card\"><div class=\"sub\">后端</div><div id=\"backend-text\">");
    html.push_str(backend_label(status.backend_reachable));
    html.push_str("</div><div class=\"sub\" id=\"backend-address\">");
    push_escaped(
        &mut html,
        if status.backend_base_url.is_empty() {
            "默认"
        } else {
            status.backend_base_url.as_str()
        },
    );
    html.push_str("</div></div>");
    html.push_str("</div>");

    html.push_str("<div class=\"grid\">");
    html.push_str("<button class=\"primary\" onclick=\"startScan()\">开始扫码</button>");
    html.push_str("<button onclick=\"location.href='/action?type=stop'\">停止扫码</button>");
    html.push_str("</div>");
    html.push_str("<form action=\"/action\" method=\"get\">");
    html.push_str("<input type=\"hidden\" name=\"type\" value=\"manual\">");
    html.push_str("<input name=\"code\" type=\"text\" placeholder=\"手动输入报名编号\">");
    html.push_str("<button type=\"submit\">手动签到</button>");
    html.push_str("</form>");
    html.push_str("<form action=\"/action\" method=\"get\">");
    html.push_str("<input type=\"hidden\" name=\"type\" value=\"set_event\">");
    html.push_str("<input name=\"event_id\" type=\"text\" placeholder=\"活动编号\">");
    html.push_str("<button type=\"submit\">切换活动</button>");
    html.push_str("</form>");
    html.push_str("<form action=\"/action\" method=\"get\">");
    html.push_str("<input type=\"hidden\" name=\"type\" value=\"set_backend\">");
    html.push_str("<input name=\"backend\" type=\"text\" placeholder=\"后端地址，如 172.20.1.5:80\">");
    html.push_str("<button type=\"submit\">更新后端</button>");
    html.push_str("</form>");
    html.push_str("<div class=\"card\"><div class=\"sub\">最近签到</div><ul id=\"recent\">");
    for entry in &status.recent {
        html.push_str("<li class=\"");
        html.push_str(if entry.kind == "success" { "ok" } else { "bad" });
        html.push_str("\">");
        push_escaped(&mut html, &entry.key);
        html.push_str(" · ");
        push_escaped(&mut html, &entry.message);
        html.push_str("</li>");
    }
    html.push_str("</ul></div>");
    html.push_str("</section>");

    html.push_str("<script>");
    html.push_str("const el=(id)=>document.getElementById(id);");
    html.push_str("const esc=(t)=>String(t).replace(/[&<>\"]/g,c=>({'&':'&amp;','<':'&lt;','>':'&gt;','\"':'&quot;'}[c]));");
    html.push_str("let wantFullscreen=false;");
    html.push_str("function enterFullscreen(){if(!wantFullscreen||document.fullscreenElement)return;");
    html.push_str("const r=document.documentElement.requestFullscreen;if(r){r.call(document.documentElement).catch(()=>{});}}");
    html.push_str("function startScan(){wantFullscreen=true;enterFullscreen();location.href='/action?type=start';}");
    html.push_str("let lastActivity=0;function activity(){const n=Date.now();if(n-lastActivity<1000)return;lastActivity=n;");
    html.push_str("fetch('/activity',{method:'POST'}).catch(()=>{});enterFullscreen();}");
    html.push_str("['pointerdown','keydown','scroll','touchstart'].forEach(t=>window.addEventListener(t,activity,{passive:true}));");
    html.push_str("function applyStatus(s){");
    html.push_str("wantFullscreen=s.fullscreen;");
    html.push_str("if(!s.fullscreen&&document.fullscreenElement){document.exitFullscreen().catch(()=>{});}");
    html.push_str("el('event-title').textContent=s.event_title||s.event_id||'未设置活动';");
    html.push_str("el('event-id').textContent=s.event_id||'—';");
    html.push_str("el('screen-state').textContent=s.screen_label;");
    html.push_str("const screen=el('screen');screen.className='screen '+(s.feedback?s.feedback.css_class:'tone-idle');");
    html.push_str("if(s.feedback&&s.feedback.fading){screen.classList.add('fading');}");
    html.push_str("el('banner').textContent=s.feedback?s.feedback.message:s.screen_label;");
    html.push_str("const err=el('camera-error');err.hidden=!s.camera_error;err.textContent=s.camera_error||'';");
    html.push_str("el('waiting').hidden=!(s.screen==='waiting'||s.screen==='camera_error');");
    html.push_str("el('success-count').textContent=s.success_count;el('failure-count').textContent=s.failure_count;");
    html.push_str("el('wifi-text').textContent=s.wifi_connected?'已连接':'未连接';");
    html.push_str("el('backend-text').textContent=s.backend_reachable===null?'未知':(s.backend_reachable?'可达':'不可达');");
    html.push_str("el('backend-address').textContent=s.backend_base_url||'默认';");
    html.push_str("el('recent').innerHTML=s.recent.map(e=>`<li class=\"${e.kind==='success'?'ok':'bad'}\">${esc(e.key)} · ${esc(e.message)}</li>`).join('');");
    html.push_str("}");
    html.push_str("async function refresh(){try{const r=await fetch('/status',{cache:'no-store'});");
    html.push_str("if(!r.ok)return;const s=await r.json();applyStatus(s);}catch(e){}}");
    html.push_str("refresh();setInterval(refresh,1000);");
    html.push_str("</script>");
    html.push_str("</body></html>");
    html
}

/// 解析 URL 查询字符串为 OperatorAction。
pub fn parse_action(query: &str) -> Option<OperatorAction> {
    let action_type = query_value(query, "type")?;
    match action_type.as_str() {
        "start" => Some(OperatorAction::Start),
        "stop" => Some(OperatorAction::Stop),
        "set_event" => {
            let event_id = query_value(query, "event_id")?;
            Some(OperatorAction::SetEvent { event_id })
        }
        "set_backend" => {
            let base_url = query_value(query, "backend")?;
            if base_url.trim().is_empty() {
                None
            } else {
                Some(OperatorAction::SetBackend { base_url })
            }
        }
        "manual" => {
            let code = query_value(query, "code")?;
            if code.trim().is_empty() {
                None
            } else {
                Some(OperatorAction::Manual { code })
            }
        }
        _ => None,
    }
}

fn backend_label(reachable: Option<bool>) -> &'static str {
    match reachable {
        Some(true) => "可达",
        Some(false) => "不可达",
        None => "未知",
    }
}

/// 写入 HTML 转义后的文本。
fn push_escaped(html: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            _ => html.push(c),
        }
    }
}

/// 获取查询参数值。
fn query_value(query: &str, key: &str) -> Option<String> {
    for part in query.split('&') {
        let mut iter = part.splitn(2, '=');
        let k = iter.next()?;
        let v = iter.next().unwrap_or("");
        if k == key {
            return Some(decode_component(v));
        }
    }
    None
}

/// URL 解码（处理 %xx 与 +，按 UTF-8 还原）。
fn decode_component(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// 十六进制字符转数值。
fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
