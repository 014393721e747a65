use serde_json::Value;

/// JSON 载荷中报名编号字段的查找顺序。
const ID_FIELDS: [&str; 6] = [
    "registration_id",
    "registrationId",
    "_id",
    "id",
    "registeredID",
    "registeredId",
];

/// UUID 各段长度（8-4-4-4-12）。
const UUID_GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
const UUID_LEN: usize = 36;
/// 文档 ID（24 位十六进制）。
const OBJECT_ID_LEN: usize = 24;
const MAX_NUMERIC_LEN: usize = 12;

/// 从扫码原文中解析报名编号，无法识别时返回 None。
///
/// 依次尝试：JSON 字段 → UUID → 24 位十六进制 → URL 末段路径 → 纯数字。
pub fn resolve(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(id) = from_json(trimmed) {
        return Some(id);
    }
    if let Some(id) = find_uuid(raw) {
        return Some(id.to_string());
    }
    if let Some(id) = find_object_id(raw) {
        return Some(id.to_string());
    }
    if let Some(id) = last_url_segment(trimmed) {
        return Some(id.to_string());
    }
    if is_short_numeric(trimmed) {
        return Some(trimmed.to_string());
    }
    None
}

/// JSON 对象中按优先级查找编号字段；解析失败直接返回 None。
fn from_json(trimmed: &str) -> Option<String> {
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let object = value.as_object()?;
    ID_FIELDS
        .iter()
        .filter_map(|field| object.get(*field))
        .find_map(scalar_to_id)
}

fn scalar_to_id(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 查找最左侧的 UUID 形状子串（大小写不敏感）。
pub fn find_uuid(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.len() < UUID_LEN {
        return None;
    }
    (0..=bytes.len() - UUID_LEN)
        .find(|&start| is_uuid_at(&bytes[start..start + UUID_LEN]))
        .map(|start| &text[start..start + UUID_LEN])
}

fn is_uuid_at(window: &[u8]) -> bool {
    let mut pos = 0;
    for (idx, len) in UUID_GROUPS.iter().enumerate() {
        if idx > 0 {
            if window[pos] != b'-' {
                return false;
            }
            pos += 1;
        }
        if !window[pos..pos + len].iter().all(u8::is_ascii_hexdigit) {
            return false;
        }
        pos += len;
    }
    true
}

/// 查找最左侧的 24 位十六进制子串。
pub fn find_object_id(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut run_start = 0;
    let mut run_len = 0;
    for (idx, byte) in bytes.iter().enumerate() {
        if byte.is_ascii_hexdigit() {
            if run_len == 0 {
                run_start = idx;
            }
            run_len += 1;
            if run_len == OBJECT_ID_LEN {
                return Some(&text[run_start..run_start + OBJECT_ID_LEN]);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

/// 将文本视为 URL，返回最后一个非空路径段。
pub fn last_url_segment(text: &str) -> Option<&str> {
    if text.chars().any(char::is_whitespace) {
        return None;
    }
    let (scheme, rest) = text.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    let path = match rest.strip_prefix("//") {
        // 跳过 authority（host:port）
        Some(after) => match after.find(['/', '?', '#']) {
            Some(idx) => &after[idx..],
            None => "",
        },
        None => rest,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|segment| !segment.is_empty()).last()
}

fn is_short_numeric(text: &str) -> bool {
    !text.is_empty() && text.len() <= MAX_NUMERIC_LEN && text.bytes().all(|b| b.is_ascii_digit())
}
