/// 扫码模组串口协议（GM65 类）：区域位写命令 + 行输出。
///
/// 命令帧：`7E 00 | type | len | addr_hi addr_lo | data... | crc_hi crc_lo`，
/// 校验位填 `AB CD` 时模组跳过校验。
pub const CMD_HEADER: [u8; 2] = [0x7E, 0x00];
pub const CMD_WRITE_ZONE: u8 = 0x08;
pub const CMD_SKIP_CRC: [u8; 2] = [0xAB, 0xCD];

/// 模组对写命令的应答：`02 00 00 01 00 33 31`。
pub const ACK_PREFIX: [u8; 4] = [0x02, 0x00, 0x00, 0x01];
const ACK_TAIL_LEN: usize = 3;

/// 工作模式所在的区域位地址。
pub const ZONE_SCAN_MODE: u16 = 0x0000;
/// 连续扫码 + 补光/提示灯开启。
pub const MODE_CONTINUOUS: u8 = 0xD6;
/// 手动（按键触发）模式，即停止连续扫码。
pub const MODE_MANUAL: u8 = 0xD4;

/// 单行最大长度，超出后丢弃该行。
pub const MAX_LINE_LEN: usize = 512;

/// 区域位写命令。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneWrite {
    pub address: u16,
    pub data: Vec<u8>,
}

impl ZoneWrite {
    pub fn continuous() -> Self {
        Self {
            address: ZONE_SCAN_MODE,
            data: vec![MODE_CONTINUOUS],
        }
    }

    pub fn manual() -> Self {
        Self {
            address: ZONE_SCAN_MODE,
            data: vec![MODE_MANUAL],
        }
    }

    /// 编码为串口字节流。
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.data.len().min(u8::MAX as usize);
        let mut out = Vec::with_capacity(2 + 1 + 1 + 2 + len + 2);
        out.extend_from_slice(&CMD_HEADER);
        out.push(CMD_WRITE_ZONE);
        out.push(len as u8);
        out.extend_from_slice(&self.address.to_be_bytes());
        out.extend_from_slice(&self.data[..len]);
        out.extend_from_slice(&CMD_SKIP_CRC);
        out
    }
}

/// 解码器输出：一行扫码文本，或一次命令应答。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanFrame {
    Line(String),
    Ack,
}

/// 行解码器：逐字节组装 CR/LF 结尾的扫码文本，并剔除命令应答。
pub struct ScanLineCodec {
    buffer: Vec<u8>,
    ack_tail: usize,
    overflow: bool,
}

impl ScanLineCodec {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
            ack_tail: 0,
            overflow: false,
        }
    }

    /// 推入一个字节，若组装完成则返回结果。
    pub fn push(&mut self, byte: u8) -> Option<ScanFrame> {
        if self.ack_tail > 0 {
            self.ack_tail -= 1;
            return if self.ack_tail == 0 { Some(ScanFrame::Ack) } else { None };
        }
        if byte == b'\r' || byte == b'\n' {
            return self.take_line();
        }
        self.buffer.push(byte);
        if self.buffer.len() <= ACK_PREFIX.len() && self.buffer[..] == ACK_PREFIX[..self.buffer.len()] {
            if self.buffer.len() == ACK_PREFIX.len() {
                self.buffer.clear();
                self.ack_tail = ACK_TAIL_LEN;
            }
            return None;
        }
        if self.buffer.len() > MAX_LINE_LEN {
            self.buffer.clear();
            self.overflow = true;
        }
        None
    }

    fn take_line(&mut self) -> Option<ScanFrame> {
        let overflow = std::mem::replace(&mut self.overflow, false);
        if self.buffer.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.buffer);
        if overflow {
            log::warn!("Dropping oversized scan line");
            return None;
        }
        let text = String::from_utf8_lossy(&bytes);
        let text: String = text.chars().filter(|c| !c.is_control()).collect();
        if text.trim().is_empty() {
            return None;
        }
        Some(ScanFrame::Line(text))
    }
}

impl Default for ScanLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// 将一段字节喂给解码器，收集完整的扫码行。
pub fn push_bytes(codec: &mut ScanLineCodec, bytes: &[u8]) -> Vec<String> {
    bytes
        .iter()
        .filter_map(|&byte| match codec.push(byte) {
            Some(ScanFrame::Line(line)) => Some(line),
            _ => None,
        })
        .collect()
}
