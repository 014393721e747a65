/// 扫码闸门状态（防抖 + 去重），生命周期与一次扫码会话相同。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GateState {
    pub last_processed_at: Option<u64>,
    pub last_key: Option<String>,
    pub last_handled_at: Option<u64>,
    pub processing: bool,
}

/// 扫码被拒绝的原因。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateRejection {
    Empty,
    Busy,
    Debounced { since_ms: u64 },
    Duplicate { key: String, since_ms: u64 },
}

impl GateRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateRejection::Empty => "empty",
            GateRejection::Busy => "busy",
            GateRejection::Debounced { .. } => "debounced",
            GateRejection::Duplicate { .. } => "duplicate",
        }
    }
}

/// 扫码闸门：决定新解码的载荷是否进入签到流程。
pub struct ScanGate {
    debounce_ms: u64,
    dedup_window_ms: u64,
    state: GateState,
}

impl ScanGate {
    pub fn new(debounce_ms: u64, dedup_window_ms: u64) -> Self {
        Self {
            debounce_ms,
            dedup_window_ms,
            state: GateState::default(),
        }
    }

    /// 判定是否接受本次扫码；接受时返回去重键并进入 processing。
    pub fn accept(
        &mut self,
        raw: &str,
        resolved: Option<&str>,
        now: u64,
    ) -> Result<String, GateRejection> {
        if self.state.processing {
            return Err(GateRejection::Busy);
        }
        if let Some(last) = self.state.last_processed_at {
            let since_ms = now.saturating_sub(last);
            if since_ms < self.debounce_ms {
                return Err(GateRejection::Debounced { since_ms });
            }
        }
        let key = dedup_key(raw, resolved);
        if key.is_empty() {
            return Err(GateRejection::Empty);
        }
        // 同一张胸牌在去重窗口内不重复处理（无论上次成功与否）
        if let (Some(last_key), Some(handled_at)) =
            (self.state.last_key.as_deref(), self.state.last_handled_at)
        {
            let since_ms = now.saturating_sub(handled_at);
            if last_key == key && since_ms < self.dedup_window_ms {
                return Err(GateRejection::Duplicate { key, since_ms });
            }
        }
        self.state.processing = true;
        self.state.last_processed_at = Some(now);
        Ok(key)
    }

    /// 记录已得出结果的去重键（与 processing 无关）。
    pub fn mark_handled(&mut self, key: &str, now: u64) {
        self.state.last_key = Some(key.to_string());
        self.state.last_handled_at = Some(now);
    }

    /// 扫码器恢复后释放闸门。
    pub fn release(&mut self) {
        self.state.processing = false;
    }

    /// 操作员重新开始扫码时清空状态。
    pub fn reset(&mut self) {
        self.state = GateState::default();
    }

    pub fn is_processing(&self) -> bool {
        self.state.processing
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }
}

/// 去重键：优先使用解析出的编号，否则使用去除首尾空白的原文。
pub fn dedup_key(raw: &str, resolved: Option<&str>) -> String {
    match resolved {
        Some(id) => id.to_string(),
        None => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ScanGate {
        ScanGate::new(1_200, 6_000)
    }

    #[test]
    fn first_scan_is_accepted_at_time_zero() {
        let mut gate = gate();
        assert_eq!(gate.accept(" A1 ", None, 0), Ok("A1".to_string()));
        assert!(gate.is_processing());
        assert_eq!(gate.state().last_processed_at, Some(0));
    }

    #[test]
    fn rejects_while_processing() {
        let mut gate = gate();
        gate.accept("A1", Some("A1"), 1_000).unwrap();
        assert_eq!(gate.accept("B2", Some("B2"), 9_000), Err(GateRejection::Busy));
    }

    #[test]
    fn debounce_measured_from_last_processed() {
        let mut gate = gate();
        gate.accept("A1", Some("A1"), 10_000).unwrap();
        gate.release();
        assert_eq!(
            gate.accept("B2", Some("B2"), 11_199),
            Err(GateRejection::Debounced { since_ms: 1_199 })
        );
        assert!(gate.accept("B2", Some("B2"), 11_200).is_ok());
    }

    #[test]
    fn duplicate_rejected_for_whole_deadtime_even_after_failure() {
        let mut gate = gate();
        gate.accept("raw", Some("K"), 0).unwrap();
        gate.mark_handled("K", 500);
        gate.release();
        for now in [1_700, 3_000, 6_499] {
            assert!(matches!(
                gate.accept("other raw", Some("K"), now),
                Err(GateRejection::Duplicate { .. })
            ));
        }
        assert_eq!(gate.accept("raw", Some("K"), 6_500), Ok("K".to_string()));
    }

    #[test]
    fn different_key_passes_inside_deadtime() {
        let mut gate = gate();
        gate.accept("a", Some("K1"), 0).unwrap();
        gate.mark_handled("K1", 100);
        gate.release();
        assert_eq!(gate.accept("b", Some("K2"), 1_300), Ok("K2".to_string()));
    }

    #[test]
    fn unresolved_payload_dedups_on_trimmed_text() {
        let mut gate = gate();
        let key = gate.accept("hello world ", None, 0).unwrap();
        gate.mark_handled(&key, 0);
        gate.release();
        assert!(matches!(
            gate.accept("  hello world", None, 2_000),
            Err(GateRejection::Duplicate { .. })
        ));
    }

    #[test]
    fn blank_payload_rejected() {
        let mut gate = gate();
        assert_eq!(gate.accept("   ", None, 0), Err(GateRejection::Empty));
        assert!(!gate.is_processing());
    }

    #[test]
    fn reset_clears_deadtime() {
        let mut gate = gate();
        gate.accept("a", Some("K"), 0).unwrap();
        gate.mark_handled("K", 0);
        gate.reset();
        assert!(gate.accept("a", Some("K"), 10).is_ok());
    }
}
