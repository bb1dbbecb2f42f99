//! Simulation log parsing
//!
//! Recognised lines:
//! - `Program <id> invoke [<depth>]`
//! - `Program <id> success` / `Program <id> failed: <reason>`
//! - `Program <id> consumed <n> of <m> compute units`
//! - `Program log: <payload>` / `Program data: <payload>`
//!
//! The invocation stack is keyed by depth: an invoke at depth `d` drops any
//! open entries at depth `d` or deeper before it is pushed, so truncated or
//! interleaved logs cannot leave stale frames behind.

use crate::analysis::types::{Invocation, InvocationStatus, LogEvent, LogPayload, ParsedLogs};
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

static INVOKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Program ([1-9A-HJ-NP-Za-km-z]{32,44}) invoke \[(\d+)\]$").expect("valid invoke regex")
});

static SUCCESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Program ([1-9A-HJ-NP-Za-km-z]{32,44}) success$").expect("valid success regex")
});

static FAILED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Program ([1-9A-HJ-NP-Za-km-z]{32,44}) failed: (.*)$").expect("valid failed regex")
});

static CONSUMED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Program ([1-9A-HJ-NP-Za-km-z]{32,44}) consumed (\d+) of (\d+) compute units$")
        .expect("valid consumed regex")
});

const LOG_PREFIX: &str = "Program log: ";
const DATA_PREFIX: &str = "Program data: ";

/// Parse an ordered list of simulation log lines
pub fn parse_logs(logs: &[String]) -> ParsedLogs {
    let mut parser = StackParser::default();
    for line in logs {
        let event = parser.parse_line(line);
        parser.parsed.events.push(event);
    }
    parser.parsed
}

#[derive(Default)]
struct StackParser {
    parsed: ParsedLogs,
    /// Indices into `parsed.invocations`, outermost first
    stack: Vec<usize>,
}

impl StackParser {
    fn parse_line(&mut self, line: &str) -> LogEvent {
        if let Some(raw) = line.strip_prefix(LOG_PREFIX) {
            return LogEvent::Log {
                program: self.current_program(),
                payload: decode_log_payload(raw),
            };
        }
        if let Some(raw) = line.strip_prefix(DATA_PREFIX) {
            return LogEvent::Data {
                program: self.current_program(),
                payload: decode_data_payload(raw),
            };
        }

        if let Some(caps) = INVOKE_RE.captures(line) {
            if let (Some(program), Ok(depth)) = (pubkey(&caps[1]), caps[2].parse::<u32>()) {
                self.invoke(program, depth);
                return LogEvent::Invoke { program, depth };
            }
        }
        if let Some(caps) = SUCCESS_RE.captures(line) {
            if let Some(program) = pubkey(&caps[1]) {
                self.close(&program, InvocationStatus::Success);
                return LogEvent::Success { program };
            }
        }
        if let Some(caps) = FAILED_RE.captures(line) {
            if let Some(program) = pubkey(&caps[1]) {
                let reason = caps[2].to_string();
                self.close(&program, InvocationStatus::Failed(reason.clone()));
                return LogEvent::Failed { program, reason };
            }
        }
        if let Some(caps) = CONSUMED_RE.captures(line) {
            if let (Some(program), Ok(units), Ok(limit)) =
                (pubkey(&caps[1]), caps[2].parse::<u64>(), caps[3].parse::<u64>())
            {
                self.record_consumption(&program, units);
                return LogEvent::Consumed { program, units, limit };
            }
        }

        LogEvent::Other(line.to_string())
    }

    fn current_program(&self) -> Option<Pubkey> {
        self.stack
            .last()
            .map(|&index| self.parsed.invocations[index].program)
    }

    fn invoke(&mut self, program: Pubkey, depth: u32) {
        let depth = depth.max(1);
        self.stack.truncate((depth - 1) as usize);
        let index = self.parsed.invocations.len();
        self.parsed.invocations.push(Invocation {
            program,
            depth,
            parent: self.stack.last().copied(),
            status: InvocationStatus::Incomplete,
            compute_units: None,
        });
        self.stack.push(index);
        self.parsed.max_depth = self.parsed.max_depth.max(depth);
    }

    /// Innermost open frame for `program`, as a stack position
    fn find_open(&self, program: &Pubkey) -> Option<usize> {
        self.stack
            .iter()
            .rposition(|&index| self.parsed.invocations[index].program == *program)
    }

    fn close(&mut self, program: &Pubkey, status: InvocationStatus) {
        if let Some(position) = self.find_open(program) {
            let index = self.stack[position];
            self.parsed.invocations[index].status = status;
            self.stack.truncate(position);
        }
    }

    fn record_consumption(&mut self, program: &Pubkey, units: u64) {
        if let Some(position) = self.find_open(program) {
            let index = self.stack[position];
            self.parsed.invocations[index].compute_units = Some(units);
        }
    }
}

fn pubkey(s: &str) -> Option<Pubkey> {
    Pubkey::from_str(s).ok()
}

fn looks_like_base64(s: &str) -> bool {
    s.len() >= 8
        && s.len() % 4 == 0
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
        && has_base64_evidence(s)
}

/// Padding or `+`/`/`, or a digit mixed with both letter cases.
/// Plain words such as `Transfer` are valid base64 but carry none of these.
fn has_base64_evidence(s: &str) -> bool {
    if s.bytes().any(|b| b == b'=' || b == b'+' || b == b'/') {
        return true;
    }
    s.bytes().any(|b| b.is_ascii_digit())
        && s.bytes().any(|b| b.is_ascii_uppercase())
        && s.bytes().any(|b| b.is_ascii_lowercase())
}

/// `Program log:` payload: bytes, then JSON, then plain text
pub fn decode_log_payload(raw: &str) -> LogPayload {
    let trimmed = raw.trim();
    if looks_like_base64(trimmed) {
        if let Ok(bytes) = STANDARD.decode(trimmed) {
            return LogPayload::Bytes(bytes);
        }
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return LogPayload::Structured(value);
        }
    }
    LogPayload::Text(raw.to_string())
}

/// `Program data:` payload: whitespace-separated base64 chunks
pub fn decode_data_payload(raw: &str) -> LogPayload {
    let mut bytes = Vec::new();
    for chunk in raw.split_whitespace() {
        match STANDARD.decode(chunk) {
            Ok(decoded) => bytes.extend(decoded),
            Err(_) => return decode_log_payload(raw),
        }
    }
    if bytes.is_empty() {
        return LogPayload::Text(raw.to_string());
    }
    LogPayload::Bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_invocations() {
        let outer = Pubkey::new_unique();
        let inner = Pubkey::new_unique();
        let logs = vec![
            format!("Program {} invoke [1]", outer),
            "Program log: Instruction: Swap".to_string(),
            format!("Program {} invoke [2]", inner),
            "Program log: Instruction: Transfer".to_string(),
            format!("Program {} consumed 4645 of 180000 compute units", inner),
            format!("Program {} success", inner),
            format!("Program {} consumed 25000 of 200000 compute units", outer),
            format!("Program {} success", outer),
        ];

        let parsed = parse_logs(&logs);
        assert_eq!(parsed.invocations.len(), 2);
        assert_eq!(parsed.max_depth, 2);
        assert_eq!(parsed.invocations[1].parent, Some(0));
        assert_eq!(parsed.invocations[1].compute_units, Some(4645));
        assert_eq!(parsed.invocations[0].compute_units, Some(25000));
        assert!(parsed
            .invocations
            .iter()
            .all(|i| i.status == InvocationStatus::Success));

        match &parsed.events[3] {
            LogEvent::Log { program, payload } => {
                assert_eq!(*program, Some(inner));
                assert_eq!(*payload, LogPayload::Text("Instruction: Transfer".to_string()));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_invoke_truncates_stale_frames() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let c = Pubkey::new_unique();
        // b never reports success; a new depth-2 invoke replaces it
        let logs = vec![
            format!("Program {} invoke [1]", a),
            format!("Program {} invoke [2]", b),
            format!("Program {} invoke [2]", c),
            format!("Program {} success", c),
            format!("Program {} success", a),
        ];

        let parsed = parse_logs(&logs);
        assert_eq!(parsed.invocations[1].status, InvocationStatus::Incomplete);
        assert_eq!(parsed.invocations[2].parent, Some(0));
        assert_eq!(parsed.invocations[0].status, InvocationStatus::Success);
    }

    #[test]
    fn test_failed_invocation() {
        let program = Pubkey::new_unique();
        let logs = vec![
            format!("Program {} invoke [1]", program),
            format!("Program {} failed: custom program error: 0x1771", program),
        ];
        let parsed = parse_logs(&logs);
        assert_eq!(
            parsed.invocations[0].status,
            InvocationStatus::Failed("custom program error: 0x1771".to_string())
        );
    }

    #[test]
    fn test_payload_decoding() {
        assert_eq!(decode_log_payload("AQIDBAUGBwg="), LogPayload::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(
            decode_log_payload(r#"{"amount":5}"#),
            LogPayload::Structured(serde_json::json!({"amount": 5}))
        );
        assert_eq!(decode_log_payload("hello world"), LogPayload::Text("hello world".to_string()));
        assert_eq!(decode_log_payload("SGVsbG8gV29ybGQh"), LogPayload::Bytes(b"Hello World!".to_vec()));
    }

    #[test]
    fn test_plain_words_stay_text() {
        for word in ["Complete", "Approved", "Transfer", "Withdraw", "initialize", "DEPOSITS"] {
            assert_eq!(decode_log_payload(word), LogPayload::Text(word.to_string()), "{}", word);
        }

        let logs = vec!["Program log: Transfer".to_string()];
        match &parse_logs(&logs).events[0] {
            LogEvent::Log { payload, .. } => assert_eq!(payload, &LogPayload::Text("Transfer".to_string())),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(decode_data_payload("AQI= AwQ="), LogPayload::Bytes(vec![1, 2, 3, 4]));
        assert_eq!(decode_data_payload("not base64!"), LogPayload::Text("not base64!".to_string()));
    }

    #[test]
    fn test_unrecognised_lines_kept() {
        let parsed = parse_logs(&["Log truncated".to_string()]);
        assert_eq!(parsed.events, vec![LogEvent::Other("Log truncated".to_string())]);
        assert!(parsed.invocations.is_empty());
    }
}
