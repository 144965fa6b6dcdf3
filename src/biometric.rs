use log::warn;
use serde::Deserialize;

/// 生体認証ログ取得中にサーバーから送られる進捗イベント。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        message: String,
        #[serde(default)]
        percent: Option<f64>,
    },
    Complete {
        message: String,
        #[serde(default)]
        fetched: u64,
    },
    Error {
        message: String,
    },
}

/// 改行区切りのJSONを逐次デコードする。
///
/// 途中で途切れた行は次のチャンクが届くまで保持する。解釈できない行はログに出力して読み飛ばす。
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// チャンクを追加し、完結した行のイベントを返す。
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=position).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// 末尾に改行の無い最後の行をデコードする。
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<ProgressEvent> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Skipping malformed progress line {:?}: {}", text, e);
            None
        }
    }
}
