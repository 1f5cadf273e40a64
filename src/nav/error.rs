use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error(
        "offset {offset} is outside the window (history {history_len}, lookahead {lookahead_len})"
    )]
    OutOfWindow {
        offset: i64,
        history_len: usize,
        lookahead_len: usize,
    },
    /// 履歴取得の失敗。呼び出し側は既存のウィンドウを保持する。
    #[error("failed to fetch channel history")]
    SourceFetch(#[source] anyhow::Error),
    #[error("invalid window settings: {0}")]
    InvalidSettings(String),
}

impl WindowError {
    #[must_use]
    pub fn is_out_of_window(&self) -> bool {
        matches!(self, Self::OutOfWindow { .. })
    }
}
