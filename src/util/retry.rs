/// 指数バックオフ+ジッター付き再試行ロジック。
///
/// AWS推奨のFull Jitter戦略を実装します。
use std::{future::Future, time::Duration};

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};

/// 再試行戦略の設定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 最大試行回数（初回を含む）
    pub max_attempts: usize,
    /// ベースとなる遅延時間（ミリ秒）
    pub base_delay_ms: u64,
    /// 最大遅延時間（ミリ秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 10000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// 指定された試行回数に対する遅延時間を計算する（Full Jitter戦略）。
    ///
    /// # Arguments
    /// * `attempt` - 試行回数（0から開始）
    #[must_use]
    pub(crate) fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        // 指数バックオフ: base * 2^(attempt-1)
        let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(shift).unwrap_or(u64::MAX));

        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jittered_delay = if capped_delay > 0 {
            rand::rng().random_range(0..=capped_delay)
        } else {
            0
        };

        Duration::from_millis(jittered_delay)
    }

    #[must_use]
    pub(crate) const fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

/// エラーが再試行可能かどうかを判定する。
///
/// 以下の場合に再試行可能と判断します：
/// - ネットワークエラー
/// - タイムアウト
/// - 5xxサーバーエラー
/// - 429 Too Many Requests
pub(crate) fn is_retryable_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    if let Some(status) = error.status() {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return true;
        }
    }

    false
}

/// `call` を再試行付きで実行する。
///
/// `reqwest::Error` を含み、かつ [`is_retryable_error`] が真となるエラーのみ再試行する。
pub(crate) async fn with_retry<T, F, Fut>(config: RetryConfig, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;

                if !config.can_retry(attempt) {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = config.max_attempts,
                        "request failed after all retries"
                    );
                    return Err(err);
                }

                let retryable = err
                    .downcast_ref::<reqwest::Error>()
                    .is_some_and(is_retryable_error);

                if !retryable {
                    warn!(operation, error = %err, "error is not retryable");
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "request failed, retrying after delay"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
