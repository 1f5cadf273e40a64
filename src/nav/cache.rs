//! 履歴と先読みからなる日付ウィンドウのキャッシュ。
//!
//! ウィンドウは不変スナップショット（`Arc<Window>`）として保持し、構築・前進のたびに丸ごと差し替える。
//! I/O はすべて書き込みロックの外で行い、ロックはポインタの差し替えの間だけ保持する。

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::{
    sync::{Mutex, RwLock},
    time::timeout,
};
use tracing::{debug, info, warn};

use super::{
    error::WindowError,
    merge::ContentMerger,
    page::Page,
    period::{DateKey, DatePeriod},
    source::{HistorySource, RawMessage},
    window::{Window, history_start, lookahead_end},
};
use crate::{
    observability::metrics::Metrics,
    sector::{
        format::PageFormatter,
        rotation::{OracleError, RotationOracle},
    },
};

/// ウィンドウの形と時間軸。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    pub period: DatePeriod,
    pub history_len: usize,
    pub lookahead_len: usize,
    /// 1日付あたりのオラクル問い合わせの上限時間。
    pub oracle_timeout: Duration,
}

impl WindowSettings {
    /// # Errors
    /// 履歴長・先読み長が0の場合は [`WindowError::InvalidSettings`] を返す。
    pub fn validate(&self) -> Result<(), WindowError> {
        if self.history_len == 0 {
            return Err(WindowError::InvalidSettings(
                "history_len must be greater than zero".to_string(),
            ));
        }
        if self.lookahead_len == 0 {
            return Err(WindowError::InvalidSettings(
                "lookahead_len must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// キャッシュが依存する外部コンポーネント。
#[derive(Clone)]
pub struct WindowDeps {
    pub source: Arc<dyn HistorySource>,
    pub channel_id: u64,
    pub oracle: Arc<dyn RotationOracle>,
    pub formatter: Arc<PageFormatter>,
    pub merger: ContentMerger,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// 境界を越えていない。I/O も差し替えも行っていない。
    Unchanged,
    Advanced {
        from: DateKey,
        to: DateKey,
        evicted: usize,
        appended: usize,
    },
}

pub struct WindowCache {
    deps: WindowDeps,
    settings: WindowSettings,
    window: RwLock<Arc<Window>>,
    advance_mutex: Mutex<()>, // Serialize advance operations
}

impl WindowCache {
    /// 履歴の再生と先読みでウィンドウを初期構築する。
    ///
    /// 先読みの各日付は独立に問い合わせ、失敗・タイムアウト・未確定はその日付だけプレースホルダーになる。
    ///
    /// # Errors
    /// 設定が不正な場合、または履歴取得に失敗した場合はエラーを返す。
    pub async fn build(
        deps: WindowDeps,
        settings: WindowSettings,
        now: DateTime<Utc>,
    ) -> Result<Self, WindowError> {
        settings.validate()?;

        let timer = deps.metrics.window_build_duration.start_timer();
        let today = settings.period.key_for(now);
        let messages = fetch_history(&deps, &settings).await?;
        let window = assemble(&deps, &settings, today, None, messages).await;
        timer.observe_duration();

        deps.metrics.window_builds.inc();
        record_window(&deps.metrics, &window);
        info!(
            today = %today,
            pages = window.len(),
            history_len = settings.history_len,
            lookahead_len = settings.lookahead_len,
            "window built"
        );

        Ok(Self {
            deps,
            settings,
            window: RwLock::new(Arc::new(window)),
            advance_mutex: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    /// 現在のウィンドウのスナップショット。
    pub async fn snapshot(&self) -> Arc<Window> {
        Arc::clone(&*self.window.read().await)
    }

    /// 今日を0とした相対位置のページ。負は履歴、正は先読み。
    ///
    /// # Errors
    /// 範囲外の場合は [`WindowError::OutOfWindow`] を返す。
    pub async fn page_at(&self, offset: i64) -> Result<Arc<Page>, WindowError> {
        self.snapshot().await.page_at(offset)
    }

    /// 今日のページ。自動投稿が使う。
    ///
    /// # Errors
    /// ウィンドウが壊れていない限り失敗しない。
    pub async fn today(&self) -> Result<Arc<Page>, WindowError> {
        self.page_at(0).await
    }

    /// `now` を基準に「今日」を再計算し、境界を越えていればウィンドウを前進させる。
    ///
    /// 境界を越えていなければ何もしないため、毎回の読み出し前に呼んでよい。
    ///
    /// # Errors
    /// 履歴取得に失敗した場合は [`WindowError::SourceFetch`] を返し、既存のウィンドウは保持される。
    pub async fn advance(&self, now: DateTime<Utc>) -> Result<AdvanceOutcome, WindowError> {
        let target = self.settings.period.key_for(now);

        // Fast path: no boundary crossed
        if self.snapshot().await.today() >= target {
            return Ok(AdvanceOutcome::Unchanged);
        }

        let _advance_guard = self.advance_mutex.lock().await;

        // Double-check after acquiring mutex (another task may have advanced)
        let current = self.snapshot().await;
        if current.today() >= target {
            return Ok(AdvanceOutcome::Unchanged);
        }

        let timer = self.deps.metrics.window_build_duration.start_timer();
        let messages = fetch_history(&self.deps, &self.settings).await?;
        let next = assemble(
            &self.deps,
            &self.settings,
            target,
            Some(&current),
            messages,
        )
        .await;
        timer.observe_duration();

        let evicted = current.iter().filter(|(key, _)| !next.contains(*key)).count();
        let appended = next.iter().filter(|(key, _)| !current.contains(*key)).count();
        let from = current.today();

        record_window(&self.deps.metrics, &next);
        {
            let mut guard = self.window.write().await;
            *guard = Arc::new(next);
        }
        self.deps.metrics.window_advances.inc();

        info!(
            from = %from,
            to = %target,
            evicted,
            appended,
            "window advanced"
        );

        Ok(AdvanceOutcome::Advanced {
            from,
            to: target,
            evicted,
            appended,
        })
    }
}

async fn fetch_history(
    deps: &WindowDeps,
    settings: &WindowSettings,
) -> Result<Vec<RawMessage>, WindowError> {
    deps.source
        .fetch_recent(deps.channel_id, settings.history_len)
        .await
        .map_err(|error| {
            deps.metrics.history_fetch_failures.inc();
            warn!(
                channel_id = deps.channel_id,
                error = %error,
                "channel history fetch failed"
            );
            WindowError::SourceFetch(error)
        })
}

/// `today` を中心とした新しいウィンドウを組み立てる。
///
/// - 履歴区間: 実メッセージがあればマージ結果、なければ前のウィンドウのページ、
///   それもなければ今日はオラクル、それ以外はプレースホルダー。
/// - 先読み区間: 前のウィンドウにあれば再利用し、新しい日付だけオラクルに問い合わせる。
///
/// 前のウィンドウのプレースホルダーは再利用せず、未取得として扱う。
async fn assemble(
    deps: &WindowDeps,
    settings: &WindowSettings,
    today: DateKey,
    previous: Option<&Window>,
    messages: Vec<RawMessage>,
) -> Window {
    let first = history_start(today, settings.history_len);
    let last = lookahead_end(today, settings.lookahead_len);

    let mut grouped: BTreeMap<DateKey, Vec<RawMessage>> = BTreeMap::new();
    for message in messages {
        let key = settings.period.key_for(message.timestamp);
        if key >= first && key <= today {
            grouped.entry(key).or_default().push(message);
        } else {
            debug!(message_id = %message.id, key = %key, "message outside history range");
        }
    }

    let mut pages: BTreeMap<DateKey, Arc<Page>> = BTreeMap::new();
    let mut pending: Vec<DateKey> = Vec::new();

    for index in first.index()..=last.index() {
        let key = DateKey::new(index);
        let reused = previous
            .and_then(|window| window.get(key))
            .filter(|page| !page.is_placeholder())
            .cloned();

        if key <= today {
            if let Some(group) = grouped.get(&key) {
                pages.insert(key, Arc::new(deps.merger.merge(group)));
            } else if let Some(page) = reused {
                pages.insert(key, page);
            } else if key == today {
                pending.push(key);
            } else {
                deps.metrics.placeholder_pages.inc();
                pages.insert(key, Arc::new(Page::placeholder()));
            }
        } else if let Some(page) = reused {
            pages.insert(key, page);
        } else {
            pending.push(key);
        }
    }

    let resolved = join_all(
        pending
            .into_iter()
            .map(|key| async move { (key, lookahead_page(deps, settings, key).await) }),
    )
    .await;
    pages.extend(
        resolved
            .into_iter()
            .map(|(key, page)| (key, Arc::new(page))),
    );

    Window::new(today, settings.history_len, settings.lookahead_len, pages)
}

/// 1日付分のオラクル問い合わせと整形。失敗はこの日付だけのプレースホルダーに落とす。
async fn lookahead_page(deps: &WindowDeps, settings: &WindowSettings, key: DateKey) -> Page {
    let date = settings.period.start_of(key);

    deps.metrics.oracle_lookups.inc();
    let timer = deps.metrics.oracle_lookup_duration.start_timer();
    let outcome = timeout(settings.oracle_timeout, deps.oracle.lookup(date.date_naive()))
        .await
        .unwrap_or(Err(OracleError::Timeout(settings.oracle_timeout)));
    timer.observe_duration();

    match outcome {
        Ok(Some(sector)) => deps.formatter.format(Some(&sector), date).await,
        Ok(None) => {
            debug!(key = %key, date = %date.date_naive(), "rotation undecided");
            deps.metrics.placeholder_pages.inc();
            deps.formatter.format(None, date).await
        }
        Err(error) => {
            warn!(
                key = %key,
                date = %date.date_naive(),
                error = %error,
                "rotation lookup failed; using placeholder"
            );
            deps.metrics.oracle_failures.inc();
            deps.metrics.placeholder_pages.inc();
            deps.formatter.format(None, date).await
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_window(metrics: &Metrics, window: &Window) {
    metrics.window_today_key.set(window.today().index() as f64);
    metrics.window_pages.set(window.len() as f64);
}
