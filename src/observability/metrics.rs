/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub window_builds: Counter,
    pub window_advances: Counter,
    pub history_fetch_failures: Counter,
    pub oracle_lookups: Counter,
    pub oracle_failures: Counter,
    pub placeholder_pages: Counter,
    pub autoposts: Counter,
    pub autopost_failures: Counter,

    // ヒストグラム
    pub window_build_duration: Histogram,
    pub oracle_lookup_duration: Histogram,

    // ゲージ
    pub window_today_key: Gauge,
    pub window_pages: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同じレジストリに同名のメトリクスが登録済みの場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            window_builds: register_counter_with_registry!(
                "beacon_window_builds_total",
                "Total number of full window builds",
                registry
            )?,
            window_advances: register_counter_with_registry!(
                "beacon_window_advances_total",
                "Number of advances that crossed at least one period boundary",
                registry
            )?,
            history_fetch_failures: register_counter_with_registry!(
                "beacon_history_fetch_failures_total",
                "Number of failed channel history fetches",
                registry
            )?,
            oracle_lookups: register_counter_with_registry!(
                "beacon_oracle_lookups_total",
                "Total number of rotation oracle lookups",
                registry
            )?,
            oracle_failures: register_counter_with_registry!(
                "beacon_oracle_failures_total",
                "Number of rotation lookups that failed or timed out",
                registry
            )?,
            placeholder_pages: register_counter_with_registry!(
                "beacon_placeholder_pages_total",
                "Number of window slots filled with the placeholder page",
                registry
            )?,
            autoposts: register_counter_with_registry!(
                "beacon_autoposts_total",
                "Number of pages delivered to destination channels",
                registry
            )?,
            autopost_failures: register_counter_with_registry!(
                "beacon_autopost_failures_total",
                "Number of failed deliveries to destination channels",
                registry
            )?,
            window_build_duration: register_histogram_with_registry!(
                "beacon_window_build_duration_seconds",
                "Duration of window builds and advances",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
                registry
            )?,
            oracle_lookup_duration: register_histogram_with_registry!(
                "beacon_oracle_lookup_duration_seconds",
                "Duration of single rotation oracle lookups",
                vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0],
                registry
            )?,
            window_today_key: register_gauge_with_registry!(
                "beacon_window_today_key",
                "Date key currently treated as today",
                registry
            )?,
            window_pages: register_gauge_with_registry!(
                "beacon_window_pages",
                "Number of pages in the installed window",
                registry
            )?,
        })
    }

    /// テスト用の独立したレジストリ上にメトリクスを作る。
    ///
    /// # Errors
    /// 登録に失敗した場合はエラーを返す。
    pub fn detached() -> Result<Arc<Self>, prometheus::Error> {
        Ok(Arc::new(Self::new(Arc::new(Registry::new()))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    #[test]
    fn metrics_register_on_fresh_registry() {
        let registry = Arc::new(Registry::new());
        let metrics = Metrics::new(Arc::clone(&registry)).expect("metrics register");

        metrics.oracle_lookups.inc();
        metrics.window_pages.set(21.0);

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .expect("encode");
        let rendered = String::from_utf8(buffer).expect("utf8");
        assert!(rendered.contains("beacon_oracle_lookups_total 1"));
        assert!(rendered.contains("beacon_window_pages 21"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        let _first = Metrics::new(Arc::clone(&registry)).expect("first registration");
        assert!(Metrics::new(registry).is_err());
    }
}
