use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    api,
    clients::{DiscordClient, DiscordConfig, HttpImageResolver, SheetRotationOracle, SheetsConfig},
    config::Config,
    nav::{
        cache::{WindowCache, WindowDeps},
        merge::ContentMerger,
    },
    observability::Telemetry,
    scheduler::daemon::AutoPostDaemon,
    sector::{format::PageFormatter, glyph::StaticGlyphs},
};

#[derive(Clone)]
pub(crate) struct AppState {
    telemetry: Telemetry,
    cache: Arc<WindowCache>,
}

impl AppState {
    pub(crate) fn new(telemetry: Telemetry, cache: Arc<WindowCache>) -> Self {
        Self { telemetry, cache }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub(crate) fn cache(&self) -> &WindowCache {
        &self.cache
    }
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    discord: Arc<DiscordClient>,
    cache: Arc<WindowCache>,
}

impl ComponentRegistry {
    /// 構成情報から各クライアントを初期化し、最初のウィンドウを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化、HTTP クライアント構築、または初回の履歴取得が失敗した場合はエラーを返す。
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;
        let retry = config.retry_config();

        let discord = Arc::new(DiscordClient::new(
            DiscordConfig {
                base_url: config.discord_api_base_url().to_string(),
                token: config.discord_token().to_string(),
                connect_timeout: config.http_connect_timeout(),
                total_timeout: config.http_total_timeout(),
            },
            retry,
        )?);

        let oracle = Arc::new(SheetRotationOracle::new(
            SheetsConfig {
                base_url: config.sheets_api_base_url().to_string(),
                spreadsheet_id: config.sheets_spreadsheet_id().to_string(),
                range: config.sheets_range().to_string(),
                api_key: config.sheets_api_key().map(str::to_string),
                cache_ttl: config.sheets_cache_ttl(),
                connect_timeout: config.http_connect_timeout(),
                total_timeout: config.http_total_timeout(),
            },
            retry,
        )?);

        let images = Arc::new(HttpImageResolver::new(
            config.http_connect_timeout(),
            config.http_total_timeout(),
        )?);
        let glyphs = Arc::new(StaticGlyphs::new(config.glyphs().clone()));
        let formatter = Arc::new(PageFormatter::new(glyphs, images, config.embed_color()));

        let deps = WindowDeps {
            source: Arc::clone(&discord) as _,
            channel_id: config.source_channel_id(),
            oracle,
            formatter,
            merger: ContentMerger::default(),
            metrics: telemetry.metrics_arc(),
        };
        let settings = config.window_settings()?;
        let cache = WindowCache::build(deps, settings, Utc::now())
            .await
            .context("failed to build initial page window")?;

        Ok(Self {
            config,
            telemetry,
            discord,
            cache: Arc::new(cache),
        })
    }

    /// 自動投稿が有効で配信先があればデーモンを起動する。
    #[must_use]
    pub fn spawn_autopost(&self) -> Option<JoinHandle<()>> {
        if !self.config.autopost_enabled() {
            info!("automatic posting disabled");
            return None;
        }
        let destinations = self.config.autopost_channel_ids().to_vec();
        if destinations.is_empty() {
            warn!("skipping automatic posting because no destination channels are configured");
            return None;
        }

        let daemon = AutoPostDaemon::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.discord) as _,
            destinations,
            self.config.autopost_delay(),
            self.telemetry.metrics_arc(),
        );
        Some(daemon.spawn())
    }
}

pub fn build_router(registry: &ComponentRegistry) -> Router {
    let state = AppState::new(registry.telemetry.clone(), Arc::clone(&registry.cache));
    api::router(state)
}
