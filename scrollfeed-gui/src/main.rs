mod app;
mod theme;

use std::path::PathBuf;
use std::sync::Arc;

use eframe::{egui, NativeOptions};
use reqwest::{redirect, ClientBuilder};
use scrollfeed_core::{
    upstream_from_config, AppConfig, FeedCoordinator, KvCacheStore, KvStore, RequestLedger,
    Upstream,
};
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::{AppInit, NewsApp};

fn main() -> eframe::Result<()> {
    init_tracing();

    let runtime = Arc::new(Runtime::new().expect("failed to initialise Tokio runtime"));
    let config = AppConfig::load();
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent("ScrollFeed/0.1")
        .build()
        .expect("failed to build HTTP client");

    let kv = runtime.block_on(KvStore::load_from_dir(data_dir()));
    let cache = Arc::new(KvCacheStore::new(kv.clone()));
    let upstream: Arc<dyn Upstream> =
        Arc::from(upstream_from_config(&config.provider, &config.fetch));
    info!(provider = upstream.name(), "news provider selected");

    let ledger = RequestLedger::new(kv, config.fetch.daily_request_limit);
    let coordinator = FeedCoordinator::new(cache.clone(), upstream, client)
        .with_timeout(config.fetch.request_timeout())
        .with_ledger(ledger);

    let init = AppInit {
        runtime,
        coordinator,
        cache,
        config,
    };

    eframe::run_native(
        "ScrollFeed",
        NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([760.0, 860.0])
                .with_min_inner_size([480.0, 500.0]),
            ..Default::default()
        },
        Box::new(move |cc| {
            install_emoji_fonts(&cc.egui_ctx);
            theme::apply(&cc.egui_ctx, &init.config.theme);
            Box::new(NewsApp::new(init, &cc.egui_ctx))
        }),
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Linux: ~/.local/share/scrollfeed
fn data_dir() -> PathBuf {
    let mut dir = dirs::data_dir()
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    dir.push("scrollfeed");
    dir
}

/// Appends system emoji/symbol fonts as fallbacks so the 📍 🌍 ⟳ glyphs render.
fn install_emoji_fonts(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();
    let candidates = [
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/noto/NotoEmoji-Regular.ttf",
        "/usr/share/fonts/opentype/noto/NotoSansSymbols2-Regular.otf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];

    let mut added = 0usize;
    for path in candidates {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        let name = format!("fallback-{added}");
        fonts
            .font_data
            .insert(name.clone(), egui::FontData::from_owned(bytes));
        for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
            fonts.families.entry(family).or_default().push(name.clone());
        }
        added += 1;
    }

    if added > 0 {
        ctx.set_fonts(fonts);
    }
}
