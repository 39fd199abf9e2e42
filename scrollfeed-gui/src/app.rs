use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eframe::egui::{self, Color32};
use scrollfeed_core::{
    relative_label, AppConfig, Article, Category, FeedCoordinator, FeedMode, FeedSnapshot,
    KvCacheStore, Partition, Phase,
};
use tokio::runtime::Runtime;
use tracing::warn;

use crate::theme;

const EXAMPLE_LOCATIONS: [&str; 5] = ["New York", "London", "Tokyo", "Paris", "Sydney"];
const PREVIEW_CHARS: usize = 300;

pub struct AppInit {
    pub runtime: Arc<Runtime>,
    pub coordinator: FeedCoordinator,
    pub cache: Arc<KvCacheStore>,
    pub config: AppConfig,
}

/// User intents collected while drawing and applied once the frame is laid out.
enum Action {
    SubmitLocation(String),
    SelectCategory(Category),
    Refresh,
    SetMode(FeedMode),
    Search(String),
    Open(String),
    ToggleAbout,
}

struct AboutStats {
    articles_cached: usize,
    partitions_cached: usize,
    requests_today: u32,
    daily_limit: u32,
}

pub struct NewsApp {
    runtime: Arc<Runtime>,
    coordinator: FeedCoordinator,
    cache: Arc<KvCacheStore>,
    config: AppConfig,
    snapshot: FeedSnapshot,
    location_input: String,
    search_input: String,
    about: Option<AboutStats>,
}

impl NewsApp {
    pub fn new(init: AppInit, ctx: &egui::Context) -> Self {
        let app = Self {
            runtime: init.runtime,
            coordinator: init.coordinator,
            cache: init.cache,
            config: init.config,
            snapshot: FeedSnapshot::default(),
            location_input: String::new(),
            search_input: String::new(),
            about: None,
        };

        let mode = app.config.ui.mode;
        app.spawn(ctx, move |coordinator| async move {
            let restored = coordinator.restore_last_partition().await;
            if restored.is_none() && mode == FeedMode::Category {
                coordinator.select_category(Category::World).await;
            }
        });
        app
    }

    /// Runs `job` on the runtime and repaints once it settles.
    fn spawn<F, Fut>(&self, ctx: &egui::Context, job: F)
    where
        F: FnOnce(FeedCoordinator) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = job(self.coordinator.clone());
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            fut.await;
            ctx.request_repaint();
        });
    }

    fn apply(&mut self, ctx: &egui::Context, action: Action) {
        match action {
            Action::SubmitLocation(input) => {
                self.spawn(ctx, move |c| async move {
                    c.select_location(&input).await;
                });
            }
            Action::SelectCategory(category) => {
                self.spawn(ctx, move |c| async move {
                    c.select_category(category).await;
                });
            }
            Action::Refresh => {
                self.spawn(ctx, |c| async move {
                    c.refresh().await;
                });
            }
            Action::SetMode(mode) => {
                let mut ui_cfg = self.config.ui.clone();
                ui_cfg.mode = mode;
                if let Err(e) = self.config.update_ui(ui_cfg) {
                    warn!(error = %e, "failed to save feed mode");
                }
                let showing_category = matches!(self.snapshot.partition, Some(Partition::Category(_)));
                let showing_location = matches!(self.snapshot.partition, Some(Partition::Location(_)));
                match mode {
                    FeedMode::Category if !showing_category => {
                        self.apply(ctx, Action::SelectCategory(Category::World));
                    }
                    FeedMode::Location
                        if !showing_location && !self.location_input.trim().is_empty() =>
                    {
                        let input = self.location_input.trim().to_owned();
                        self.apply(ctx, Action::SubmitLocation(input));
                    }
                    _ => {}
                }
            }
            Action::Search(term) => {
                self.runtime.block_on(self.coordinator.set_search(term));
            }
            Action::Open(url) => {
                if let Err(e) = webbrowser::open(&url) {
                    warn!(error = %e, url = %url, "failed to open article");
                }
            }
            Action::ToggleAbout => {
                self.about = match self.about {
                    Some(_) => None,
                    None => Some(self.collect_stats()),
                };
            }
        }
    }

    fn collect_stats(&self) -> AboutStats {
        self.runtime.block_on(async {
            let keys = self.cache.cached_partition_keys().await;
            let articles_cached = self.cache.cached_article_count(&keys).await;
            let (requests_today, daily_limit) = match self.coordinator.ledger() {
                Some(ledger) => (ledger.requests_on(Utc::now()).await, ledger.daily_limit()),
                None => (0, self.config.fetch.daily_request_limit),
            };
            AboutStats {
                articles_cached,
                partitions_cached: keys.len(),
                requests_today,
                daily_limit,
            }
        })
    }

    fn partition_label(&self) -> String {
        self.snapshot
            .partition
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn draw_header(&mut self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.heading(egui::RichText::new("📍 ScrollFeed").strong().size(22.0));
                let subtitle = match self.config.ui.mode {
                    FeedMode::Location => "Local news reader · Last 2 days",
                    FeedMode::Category => "Top stories by category",
                };
                ui.label(
                    egui::RichText::new(subtitle)
                        .color(theme::secondary_text(&self.config.theme))
                        .size(13.0),
                );
            });
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("ℹ").on_hover_text("About").clicked() {
                    actions.push(Action::ToggleAbout);
                }
                if self.snapshot.partition.is_some() {
                    let refresh = egui::Button::new(if self.snapshot.refreshing { "⟳ …" } else { "⟳" });
                    if ui
                        .add_enabled(!self.snapshot.is_busy(), refresh)
                        .on_hover_text("Refresh news")
                        .clicked()
                    {
                        actions.push(Action::Refresh);
                    }
                }
                ui.separator();
                let mode = self.config.ui.mode;
                if ui
                    .selectable_label(mode == FeedMode::Category, "Categories")
                    .clicked()
                    && mode != FeedMode::Category
                {
                    actions.push(Action::SetMode(FeedMode::Category));
                }
                if ui
                    .selectable_label(mode == FeedMode::Location, "Location")
                    .clicked()
                    && mode != FeedMode::Location
                {
                    actions.push(Action::SetMode(FeedMode::Location));
                }
            });
        });
    }

    fn draw_selector(&mut self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        match self.config.ui.mode {
            FeedMode::Location => {
                ui.horizontal(|ui| {
                    ui.label("📍");
                    let edit = ui.add(
                        egui::TextEdit::singleline(&mut self.location_input)
                            .hint_text("Enter city or region (e.g., Vancouver, London, Tokyo)")
                            .desired_width(ui.available_width() - 90.0),
                    );
                    let submitted =
                        edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    let label = if self.snapshot.partition.is_some() { "Update" } else { "Search" };
                    let has_input = !self.location_input.trim().is_empty();
                    let clicked = ui.add_enabled(has_input, egui::Button::new(label)).clicked();
                    if has_input && (submitted || clicked) {
                        actions.push(Action::SubmitLocation(self.location_input.trim().to_owned()));
                    }
                });
                if let Some(Partition::Location(loc)) = &self.snapshot.partition {
                    ui.label(
                        egui::RichText::new(format!("Currently showing: {loc}"))
                            .color(theme::secondary_text(&self.config.theme))
                            .size(12.0),
                    );
                }
            }
            FeedMode::Category => {
                ui.horizontal_wrapped(|ui| {
                    for category in Category::ALL {
                        let selected =
                            self.snapshot.partition == Some(Partition::Category(category));
                        if ui.selectable_label(selected, category.label()).clicked() && !selected {
                            actions.push(Action::SelectCategory(category));
                        }
                    }
                });
            }
        }

        if !self.snapshot.articles.is_empty() {
            ui.add_space(4.0);
            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.search_input)
                    .hint_text("Filter articles...")
                    .desired_width(f32::INFINITY),
            );
            if edit.changed() {
                actions.push(Action::Search(self.search_input.clone()));
            }
        }
    }

    fn draw_about(&self, ui: &mut egui::Ui, stats: &AboutStats) {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.label(egui::RichText::new("About ScrollFeed").strong().size(16.0));
            ui.label(format!(
                "{} articles cached across {} feeds",
                stats.articles_cached, stats.partitions_cached
            ));
            ui.label(format!(
                "{} of {} upstream requests used today",
                stats.requests_today, stats.daily_limit
            ));
            ui.label(
                egui::RichText::new("Feeds are cached for 15 minutes to stay within the daily quota.")
                    .color(theme::secondary_text(&self.config.theme))
                    .size(12.0),
            );
        });
    }

    fn draw_feed(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        let snap = &self.snapshot;
        let label = self.partition_label();
        let weak = theme::secondary_text(&self.config.theme);

        if snap.partition.is_none() && snap.phase != Phase::Loading {
            self.draw_welcome(ui, actions);
            return;
        }

        if snap.phase == Phase::Loading && snap.articles.is_empty() {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.spinner();
                ui.label(egui::RichText::new(format!("Loading news for {label}...")).color(weak));
            });
            return;
        }

        if snap.phase == Phase::Error {
            let message = snap.error.clone().unwrap_or_default();
            ui.horizontal_wrapped(|ui| {
                let text = if snap.articles.is_empty() {
                    format!("Unable to fetch news for \"{label}\": {message}")
                } else {
                    format!("Showing saved articles. Refresh failed: {message}")
                };
                ui.label(egui::RichText::new(text).color(theme::ERROR_COLOR));
                if ui.button("Retry").clicked() {
                    actions.push(Action::Refresh);
                }
            });
            if snap.articles.is_empty() {
                return;
            }
        }

        if snap.articles.is_empty() {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.label(format!("No recent news found for \"{label}\"."));
                ui.label(egui::RichText::new("Try a different location or check back later.").color(weak));
            });
            return;
        }

        if snap.refreshing {
            ui.label(egui::RichText::new(format!("Refreshing {label}...")).color(weak).italics());
        }

        let visible = snap.visible_articles();
        if visible.is_empty() {
            ui.label(egui::RichText::new("No articles match your search.").color(weak));
            return;
        }

        let now = Utc::now();
        egui::ScrollArea::vertical()
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for article in visible {
                    self.draw_card(ui, article, now, actions);
                    ui.add_space(5.0);
                }
            });
    }

    fn draw_welcome(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.label(egui::RichText::new("🌍").size(40.0));
            ui.heading("Welcome to ScrollFeed");
            match self.config.ui.mode {
                FeedMode::Location => {
                    ui.label("Enter your city or region above to see the latest local news from the past 2 days.");
                    ui.add_space(8.0);
                    ui.label(egui::RichText::new("Try these locations:").size(12.0));
                    ui.horizontal_wrapped(|ui| {
                        for city in EXAMPLE_LOCATIONS {
                            if ui.button(city).clicked() {
                                actions.push(Action::SubmitLocation(city.to_owned()));
                            }
                        }
                    });
                }
                FeedMode::Category => {
                    ui.label("Pick a category above to see the top stories.");
                }
            }
        });
    }

    fn draw_card(
        &self,
        ui: &mut egui::Ui,
        article: &Article,
        now: chrono::DateTime<Utc>,
        actions: &mut Vec<Action>,
    ) {
        let weak = theme::secondary_text(&self.config.theme);
        let frame = egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.vertical(|ui| {
                ui.add(
                    egui::Label::new(egui::RichText::new(&article.title).strong().size(17.0))
                        .wrap(true),
                );

                let preview = preview_text(&article.description);
                if !preview.is_empty() {
                    ui.label(egui::RichText::new(preview).color(weak).size(13.0));
                }

                ui.horizontal_wrapped(|ui| {
                    ui.label(
                        egui::RichText::new(&article.source_name)
                            .color(theme::accent(&self.config.theme))
                            .size(12.0),
                    );
                    ui.label(egui::RichText::new("·").color(weak).size(12.0));
                    ui.label(
                        egui::RichText::new(relative_label(article.published_at, now))
                            .color(weak)
                            .size(12.0),
                    );
                    if let Some(tag) = &article.category_tag {
                        ui.label(
                            egui::RichText::new(format!("🏷 {tag}"))
                                .color(Color32::from_rgb(150, 150, 150))
                                .size(12.0),
                        );
                    }
                });
            });
        });

        let response = frame
            .response
            .interact(egui::Sense::click())
            .on_hover_cursor(egui::CursorIcon::PointingHand);
        if response.clicked() && !article.url.is_empty() {
            actions.push(Action::Open(article.url.clone()));
        }
    }
}

/// Plain-text preview of an HTML-ish description, cut on a char boundary.
fn preview_text(description: &str) -> String {
    if description.trim().is_empty() {
        return String::new();
    }
    let text = html2text::from_read(description.as_bytes(), 100);
    let text = text.trim();
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        text.to_owned()
    }
}

impl eframe::App for NewsApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.snapshot = self.runtime.block_on(self.coordinator.snapshot());
        self.search_input.clone_from(&self.snapshot.search);
        if self.location_input.is_empty() {
            if let Some(Partition::Location(loc)) = &self.snapshot.partition {
                self.location_input = loc.clone();
            }
        }

        let mut actions = Vec::new();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            self.draw_header(ui, &mut actions);
            ui.separator();
            self.draw_selector(ui, &mut actions);
            ui.add_space(6.0);
        });

        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("Free & open-source news reader").size(11.0));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(stats) = &self.about {
                self.draw_about(ui, stats);
                ui.add_space(8.0);
            }
            self.draw_feed(ui, &mut actions);
        });

        for action in actions {
            self.apply(ctx, action);
        }

        if self.snapshot.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(150));
        }
    }
}
