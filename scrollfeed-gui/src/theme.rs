use eframe::egui::{self, Color32, Rounding, Stroke};
use scrollfeed_core::config::ThemeConfig;

fn rgb(c: [u8; 3]) -> Color32 {
    Color32::from_rgb(c[0], c[1], c[2])
}

pub fn accent(theme: &ThemeConfig) -> Color32 {
    rgb(theme.accent_color)
}

pub fn secondary_text(theme: &ThemeConfig) -> Color32 {
    rgb(theme.secondary_text_color)
}

pub const ERROR_COLOR: Color32 = Color32::from_rgb(229, 57, 53);

/// Dark style built from the configured palette. Only the fills, strokes and
/// spacing the feed cards and selector buttons depend on are overridden.
pub fn apply(ctx: &egui::Context, theme: &ThemeConfig) {
    let mut style = (*ctx.style()).clone();
    let text = rgb(theme.text_color);
    let border = rgb(theme.border_color);
    let accent = rgb(theme.accent_color);

    let visuals = &mut style.visuals;
    visuals.dark_mode = true;
    visuals.panel_fill = rgb(theme.panel_color);
    visuals.window_fill = rgb(theme.background_color);
    visuals.override_text_color = Some(text);
    visuals.selection.bg_fill = accent.gamma_multiply(0.25);
    visuals.selection.stroke = Stroke::new(1.0, accent);

    let widgets = &mut visuals.widgets;
    widgets.noninteractive.bg_stroke = Stroke::new(1.0, border);
    widgets.inactive.bg_stroke = Stroke::new(1.0, border);
    widgets.hovered.bg_stroke = Stroke::new(1.0, accent);
    widgets.active.bg_fill = accent;
    widgets.active.fg_stroke = Stroke::new(1.0, Color32::WHITE);
    for state in [&mut widgets.inactive, &mut widgets.hovered, &mut widgets.active] {
        state.rounding = Rounding::same(3.0);
    }

    style.spacing.item_spacing = egui::vec2(10.0, 8.0);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);

    ctx.set_style(style);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_drives_panel_and_active_fill() {
        let ctx = egui::Context::default();
        let theme = ThemeConfig::default();
        apply(&ctx, &theme);

        let style = ctx.style();
        assert!(style.visuals.dark_mode);
        assert_eq!(style.visuals.panel_fill, rgb(theme.panel_color));
        assert_eq!(style.visuals.widgets.active.bg_fill, accent(&theme));
    }
}
