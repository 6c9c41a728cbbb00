use log::warn;

/// Copy `text` to the system clipboard, preferring the OS clipboard and
/// falling back to egui's clipboard handling when that fails (e.g. no
/// display-server clipboard available). Failures are logged, never surfaced.
pub fn copy_text(ctx: &egui::Context, text: &str) {
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.to_owned())) {
        Ok(()) => {}
        Err(err) => {
            warn!("system clipboard unavailable ({err}), using egui fallback");
            ctx.copy_text(text.to_owned());
        }
    }
}
