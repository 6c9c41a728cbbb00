use std::time::{Duration, Instant};

use rand::Rng;

/// Which screen owns the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Selection,
    Tracker,
    Viewer,
}

/// Top-level state threaded down into the screens. Owned by the app; leaf
/// views never reach for it through globals.
pub struct SessionShell {
    pub mode: Mode,
    /// The shared identifier linking a tracker to its viewers. Empty while on
    /// the selection screen.
    pub bag_id: String,
    /// Free-text identifier input on the selection screen.
    pub viewer_input: String,
    /// Set when the identifier was just copied; drives the 2s confirmation.
    copied_at: Option<Instant>,
    /// Narrow-window layout, recomputed every frame from the viewport width.
    pub compact: bool,
}

/// Windows narrower than this get the stacked mobile-ish layout.
pub const COMPACT_WIDTH: f32 = 768.0;

const COPY_FLASH: Duration = Duration::from_secs(2);

impl SessionShell {
    pub fn new() -> Self {
        Self {
            mode: Mode::Selection,
            bag_id: String::new(),
            viewer_input: String::new(),
            copied_at: None,
            compact: false,
        }
    }

    /// "Home": drop the identifier and fall back to the selection screen.
    /// Callers are responsible for tearing down the live controller first.
    pub fn reset_to_selection(&mut self) {
        self.mode = Mode::Selection;
        self.bag_id.clear();
        self.viewer_input.clear();
        self.copied_at = None;
    }

    pub fn mark_copied(&mut self) {
        self.copied_at = Some(Instant::now());
    }

    pub fn copy_flash_active(&self) -> bool {
        self.copied_at
            .map(|at| at.elapsed() < COPY_FLASH)
            .unwrap_or(false)
    }
}

impl Default for SessionShell {
    fn default() -> Self {
        Self::new()
    }
}

pub const BAG_ID_LEN: usize = 6;

const BAG_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Mint a new identifier: six uppercase base-36 characters. There is no
/// uniqueness check against the store; a collision means the second tracker
/// silently takes over the document.
pub fn generate_bag_id() -> String {
    generate_bag_id_with(&mut rand::thread_rng())
}

pub fn generate_bag_id_with<R: Rng>(rng: &mut R) -> String {
    (0..BAG_ID_LEN)
        .map(|_| BAG_ID_ALPHABET[rng.gen_range(0..BAG_ID_ALPHABET.len())] as char)
        .collect()
}
