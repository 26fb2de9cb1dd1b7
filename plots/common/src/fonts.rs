//! Font registration for bitmap text.
//!
//! Plotters keeps one process-wide font table, so the `sans-serif` face is
//! chosen once at startup. Scene rendering, SVG and PDF never need it.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use plotters::style::{FontStyle, register_font};
use tracing::{debug, warn};

static SANS_SERIF: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Registers the first readable TrueType font in `candidates` as
/// `sans-serif`. Only the first call in a process looks at its candidates;
/// later calls return what it registered.
pub fn register(candidates: &[PathBuf]) -> Option<&'static Path> {
    SANS_SERIF
        .get_or_init(|| {
            for path in candidates {
                let Ok(bytes) = fs::read(path) else {
                    debug!("Font {} not readable", path.display());
                    continue;
                };
                let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
                if register_font("sans-serif", FontStyle::Normal, bytes).is_ok() {
                    debug!("Registered {} as sans-serif", path.display());
                    return Some(path.clone());
                }
                warn!("{} is not a usable TrueType font", path.display());
            }
            warn!("No font found in {candidates:?}, bitmap output will have no text");
            None
        })
        .as_deref()
}

/// The font registered by [`register`], if any.
pub fn registered() -> Option<&'static Path> {
    SANS_SERIF.get().and_then(|path| path.as_deref())
}
