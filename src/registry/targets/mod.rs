//! Built-in detection targets.
//!
//! Each submodule wires one public bot-detection page: the extraction
//! script that scrapes its verdict, and a validator judging the scraped
//! payload. Hosts that want a different target set construct an empty
//! [`DetectionRegistry`](crate::registry::DetectionRegistry) and register
//! their own entries.

pub mod botd;
pub mod fingerprintjs;
pub mod headless;
pub mod sannysoft;

pub use botd::{botd_target, BOTD_EXTRACT_SCRIPT};
pub use fingerprintjs::{fingerprintjs_target, FINGERPRINTJS_EXTRACT_SCRIPT};
pub use headless::{headless_target, HEADLESS_EXTRACT_SCRIPT};
pub use sannysoft::{sannysoft_target, SANNYSOFT_EXTRACT_SCRIPT};

use crate::registry::DetectionTestEntry;

/// All built-in targets in their canonical order.
pub fn builtin_targets() -> Vec<DetectionTestEntry> {
    vec![
        botd_target(),
        sannysoft_target(),
        headless_target(),
        fingerprintjs_target(),
    ]
}
