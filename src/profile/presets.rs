//! Curated identity tables for preset and seeded profile generation.
//!
//! Every table is grouped by OS family so any draw produces a mutually
//! consistent identity: the user agent, platform string, and GPU pair always
//! come from the same family.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;

use super::{OsFamily, ScreenMetrics, StealthProfile};

/// A WebGL vendor/renderer pair as exposed through
/// `WEBGL_debug_renderer_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuStrings {
    pub vendor: &'static str,
    pub renderer: &'static str,
}

static WINDOWS_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

static MAC_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

static LINUX_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

static WINDOWS_GPUS: &[GpuStrings] = &[
    GpuStrings {
        vendor: "Google Inc. (Intel)",
        renderer: "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    GpuStrings {
        vendor: "Google Inc. (NVIDIA)",
        renderer: "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    GpuStrings {
        vendor: "Google Inc. (AMD)",
        renderer: "ANGLE (AMD, AMD Radeon RX 6700 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
];

static MAC_GPUS: &[GpuStrings] = &[
    GpuStrings {
        vendor: "Google Inc. (Apple)",
        renderer: "ANGLE (Apple, Apple M1, OpenGL 4.1 Metal - 88)",
    },
    GpuStrings {
        vendor: "Google Inc. (Apple)",
        renderer: "ANGLE (Apple, Apple M2, OpenGL 4.1 Metal - 88)",
    },
];

static LINUX_GPUS: &[GpuStrings] = &[
    GpuStrings {
        vendor: "Google Inc. (Intel)",
        renderer: "ANGLE (Intel, Mesa Intel(R) UHD Graphics 630 (CML GT2), OpenGL 4.6)",
    },
    GpuStrings {
        vendor: "Google Inc. (AMD)",
        renderer: "ANGLE (AMD, Mesa AMD Radeon RX 6700 XT (navy_flounder), OpenGL 4.6)",
    },
];

static TIMEZONE_OFFSETS: &[i32] = &[300, 360, 420, 480, 0, -60, -540, -600];

static LANGUAGE_SETS: Lazy<Vec<Vec<String>>> = Lazy::new(|| {
    vec![
        vec!["en-US".to_string(), "en".to_string()],
        vec!["en-GB".to_string(), "en".to_string()],
        vec!["en-US".to_string(), "en".to_string(), "de".to_string()],
    ]
});

static SCREENS: Lazy<Vec<ScreenMetrics>> = Lazy::new(|| {
    vec![
        ScreenMetrics::new(1920, 1080),
        ScreenMetrics::new(2560, 1440),
        ScreenMetrics::new(1536, 864),
        ScreenMetrics::new(1440, 900),
    ]
});

fn user_agents(family: OsFamily) -> &'static [&'static str] {
    match family {
        OsFamily::Windows => WINDOWS_USER_AGENTS,
        OsFamily::MacOs => MAC_USER_AGENTS,
        OsFamily::Linux => LINUX_USER_AGENTS,
    }
}

fn gpus(family: OsFamily) -> &'static [GpuStrings] {
    match family {
        OsFamily::Windows => WINDOWS_GPUS,
        OsFamily::MacOs => MAC_GPUS,
        OsFamily::Linux => LINUX_GPUS,
    }
}

fn browser_vendor(family: OsFamily) -> &'static str {
    // Chrome-shaped identities across all three families.
    let _ = family;
    "Google Inc."
}

fn assemble(family: OsFamily, seed: u64) -> StealthProfile {
    let uas = user_agents(family);
    let gpu = gpus(family)[(seed >> 8) as usize % gpus(family).len()];

    StealthProfile {
        platform: family.platform().to_string(),
        vendor: browser_vendor(family).to_string(),
        product: "Gecko".to_string(),
        product_sub: "20030107".to_string(),
        vendor_sub: String::new(),
        user_agent: uas[seed as usize % uas.len()].to_string(),
        languages: LANGUAGE_SETS[(seed >> 16) as usize % LANGUAGE_SETS.len()].clone(),
        hardware_concurrency: [4u8, 8, 8, 12, 16][(seed >> 24) as usize % 5],
        device_memory: [8u8, 8, 16, 32][(seed >> 32) as usize % 4],
        max_touch_points: 0,
        screen: SCREENS[(seed >> 40) as usize % SCREENS.len()].clone(),
        webgl_vendor: gpu.vendor.to_string(),
        webgl_renderer: gpu.renderer.to_string(),
        timezone_offset_minutes: TIMEZONE_OFFSETS[(seed >> 48) as usize % TIMEZONE_OFFSETS.len()],
        canvas_noise_amplitude: 2,
        audio_noise_amplitude: 1e-5,
    }
}

/// Canonical preset for one OS family (first table entry of each draw).
pub(super) fn preset(family: OsFamily) -> StealthProfile {
    assemble(family, 0)
}

/// Profile derived from an arbitrary 64-bit seed.
pub(super) fn from_seed(seed: u64) -> StealthProfile {
    let family = match seed % 3 {
        0 => OsFamily::Windows,
        1 => OsFamily::MacOs,
        _ => OsFamily::Linux,
    };
    assemble(family, seed)
}

pub(super) fn hash_seed(seed: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    hasher.finish()
}

pub(super) fn entropy_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed_cafe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_tables_match_their_family() {
        for gpu in WINDOWS_GPUS {
            assert!(OsFamily::Windows.matches_renderer(gpu.renderer));
        }
        for gpu in MAC_GPUS {
            assert!(OsFamily::MacOs.matches_renderer(gpu.renderer));
        }
        for gpu in LINUX_GPUS {
            assert!(OsFamily::Linux.matches_renderer(gpu.renderer));
        }
    }

    #[test]
    fn user_agent_tables_match_their_family() {
        for ua in WINDOWS_USER_AGENTS {
            assert!(OsFamily::Windows.matches_user_agent(ua));
        }
        for ua in MAC_USER_AGENTS {
            assert!(OsFamily::MacOs.matches_user_agent(ua));
        }
        for ua in LINUX_USER_AGENTS {
            assert!(OsFamily::Linux.matches_user_agent(ua));
        }
    }

    #[test]
    fn all_seeds_produce_valid_profiles() {
        for seed in [0u64, 1, 17, 0xdead_beef, u64::MAX] {
            from_seed(seed).validate().expect("seeded draw must validate");
        }
    }
}
