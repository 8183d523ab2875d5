//! Named size and quality presets shared by the browser client and the CLI.
//!
//! | Size | Max edge | | Quality | Value |
//! |---|---|---|---|---|
//! | Original | no resize | | High | 85 |
//! | **Large** | 1920 | | **Medium** | 70 |
//! | Medium | 1280 | | Low | 50 |
//! | Small | 800 | | | |
//! | Thumb | 400 | | | |
//!
//! Defaults in bold. A size preset is applied as both `maxWidth` and
//! `maxHeight`, so the longer edge ends up at the preset value.

use crate::imaging::{Bounds, Quality};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SizePreset {
    Original,
    #[default]
    Large,
    Medium,
    Small,
    Thumb,
}

impl SizePreset {
    pub const ALL: [SizePreset; 5] = [
        Self::Original,
        Self::Large,
        Self::Medium,
        Self::Small,
        Self::Thumb,
    ];

    /// Longest edge in pixels. 0 means keep the original size.
    pub fn max_edge(self) -> u32 {
        match self {
            Self::Original => 0,
            Self::Large => 1920,
            Self::Medium => 1280,
            Self::Small => 800,
            Self::Thumb => 400,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Original => "Original",
            Self::Large => "Large (1920px)",
            Self::Medium => "Medium (1280px)",
            Self::Small => "Small (800px)",
            Self::Thumb => "Thumbnail (400px)",
        }
    }

    pub fn bounds(self) -> Bounds {
        Bounds::square(self.max_edge())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    High,
    #[default]
    Medium,
    Low,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn value(self) -> u32 {
        match self {
            Self::High => 85,
            Self::Medium => 70,
            Self::Low => 50,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn quality(self) -> Quality {
        Quality::new(self.value())
    }
}

/// One entry of the `/api/presets` listing.
#[derive(Debug, Clone, Serialize)]
pub struct PresetEntry<T: Serialize> {
    pub id: T,
    pub label: &'static str,
    pub value: u32,
    pub default: bool,
}

/// Everything the client needs to render its preset selects.
#[derive(Debug, Clone, Serialize)]
pub struct PresetCatalog {
    pub sizes: Vec<PresetEntry<SizePreset>>,
    pub qualities: Vec<PresetEntry<QualityPreset>>,
}

pub fn catalog() -> PresetCatalog {
    PresetCatalog {
        sizes: SizePreset::ALL
            .iter()
            .map(|&p| PresetEntry {
                id: p,
                label: p.label(),
                value: p.max_edge(),
                default: p == SizePreset::default(),
            })
            .collect(),
        qualities: QualityPreset::ALL
            .iter()
            .map(|&p| PresetEntry {
                id: p,
                label: p.label(),
                value: p.value(),
                default: p == QualityPreset::default(),
            })
            .collect(),
    }
}
