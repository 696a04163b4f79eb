//! Builders for test configurations and capture data.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use herdscore::config::{load_config_from_str, AnalysisConfig, Config, LoggingConfig, SyncConfig};
use herdscore::scoring::{BreedStandard, TraitStandard};

/// The example configuration shipped next to the schema.
pub const EXAMPLE_CONFIG: &str = include_str!("../../../../schema/example-config.json");

/// Breed standards from the example configuration.
pub fn example_standards() -> Vec<BreedStandard> {
    load_config_from_str(EXAMPLE_CONFIG)
        .expect("Example config should load")
        .standards
}

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Test defaults: fixed device id, manual sync, short delays and the
    /// example breed standards.
    pub fn new() -> Self {
        Self {
            config: Config {
                device_id: Some("TEST01".to_string()),
                analysis: AnalysisConfig {
                    timeout_secs: 5,
                    max_attempts: 2,
                    retry_delay_ms: 10,
                },
                sync: SyncConfig {
                    auto_sync: false,
                    base_backoff_secs: 1,
                    max_backoff_secs: 4,
                    attempt_timeout_secs: 5,
                    ..Default::default()
                },
                logging: LoggingConfig {
                    level: "debug".to_string(),
                    json: false,
                },
                standards: example_standards(),
                ..Default::default()
            },
        }
    }

    pub fn device_id(mut self, device_id: &str) -> Self {
        self.config.device_id = Some(device_id.to_string());
        self
    }

    pub fn generated_device_id(mut self) -> Self {
        self.config.device_id = None;
        self
    }

    pub fn data_directory(mut self, path: &str) -> Self {
        self.config.data_directory = Some(path.to_string());
        self
    }

    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.config.sync.auto_sync = enabled;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.sync.concurrency = concurrency;
        self
    }

    pub fn attention_threshold(mut self, threshold: u32) -> Self {
        self.config.sync.attention_threshold = threshold;
        self
    }

    /// Adds a standard, replacing any for the same category.
    pub fn standard(mut self, standard: BreedStandard) -> Self {
        self.config
            .standards
            .retain(|s| !s.category.eq_ignore_ascii_case(&standard.category));
        self.config.standards.push(standard);
        self
    }

    pub fn without_standards(mut self) -> Self {
        self.config.standards.clear();
        self
    }

    pub fn fallback_standard(mut self, standard: BreedStandard) -> Self {
        self.config.fallback_standard = Some(standard);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating `BreedStandard` instances.
pub struct StandardBuilder {
    category: String,
    traits: BTreeMap<String, TraitStandard>,
}

impl StandardBuilder {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            traits: BTreeMap::new(),
        }
    }

    /// Adds a trait with weight 1.
    pub fn trait_standard(self, name: &str, ideal: f64, tolerance: f64) -> Self {
        self.weighted(name, ideal, tolerance, 1.0)
    }

    pub fn weighted(mut self, name: &str, ideal: f64, tolerance: f64, weight: f64) -> Self {
        self.traits.insert(
            name.to_string(),
            TraitStandard {
                ideal,
                tolerance,
                weight,
            },
        );
        self
    }

    pub fn build(self) -> BreedStandard {
        BreedStandard {
            category: self.category,
            traits: self.traits,
        }
    }
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 120])
    });
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, format)
        .expect("Failed to encode test image");
    bytes.into_inner()
}

/// A small decodable PNG.
pub fn png_bytes() -> Vec<u8> {
    encode(16, 12, ImageFormat::Png)
}

/// A small decodable JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    encode(16, 12, ImageFormat::Jpeg)
}

/// Bytes that look like a PNG header but do not decode.
pub fn truncated_png() -> Vec<u8> {
    let mut bytes = png_bytes();
    bytes.truncate(20);
    bytes
}
