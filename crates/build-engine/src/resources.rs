//! Launcher icons and splash screens
//!
//! Generates Android density buckets from the configured icon and splash image
//! into `<project>/resources/android/`, laid out like `app/src/main/res`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, info};
use webdroid_core::{AppConfig, WebDroidError};

/// Launcher icon sizes per density
pub const ICON_DENSITIES: &[(&str, u32)] = &[
    ("mdpi", 48),
    ("hdpi", 72),
    ("xhdpi", 96),
    ("xxhdpi", 144),
    ("xxxhdpi", 192),
];

/// Splash drawables: (directory, width, height)
pub const SPLASH_SIZES: &[(&str, u32, u32)] = &[
    ("drawable", 480, 320),
    ("drawable-port-mdpi", 320, 480),
    ("drawable-port-hdpi", 480, 800),
    ("drawable-port-xhdpi", 720, 1280),
    ("drawable-port-xxhdpi", 960, 1600),
    ("drawable-port-xxxhdpi", 1280, 1920),
    ("drawable-land-mdpi", 480, 320),
    ("drawable-land-hdpi", 800, 480),
    ("drawable-land-xhdpi", 1280, 720),
    ("drawable-land-xxhdpi", 1600, 960),
    ("drawable-land-xxxhdpi", 1920, 1280),
];

/// Share of the splash's shorter side the centered image may occupy
const SPLASH_IMAGE_RATIO: f32 = 1.0 / 3.0;

/// Files written by a resource run
#[derive(Debug, Clone, Default)]
pub struct GeneratedResources {
    pub files: Vec<PathBuf>,
}

/// Produces Android resources from the app configuration
#[async_trait]
pub trait ResourceProcessor: Send + Sync {
    async fn generate(&self, config: &AppConfig, out_dir: &Path) -> Result<GeneratedResources, WebDroidError>;
}

/// Resizes and composites with the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageResourceProcessor;

#[async_trait]
impl ResourceProcessor for ImageResourceProcessor {
    async fn generate(&self, config: &AppConfig, out_dir: &Path) -> Result<GeneratedResources, WebDroidError> {
        let icon = config.icon.clone();
        let splash = config
            .splash_screen
            .as_ref()
            .map(|s| (s.image.clone(), s.background_color.clone()));
        let android_dir = out_dir.join("android");

        if icon.is_none() && splash.is_none() {
            debug!("No icon or splash configured, skipping resource generation");
            return Ok(GeneratedResources::default());
        }

        tokio::task::spawn_blocking(move || -> Result<GeneratedResources, WebDroidError> {
            let mut generated = GeneratedResources::default();
            if let Some(icon) = icon {
                generated.files.extend(generate_icons(&icon, &android_dir)?);
            }
            if let Some((image, background)) = splash {
                generated.files.extend(generate_splashes(&image, &background, &android_dir)?);
            }
            info!("Generated {} resource files", generated.files.len());
            Ok(generated)
        })
        .await
        .map_err(|e| WebDroidError::resource(format!("Resource generation panicked: {}", e)))?
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, WebDroidError> {
    image::open(path).map_err(|e| {
        WebDroidError::resource(format!("Cannot read image {}: {}", path.display(), e))
            .with_context("path", path.display().to_string())
    })
}

fn save_image(image: &RgbaImage, path: &Path) -> Result<(), WebDroidError> {
    let write_error = |e: String| {
        WebDroidError::resource(format!("Cannot write {}: {}", path.display(), e))
            .with_context("path", path.display().to_string())
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
    }
    image.save(path).map_err(|e| write_error(e.to_string()))
}

/// `mipmap-<density>/ic_launcher.png` and `ic_launcher_round.png`
pub fn generate_icons(source: &Path, android_dir: &Path) -> Result<Vec<PathBuf>, WebDroidError> {
    let icon = load_image(source)?;
    let mut files = Vec::new();

    for (density, size) in ICON_DENSITIES {
        let resized = icon.resize_exact(*size, *size, FilterType::Lanczos3).to_rgba8();
        let dir = android_dir.join(format!("mipmap-{}", density));

        for name in ["ic_launcher.png", "ic_launcher_round.png"] {
            let path = dir.join(name);
            save_image(&resized, &path)?;
            files.push(path);
        }
    }

    Ok(files)
}

/// `<drawable dir>/splash.png` for each splash size
pub fn generate_splashes(source: &Path, background: &str, android_dir: &Path) -> Result<Vec<PathBuf>, WebDroidError> {
    let image = load_image(source)?;
    let background = parse_hex_color(background).ok_or_else(|| {
        WebDroidError::resource(format!("Invalid splash background color: {}", background))
            .with_context("backgroundColor", background)
    })?;

    let mut files = Vec::new();
    for (dir, width, height) in SPLASH_SIZES {
        let splash = compose_splash(&image, *width, *height, background);
        let path = android_dir.join(dir).join("splash.png");
        save_image(&splash, &path)?;
        files.push(path);
    }

    Ok(files)
}

/// Center `image`, scaled to fit, on a `width`×`height` canvas filled with `background`
pub fn compose_splash(image: &DynamicImage, width: u32, height: u32, background: Rgba<u8>) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, background);

    let max_side = ((width.min(height) as f32) * SPLASH_IMAGE_RATIO).max(1.0) as u32;
    let logo = image.resize(max_side, max_side, FilterType::Lanczos3).to_rgba8();

    let x = (width.saturating_sub(logo.width()) / 2) as i64;
    let y = (height.saturating_sub(logo.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &logo, x, y);

    canvas
}

/// `#RRGGBB` or `#RRGGBBAA`
pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    let channel = |i: usize| hex.get(i..i + 2).and_then(|c| u8::from_str_radix(c, 16).ok());

    match hex.len() {
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}
