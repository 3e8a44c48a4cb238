use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use ab_glyph::{FontRef, PxScale};
use anyhow::{anyhow, Context};
use futures_util::future::join_all;
use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use tracing::{debug, warn};

use super::pdf::wrap_caption;
use crate::entries::repo_types::Sticker;
use crate::storage::StorageClient;

/// Logical card size, before the pixel-ratio multiplier.
pub const CARD_WIDTH: u32 = 360;
pub const CARD_HEIGHT: u32 = 480;
const PHOTO_INSET: u32 = 16;
const STICKER_BASE: u32 = 64;
/// Caption band below the photo, logical pixels.
pub const CAPTION_TOP: u32 = 356;
const CAPTION_PX: f32 = 18.0;
const CAPTION_LEADING: u32 = 24;
const CAPTION_UNITS: usize = 36;
const CAPTION_LINES: usize = 4;

const PAPER: Rgba<u8> = Rgba([255, 253, 247, 255]);
const PLACEHOLDER: Rgba<u8> = Rgba([236, 232, 224, 255]);
const INK: Rgba<u8> = Rgba([58, 52, 46, 255]);

/// Latin fallback for captions when no other font is usable.
static FALLBACK_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// What a card is drawn from.
#[derive(Debug, Clone)]
pub struct CardSource {
    pub photo_path: Option<String>,
    pub caption: Option<String>,
    pub stickers: Vec<Sticker>,
}

pub struct CardLayers {
    pub photo: Option<DynamicImage>,
    pub stickers: Vec<(Sticker, DynamicImage)>,
}

#[derive(Debug, Clone)]
pub struct RenderedCard {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn sticker_key(id: &str) -> String {
    format!("stickers/{}.png", id)
}

async fn load_image(storage: Arc<dyn StorageClient>, key: String) -> Option<DynamicImage> {
    let bytes = match storage.get_object(&key).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, %key, "card image missing");
            return None;
        }
    };
    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await;
    match decoded {
        Ok(Ok(img)) => Some(img),
        Ok(Err(e)) => {
            warn!(error = %e, %key, "card image undecodable");
            None
        }
        Err(e) => {
            warn!(error = %e, %key, "decode task failed");
            None
        }
    }
}

/// Fetch and decode the photo and every sticker asset at once.
pub async fn load_layers(storage: Arc<dyn StorageClient>, source: &CardSource) -> CardLayers {
    let photo = source
        .photo_path
        .clone()
        .map(|p| load_image(storage.clone(), p));
    let sticker_loads = source
        .stickers
        .iter()
        .map(|s| load_image(storage.clone(), sticker_key(&s.id)));

    let (photo, stickers) = tokio::join!(
        async {
            match photo {
                Some(fut) => fut.await,
                None => None,
            }
        },
        join_all(sticker_loads)
    );

    let stickers = source
        .stickers
        .iter()
        .cloned()
        .zip(stickers)
        .filter_map(|(s, img)| img.map(|i| (s, i)))
        .collect();

    CardLayers { photo, stickers }
}

/// Rotate clockwise by `degrees` into a bounding box, nearest neighbour.
pub fn rotate(img: &RgbaImage, degrees: f32) -> RgbaImage {
    if degrees.rem_euclid(360.0) == 0.0 {
        return img.clone();
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (w, h) = (img.width() as f32, img.height() as f32);
    // Trim float noise so a quarter turn of 40x20 is exactly 20x40.
    let out_w = ((w * cos.abs() + h * sin.abs() - 1e-3).ceil() as u32).max(1);
    let out_h = ((w * sin.abs() + h * cos.abs() - 1e-3).ceil() as u32).max(1);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ocx, ocy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);

    RgbaImage::from_fn(out_w, out_h, |x, y| {
        let dx = x as f32 + 0.5 - ocx;
        let dy = y as f32 + 0.5 - ocy;
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < img.width() && (sy as u32) < img.height() {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

fn caption_font(font: Option<&[u8]>) -> anyhow::Result<FontRef<'_>> {
    if let Some(bytes) = font {
        match FontRef::try_from_slice(bytes) {
            Ok(f) => return Ok(f),
            Err(e) => warn!(error = %e, "caption font unreadable, using fallback"),
        }
    }
    FontRef::try_from_slice(FALLBACK_FONT).map_err(|e| anyhow!("fallback font: {}", e))
}

fn draw_caption(canvas: &mut RgbaImage, caption: &str, font: Option<&[u8]>, ratio: u32) -> anyhow::Result<()> {
    let mut lines = wrap_caption(caption.trim(), CAPTION_UNITS);
    if lines.is_empty() {
        return Ok(());
    }
    lines.truncate(CAPTION_LINES);
    let font = caption_font(font)?;
    let scale = PxScale::from(CAPTION_PX * ratio as f32);
    let x = (PHOTO_INSET * ratio) as i32;
    for (i, line) in lines.iter().enumerate() {
        let y = ((CAPTION_TOP + CAPTION_LEADING * i as u32) * ratio) as i32;
        draw_text_mut(canvas, INK, x, y, scale, &font, line);
    }
    Ok(())
}

/// Draw the card at `pixel_ratio` times its logical size and encode as an
/// opaque RGB PNG. The caption goes under the photo in `font`, or in the
/// bundled Latin font when that is missing or unreadable.
pub fn rasterize(
    layers: &CardLayers,
    caption: Option<&str>,
    font: Option<&[u8]>,
    pixel_ratio: u32,
) -> anyhow::Result<RenderedCard> {
    let ratio = pixel_ratio.max(1);
    let (w, h) = (CARD_WIDTH * ratio, CARD_HEIGHT * ratio);
    let mut canvas = RgbaImage::from_pixel(w, h, PAPER);

    let inset = PHOTO_INSET * ratio;
    let photo_side = w - 2 * inset;
    match &layers.photo {
        Some(photo) => {
            let fitted = photo.resize_to_fill(photo_side, photo_side, FilterType::Lanczos3);
            imageops::overlay(&mut canvas, &fitted.to_rgba8(), i64::from(inset), i64::from(inset));
        }
        None => {
            let blank = RgbaImage::from_pixel(photo_side, photo_side, PLACEHOLDER);
            imageops::overlay(&mut canvas, &blank, i64::from(inset), i64::from(inset));
        }
    }

    if let Some(caption) = caption {
        draw_caption(&mut canvas, caption, font, ratio)?;
    }

    let mut stickers: Vec<&(Sticker, DynamicImage)> = layers.stickers.iter().collect();
    stickers.sort_by_key(|(s, _)| s.z_index);
    for (sticker, img) in stickers {
        let side = ((STICKER_BASE * ratio) as f32 * sticker.scale).round().max(1.0) as u32;
        let sized = img.resize(side, side, FilterType::Triangle).to_rgba8();
        let turned = rotate(&sized, sticker.rotation);
        let cx = sticker.x * w as f32;
        let cy = sticker.y * h as f32;
        let left = (cx - turned.width() as f32 / 2.0).round() as i64;
        let top = (cy - turned.height() as f32 / 2.0).round() as i64;
        imageops::overlay(&mut canvas, &turned, left, top);
    }

    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("encode card png")?;
    debug!(width = w, height = h, bytes = png.len(), "card rasterized");
    Ok(RenderedCard { png, width: w, height: h })
}

/// Render a card once every image it shows has settled.
///
/// Photo and sticker assets are fetched and decoded concurrently; assets
/// that fail to load are left out rather than failing the export.
pub async fn render_card(
    storage: Arc<dyn StorageClient>,
    source: &CardSource,
    font: Option<Arc<Vec<u8>>>,
    settle: Duration,
    pixel_ratio: u32,
) -> anyhow::Result<RenderedCard> {
    let layers = load_layers(storage, source).await;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    let caption = source.caption.clone();
    tokio::task::spawn_blocking(move || {
        rasterize(&layers, caption.as_deref(), font.as_deref().map(Vec::as_slice), pixel_ratio)
    })
    .await
    .context("render task")?
}
