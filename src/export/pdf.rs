use std::io::{BufWriter, Cursor};

use anyhow::{anyhow, Context};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};
use tracing::warn;

use super::render::RenderedCard;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 10.0;

const IMAGE_DPI: f32 = 300.0;
const CAPTION_PT: f32 = 14.0;
const LINE_MM: f32 = 7.0;
const CAPTION_GAP_MM: f32 = 6.0;
/// Half-width units per caption line; wide glyphs count as two.
const LINE_UNITS: usize = 60;
const MAX_CAPTION_LINES: usize = 6;
const MM_PER_INCH: f32 = 25.4;

/// Where the card image lands on the page, bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scale a `width_px` x `height_px` image into the printable area above a
/// caption band of `caption_mm`, keeping its aspect ratio. The image is
/// centered horizontally and hugs the top margin.
pub fn fit_to_page(width_px: u32, height_px: u32, caption_mm: f32) -> Placement {
    let avail_w = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
    let avail_h = (PAGE_HEIGHT_MM - 2.0 * MARGIN_MM - caption_mm).max(1.0);
    let (w, h) = (width_px.max(1) as f32, height_px.max(1) as f32);

    let scale = (avail_w / w).min(avail_h / h);
    let width = w * scale;
    let height = h * scale;
    Placement {
        x: MARGIN_MM + (avail_w - width) / 2.0,
        y: PAGE_HEIGHT_MM - MARGIN_MM - height,
        width,
        height,
    }
}

fn char_units(c: char) -> usize {
    // Hangul, CJK and full-width forms take roughly two Latin widths.
    match c as u32 {
        0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60 => 2,
        _ => 1,
    }
}

/// Break a caption into lines of at most `max_units`, preferring spaces and
/// splitting words that do not fit on their own. Explicit newlines are kept.
pub fn wrap_caption(text: &str, max_units: usize) -> Vec<String> {
    let max_units = max_units.max(2);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut used = 0;
        for word in paragraph.split_whitespace() {
            let word_units: usize = word.chars().map(char_units).sum();
            let sep = usize::from(!line.is_empty());
            if used + sep + word_units <= max_units {
                if sep == 1 {
                    line.push(' ');
                }
                line.push_str(word);
                used += sep + word_units;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                used = 0;
            }
            for c in word.chars() {
                let u = char_units(c);
                if used + u > max_units {
                    lines.push(std::mem::take(&mut line));
                    used = 0;
                }
                line.push(c);
                used += u;
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn caption_font(doc: &PdfDocumentReference, font: Option<&[u8]>) -> anyhow::Result<IndirectFontRef> {
    if let Some(bytes) = font {
        match doc.add_external_font(Cursor::new(bytes)) {
            Ok(f) => return Ok(f),
            Err(e) => warn!(error = ?e, "font rejected by pdf writer, using Helvetica"),
        }
    }
    doc.add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("builtin font: {:?}", e))
}

/// Lay the card PNG out on one A4 page with the caption underneath.
pub fn build_pdf(
    card: &RenderedCard,
    caption: Option<&str>,
    font: Option<&[u8]>,
    title: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut lines = caption
        .map(|c| wrap_caption(c.trim(), LINE_UNITS))
        .unwrap_or_default();
    lines.truncate(MAX_CAPTION_LINES);
    let caption_mm = if lines.is_empty() {
        0.0
    } else {
        CAPTION_GAP_MM + LINE_MM * lines.len() as f32
    };
    let place = fit_to_page(card.width, card.height, caption_mm);

    let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "card");
    let layer = doc.get_page(page).get_layer(layer);

    let decoder = PngDecoder::new(Cursor::new(card.png.as_slice())).context("read card png")?;
    let image = Image::try_from(decoder).context("embed card png")?;
    // Native size at IMAGE_DPI, then scaled to the placement.
    let native_w = card.width as f32 / IMAGE_DPI * MM_PER_INCH;
    let native_h = card.height as f32 / IMAGE_DPI * MM_PER_INCH;
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(place.x)),
            translate_y: Some(Mm(place.y)),
            scale_x: Some(place.width / native_w),
            scale_y: Some(place.height / native_h),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );

    if !lines.is_empty() {
        let font = caption_font(&doc, font)?;
        let mut baseline = place.y - CAPTION_GAP_MM - LINE_MM * 0.7;
        for line in &lines {
            layer.use_text(line.as_str(), CAPTION_PT, Mm(place.x), Mm(baseline), &font);
            baseline -= LINE_MM;
        }
    }

    let mut out = BufWriter::new(Vec::new());
    doc.save(&mut out).map_err(|e| anyhow!("write pdf: {:?}", e))?;
    out.into_inner().context("flush pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::render::{rasterize, CardLayers};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn portrait_card_fills_height_without_caption() {
        let p = fit_to_page(720, 960, 0.0);
        // 190 x 277 printable; a 3:4 card is width-bound at 190 mm.
        assert!(approx(p.width, 190.0));
        assert!(approx(p.height, 253.333));
        assert!(approx(p.x, MARGIN_MM));
        assert!(approx(p.y + p.height, PAGE_HEIGHT_MM - MARGIN_MM));
    }

    #[test]
    fn caption_band_shrinks_tall_images() {
        let p = fit_to_page(500, 2000, 20.0);
        assert!(approx(p.height, 257.0));
        assert!(approx(p.width, 64.25));
        // Centered horizontally.
        assert!(approx(p.x * 2.0 + p.width, PAGE_WIDTH_MM));
        assert!(p.y >= MARGIN_MM + 20.0 - 0.01);
    }

    #[test]
    fn wrapping_prefers_spaces() {
        let lines = wrap_caption("went for a walk by the river", 12);
        assert_eq!(lines, vec!["went for a", "walk by the", "river"]);
    }

    #[test]
    fn wide_glyphs_count_double() {
        let lines = wrap_caption("오늘도잘했어요", 8);
        assert_eq!(lines, vec!["오늘도잘", "했어요"]);
    }

    #[test]
    fn newlines_start_new_lines() {
        assert_eq!(wrap_caption("one\ntwo", 40), vec!["one", "two"]);
        assert!(wrap_caption("   ", 40).is_empty());
    }

    #[test]
    fn pdf_falls_back_to_builtin_font() {
        let card = rasterize(&CardLayers { photo: None, stickers: vec![] }, None, None, 1).unwrap();
        let bytes = build_pdf(&card, Some("A quiet Sunday"), Some(b"not a font"), "2025-01-15").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn pdf_without_caption() {
        let card = rasterize(&CardLayers { photo: None, stickers: vec![] }, None, None, 1).unwrap();
        let bytes = build_pdf(&card, None, None, "blank").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
