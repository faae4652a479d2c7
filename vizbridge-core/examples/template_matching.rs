//! Template matching walkthrough.
//!
//! Generates a source image and a template cut out of it, loads both into the
//! module, finds the template, outlines the match and writes `outMatch.png`.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p vizbridge-core --example template_matching
//! ```

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use vizbridge_core::{
    init_tracing, BridgeConfig, BuiltinFactory, EngineLoader, ImageEnvironment, ImageIo,
    WriteOptions,
};

const SOURCE: (u32, u32) = (160, 120);
const TEMPLATE: (u32, u32) = (24, 24);
const TEMPLATE_AT: (u32, u32) = (97, 31);

fn texel(x: u32, y: u32) -> image::Rgba<u8> {
    let h = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(2_246_822_519);
    image::Rgba([(h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8, 255])
}

/// Top-left corner of the best match by sum of squared differences.
fn match_template(src: &[u8], templ: &[u8]) -> (u32, u32) {
    let (sw, sh) = (SOURCE.0 as usize, SOURCE.1 as usize);
    let (tw, th) = (TEMPLATE.0 as usize, TEMPLATE.1 as usize);
    let mut best = (u64::MAX, 0, 0);
    for y in 0..=sh - th {
        for x in 0..=sw - tw {
            let mut score = 0u64;
            for ty in 0..th {
                let s = ((y + ty) * sw + x) * 4;
                let t = ty * tw * 4;
                for (a, b) in src[s..s + tw * 4].iter().zip(&templ[t..t + tw * 4]) {
                    let d = *a as i64 - *b as i64;
                    score += (d * d) as u64;
                }
            }
            if score < best.0 {
                best = (score, x, y);
            }
        }
    }
    (best.1 as u32, best.2 as u32)
}

fn outline(buf: &mut [u8], (x0, y0): (u32, u32), (x1, y1): (u32, u32)) {
    let width = SOURCE.0;
    for y in y0..=y1.min(SOURCE.1 - 1) {
        for x in x0..=x1.min(width - 1) {
            if x <= x0 + 1 || x + 1 >= x1 || y <= y0 + 1 || y + 1 >= y1 {
                let i = ((y * width + x) * 4) as usize;
                buf[i..i + 4].copy_from_slice(&[255, 0, 0, 255]);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let dir = std::env::temp_dir().join("vizbridge-template-matching");
    std::fs::create_dir_all(&dir)?;
    image::RgbaImage::from_fn(SOURCE.0, SOURCE.1, texel).save(dir.join("imageCanvasInput.png"))?;
    image::RgbaImage::from_fn(TEMPLATE.0, TEMPLATE.1, |x, y| {
        texel(x + TEMPLATE_AT.0, y + TEMPLATE_AT.1)
    })
    .save(dir.join("templateCanvasInput.png"))?;

    let loader = Arc::new(EngineLoader::with_config(
        Arc::new(ImageEnvironment::new()),
        Arc::new(BuiltinFactory::new()),
        BridgeConfig::new().with_mount("/work", &dir),
    ));
    loader.ensure_ready().await?;
    let io = ImageIo::new(loader);

    let src = io.read_image_virtual("imageCanvasInput.png").await?;
    let templ = io.read_image_virtual("templateCanvasInput.png").await?;

    let mut pixels = src.read_pixels()?;
    let max_loc = match_template(&pixels, &templ.read_pixels()?);
    info!(x = max_loc.0, y = max_loc.1, "Template found");

    let corner = (max_loc.0 + TEMPLATE.0, max_loc.1 + TEMPLATE.1);
    outline(&mut pixels, max_loc, corner);
    src.write_pixels(&pixels)?;

    io.write_image_virtual("outMatch.png", &src, &WriteOptions::default())
        .await?;
    info!(output = ?dir.join("outMatch.png"), "Annotated match written");

    src.release()?;
    templ.release()?;
    Ok(())
}
