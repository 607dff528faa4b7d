//! Sprite stage: pack declared icons into sheets at each pixel ratio.
//!
//! For ratio 1 and then ratio 2, every sprite image is loaded concurrently,
//! scaled by the ratio, and packed into one sheet. Each ratio produces
//!
//! - `sprites[@{ratio}x].png`: the composed sheet
//! - `sprites[@{ratio}x].json`: `{name: {x, y, width, height, pixelRatio}}`

mod packer;

pub use packer::{NamedImage, Placement, Sheet, SheetPacker};

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use futures::future::try_join_all;
use image::imageops::FilterType;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{PantilerError, Result};
use crate::fetch::{load_asset, HttpDownloader};
use crate::progress::{ProgressEvent, ProgressReporter, DONE, IN_PROGRESS};
use crate::sequence::run_in_order;
use crate::spec::AssetInput;

/// Pixel ratios rendered, in order.
pub const RATIOS: [u32; 2] = [1, 2];

/// Padding between sprites on a sheet.
pub const PADDING: u32 = 1;

/// File stem for the sheet at `ratio`.
pub fn file_stem(ratio: u32) -> String {
    if ratio == 1 {
        "sprites".to_string()
    } else {
        format!("sprites@{}x", ratio)
    }
}

/// One manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteEntry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: u32,
}

/// Manifest describing where each sprite sits on its sheet.
pub type Manifest = BTreeMap<String, SpriteEntry>;

fn build_manifest(sheet: &Sheet, ratio: u32) -> Manifest {
    sheet
        .placements
        .iter()
        .map(|(name, p)| {
            (
                name.clone(),
                SpriteEntry {
                    x: p.x,
                    y: p.y,
                    width: p.width,
                    height: p.height,
                    pixel_ratio: ratio,
                },
            )
        })
        .collect()
}

fn decode(name: &str, bytes: &[u8], ratio: u32) -> Result<NamedImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| PantilerError::InvalidImage {
            name: name.to_string(),
            reason: e.to_string(),
        })?
        .to_rgba8();
    let image = if ratio > 1 {
        let (w, h) = image.dimensions();
        image::imageops::resize(&image, w * ratio, h * ratio, FilterType::Lanczos3)
    } else {
        image
    };
    Ok(NamedImage {
        name: name.to_string(),
        image,
    })
}

/// Builds sprite sheets.
pub struct SpriteStage<'a> {
    http: &'a HttpDownloader,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> SpriteStage<'a> {
    pub fn new(http: &'a HttpDownloader, reporter: &'a dyn ProgressReporter) -> Self {
        Self { http, reporter }
    }

    /// Write one sheet and manifest per ratio under `target`.
    #[instrument(skip_all, fields(sprites = sprites.len()))]
    pub async fn run(&self, sprites: &[AssetInput], target: &Path) -> Result<usize> {
        let sheets = run_in_order(RATIOS, |ratio| self.ratio(sprites, ratio, target)).await?;
        Ok(sheets.len())
    }

    async fn ratio(&self, sprites: &[AssetInput], ratio: u32, target: &Path) -> Result<()> {
        let stem = file_stem(ratio);
        let event = ProgressEvent::process("packing").with_output(stem.clone());
        self.reporter.report(event.clone().with_message(IN_PROGRESS));

        let images = try_join_all(sprites.iter().map(|sprite| async move {
            let bytes = load_asset(self.http, "sprites", sprite).await?;
            let name = sprite.name.clone();
            tokio::task::spawn_blocking(move || decode(&name, &bytes, ratio)).await?
        }))
        .await?;

        let (png, manifest) = tokio::task::spawn_blocking(move || {
            let sheet = SheetPacker::new(PADDING).pack(&images);
            let mut png = Vec::new();
            sheet
                .image
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|e| PantilerError::InvalidImage {
                    name: "sheet".to_string(),
                    reason: e.to_string(),
                })?;
            Ok::<_, PantilerError>((png, build_manifest(&sheet, ratio)))
        })
        .await??;

        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| PantilerError::InvalidDocument {
            path: target.join(format!("{}.json", stem)),
            reason: e.to_string(),
        })?;
        write(&target.join(format!("{}.json", stem)), &json).await?;
        write(&target.join(format!("{}.png", stem)), &png).await?;

        info!(ratio, sprites = manifest.len(), "Wrote sprite sheet");
        self.reporter.report(event.with_message(DONE));
        Ok(())
    }
}

async fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| PantilerError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NullReporter, RecordingReporter};
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn icon(dir: &Path, name: &str, w: u32, h: u32) -> AssetInput {
        let path = dir.join(format!("{}.png", name));
        RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255]))
            .save(&path)
            .unwrap();
        AssetInput {
            name: name.to_string(),
            url: None,
            path: Some(path),
            format: None,
        }
    }

    fn read_manifest(path: &Path) -> Manifest {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(1), "sprites");
        assert_eq!(file_stem(2), "sprites@2x");
    }

    #[tokio::test]
    async fn test_sheets_for_both_ratios() {
        let temp = TempDir::new().unwrap();
        let sprites = vec![icon(temp.path(), "pin", 8, 12), icon(temp.path(), "dot", 4, 4)];
        let target = temp.path().join("out");
        std::fs::create_dir(&target).unwrap();
        let http = HttpDownloader::new().unwrap();
        let reporter = RecordingReporter::new();

        let written = SpriteStage::new(&http, &reporter)
            .run(&sprites, &target)
            .await
            .unwrap();

        assert_eq!(written, 2);
        let one = read_manifest(&target.join("sprites.json"));
        assert_eq!(
            one["pin"],
            SpriteEntry { x: 0, y: 0, width: 8, height: 12, pixel_ratio: 1 }
        );
        assert_eq!(one["dot"].pixel_ratio, 1);

        let two = read_manifest(&target.join("sprites@2x.json"));
        assert_eq!((two["pin"].width, two["pin"].height), (16, 24));
        assert_eq!(two["dot"].pixel_ratio, 2);

        let sheet = image::open(target.join("sprites@2x.png")).unwrap();
        assert!(sheet.width() >= 16 && sheet.height() >= 24);
        assert!(target.join("sprites.png").exists());

        // Ratios run in order
        let outputs: Vec<_> = reporter
            .events()
            .into_iter()
            .map(|e| format!("{} {}", e.output.unwrap_or_default(), e.message))
            .collect();
        assert_eq!(
            outputs,
            vec![
                "sprites in progress...",
                "sprites done",
                "sprites@2x in progress...",
                "sprites@2x done"
            ]
        );
    }

    #[tokio::test]
    async fn test_undecodable_image_fails() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("broken.png");
        std::fs::write(&broken, b"not an image").unwrap();
        let input = AssetInput {
            name: "broken".to_string(),
            url: None,
            path: Some(broken),
            format: None,
        };
        let http = HttpDownloader::new().unwrap();

        let err = SpriteStage::new(&http, &NullReporter)
            .run(&[input], temp.path())
            .await
            .unwrap_err();

        assert!(matches!(err, PantilerError::InvalidImage { ref name, .. } if name == "broken"));
    }
}
