//! Glyph stage: render declared fonts into range files for map labels.
//!
//! Fonts are handled one at a time. Within a font the Basic Multilingual
//! Plane is split into 256 code-point ranges which are rasterized
//! concurrently and written to `glyphs/{font}/{start}-{end}.pbf`.

mod pbf;
mod rasterizer;

pub use pbf::{encode, Glyph, GlyphRange};
pub use rasterizer::{distance_field, FontData, GlyphRasterizer, SdfRasterizer};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use crate::error::{PantilerError, Result};
use crate::fetch::{load_asset, HttpDownloader};
use crate::progress::{ProgressEvent, ProgressReporter, DONE, IN_PROGRESS};
use crate::sequence::run_in_order;
use crate::spec::AssetInput;

/// Code points per range file.
pub const RANGE_SIZE: u32 = 256;

/// Highest code point rendered.
pub const MAX_CODE_POINT: u32 = 65535;

/// Directory under the target holding every font.
pub const GLYPHS_DIR: &str = "glyphs";

/// All ranges from `0-255` up to `65280-65535`.
pub fn ranges() -> impl Iterator<Item = GlyphRange> {
    (0..=MAX_CODE_POINT)
        .step_by(RANGE_SIZE as usize)
        .map(|start| GlyphRange {
            start,
            end: (start + RANGE_SIZE - 1).min(MAX_CODE_POINT),
        })
}

/// Renders every declared font.
pub struct GlyphStage<'a> {
    http: &'a HttpDownloader,
    rasterizer: Arc<dyn GlyphRasterizer>,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> GlyphStage<'a> {
    pub fn new(
        http: &'a HttpDownloader,
        rasterizer: Arc<dyn GlyphRasterizer>,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            http,
            rasterizer,
            reporter,
        }
    }

    /// Render `fonts` under `target`, returning the number of files written.
    #[instrument(skip_all, fields(fonts = fonts.len()))]
    pub async fn run(&self, fonts: &[AssetInput], target: &Path) -> Result<usize> {
        let written = run_in_order(fonts, |font| self.font(font, target)).await?;
        Ok(written.into_iter().sum())
    }

    async fn font(&self, font: &AssetInput, target: &Path) -> Result<usize> {
        let event = ProgressEvent::process("rasterizing").with_input(font.name.clone());
        self.reporter.report(event.clone().with_message(IN_PROGRESS));

        let bytes = load_asset(self.http, "fonts", font).await?;
        let data = Arc::new(FontData {
            name: font.name.clone(),
            bytes,
        });

        let dir = target.join(GLYPHS_DIR).join(&font.name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PantilerError::CreateDirFailed {
                path: dir.clone(),
                source: e,
            })?;

        let written = try_join_all(ranges().map(|range| self.range(Arc::clone(&data), range, &dir)))
            .await?;
        let glyphs: usize = written.iter().sum();

        info!(font = %font.name, glyphs, "Rendered font");
        self.reporter.report(event.with_message(DONE));
        Ok(written.len())
    }

    /// Render and write one range, returning its glyph count.
    async fn range(&self, data: Arc<FontData>, range: GlyphRange, dir: &Path) -> Result<usize> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let (bytes, count) = tokio::task::spawn_blocking(move || {
            let glyphs = rasterizer.rasterize(&data, range)?;
            Ok::<_, PantilerError>((encode(&data.name, range, &glyphs), glyphs.len()))
        })
        .await??;

        let path: PathBuf = dir.join(format!("{}.pbf", range));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PantilerError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!(path = %path.display(), glyphs = count, "Wrote glyph range");
        Ok(count)
    }
}
