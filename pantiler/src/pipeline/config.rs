//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::DEFAULT_CACHE_DIR;
use crate::glyphs::{GlyphRasterizer, SdfRasterizer};
use crate::process::ToolConfig;
use crate::tile::ClipBounds;

/// Everything a run needs besides the build spec itself.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Output directory; must not exist yet.
    pub target: PathBuf,
    /// Cache directory, reused across runs.
    pub cache: PathBuf,
    /// Remove the cache after a successful run.
    pub clear_cache: bool,
    /// Clip tiles to this box.
    pub bounds: Option<ClipBounds>,
    /// Per-request timeout for downloads. `None` waits forever.
    pub http_timeout: Option<Duration>,
    pub tippecanoe: ToolConfig,
    pub ogr2ogr: ToolConfig,
    pub rasterizer: Arc<dyn GlyphRasterizer>,
}

impl PipelineConfig {
    /// Defaults for building into `target`.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            cache: PathBuf::from(DEFAULT_CACHE_DIR),
            clear_cache: false,
            bounds: None,
            http_timeout: None,
            tippecanoe: ToolConfig::tippecanoe(),
            ogr2ogr: ToolConfig::ogr2ogr(),
            rasterizer: Arc::new(SdfRasterizer::default()),
        }
    }

    pub fn with_cache(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = cache.into();
        self
    }

    pub fn with_clear_cache(mut self, clear_cache: bool) -> Self {
        self.clear_cache = clear_cache;
        self
    }

    pub fn with_bounds(mut self, bounds: Option<ClipBounds>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn with_tippecanoe(mut self, tool: ToolConfig) -> Self {
        self.tippecanoe = tool;
        self
    }

    pub fn with_ogr2ogr(mut self, tool: ToolConfig) -> Self {
        self.ogr2ogr = tool;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn GlyphRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("target", &self.target)
            .field("cache", &self.cache)
            .field("clear_cache", &self.clear_cache)
            .field("bounds", &self.bounds)
            .field("http_timeout", &self.http_timeout)
            .field("tippecanoe", &self.tippecanoe)
            .field("ogr2ogr", &self.ogr2ogr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("out");
        assert_eq!(config.target, PathBuf::from("out"));
        assert_eq!(config.cache, PathBuf::from(".pantiler-cache"));
        assert!(!config.clear_cache);
        assert_eq!(config.bounds, None);
        assert_eq!(config.tippecanoe.name, "tippecanoe");
        assert_eq!(config.ogr2ogr.name, "ogr2ogr");
    }

    #[test]
    fn test_builder_overrides() {
        let bounds: ClipBounds = "0,0,1,1".parse().unwrap();
        let config = PipelineConfig::new("out")
            .with_cache("/tmp/cache")
            .with_clear_cache(true)
            .with_bounds(Some(bounds))
            .with_http_timeout(Duration::from_secs(30))
            .with_tippecanoe(ToolConfig::tippecanoe().with_program("/opt/bin/tippecanoe"));

        assert_eq!(config.cache, PathBuf::from("/tmp/cache"));
        assert!(config.clear_cache);
        assert_eq!(config.bounds, Some(bounds));
        assert_eq!(config.http_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.tippecanoe.program, PathBuf::from("/opt/bin/tippecanoe"));
        assert!(format!("{:?}", config).contains("clear_cache: true"));
    }
}
