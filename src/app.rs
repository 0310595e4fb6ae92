use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::arxiv::{self, LatexTable, TableOptions};
use crate::cache::CacheLayout;
use crate::catalog::{self, CatalogTable};
use crate::domain::{Eprint, SourceLocator, TransportKind};
use crate::error::GaldynError;
use crate::fetch::{FetchOptions, FetchStatus, Fetcher};
use crate::fs_util;
use crate::transport::TransportProvider;

pub const HARRIS_URL: &str = "http://physwww.mcmaster.ca/~harris/mwgc.dat";

const PROBE_FILE_NAME: &str = "resource";

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub source: String,
    pub url: String,
    /// Cached file; absent for probes, which write nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub status: FetchStatus,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    /// Called once the operation that emitted events is over.
    fn clear(&self) {}
}

pub struct App<P: TransportProvider> {
    cache: CacheLayout,
    fetcher: Fetcher<P>,
    options: FetchOptions,
}

impl<P: TransportProvider> App<P> {
    pub fn new(cache: CacheLayout, transports: P, options: FetchOptions) -> Self {
        Self {
            cache,
            fetcher: Fetcher::new(transports),
            options,
        }
    }

    pub fn cache(&self) -> &CacheLayout {
        &self.cache
    }

    pub fn fetcher(&self) -> &Fetcher<P> {
        &self.fetcher
    }

    /// Makes sure `harris/mwgc.dat` is in the cache.
    pub fn ensure_catalog(&self, sink: &dyn ProgressSink) -> Result<FetchItemResult, GaldynError> {
        let locator = SourceLocator::new(HARRIS_URL, TransportKind::Wget);
        let path = self.cache.harris_catalog_path();
        self.ensure(&locator, path, "harris", sink)
    }

    pub fn read_catalog(&self, sink: &dyn ProgressSink) -> Result<CatalogTable, GaldynError> {
        self.ensure_catalog(sink)?;
        let path = self.cache.harris_catalog_path();
        let bytes = fs::read(path.as_std_path())
            .map_err(|err| GaldynError::Filesystem(format!("read {path}: {err}")))?;
        let text = String::from_utf8_lossy(&bytes);
        let lines = text.lines().collect::<Vec<_>>();
        let table = catalog::assemble(&lines)?;
        info!(rows = table.len(), "assembled harris catalog");
        Ok(table)
    }

    /// Downloads the e-print source when it is not cached yet, then unpacks
    /// it next to the archive.
    pub fn download_arxiv_source(
        &self,
        eprint: &Eprint,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, GaldynError> {
        let locator = arxiv::source_locator(eprint);
        let archive = self.cache.arxiv_source_archive(eprint);
        let item = self.ensure(&locator, archive.clone(), "arxiv", sink)?;

        let target = self.cache.arxiv_source_dir(eprint);
        fs_util::validate_gzip(archive.as_std_path())?;
        fs_util::extract_tarball(archive.as_std_path(), target.as_std_path())?;
        info!(eprint = %eprint, dir = %target, "unpacked arxiv source");
        Ok(item)
    }

    pub fn read_arxiv_table(
        &self,
        eprint: &Eprint,
        file: &str,
        options: &TableOptions,
        sink: &dyn ProgressSink,
    ) -> Result<LatexTable, GaldynError> {
        self.download_arxiv_source(eprint, sink)?;
        arxiv::read_latex_table(&self.cache.arxiv_file(eprint, file), options)
    }

    /// Checks that `url` exists without downloading it. The transfer runs
    /// against a scratch directory; the cache is not touched.
    pub fn probe(
        &self,
        url: &str,
        transport: TransportKind,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, GaldynError> {
        let locator = SourceLocator::new(url, transport);
        let scratch = tempfile::Builder::new()
            .prefix(".galdyn-probe")
            .tempdir()
            .map_err(|err| GaldynError::Filesystem(err.to_string()))?;
        let path = Utf8Path::from_path(scratch.path())
            .ok_or_else(|| {
                GaldynError::Filesystem(format!(
                    "scratch directory {} is not UTF-8",
                    scratch.path().display()
                ))
            })?
            .join(PROBE_FILE_NAME);
        let options = FetchOptions {
            probe: true,
            ..self.options
        };
        let status = self.fetcher.fetch(&locator, &path, options, sink)?;
        Ok(FetchItemResult {
            source: "probe".to_string(),
            url: url.to_string(),
            path: None,
            status,
        })
    }

    fn ensure(
        &self,
        locator: &SourceLocator,
        path: Utf8PathBuf,
        source: &str,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, GaldynError> {
        let status = self.fetcher.fetch(locator, &path, self.options, sink)?;
        Ok(FetchItemResult {
            source: source.to_string(),
            url: locator.url().to_string(),
            path: Some(path.to_string()),
            status,
        })
    }
}
