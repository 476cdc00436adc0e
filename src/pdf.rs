//! PDF collaborator: rendering/rotation seam, per-document rotation state,
//! and the source-folder scanner.
//!
//! Actual page rendering is behind the `PdfOps` trait so the core pipeline
//! stays testable without a rasterizer. Rotation requested in the viewer is
//! not applied in place; it is recorded here and baked into the relocated
//! copy, so a skipped document keeps its original bytes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::FilerError;
use crate::net;

/// Folder listings are reused for this long before re-reading the directory.
const LISTING_TTL: Duration = Duration::from_secs(5);

/// Operations the relocation pipeline needs from a PDF backend.
pub trait PdfOps {
    fn page_count(&self, path: &Path) -> Result<usize, FilerError>;

    /// Render one page at the given zoom factor into opaque image bytes.
    fn render_page(&self, path: &Path, page: usize, zoom: f64) -> Result<Vec<u8>, FilerError>;

    /// Rewrite the file with all pages rotated clockwise by `degrees`.
    fn rotate(&self, path: &Path, degrees: u16) -> Result<(), FilerError>;
}

/// Backend used when no rasterizer is wired in. Copying and relocation work;
/// anything that needs page content reports the limitation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPdfOps;

impl PdfOps for NullPdfOps {
    fn page_count(&self, _path: &Path) -> Result<usize, FilerError> {
        Err(FilerError::Load("No PDF renderer configured".to_string()))
    }

    fn render_page(&self, _path: &Path, _page: usize, _zoom: f64) -> Result<Vec<u8>, FilerError> {
        Err(FilerError::Load("No PDF renderer configured".to_string()))
    }

    fn rotate(&self, _path: &Path, _degrees: u16) -> Result<(), FilerError> {
        Err(FilerError::Load("No PDF renderer configured".to_string()))
    }
}

/// Pending clockwise rotation per document, in degrees.
#[derive(Debug, Default)]
pub struct RotationState {
    pending: HashMap<PathBuf, u16>,
}

impl RotationState {
    pub fn new() -> Self {
        RotationState::default()
    }

    /// Advance the document's pending rotation by 90 degrees and return the
    /// new value.
    pub fn rotate_clockwise(&mut self, path: &Path) -> u16 {
        let entry = self.pending.entry(path.to_path_buf()).or_insert(0);
        *entry = (*entry + 90) % 360;
        if *entry == 0 {
            self.pending.remove(path);
            0
        } else {
            *entry
        }
    }

    pub fn pending(&self, path: &Path) -> u16 {
        self.pending.get(path).copied().unwrap_or(0)
    }

    /// Forget the document's rotation, called after a successful relocation.
    pub fn clear(&mut self, path: &Path) {
        self.pending.remove(path);
    }
}

/// Cycles through the PDFs of the source folder with a short-lived cached
/// listing, so "next" stays fast on slow network shares.
#[derive(Debug, Default)]
pub struct FolderScanner {
    folder: Option<PathBuf>,
    listing: Vec<PathBuf>,
    refreshed_at: Option<Instant>,
}

impl FolderScanner {
    pub fn new() -> Self {
        FolderScanner::default()
    }

    /// Sorted PDF listing of `folder`, refreshed when the folder changed or
    /// the cached listing is older than the TTL.
    pub fn list(&mut self, folder: &Path) -> Result<&[PathBuf], FilerError> {
        let stale = self.folder.as_deref() != Some(folder)
            || self
                .refreshed_at
                .map(|t| t.elapsed() >= LISTING_TTL)
                .unwrap_or(true);
        if stale {
            self.listing = read_pdf_listing(folder)?;
            self.folder = Some(folder.to_path_buf());
            self.refreshed_at = Some(Instant::now());
            debug!(folder = %folder.display(), count = self.listing.len(), "folder listing refreshed");
        }
        Ok(&self.listing)
    }

    /// PDF after `current` in sorted order, wrapping to the first. With no
    /// current file (or one no longer listed) the first PDF is returned.
    pub fn next_pdf(
        &mut self,
        folder: &Path,
        current: Option<&Path>,
    ) -> Result<Option<PathBuf>, FilerError> {
        let listing = self.list(folder)?;
        if listing.is_empty() {
            return Ok(None);
        }
        let next = match current.and_then(|c| listing.iter().position(|p| p == c)) {
            Some(pos) => listing[(pos + 1) % listing.len()].clone(),
            None => listing[0].clone(),
        };
        Ok(Some(next))
    }

    /// Drop the cached listing so the next call re-reads the directory.
    pub fn invalidate(&mut self) {
        self.refreshed_at = None;
    }
}

fn read_pdf_listing(folder: &Path) -> Result<Vec<PathBuf>, FilerError> {
    let raw = folder.to_string_lossy();
    if raw.starts_with("\\\\") && !net::is_path_available(folder, net::DEFAULT_PROBE_TIMEOUT) {
        return Err(FilerError::NetworkUnavailable(raw.into_owned()));
    }
    let entries = std::fs::read_dir(folder)
        .map_err(|e| FilerError::Load(format!("Could not read folder {}: {}", raw, e)))?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"%PDF-1.4").unwrap();
    }

    #[test]
    fn rotation_cycles_and_clears() {
        let mut state = RotationState::new();
        let p = Path::new("a.pdf");
        assert_eq!(state.pending(p), 0);
        assert_eq!(state.rotate_clockwise(p), 90);
        assert_eq!(state.rotate_clockwise(p), 180);
        assert_eq!(state.rotate_clockwise(p), 270);
        assert_eq!(state.rotate_clockwise(p), 0);
        assert_eq!(state.pending(p), 0);
        state.rotate_clockwise(p);
        state.clear(p);
        assert_eq!(state.pending(p), 0);
    }

    #[test]
    fn listing_filters_and_sorts_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.pdf"));
        touch(&dir.path().join("a.PDF"));
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let mut scanner = FolderScanner::new();
        let listing = scanner.list(dir.path()).unwrap();
        let names: Vec<_> = listing
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn next_pdf_cycles_with_wraparound() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        touch(&a);
        touch(&b);
        let mut scanner = FolderScanner::new();
        assert_eq!(scanner.next_pdf(dir.path(), None).unwrap(), Some(a.clone()));
        assert_eq!(scanner.next_pdf(dir.path(), Some(&a)).unwrap(), Some(b.clone()));
        assert_eq!(scanner.next_pdf(dir.path(), Some(&b)).unwrap(), Some(a.clone()));
    }

    #[test]
    fn next_pdf_empty_folder_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner = FolderScanner::new();
        assert_eq!(scanner.next_pdf(dir.path(), None).unwrap(), None);
    }

    #[test]
    fn invalidate_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner = FolderScanner::new();
        assert!(scanner.list(dir.path()).unwrap().is_empty());
        touch(&dir.path().join("new.pdf"));
        scanner.invalidate();
        assert_eq!(scanner.list(dir.path()).unwrap().len(), 1);
    }
}
