//! Image provider: directory scan and grayscale decoding.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{info, warn};

use crate::error::{Result, SimilarityError};
use crate::metric::Image;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path so row indices are stable.
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decode one file as 8-bit grayscale.
pub fn load_grayscale(path: &Path) -> Result<Image> {
    let img = image::open(path)
        .map_err(|source| SimilarityError::ImageLoad { path: path.to_path_buf(), source })?
        .to_luma8();
    let (width, height) = img.dimensions();
    let pixels: Vec<f32> = img.into_raw().into_iter().map(f32::from).collect();
    Array2::from_shape_vec((height as usize, width as usize), pixels)
        .map_err(|e| SimilarityError::Config(format!("{}: {e}", path.display())))
}

/// Load every path, skipping files that fail to decode.
pub fn load_images(paths: &[PathBuf]) -> Vec<(PathBuf, Image)> {
    let mut images = Vec::with_capacity(paths.len());
    for (n, path) in paths.iter().enumerate() {
        match load_grayscale(path) {
            Ok(img) => images.push((path.clone(), img)),
            Err(e) => warn!(error = %e, "skipping image"),
        }
        info!(loaded = n + 1, total = paths.len(), "loading images");
    }
    images
}

/// Scan `dir` and load what decodes. Errors if nothing usable is found.
pub fn load_dir(dir: &Path) -> Result<Vec<(PathBuf, Image)>> {
    let paths = scan_images(dir)?;
    if paths.is_empty() {
        return Err(SimilarityError::NoImages(dir.to_path_buf()));
    }
    info!(count = paths.len(), dir = %dir.display(), "found images");
    let images = load_images(&paths);
    if images.is_empty() {
        return Err(SimilarityError::NoImages(dir.to_path_buf()));
    }
    Ok(images)
}
