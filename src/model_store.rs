// Model artifact resolution: cache, bundled directory, then download

use crate::error::{MoodLensError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Resolves a model artifact by name, checking local locations before
/// downloading.
///
/// Resolution order:
/// 1. The model cache directory
/// 2. The bundled directory (pre-packaged installs, development checkouts)
/// 3. Download from the artifact URL into the cache
pub fn resolve(
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    cache_dir: &Path,
) -> Result<PathBuf> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if let Some(dir) = bundled_dir {
        let bundled_path = dir.join(name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    fs::create_dir_all(cache_dir)?;
    info!("Downloading {} from {}", name, url);
    download(url, &cached_path)?;
    Ok(cached_path)
}

/// Platform model cache directory, e.g. `~/.cache/moodlens/models` on Linux
pub fn default_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|d| d.join("moodlens").join("models"))
        .ok_or_else(|| MoodLensError::ModelLoad("could not determine cache directory".to_string()))
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let fetch_err = |message: String| MoodLensError::ModelFetch {
        url: url.to_string(),
        message,
    };

    let response = reqwest::blocking::get(url).map_err(|e| fetch_err(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;

    // Write to a temp file first, then rename, so a failed download never
    // leaves a partial artifact at the destination path
    let temp_path = dest.with_extension("part");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(&bytes)?;
    file.flush()?;
    drop(file);

    fs::rename(&temp_path, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_prefers_cached_file() {
        let tmp = TempDir::new().unwrap();
        let cache_dir = tmp.path().join("cache");
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(cache_dir.join("model.onnx"), b"cached").unwrap();

        let bundled_dir = tmp.path().join("bundled");
        fs::create_dir_all(&bundled_dir).unwrap();
        fs::write(bundled_dir.join("model.onnx"), b"bundled").unwrap();

        let path = resolve(
            "model.onnx",
            "http://invalid.nonexistent.example.com/model.onnx",
            Some(&bundled_dir),
            &cache_dir,
        )
        .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"cached");
    }

    #[test]
    fn test_resolve_falls_back_to_bundled_file() {
        let tmp = TempDir::new().unwrap();
        let cache_dir = tmp.path().join("cache");

        let bundled_dir = tmp.path().join("bundled");
        fs::create_dir_all(&bundled_dir).unwrap();
        fs::write(bundled_dir.join("model.onnx"), b"bundled").unwrap();

        let path = resolve(
            "model.onnx",
            "http://invalid.nonexistent.example.com/model.onnx",
            Some(&bundled_dir),
            &cache_dir,
        )
        .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"bundled");
    }

    #[test]
    fn test_resolve_unreachable_url_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = resolve(
            "model.onnx",
            "http://invalid.nonexistent.example.com/model.onnx",
            None,
            tmp.path(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_download_leaves_no_partial_files() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let _ = download("http://invalid.nonexistent.example.com/model.onnx", &dest);
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_default_cache_dir_is_namespaced() {
        let dir = default_cache_dir().unwrap();
        assert!(dir.to_string_lossy().contains("moodlens"));
        assert!(dir.to_string_lossy().ends_with("models"));
    }
}
