use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

use crate::bootstrap::RuntimeCheck;

pub const HANDPOSE_ESTIMATOR_MODEL_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
pub const PALM_DETECTOR_MODEL_FILENAME: &str = "palm_detection_mediapipe_2023feb.onnx";

/// Maps a runtime resource filename to the URL it is fetched from.
pub type ResourceLocator = Box<dyn Fn(&str) -> String + Send>;

pub fn base_url_locator(base_url: &str) -> ResourceLocator {
    let base = base_url.trim_end_matches('/').to_string();
    Box::new(move |file| format!("{base}/{file}"))
}

/// On-disk locations of the files the hand runtime is built from.
#[derive(Clone, Debug)]
pub struct ModelFiles {
    pub handpose_estimator: PathBuf,
    pub palm_detector: PathBuf,
}

impl ModelFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            handpose_estimator: dir.join(HANDPOSE_ESTIMATOR_MODEL_FILENAME),
            palm_detector: dir.join(PALM_DETECTOR_MODEL_FILENAME),
        }
    }

    fn entries(&self) -> [(&'static str, &Path); 2] {
        [
            (PALM_DETECTOR_MODEL_FILENAME, self.palm_detector.as_path()),
            (HANDPOSE_ESTIMATOR_MODEL_FILENAME, self.handpose_estimator.as_path()),
        ]
    }
}

impl RuntimeCheck for ModelFiles {
    fn missing_entry_points(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Fetches every missing model file in the background.
pub fn spawn_model_fetch(files: ModelFiles, locate: ResourceLocator) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for (name, path) in files.entries() {
            if let Err(err) = ensure_model(path, &locate(name)) {
                log::error!("failed to prepare {name} at {}: {err:?}", path.display());
            }
        }
    })
}

fn ensure_model(path: &Path, url: &str) -> anyhow::Result<()> {
    if path.exists() {
        log::info!("model already present at {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(url, path)
}

fn download_to_path(url: &str, dest: &Path) -> anyhow::Result<()> {
    log::info!("downloading model from {url} to {}", dest.display());

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());
    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        progress.inc(bytes_read as u64);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    // Renaming last keeps the runtime check from seeing a partial file.
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    progress.finish_with_message("model ready");
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_joins_filename_onto_base() {
        let locate = base_url_locator("https://models.example.com/hands/");
        assert_eq!(
            locate("palm.onnx"),
            "https://models.example.com/hands/palm.onnx"
        );
    }

    #[test]
    fn missing_entry_points_lists_absent_files() {
        let files = ModelFiles::in_dir(Path::new("no/such/model/dir"));
        assert_eq!(
            files.missing_entry_points(),
            vec![PALM_DETECTOR_MODEL_FILENAME, HANDPOSE_ESTIMATOR_MODEL_FILENAME]
        );
    }
}
