//! Image vault: durable storage for captured animal photos.
//!
//! Images live under `<root>/<record id>/<uuid>.<ext>`. The returned
//! [`ImageRef`] is the path relative to the root, so the data directory can
//! move without rewriting records.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use image::ImageFormat;

use crate::error::CaptureError;
use crate::model::ImageRef;

#[derive(Debug, Clone)]
pub struct ImageVault {
    root: PathBuf,
}

impl ImageVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks that `bytes` decode as an image and returns the detected format.
    pub fn inspect(bytes: &[u8]) -> Result<ImageFormat, CaptureError> {
        if bytes.is_empty() {
            return Err(CaptureError::Empty);
        }
        let format =
            image::guess_format(bytes).map_err(|e| CaptureError::Undecodable(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| CaptureError::Undecodable(e.to_string()))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(CaptureError::Undecodable("image has no pixels".to_string()));
        }
        Ok(format)
    }

    /// Writes an already inspected image for `record_id` and syncs it to
    /// disk before returning its reference.
    pub fn write(
        &self,
        record_id: &str,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<ImageRef, CaptureError> {
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let relative = format!("{}/{}.{}", record_id, uuid::Uuid::new_v4(), extension);
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CaptureError::WriteImage {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let write_err = |e| CaptureError::WriteImage {
            path: path.clone(),
            source: e,
        };
        let mut file = File::create(&path).map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        log::debug!("Stored capture {} ({} bytes)", relative, bytes.len());
        Ok(ImageRef::new(relative))
    }

    /// Inspects and writes in one step.
    pub fn store(&self, record_id: &str, bytes: &[u8]) -> Result<ImageRef, CaptureError> {
        let format = Self::inspect(bytes)?;
        self.write(record_id, bytes, format)
    }

    /// Resolves a reference to its file path, refusing references that
    /// would leave the vault.
    pub fn path_of(&self, image: &ImageRef) -> Result<PathBuf, CaptureError> {
        let relative = Path::new(image.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || image.as_str().is_empty() {
            return Err(CaptureError::InvalidReference(image.to_string()));
        }
        Ok(self.root.join(relative))
    }

    pub fn load(&self, image: &ImageRef) -> Result<Vec<u8>, CaptureError> {
        let path = self.path_of(image)?;
        fs::read(&path).map_err(|e| CaptureError::ReadImage { path, source: e })
    }

    /// Deletes a superseded capture. A missing file is not an error.
    pub fn remove(&self, image: &ImageRef) -> Result<(), CaptureError> {
        let path = self.path_of(image)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaptureError::WriteImage { path, source: e }),
        }
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 90, 60]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}
