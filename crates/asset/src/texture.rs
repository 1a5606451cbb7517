//! RGBA8 image loading. Used for the window icon.

use std::path::Path;

/// Decoded image in CPU-friendly RGBA8 form.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Load an image file and convert to RGBA8.
    pub fn load_png<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open image {:?}: {}", path, e))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();
        log::info!("Loaded image {:?} ({}x{})", path, width, height);

        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width * self.height * 4) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_checks_dimensions_against_data() {
        let ok = TextureData {
            data: vec![0; 16],
            width: 2,
            height: 2,
        };
        assert!(ok.is_valid());

        let short = TextureData {
            data: vec![0; 15],
            width: 2,
            height: 2,
        };
        assert!(!short.is_valid());
    }
}
