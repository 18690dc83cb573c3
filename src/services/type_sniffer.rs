use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::models::annotation::ImageType;
use crate::scope_path;

const CANDIDATE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const HEADER_LEN: u64 = 30;

const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const VP8X_FLAGS_OFFSET: usize = 20;
const VP8X_ANIMATION_BIT: u8 = 0x02;

pub fn is_candidate(path: &Path) -> bool {
    scope_path::lowercase_extension(path)
        .map(|ext| CANDIDATE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Classifies `path` from its extension and first bytes. Never fails: anything
/// unreadable is `NotImage`.
pub fn classify(path: &Path) -> ImageType {
    if !is_candidate(path) {
        return ImageType::NotImage;
    }

    let Ok(file) = File::open(path) else {
        return ImageType::NotImage;
    };
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    if file.take(HEADER_LEN).read_to_end(&mut header).is_err() {
        return ImageType::NotImage;
    }

    classify_header(&header)
}

pub fn classify_header(header: &[u8]) -> ImageType {
    if header.len() >= 4 && header[..3] == JPEG_SOI && matches!(header[3], 0xE0 | 0xE1) {
        return ImageType::Jpeg;
    }

    if header.starts_with(&PNG_SIGNATURE) {
        return ImageType::Png;
    }

    if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        let is_extended = header.len() >= 16 && &header[12..16] == b"VP8X";
        if is_extended {
            let animated = header
                .get(VP8X_FLAGS_OFFSET)
                .is_some_and(|flags| flags & VP8X_ANIMATION_BIT != 0);
            if animated {
                return ImageType::AnimatedWebp;
            }
        }
        return ImageType::StaticWebp;
    }

    ImageType::NotImage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webp_vp8x(flags: u8) -> Vec<u8> {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&[0x24, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(b"WEBPVP8X");
        bytes.extend_from_slice(&[0x0A, 0x00, 0x00, 0x00]);
        bytes.push(flags);
        bytes.extend_from_slice(&[0x00; 9]);
        bytes
    }

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_recognises_jpeg_variants() {
        assert_eq!(classify_header(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), ImageType::Jpeg);
        assert_eq!(classify_header(&[0xFF, 0xD8, 0xFF, 0xE1, 0x00]), ImageType::Jpeg);
        assert_eq!(
            classify_header(&[0xFF, 0xD8, 0xFF, 0xDB, 0x00]),
            ImageType::NotImage
        );
    }

    #[test]
    fn test_recognises_png_signature() {
        let mut header = PNG_SIGNATURE.to_vec();
        header.extend_from_slice(b"\0\0\0\rIHDR");
        assert_eq!(classify_header(&header), ImageType::Png);
        assert_eq!(classify_header(&PNG_SIGNATURE[..7]), ImageType::NotImage);
    }

    #[test]
    fn test_animated_webp_is_rejected_static_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let animated = write(dir.path(), "photo.webp", &webp_vp8x(0x02));
        let still = write(dir.path(), "still.webp", &webp_vp8x(0x00));

        assert_eq!(classify(&animated), ImageType::AnimatedWebp);
        assert!(!classify(&animated).is_indexable());
        assert_eq!(classify(&still), ImageType::StaticWebp);
        assert!(classify(&still).is_indexable());
    }

    #[test]
    fn test_simple_webp_without_vp8x_is_static() {
        let mut bytes = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
        bytes.extend_from_slice(&[0xFF; 10]);
        assert_eq!(classify_header(&bytes), ImageType::StaticWebp);
    }

    #[test]
    fn test_extension_prefilter_runs_before_header() {
        let dir = tempfile::tempdir().unwrap();
        let disguised = write(dir.path(), "photo.gif", &PNG_SIGNATURE);
        let upper = write(dir.path(), "PHOTO.PNG", &PNG_SIGNATURE);

        assert_eq!(classify(&disguised), ImageType::NotImage);
        assert_eq!(classify(&upper), ImageType::Png);
    }

    #[test]
    fn test_unreadable_or_short_files_are_not_images() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(classify(&dir.path().join("missing.jpg")), ImageType::NotImage);

        let empty = write(dir.path(), "empty.png", &[]);
        assert_eq!(classify(&empty), ImageType::NotImage);

        let text = write(dir.path(), "notes.jpg", b"just some text");
        assert_eq!(classify(&text), ImageType::NotImage);
    }
}
