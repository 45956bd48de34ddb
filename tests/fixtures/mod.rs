#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use assert_fs::TempDir;
use assert_fs::fixture::PathChild;
use image::{ImageFormat as CodecFormat, Rgba, RgbaImage};

/// A noisy RGBA source: enough high-frequency detail that lossy re-encoding
/// at any sane quality produces a measurably smaller file than a naive save.
pub fn noisy_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let base = ((x * 37 + y * 19) % 256) as u8;
        Rgba([base, base.wrapping_add(53), base.wrapping_add(101), 255])
    })
}

pub fn write_noisy_jpeg(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    write_image(dir, name, &noisy_rgba(width, height), CodecFormat::Jpeg)
}

pub fn write_noisy_png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    write_image(dir, name, &noisy_rgba(width, height), CodecFormat::Png)
}

pub fn write_noisy_tiff(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    write_image(dir, name, &noisy_rgba(width, height), CodecFormat::Tiff)
}

fn write_image(dir: &TempDir, name: &str, image: &RgbaImage, format: CodecFormat) -> PathBuf {
    let child = dir.child(name);
    let path = child.path().to_path_buf();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create fixture directory");
    }
    let mut file = File::create(&path).expect("failed to create fixture file");
    image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut file, format)
        .expect("failed to encode fixture image");
    path
}

pub fn write_garbage(dir: &TempDir, name: &str) -> PathBuf {
    let child = dir.child(name);
    let path = child.path().to_path_buf();
    fs::write(&path, b"not actually an image, just bytes with a jpg extension")
        .expect("failed to write garbage fixture");
    path
}

pub fn subfolder_output_path(input: &Path, ext: &str) -> PathBuf {
    let parent = input.parent().expect("input has a parent directory");
    let stem = input.file_stem().unwrap().to_string_lossy();
    parent.join("Optimized").join(format!("{stem}.{ext}"))
}

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path)
        .unwrap_or_else(|err| panic!("failed to read metadata for {}: {err}", path.display()))
        .len()
}
