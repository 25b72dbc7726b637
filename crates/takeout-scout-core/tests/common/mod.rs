#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub fn noop(_: &str, _: u64, _: u64, _: &str) {}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

pub fn write_tgz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(enc);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Stored (uncompressed) ZIP, so payload bytes can be located and damaged.
pub fn write_stored_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Flip the first byte of `needle` inside the file at `path`.
pub fn damage_bytes(path: &Path, needle: &[u8]) {
    let mut bytes = fs::read(path).unwrap();
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present");
    bytes[at] ^= 0xFF;
    fs::write(path, bytes).unwrap();
}

/// Gzip-tar whose tar stream stops `cut` bytes into the header of entry `keep`.
/// Every entry must hold fewer than 512 bytes of data.
pub fn write_cut_tgz(path: &Path, entries: &[(&str, &[u8])], keep: usize, cut: usize) {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        assert!(data.len() < 512);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    let mut tar = builder.into_inner().unwrap();
    // One header block plus one data block per entry.
    tar.truncate(keep * 1024 + cut);

    let file = File::create(path).unwrap();
    let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    enc.write_all(&tar).unwrap();
    enc.finish().unwrap();
}

pub fn write_files(root: &Path, entries: &[(&str, &[u8])]) {
    for (name, data) in entries {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

/// A valid 1x1 PNG with no metadata chunks.
pub const PLAIN_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53,
    0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8, 0xFF, 0xFF, 0x3F,
    0x00, 0x05, 0xFE, 0x02, 0xFE, 0xDC, 0xCC, 0x59, 0xE7, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E,
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// A small Google Photos export: 3 photos, 1 video, 2 sidecars, 1 other.
pub const PHOTOS_EXPORT: &[(&str, &[u8])] = &[
    ("Takeout/Google Photos/Photos from 2023/IMG_0001.HEIC", b"heic"),
    ("Takeout/Google Photos/Photos from 2023/IMG_0001.MOV", b"mov-bytes"),
    ("Takeout/Google Photos/Photos from 2023/IMG_0002.jpg", b"jpeg"),
    ("Takeout/Google Photos/Photos from 2023/IMG_0002.jpg.json", b"{}"),
    ("Takeout/Google Photos/Trip/beach.png", b"png"),
    ("Takeout/Google Photos/Trip/beach.png.json", b"{}"),
    ("Takeout/archive_browser.html", b"<html></html>"),
];
