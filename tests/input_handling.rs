use std::error::Error;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::fixture::PathChild;

mod fixtures;

#[test]
fn run_dedupes_a_directory_and_an_overlapping_explicit_path() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let images_dir = temp.child("images").path().to_path_buf();
    std::fs::create_dir_all(&images_dir)?;

    let first = fixtures::write_noisy_png(&temp, "images/first.png", 16, 16);
    let second = fixtures::write_noisy_png(&temp, "images/second.png", 12, 20);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--no-progress"])
        .arg(&first)
        .arg(&images_dir)
        .arg(&images_dir)
        .assert()
        .success();

    assert!(fixtures::subfolder_output_path(&first, "png").exists());
    assert!(fixtures::subfolder_output_path(&second, "png").exists());

    Ok(())
}

#[test]
fn run_fails_when_no_supported_files_are_found() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let notes = temp.child("notes.txt").path().to_path_buf();
    std::fs::write(&notes, b"not an image")?;

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--no-progress"])
        .arg(&notes)
        .assert()
        .failure();

    Ok(())
}

#[test]
fn run_skips_ignored_directories_during_directory_walk() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let images_dir = temp.child("images").path().to_path_buf();
    std::fs::create_dir_all(&images_dir)?;

    let tracked = fixtures::write_noisy_png(&temp, "images/tracked.png", 16, 16);
    let inside_node_modules = fixtures::write_noisy_png(&temp, "images/node_modules/dep.png", 16, 16);
    let inside_git = fixtures::write_noisy_png(&temp, "images/.git/objects/blob.png", 16, 16);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--no-progress"])
        .arg(&images_dir)
        .assert()
        .success();

    assert!(fixtures::subfolder_output_path(&tracked, "png").exists());
    assert!(!fixtures::subfolder_output_path(&inside_node_modules, "png").exists());
    assert!(!fixtures::subfolder_output_path(&inside_git, "png").exists());

    Ok(())
}

#[test]
fn scan_reports_without_writing_any_output() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_jpeg(&temp, "scan.jpg", 20, 20);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["scan", "--no-progress"])
        .arg(&input)
        .assert()
        .success();

    assert!(!fixtures::subfolder_output_path(&input, "jpg").exists());

    Ok(())
}
