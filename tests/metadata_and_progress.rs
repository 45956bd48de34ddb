use std::error::Error;

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;

mod fixtures;

#[test]
fn quiet_mode_prints_a_summary_without_rendering_progress_bars() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_jpeg(&temp, "quiet.jpg", 16, 16);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--no-progress"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("processed"))
        .stderr(predicate::str::is_empty());

    Ok(())
}

#[test]
fn metadata_preset_flag_is_accepted_for_every_variant() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;

    for preset in ["web-safe", "max-compression", "keep-copyright", "keep-camera-info"] {
        let input = fixtures::write_noisy_jpeg(&temp, &format!("{preset}.jpg"), 16, 16);
        Command::cargo_bin("pixelforge")?
            .env("HOME", temp.path())
            .args(["run", "--metadata", preset, "--no-progress"])
            .arg(&input)
            .assert()
            .success();
    }

    Ok(())
}

#[test]
fn smart_mode_with_a_visually_lossless_target_still_shrinks_a_noisy_source() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_png(&temp, "smart.png", 40, 40);
    let original_size = fixtures::file_size(&input);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--mode", "smart", "--smart-target", "visually-lossless", "--no-progress"])
        .arg(&input)
        .assert()
        .success();

    let output = fixtures::subfolder_output_path(&input, "png");
    assert!(output.exists());
    assert!(fixtures::file_size(&output) <= original_size);

    Ok(())
}
