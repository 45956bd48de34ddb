use std::error::Error;

use assert_cmd::Command;
use assert_fs::TempDir;

mod fixtures;

#[test]
fn optimize_jpeg_lands_in_subfolder_and_shrinks() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_jpeg(&temp, "photo.jpg", 64, 64);
    let original_size = fixtures::file_size(&input);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--no-progress"])
        .arg(&input)
        .assert()
        .success();

    let output = fixtures::subfolder_output_path(&input, "jpg");
    assert!(output.exists(), "expected {} to exist", output.display());
    assert!(fixtures::file_size(&output) < original_size);

    Ok(())
}

#[test]
fn optimize_png_lands_in_subfolder_and_shrinks() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_png(&temp, "photo.png", 64, 64);
    let original_size = fixtures::file_size(&input);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--no-progress"])
        .arg(&input)
        .assert()
        .success();

    let output = fixtures::subfolder_output_path(&input, "png");
    assert!(output.exists(), "expected {} to exist", output.display());
    assert!(fixtures::file_size(&output) < original_size);

    Ok(())
}

#[test]
fn convert_webp_mode_produces_webp_output() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_png(&temp, "photo.png", 48, 48);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--mode", "convert-webp", "--no-progress"])
        .arg(&input)
        .assert()
        .success();

    let output = fixtures::subfolder_output_path(&input, "webp");
    assert!(output.exists());

    Ok(())
}

#[test]
fn replace_mode_overwrites_the_source_file() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let input = fixtures::write_noisy_png(&temp, "photo.png", 48, 48);
    let original_size = fixtures::file_size(&input);

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--replace", "--overwrite", "--no-progress"])
        .arg(&input)
        .assert()
        .success();

    assert!(input.exists());
    assert!(fixtures::file_size(&input) < original_size);
    assert!(!fixtures::subfolder_output_path(&input, "png").exists());

    Ok(())
}

#[test]
fn threads_flag_is_accepted_across_a_batch() -> Result<(), Box<dyn Error>> {
    let temp = TempDir::new()?;
    let inputs: Vec<_> = (0..3)
        .map(|i| fixtures::write_noisy_jpeg(&temp, &format!("batch{i}.jpg"), 24, 24))
        .collect();

    Command::cargo_bin("pixelforge")?
        .env("HOME", temp.path())
        .args(["run", "--threads", "1", "--no-progress"])
        .args(inputs.iter().map(|p| p.as_os_str()))
        .assert()
        .success();

    for input in &inputs {
        assert!(fixtures::subfolder_output_path(input, "jpg").exists());
    }

    Ok(())
}
