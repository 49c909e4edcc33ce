use std::path::PathBuf;

#[test]
fn cli_writes_frame_pngs() {
    let dir = PathBuf::from("target").join("cli_smoke_frames");
    let _ = std::fs::remove_dir_all(&dir);

    let exe = std::env::var_os("CARGO_BIN_EXE_staticfill")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "staticfill.exe"
            } else {
                "staticfill"
            });
            p
        });

    let out_arg = dir.to_string_lossy().to_string();
    let status = std::process::Command::new(exe)
        .args([
            "--text", "HI", "--width", "320", "--height", "240", "--frames", "2", "--seed", "7",
            "--out",
        ])
        .arg(out_arg.as_str())
        .status()
        .unwrap();

    assert!(status.success());
    assert!(dir.join("frame_0000.png").exists());
    assert!(dir.join("frame_0001.png").exists());

    let (w, h) = image::image_dimensions(dir.join("frame_0000.png")).unwrap();
    assert_eq!((w, h), (320, 240));
}
