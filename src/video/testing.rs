//! Stand-in FFmpeg binaries for process tests.
//!
//! Each fake is a small shell script, so the decoder and encoder lifecycles
//! run against real child processes without FFmpeg installed.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::FfmpegTool;

/// File the fake `ffmpeg` writes its arguments to, one per line
pub(crate) const ARGS_FILE: &str = "ffmpeg-args.txt";

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub(crate) fn fake_binary(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A tool whose `ffmpeg` logs its arguments and then runs `body`.
pub(crate) fn fake_ffmpeg(dir: &Path, body: &str) -> FfmpegTool {
    let script = format!(
        "printf '%s\\n' \"$@\" > '{}'\n{}",
        dir.join(ARGS_FILE).display(),
        body
    );
    FfmpegTool::with_paths(fake_binary(dir, "ffmpeg", &script), None)
}

/// Arguments the fake `ffmpeg` in `dir` was last started with.
pub(crate) fn logged_args(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join(ARGS_FILE))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
