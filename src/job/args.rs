use std::{
    ffi::{OsStr, OsString},
    path::Path,
};

/// Flags for a demucs-compatible separator.
///
/// Every value is its own argv entry, so paths with spaces or quotes reach
/// the child process untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeparationArgs<'a> {
    pub output_dir: &'a Path,
    pub model: &'a str,
    pub device: &'a str,
    pub mp3_bitrate: u32,
    pub input: &'a Path,
}

impl SeparationArgs<'_> {
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            "-o".into(),
            self.output_dir.as_os_str().to_owned(),
            "-n".into(),
            self.model.into(),
            "--device".into(),
            self.device.into(),
            "--mp3".into(),
            format!("--mp3-bitrate={}", self.mp3_bitrate).into(),
            self.input.as_os_str().to_owned(),
        ]
    }
}

/// Renders a command line for logs, single-quoting anything a POSIX shell
/// would split or expand.
pub fn display_command(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|a| shell_quote(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
