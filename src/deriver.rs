use std::fs;
use std::path::PathBuf;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::DeriveError;

pub const FULL_PLACEHOLDER: &str = "{full}";
pub const ROOTFS_URL_PLACEHOLDER: &str = "{rootfs_url}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

pub const DEFAULT_DERIVE_COMMAND: &str =
    "coreos-installer iso extract minimal-iso --rootfs-url {rootfs_url} {full} {output}";

/// Builds a minimal image from a full image. Implementations must not leave a
/// file at `output` when they fail.
pub trait ImageDeriver: Send + Sync {
    fn derive_minimal(
        &self,
        full_image: &Utf8Path,
        rootfs_url: &str,
        output: &Utf8Path,
    ) -> Result<(), DeriveError>;
}

impl<T: ImageDeriver + ?Sized> ImageDeriver for &T {
    fn derive_minimal(
        &self,
        full_image: &Utf8Path,
        rootfs_url: &str,
        output: &Utf8Path,
    ) -> Result<(), DeriveError> {
        (**self).derive_minimal(full_image, rootfs_url, output)
    }
}

/// Delegates derivation to an external program described by an argument
/// template.
#[derive(Debug, Clone)]
pub struct CommandDeriver {
    program: String,
    args: Vec<String>,
}

impl CommandDeriver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace separated command line such as
    /// `tool --in {full} --rootfs {rootfs_url} --out {output}`.
    ///
    /// Quotes are not interpreted, so no argument may contain whitespace.
    /// Build the deriver with [`CommandDeriver::new`] when one has to.
    pub fn from_command_line(command: &str) -> Result<Self, DeriveError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| DeriveError::MissingTool("empty derive command".to_string()))?;
        let args = parts.collect::<Vec<_>>();
        if !args.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
            return Err(DeriveError::Failed(format!(
                "derive command must reference {OUTPUT_PLACEHOLDER}"
            )));
        }
        Ok(Self::new(program, args))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn resolve_program(&self) -> Result<PathBuf, DeriveError> {
        which::which(&self.program).map_err(|_| DeriveError::MissingTool(self.program.clone()))
    }

    fn render_args(&self, full_image: &Utf8Path, rootfs_url: &str, output: &Utf8Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace(FULL_PLACEHOLDER, full_image.as_str())
                    .replace(ROOTFS_URL_PLACEHOLDER, rootfs_url)
                    .replace(OUTPUT_PLACEHOLDER, output.as_str())
            })
            .collect()
    }
}

impl Default for CommandDeriver {
    fn default() -> Self {
        let mut parts = DEFAULT_DERIVE_COMMAND.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self::new(program, parts.collect())
    }
}

impl ImageDeriver for CommandDeriver {
    fn derive_minimal(
        &self,
        full_image: &Utf8Path,
        rootfs_url: &str,
        output: &Utf8Path,
    ) -> Result<(), DeriveError> {
        let program = self.resolve_program()?;
        let parent = output
            .parent()
            .ok_or_else(|| DeriveError::Filesystem(format!("invalid output path {output}")))?;
        let file_name = output
            .file_name()
            .ok_or_else(|| DeriveError::Filesystem(format!("invalid output path {output}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| DeriveError::Filesystem(err.to_string()))?;

        // The tool writes into a scratch directory that is removed on drop, so
        // a failed run never leaves a file at `output`.
        let scratch = Builder::new()
            .prefix(".minimal-")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| DeriveError::Filesystem(err.to_string()))?;
        let scratch_dir = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf())
            .map_err(|_| DeriveError::Filesystem("non-utf8 scratch directory".to_string()))?;
        let staged = scratch_dir.join(file_name);

        let args = self.render_args(full_image, rootfs_url, &staged);
        let result = Command::new(&program)
            .args(&args)
            .output()
            .map_err(|err| DeriveError::Failed(err.to_string()))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("command failed: {} ({})", program.display(), result.status)
            } else {
                stderr
            };
            return Err(DeriveError::Failed(message));
        }
        if !staged.as_std_path().is_file() {
            return Err(DeriveError::NoOutput(staged.to_string()));
        }
        fs::rename(staged.as_std_path(), output.as_std_path())
            .map_err(|err| DeriveError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn default_template_targets_coreos_installer() {
        let deriver = CommandDeriver::default();
        assert_eq!(deriver.program(), "coreos-installer");
        let args = deriver.render_args(
            Utf8Path::new("/data/live.iso"),
            "https://example.com/rootfs.img",
            Utf8Path::new("/data/minimal-live.iso"),
        );
        assert_eq!(
            args,
            vec![
                "iso",
                "extract",
                "minimal-iso",
                "--rootfs-url",
                "https://example.com/rootfs.img",
                "/data/live.iso",
                "/data/minimal-live.iso",
            ]
        );
    }

    #[test]
    fn command_line_requires_output_placeholder() {
        let err = CommandDeriver::from_command_line("tool {full}").unwrap_err();
        assert_matches!(err, DeriveError::Failed(_));
        let err = CommandDeriver::from_command_line("   ").unwrap_err();
        assert_matches!(err, DeriveError::MissingTool(_));
    }

    #[test]
    fn placeholders_expand_inside_arguments() {
        let deriver = CommandDeriver::from_command_line("tool --out={output} --in={full}").unwrap();
        let args = deriver.render_args(Utf8Path::new("/a.iso"), "u", Utf8Path::new("/b.iso"));
        assert_eq!(args, vec!["--out=/b.iso", "--in=/a.iso"]);
    }

    #[test]
    fn quotes_are_not_interpreted() {
        let deriver = CommandDeriver::from_command_line(r#"tool "a b" {output}"#).unwrap();
        assert_eq!(deriver.args, vec![r#""a"#, r#"b""#, "{output}"]);
    }

    #[cfg(unix)]
    #[test]
    fn program_is_looked_up_on_path() {
        let resolved = CommandDeriver::new("sh", Vec::new()).resolve_program().unwrap();
        assert!(resolved.is_absolute());
        let direct = CommandDeriver::new("/bin/sh", Vec::new()).resolve_program().unwrap();
        assert!(direct.ends_with("sh"));
    }

    #[test]
    fn missing_program_is_reported() {
        let deriver = CommandDeriver::new("definitely-not-a-real-derive-tool", Vec::new());
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let err = deriver
            .derive_minimal(&dir.join("full.iso"), "u", &dir.join("minimal-full.iso"))
            .unwrap_err();
        assert_matches!(err, DeriveError::MissingTool(_));
    }
}
