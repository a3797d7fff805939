//! Derivative primary files.
//!
//! With `--tiff`, a TIFF rendition of the resolved primary file is generated
//! and deposited as the primary instead.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::DerivativeError;

/// Produces a derivative of a file.
pub trait DerivativeGenerator: Send + Sync {
    /// Generate a derivative of `source` inside `dest_dir` and return its path.
    fn generate(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, DerivativeError>;
}

/// ImageMagick `convert <src> <dest>.tiff`.
pub struct ImageMagick {
    program: String,
}

impl ImageMagick {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DerivativeGenerator for ImageMagick {
    fn generate(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, DerivativeError> {
        let name = source
            .file_name()
            .map(|n| format!("{}.tiff", n.to_string_lossy()))
            .unwrap_or_else(|| "derivative.tiff".to_string());
        let output = dest_dir.join(name);
        tracing::info!(file = %source.display(), "creating tiff");

        // Exit status is not trusted; success means the output exists.
        Command::new(&self.program)
            .arg(source)
            .arg(&output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| DerivativeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.exists() {
            Ok(output)
        } else {
            tracing::error!(output = %output.display(), "could not create tiff");
            Err(DerivativeError::NotProduced {
                program: self.program.clone(),
                output,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("page.pdf");
        std::fs::write(&src, b"x").unwrap();
        let generator = ImageMagick::new("definitely-not-a-real-converter");
        assert!(matches!(
            generator.generate(&src, tmp.path()),
            Err(DerivativeError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn program_that_writes_nothing_is_not_produced() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("page.pdf");
        std::fs::write(&src, b"x").unwrap();
        let generator = ImageMagick::new("true");
        assert!(matches!(
            generator.generate(&src, tmp.path()),
            Err(DerivativeError::NotProduced { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn copying_program_produces_output() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("page.pdf");
        std::fs::write(&src, b"x").unwrap();
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let generator = ImageMagick::new("cp");
        let out = generator.generate(&src, &out_dir).unwrap();
        assert_eq!(out, out_dir.join("page.pdf.tiff"));
    }
}
