//! Diagram rendering: Mermaid text → SVG via the external `mmdc` CLI.
//!
//! The renderer is a thin process wrapper. It writes the diagram source to
//! `{output_dir}/{stem}.mmd`, runs
//!
//! ```text
//! mmdc -i {stem}.mmd -o {stem}.svg
//! ```
//!
//! and returns the SVG path. Each invocation uses its own stem (a UUID in
//! the server and CLI), so concurrent renders never share files.
//!
//! ## Locating the CLI
//!
//! 1. An explicit path ([`PipelineConfig::mmdc_path`] / `MMDC_PATH`) is used
//!    as-is and must exist.
//! 2. Otherwise every `PATH` entry is searched for `mmdc` (and `mmdc.cmd`
//!    on Windows, where npm installs a shim).
//!
//! A launcher with leading arguments (for example `npx -p
//! @mermaid-js/mermaid-cli mmdc`) can be set with
//! [`MermaidRenderer::with_launcher`].

use crate::config::PipelineConfig;
use crate::error::Pdf2GraphError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(windows)]
const MMDC_NAMES: &[&str] = &["mmdc.cmd", "mmdc.exe", "mmdc"];
#[cfg(not(windows))]
const MMDC_NAMES: &[&str] = &["mmdc"];

/// Files produced by one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDiagram {
    /// The `.mmd` source handed to the CLI.
    pub source_path: PathBuf,
    /// The rendered `.svg`.
    pub svg_path: PathBuf,
}

/// Runs the Mermaid CLI.
#[derive(Debug, Clone)]
pub struct MermaidRenderer {
    program: Option<PathBuf>,
    leading_args: Vec<OsString>,
    output_dir: PathBuf,
}

impl MermaidRenderer {
    /// Renderer writing into `output_dir`, locating `mmdc` on `PATH`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: None,
            leading_args: Vec::new(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut renderer = Self::new(&config.output_dir);
        renderer.program = config.mmdc_path.clone();
        renderer
    }

    /// Use an explicit executable path instead of searching `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Run `program args… -i in -o out` instead of `mmdc -i in -o out`.
    pub fn with_launcher<I, S>(mut self, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.program = Some(program.into());
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve the executable to run.
    ///
    /// # Errors
    /// [`Pdf2GraphError::RenderUnavailable`] if the explicit path does not
    /// exist or nothing named `mmdc` is on `PATH`.
    pub fn locate(&self) -> Result<PathBuf, Pdf2GraphError> {
        if let Some(ref program) = self.program {
            if program.exists() {
                return Ok(program.clone());
            }
            return Err(Pdf2GraphError::RenderUnavailable {
                searched: program.display().to_string(),
            });
        }

        let path_var = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path_var) {
            for name in MMDC_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    debug!("Found Mermaid CLI at {}", candidate.display());
                    return Ok(candidate);
                }
            }
        }

        Err(Pdf2GraphError::RenderUnavailable {
            searched: format!("{} on PATH", MMDC_NAMES.join(", ")),
        })
    }

    /// Write `description` to `{stem}.mmd` and render `{stem}.svg`.
    ///
    /// # Errors
    /// * [`Pdf2GraphError::RenderUnavailable`] — CLI not found.
    /// * [`Pdf2GraphError::RenderFailed`] — CLI exited non-zero; carries its stderr.
    /// * [`Pdf2GraphError::OutputWriteFailed`] — scratch file could not be written.
    pub async fn render(&self, description: &str, stem: &str) -> Result<RenderedDiagram, Pdf2GraphError> {
        let program = self.locate()?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Pdf2GraphError::OutputWriteFailed {
                path: self.output_dir.clone(),
                source: e,
            })?;

        let source_path = self.output_dir.join(format!("{stem}.mmd"));
        let svg_path = self.output_dir.join(format!("{stem}.svg"));

        tokio::fs::write(&source_path, description)
            .await
            .map_err(|e| Pdf2GraphError::OutputWriteFailed {
                path: source_path.clone(),
                source: e,
            })?;

        debug!(
            "Running {} -i {} -o {}",
            program.display(),
            source_path.display(),
            svg_path.display()
        );

        let output = Command::new(&program)
            .args(&self.leading_args)
            .arg("-i")
            .arg(&source_path)
            .arg("-o")
            .arg(&svg_path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Pdf2GraphError::RenderUnavailable {
                        searched: program.display().to_string(),
                    }
                } else {
                    Pdf2GraphError::RenderFailed {
                        status: "spawn error".into(),
                        stderr: e.to_string(),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("Mermaid CLI failed ({}): {}", output.status, stderr);
            return Err(Pdf2GraphError::RenderFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        info!("Diagram rendered to {}", svg_path.display());
        Ok(RenderedDiagram {
            source_path,
            svg_path,
        })
    }

    /// Render to an in-memory SVG string and delete the scratch files.
    pub async fn render_to_string(&self, description: &str) -> Result<String, Pdf2GraphError> {
        let stem = Uuid::new_v4().to_string();
        let rendered = self.render(description, &stem).await?;

        let svg = tokio::fs::read_to_string(&rendered.svg_path).await;

        for path in [&rendered.svg_path, &rendered.source_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Failed to clean up {}: {}", path.display(), e);
            }
        }

        svg.map_err(|e| Pdf2GraphError::RenderFailed {
            status: "success".into(),
            stderr: format!("SVG output unreadable: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_program_is_unavailable() {
        let r = MermaidRenderer::new("out").with_program("/definitely/not/here/mmdc");
        match r.locate() {
            Err(Pdf2GraphError::RenderUnavailable { searched }) => {
                assert!(searched.contains("/definitely/not/here/mmdc"))
            }
            other => panic!("expected RenderUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn render_fails_fast_when_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let r = MermaidRenderer::new(dir.path()).with_program(dir.path().join("missing"));
        let err = r.render("graph TD", "x").await.unwrap_err();
        assert!(matches!(err, Pdf2GraphError::RenderUnavailable { .. }));
        assert!(!dir.path().join("x.mmd").exists());
    }

    // The fake CLI scripts run through `sh`, so they need no exec bit.
    #[cfg(unix)]
    fn fake_cli(dir: &Path, body: &str) -> MermaidRenderer {
        let script = dir.join("fake-mmdc.sh");
        std::fs::write(&script, body).unwrap();
        MermaidRenderer::new(dir.join("out")).with_launcher("/bin/sh", [script.into_os_string()])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn render_writes_source_and_returns_svg_path() {
        let dir = tempfile::tempdir().unwrap();
        // $1=-i $2=input $3=-o $4=output
        let r = fake_cli(dir.path(), "printf '<svg>%s</svg>' \"$(cat \"$2\")\" > \"$4\"\n");

        let rendered = r.render("graph TD\n    n1[\"Photo\"]", "abc").await.unwrap();
        assert_eq!(rendered.svg_path, dir.path().join("out/abc.svg"));
        let source = std::fs::read_to_string(&rendered.source_path).unwrap();
        assert!(source.starts_with("graph TD"));
        let svg = std::fs::read_to_string(&rendered.svg_path).unwrap();
        assert!(svg.starts_with("<svg>graph TD"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let r = fake_cli(dir.path(), "echo 'Parse error on line 2' >&2\nexit 3\n");

        match r.render("graph TD\n    ???", "bad").await {
            Err(Pdf2GraphError::RenderFailed { stderr, .. }) => {
                assert_eq!(stderr, "Parse error on line 2")
            }
            other => panic!("expected RenderFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn render_to_string_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let r = fake_cli(dir.path(), "echo '<svg/>' > \"$4\"\n");

        let svg = r.render_to_string("graph TD").await.unwrap();
        assert_eq!(svg.trim(), "<svg/>");
        let leftovers = std::fs::read_dir(dir.path().join("out")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
