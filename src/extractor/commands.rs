use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::platform::Platform;

/// Format chain: separate mp4 video + m4a audio, else best mp4, else anything.
pub const FORMAT_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
pub const MERGE_OUTPUT_FORMAT: &str = "mp4";
pub const TIKTOK_REFERER: &str = "https://www.tiktok.com/";

/// Fully resolved extractor invocation. Arguments are handed to the OS as a
/// list; nothing here is ever re-parsed by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
    output_path: Option<PathBuf>,
}

impl ExtractorCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
            output_path: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn format<S: Into<String>>(self, selector: S) -> Self {
        self.arg("-f").arg(selector)
    }

    pub fn merge_output_format<S: Into<String>>(self, container: S) -> Self {
        self.arg("--merge-output-format").arg(container)
    }

    /// Output template; recorded so callers can check the artifact afterwards.
    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        self.output_path = Some(path.to_path_buf());
        self.arg("-o").arg(path.to_string_lossy().to_string())
    }

    /// Add an HTTP header in "Name: value" form
    pub fn header(self, name: &str, value: &str) -> Self {
        self.arg("--add-header").arg(format!("{}: {}", name, value))
    }

    pub fn user_agent(self, agent: &str) -> Self {
        self.header("User-Agent", agent)
    }

    pub fn cookies<S: Into<String>>(self, path: S) -> Self {
        self.arg("--cookies").arg(path)
    }

    pub fn geo_bypass(self) -> Self {
        self.arg("--geo-bypass")
    }

    pub fn embed_metadata(self) -> Self {
        self.arg("--embed-metadata")
    }

    pub fn no_check_certificate(self) -> Self {
        self.arg("--no-check-certificate")
    }

    /// Terminate option parsing and append the target URL as the last argument.
    pub fn target<S: Into<String>>(self, url: S) -> Self {
        self.arg("--").arg(url)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Space-joined rendering for log lines only.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Produces per-platform extractor invocations.
#[derive(Debug, Clone)]
pub struct ExtractorCommandBuilder {
    config: Arc<Config>,
}

impl ExtractorCommandBuilder {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Build the download command for `url` on `platform`, writing to `output_path`.
    pub fn build<P: AsRef<Path>>(&self, platform: Platform, url: &str, output_path: P) -> ExtractorCommand {
        let extractor = &self.config.extractor;
        let cmd = ExtractorCommand::new(
            &extractor.binary_path,
            format!("{} download", platform.display_name()),
        )
        .args(extractor.binary_args.iter().cloned())
        .format(FORMAT_SELECTOR)
        .merge_output_format(MERGE_OUTPUT_FORMAT)
        .output(output_path);

        let cmd = match platform {
            Platform::TikTok => cmd
                .user_agent(extractor.tiktok_user_agent())
                .header("Referer", TIKTOK_REFERER),
            Platform::YouTube => cmd
                .user_agent(&extractor.desktop_user_agent)
                .cookies(extractor.cookies_path.clone())
                .geo_bypass()
                .embed_metadata()
                .no_check_certificate(),
            Platform::Instagram => cmd.user_agent(&extractor.mobile_user_agent),
            Platform::Unknown => cmd.no_check_certificate(),
        };

        cmd.target(url)
    }

    /// `--version` probe run once at startup.
    pub fn version_check(&self) -> ExtractorCommand {
        let extractor = &self.config.extractor;
        ExtractorCommand::new(&extractor.binary_path, "Version check")
            .args(extractor.binary_args.iter().cloned())
            .arg("--version")
    }
}
