//! Style Dictionary build orchestration.

use crate::platform::Platform;
use crate::runner::CommandRunner;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Default build tool invocation; `--platform <name>` is appended per build.
pub const DEFAULT_BUILD_COMMAND: &str =
    "npx style-dictionary build --config style-dictionary.config.js";

/// Configuration for the builder.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Root of the per-platform output directories
    pub build_dir: PathBuf,
    /// Working directory the build tool runs in
    pub work_dir: PathBuf,
    /// Build tool program followed by its fixed arguments
    pub command: Vec<String>,
    /// Build tool configuration file, relative to `work_dir`
    pub config_file: PathBuf,
    /// Platforms built when none are requested explicitly
    pub default_platforms: Vec<Platform>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("./dist"),
            work_dir: PathBuf::from("."),
            command: DEFAULT_BUILD_COMMAND
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            config_file: PathBuf::from("style-dictionary.config.js"),
            default_platforms: vec![
                Platform::Web,
                Platform::Ios,
                Platform::Android,
                Platform::Flutter,
            ],
        }
    }
}

/// Outcome of building one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Whether the build tool succeeded
    pub success: bool,
    /// Platform that was built
    pub platform: Platform,
    /// When the build finished
    pub build_time: DateTime<Utc>,
    /// Output files relative to the platform directory
    pub output_files: Vec<String>,
    /// Byte size per output file
    pub file_sizes: IndexMap<String, u64>,
    /// Wall-clock duration
    pub build_duration_ms: u64,
    /// Failure reason
    pub error: Option<String>,
}

impl BuildResult {
    /// Sum of all output file sizes.
    #[must_use]
    pub fn total_size_bytes(&self) -> u64 {
        self.file_sizes.values().sum()
    }

    fn failed(platform: Platform, started: Instant, error: String) -> Self {
        Self {
            success: false,
            platform,
            build_time: Utc::now(),
            output_files: Vec::new(),
            file_sizes: IndexMap::new(),
            build_duration_ms: elapsed_ms(started),
            error: Some(error),
        }
    }
}

/// A file produced by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFile {
    /// File name
    pub name: String,
    /// Path relative to the platform directory
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Extension including the leading dot, empty if none
    pub extension: String,
}

/// Builder state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Every platform that can be built
    pub available_platforms: Vec<Platform>,
    /// When the last build finished
    pub last_build_time: Option<DateTime<Utc>>,
    /// Most recent result per platform
    pub build_cache: BTreeMap<Platform, BuildResult>,
    /// Whether the build tool configuration file exists
    pub config_file_exists: bool,
    /// Whether the build directory exists
    pub build_dir_exists: bool,
}

/// Errors from builds and output file access.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The build tool could not be started
    #[error("failed to start '{program}': {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The build tool ran and reported failure
    #[error("build failed for platform '{platform}': {message}")]
    Failed {
        /// Platform that failed
        platform: Platform,
        /// Captured error output
        message: String,
    },
    /// A requested file resolves outside its platform directory
    #[error("access denied: '{filename}' is outside the '{platform}' output directory")]
    AccessDenied {
        /// Platform directory the request was confined to
        platform: Platform,
        /// Requested file name
        filename: String,
    },
    /// A requested output does not exist
    #[error("{0}")]
    NotFound(String),
    /// A requested output is not UTF-8 text
    #[error("file '{0}' is not text-readable")]
    NotText(String),
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The platform name is not recognized
    #[error("invalid platform '{given}'; available: {available}")]
    UnknownPlatform {
        /// The rejected name
        given: String,
        /// Comma-separated valid names
        available: String,
    },
}

#[derive(Debug, Default)]
struct BuildState {
    cache: BTreeMap<Platform, BuildResult>,
    last_build_time: Option<DateTime<Utc>>,
}

/// Drives the build tool and serves its outputs.
pub struct StyleDictionaryBuilder {
    config: BuilderConfig,
    runner: Arc<dyn CommandRunner>,
    state: Mutex<BuildState>,
    /// Builds share one output tree, so only one runs at a time.
    build_lock: tokio::sync::Mutex<()>,
}

impl StyleDictionaryBuilder {
    /// Create a builder over `runner`.
    #[must_use]
    pub fn new(config: BuilderConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            state: Mutex::new(BuildState::default()),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The builder configuration.
    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Output directory of `platform`.
    #[must_use]
    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.config.build_dir.join(platform.as_str())
    }

    /// Check that the build tool is installed. Logs a warning if not.
    pub async fn check_toolchain(&self) -> bool {
        if let Err(e) = tokio::fs::create_dir_all(&self.config.build_dir).await {
            tracing::warn!(
                dir = %self.config.build_dir.display(),
                error = %e,
                "Cannot create build directory"
            );
        }

        let args = ["list".to_string(), "style-dictionary".to_string()];
        match self.runner.run("npm", &args, &self.config.work_dir).await {
            Ok(out) if out.success => {
                tracing::info!("Style Dictionary toolchain available");
                true
            }
            Ok(_) => {
                tracing::warn!("Style Dictionary not found in node_modules; run `npm install`");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not check Style Dictionary installation");
                false
            }
        }
    }

    /// Build each platform in turn. Failures are reported per platform.
    pub async fn build_platforms(
        &self,
        platforms: &[Platform],
    ) -> IndexMap<Platform, BuildResult> {
        let _guard = self.build_lock.lock().await;
        let started = Instant::now();

        let mut results = IndexMap::new();
        for &platform in platforms {
            let result = self.build_one(platform).await;
            if result.success {
                tracing::info!(
                    %platform,
                    files = result.output_files.len(),
                    duration_ms = result.build_duration_ms,
                    "Platform built"
                );
            } else {
                tracing::warn!(
                    %platform,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Platform build failed"
                );
            }
            results.insert(platform, result);
        }

        {
            let mut state = self.state.lock();
            state.last_build_time = Some(Utc::now());
            for (platform, result) in &results {
                state.cache.insert(*platform, result.clone());
            }
        }

        tracing::info!(
            platforms = results.len(),
            duration_ms = elapsed_ms(started),
            "Build completed"
        );
        results
    }

    /// Build the configured default platforms.
    pub async fn build_default(&self) -> IndexMap<Platform, BuildResult> {
        self.build_platforms(&self.config.default_platforms).await
    }

    async fn build_one(&self, platform: Platform) -> BuildResult {
        let started = Instant::now();

        let Some((program, fixed_args)) = self.config.command.split_first() else {
            return BuildResult::failed(platform, started, "no build command configured".into());
        };
        let mut args = fixed_args.to_vec();
        args.push("--platform".to_string());
        args.push(platform.as_str().to_string());

        let output = match self.runner.run(program, &args, &self.config.work_dir).await {
            Ok(output) => output,
            Err(e) => return BuildResult::failed(platform, started, e.to_string()),
        };

        if !output.success {
            let stderr = output.stderr.trim();
            let message = if stderr.is_empty() {
                format!("build tool exited with status {:?}", output.status)
            } else {
                stderr.to_string()
            };
            return BuildResult::failed(platform, started, message);
        }

        let files = match self.scan_platform(platform).await {
            Ok(files) => files,
            Err(e) => return BuildResult::failed(platform, started, e.to_string()),
        };

        BuildResult {
            success: true,
            platform,
            build_time: Utc::now(),
            output_files: files.iter().map(|f| f.path.clone()).collect(),
            file_sizes: files.into_iter().map(|f| (f.path, f.size)).collect(),
            build_duration_ms: elapsed_ms(started),
            error: None,
        }
    }

    /// Files produced for `platform`, newest first. Empty if never built.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] if the directory cannot be read.
    pub async fn platform_files(
        &self,
        platform: Platform,
    ) -> Result<Vec<PlatformFile>, BuildError> {
        let mut files = self.scan_platform(platform).await?;
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }

    async fn scan_platform(&self, platform: Platform) -> Result<Vec<PlatformFile>, BuildError> {
        let dir = self.platform_dir(platform);
        tokio::task::spawn_blocking(move || scan_dir(&dir))
            .await
            .map_err(|e| BuildError::Io(std::io::Error::other(e)))?
    }

    /// Resolve `filename` inside the platform directory.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NotFound`] if the file does not exist and
    /// [`BuildError::AccessDenied`] if it resolves outside the platform
    /// directory.
    pub fn file_path(&self, platform: Platform, filename: &str) -> Result<PathBuf, BuildError> {
        let root = self.platform_dir(platform);
        let candidate = root.join(filename);
        let not_found = || {
            BuildError::NotFound(format!(
                "file '{filename}' not found for platform '{platform}'"
            ))
        };

        if !candidate.exists() {
            return Err(not_found());
        }

        let root = root.canonicalize()?;
        let resolved = candidate.canonicalize()?;
        if !resolved.starts_with(&root) {
            tracing::warn!(%platform, filename, "Rejected file access outside platform directory");
            return Err(BuildError::AccessDenied {
                platform,
                filename: filename.to_string(),
            });
        }
        if !resolved.is_file() {
            return Err(not_found());
        }
        Ok(resolved)
    }

    /// Path of the platform's main output, for downloads.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NotFound`] if the platform has not been built.
    pub fn main_file_path(&self, platform: Platform) -> Result<PathBuf, BuildError> {
        self.file_path(platform, platform.main_file())
            .map_err(|e| match e {
                BuildError::NotFound(_) => BuildError::NotFound(format!(
                    "main file not found for platform '{platform}'; run a build first"
                )),
                other => other,
            })
    }

    /// Text content of an output file.
    ///
    /// # Errors
    ///
    /// As [`StyleDictionaryBuilder::file_path`], plus [`BuildError::NotText`]
    /// for non-UTF-8 content.
    pub async fn file_content(
        &self,
        platform: Platform,
        filename: &str,
    ) -> Result<String, BuildError> {
        let path = self.file_path(platform, filename)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(BuildError::NotText(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete one platform's outputs and its cached result.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] if the directory cannot be removed.
    pub async fn clear_platform(&self, platform: Platform) -> Result<(), BuildError> {
        let _guard = self.build_lock.lock().await;
        let dir = self.platform_dir(platform);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
            tokio::fs::create_dir_all(&dir).await?;
        }
        self.state.lock().cache.remove(&platform);
        tracing::info!(%platform, "Platform outputs cleared");
        Ok(())
    }

    /// Delete every output and reset the build cache.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] if the build directory cannot be recreated.
    pub async fn clear_all(&self) -> Result<(), BuildError> {
        let _guard = self.build_lock.lock().await;
        let dir = &self.config.build_dir;
        if tokio::fs::try_exists(dir).await? {
            tokio::fs::remove_dir_all(dir).await?;
        }
        tokio::fs::create_dir_all(dir).await?;

        let mut state = self.state.lock();
        state.cache.clear();
        state.last_build_time = None;
        tracing::info!("Build cache cleared");
        Ok(())
    }

    /// Current builder status.
    #[must_use]
    pub fn status(&self) -> BuildStatus {
        let state = self.state.lock();
        BuildStatus {
            available_platforms: Platform::ALL.to_vec(),
            last_build_time: state.last_build_time,
            build_cache: state.cache.clone(),
            config_file_exists: self.config.work_dir.join(&self.config.config_file).exists(),
            build_dir_exists: self.config.build_dir.exists(),
        }
    }
}

fn scan_dir(dir: &Path) -> Result<Vec<PlatformFile>, BuildError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(|e| BuildError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(PlatformFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: relative,
            size: meta.len(),
            modified: meta.modified().map(DateTime::<Utc>::from)?,
            extension: entry
                .path()
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default(),
        });
    }
    Ok(files)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use async_trait::async_trait;

    /// Pretends to be the build tool: writes `<platform>/<main file>`.
    struct FakeTool {
        build_dir: PathBuf,
        fail: Option<Platform>,
    }

    #[async_trait]
    impl CommandRunner for FakeTool {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            _cwd: &Path,
        ) -> Result<CommandOutput, BuildError> {
            let platform: Platform = args
                .last()
                .map(String::as_str)
                .unwrap_or("web")
                .parse()
                .unwrap_or(Platform::Web);

            if self.fail == Some(platform) {
                return Ok(CommandOutput {
                    status: Some(1),
                    success: false,
                    stdout: String::new(),
                    stderr: "token reference not found\n".into(),
                });
            }

            let dir = self.build_dir.join(platform.as_str());
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(platform.main_file()), ":root { --a: #fff; }").unwrap();
            Ok(CommandOutput {
                status: Some(0),
                success: true,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn builder(fail: Option<Platform>) -> (tempfile::TempDir, StyleDictionaryBuilder) {
        let tmp = tempfile::tempdir().unwrap();
        let build_dir = tmp.path().join("dist");
        let config = BuilderConfig {
            build_dir: build_dir.clone(),
            work_dir: tmp.path().to_path_buf(),
            ..BuilderConfig::default()
        };
        let runner = Arc::new(FakeTool { build_dir, fail });
        (tmp, StyleDictionaryBuilder::new(config, runner))
    }

    #[tokio::test]
    async fn default_build_covers_configured_platforms() {
        let (_tmp, builder) = builder(None);
        let results = builder.build_default().await;

        let built: Vec<_> = results.keys().copied().collect();
        assert_eq!(built, builder.config().default_platforms);
        assert!(results.values().all(|r| r.success));
        assert_eq!(
            builder.platform_files(Platform::Web).await.unwrap()[0].name,
            "tokens.css"
        );
    }

    #[tokio::test]
    async fn build_collects_outputs() {
        let (_tmp, builder) = builder(None);
        let results = builder.build_platforms(&[Platform::Web, Platform::Ios]).await;

        let web = &results[&Platform::Web];
        assert!(web.success);
        assert_eq!(web.output_files, ["tokens.css"]);
        assert_eq!(web.total_size_bytes(), 20);

        let status = builder.status();
        assert!(status.last_build_time.is_some());
        assert_eq!(status.build_cache.len(), 2);
        assert!(status.build_dir_exists);
    }

    #[tokio::test]
    async fn failed_build_is_captured() {
        let (_tmp, builder) = builder(Some(Platform::Android));
        let results = builder
            .build_platforms(&[Platform::Android, Platform::Web])
            .await;

        let android = &results[&Platform::Android];
        assert!(!android.success);
        assert_eq!(android.error.as_deref(), Some("token reference not found"));
        assert!(results[&Platform::Web].success);
    }

    #[tokio::test]
    async fn file_access_is_confined_to_platform_dir() {
        let (tmp, builder) = builder(None);
        builder.build_platforms(&[Platform::Web, Platform::Ios]).await;
        std::fs::write(tmp.path().join("secret.txt"), "nope").unwrap();

        let content = builder.file_content(Platform::Web, "tokens.css").await.unwrap();
        assert!(content.contains("--a"));

        let err = builder.file_path(Platform::Web, "../../secret.txt").unwrap_err();
        assert!(matches!(err, BuildError::AccessDenied { .. }));

        let err = builder
            .file_path(Platform::Web, "../ios/DesignTokens.swift")
            .unwrap_err();
        assert!(matches!(err, BuildError::AccessDenied { .. }));

        let err = builder.file_path(Platform::Web, "missing.css").unwrap_err();
        assert!(matches!(err, BuildError::NotFound(_)));
    }

    #[tokio::test]
    async fn binary_file_is_not_text() {
        let (tmp, builder) = builder(None);
        let dir = tmp.path().join("dist/json");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let err = builder.file_content(Platform::Json, "blob.bin").await.unwrap_err();
        assert!(matches!(err, BuildError::NotText(_)));
    }

    #[tokio::test]
    async fn clear_removes_outputs_and_cache() {
        let (_tmp, builder) = builder(None);
        builder.build_platforms(&[Platform::Web, Platform::Flutter]).await;

        builder.clear_platform(Platform::Web).await.unwrap();
        assert!(builder.platform_files(Platform::Web).await.unwrap().is_empty());
        assert_eq!(builder.platform_files(Platform::Flutter).await.unwrap().len(), 1);
        assert!(!builder.status().build_cache.contains_key(&Platform::Web));

        builder.clear_all().await.unwrap();
        let status = builder.status();
        assert!(status.build_cache.is_empty());
        assert!(status.last_build_time.is_none());
        assert!(builder.platform_files(Platform::Flutter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn main_file_requires_build() {
        let (_tmp, builder) = builder(None);
        assert!(matches!(
            builder.main_file_path(Platform::Scss),
            Err(BuildError::NotFound(_))
        ));

        builder.build_platforms(&[Platform::Scss]).await;
        let path = builder.main_file_path(Platform::Scss).unwrap();
        assert!(path.ends_with("tokens.scss"));
    }
}
