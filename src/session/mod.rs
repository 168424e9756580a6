//! Session context: cache directory, message stores, counters, and the
//! live kernel
//!
//! A session is the isolated working context for one user interaction
//! lifetime. Its lifecycle is explicit: `open` spawns the kernel and seeds
//! the coder store, `clear` tears everything down and starts fresh in the
//! same cache directory, `close` releases the kernel. Sessions are fully
//! independent of one another; no state is shared.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{prompts, MessageStore};
use crate::config::Config;
use crate::kernel::{ExecutionResult, KernelError, PyKernel, Runner};
use crate::knowledge::SnippetRegistry;

const CODER_TRANSCRIPT: &str = "coder_messages.json";
const INSPECTOR_TRANSCRIPT: &str = "inspector_messages.json";
const SESSION_STATE: &str = "session.json";

/// Error type for session operations
#[derive(Debug)]
pub enum SessionError {
    Io(std::io::Error),
    Kernel(KernelError),
    State(serde_json::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "Session I/O error: {}", e),
            SessionError::Kernel(e) => write!(f, "Session kernel error: {}", e),
            SessionError::State(e) => write!(f, "Session state error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<KernelError> for SessionError {
    fn from(e: KernelError) -> Self {
        SessionError::Kernel(e)
    }
}

/// A file that appeared in the cache directory after an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// An image, recorded in the session figure list for reports
    Figure(PathBuf),
    /// Any other downloadable file
    Download { path: PathBuf, name: String },
}

impl Artifact {
    /// Markdown reference for the user-visible transcript
    pub fn render(&self) -> String {
        match self {
            Artifact::Figure(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                format!("\n![{}]({})", name, path.display())
            }
            Artifact::Download { path, name } => {
                format!("\n[Download {}]({})", name, path.display())
            }
        }
    }
}

/// Persisted session state for resuming
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SessionState {
    id: String,
    created_at: String,
    error_count: usize,
    repair_count: usize,
    file_list: Vec<String>,
    figure_list: Vec<PathBuf>,
    config: Config,
}

/// One user-facing working context
pub struct Session<R: Runner = PyKernel> {
    pub id: String,
    pub cache_dir: PathBuf,
    pub config: Config,
    pub coder: MessageStore,
    pub inspector: MessageStore,
    /// Executions that failed at least once
    pub error_count: usize,
    /// Requests repaired successfully by the loop
    pub repair_count: usize,
    pub figure_list: Vec<PathBuf>,
    kernel: R,
    file_list: Vec<String>,
    created_at: String,
}

impl<R: Runner> Session<R> {
    /// Build a session around an existing runner. Used by [`Session::open`]
    /// and by tests with scripted runners.
    pub fn with_runner(
        kernel: R,
        cache_dir: impl Into<PathBuf>,
        config: Config,
    ) -> Result<Self, SessionError> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        let coder = Self::seed_coder_store(&cache_dir, &config);
        let file_list = list_dir(&cache_dir)?;

        Ok(Self {
            id: Uuid::now_v7().to_string(),
            cache_dir,
            coder,
            inspector: MessageStore::new(),
            error_count: 0,
            repair_count: 0,
            figure_list: Vec::new(),
            kernel,
            file_list,
            created_at: chrono::Local::now().to_rfc3339(),
            config,
        })
    }

    fn seed_coder_store(cache_dir: &Path, config: &Config) -> MessageStore {
        let mut coder =
            MessageStore::with_system(prompts::coder_preamble(&cache_dir.display().to_string()));
        if config.retrieval {
            coder.extend_system(prompts::KNOWLEDGE_POLICY);
        }
        coder
    }

    /// Execute code in the session kernel
    ///
    /// Kernel-level failures (process dead, protocol broken) are converted
    /// to a `Sign::Text` result here: they are not faults of the generated
    /// code and must surface to the user instead of entering the repair
    /// loop.
    pub async fn run_code(&mut self, code: &str) -> ExecutionResult {
        match self.kernel.execute(code).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "kernel-level failure during execution");
                ExecutionResult::infra(format!(
                    "{}\nThis failure comes from the execution backend, not from \
the generated code; the user should check the system setup.",
                    e
                ))
            }
        }
    }

    /// Diff the cache directory against the known file list and record any
    /// new artifacts. Each file is reported exactly once.
    pub fn check_folder(&mut self) -> Vec<Artifact> {
        let current = match list_dir(&self.cache_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "failed to list session cache directory");
                return Vec::new();
            }
        };

        let mut artifacts = Vec::new();
        for name in &current {
            if self.file_list.contains(name) {
                continue;
            }
            let path = self.cache_dir.join(name);
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if matches!(ext.as_str(), "png" | "jpg" | "jpeg") {
                self.figure_list.push(path.clone());
                artifacts.push(Artifact::Figure(path));
            } else {
                artifacts.push(Artifact::Download {
                    path,
                    name: name.clone(),
                });
            }
        }
        self.file_list = current;
        artifacts
    }

    /// Copy an uploaded file into the cache directory and tell the coder
    /// about it
    pub fn add_file(&mut self, source: &Path) -> std::io::Result<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path")
            })?
            .to_string_lossy()
            .to_string();
        let dest = self.cache_dir.join(&name);
        std::fs::copy(source, &dest)?;
        self.file_list.push(name);
        self.coder.extend_system(&format!(
            "\nNow, the user uploaded a file at {}.",
            dest.display()
        ));
        info!(file = %dest.display(), "file added to session");
        Ok(dest)
    }

    /// Persist both transcripts and the session state into the cache
    /// directory
    pub fn save(&self) -> Result<(), SessionError> {
        self.coder.save(&self.cache_dir.join(CODER_TRANSCRIPT))?;
        self.inspector
            .save(&self.cache_dir.join(INSPECTOR_TRANSCRIPT))?;

        let state = SessionState {
            id: self.id.clone(),
            created_at: self.created_at.clone(),
            error_count: self.error_count,
            repair_count: self.repair_count,
            file_list: self.file_list.clone(),
            figure_list: self.figure_list.clone(),
            config: self.config.clone(),
        };
        let json = serde_json::to_string_pretty(&state).map_err(SessionError::State)?;
        std::fs::write(self.cache_dir.join(SESSION_STATE), json)?;
        info!(dir = %self.cache_dir.display(), "session saved");
        Ok(())
    }

    /// Execute the backend code of every core knowledge snippet so the
    /// coder can call the predefined functions directly. Must run again
    /// after [`Session::clear`], which replaces the kernel.
    pub async fn prime_knowledge(&mut self, registry: &SnippetRegistry) {
        let cells: Vec<String> = registry.backend_cells().map(str::to_string).collect();
        for cell in cells {
            let result = self.run_code(&cell).await;
            if !matches!(result.sign, crate::kernel::Sign::Success) {
                warn!(message = %result.human_message, "knowledge backend cell failed");
            }
        }
    }

    /// Figure paths as strings, for report prompts
    pub fn figure_links(&self) -> Vec<String> {
        self.figure_list
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }
}

impl Session<PyKernel> {
    /// Open a fresh session: create the cache directory, spawn the kernel,
    /// and run the bootstrap imports
    pub async fn open(config: Config) -> Result<Self, SessionError> {
        let dir_name = format!(
            "{}-{}",
            chrono::Local::now().format("%Y-%m-%d"),
            Uuid::now_v7().simple()
        );
        let cache_dir = config.project_cache_path.join(dir_name);
        std::fs::create_dir_all(&cache_dir)?;

        let kernel = PyKernel::spawn(&cache_dir, config.max_exe_time())?;
        let mut session = Self::with_runner(kernel, cache_dir, config)?;
        session.bootstrap().await;
        info!(dir = %session.cache_dir.display(), id = %session.id, "session opened");
        Ok(session)
    }

    /// Resume a previously saved session in its cache directory
    pub async fn resume(cache_dir: &Path) -> Result<Self, SessionError> {
        let json = std::fs::read_to_string(cache_dir.join(SESSION_STATE))?;
        let state: SessionState = serde_json::from_str(&json).map_err(SessionError::State)?;

        let kernel = PyKernel::spawn(cache_dir, state.config.max_exe_time())?;
        let mut session = Self::with_runner(kernel, cache_dir, state.config)?;
        session.id = state.id;
        session.created_at = state.created_at;
        session.error_count = state.error_count;
        session.repair_count = state.repair_count;
        session.file_list = state.file_list;
        session.figure_list = state.figure_list;
        session.coder = MessageStore::load(&cache_dir.join(CODER_TRANSCRIPT))?;
        session.inspector = MessageStore::load(&cache_dir.join(INSPECTOR_TRANSCRIPT))?;
        session.bootstrap().await;
        info!(dir = %cache_dir.display(), id = %session.id, "session resumed");
        Ok(session)
    }

    async fn bootstrap(&mut self) {
        let result = self.run_code(prompts::BOOTSTRAP_IMPORTS).await;
        if !matches!(result.sign, crate::kernel::Sign::Success) {
            warn!(message = %result.human_message, "bootstrap imports failed");
        }
    }

    /// Tear down the kernel and start the session over
    ///
    /// The kernel is shut down before its replacement is constructed. All
    /// files in the cache directory are removed and both message stores are
    /// discarded.
    pub async fn clear(&mut self) -> Result<(), SessionError> {
        self.kernel.shutdown().await;

        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }

        self.kernel = PyKernel::spawn(&self.cache_dir, self.config.max_exe_time())?;
        self.coder = Self::seed_coder_store(&self.cache_dir, &self.config);
        self.inspector = MessageStore::new();
        self.file_list.clear();
        self.figure_list.clear();
        self.bootstrap().await;
        info!(dir = %self.cache_dir.display(), "session cleared");
        Ok(())
    }

    /// Release the kernel. The session cannot execute code afterwards.
    pub async fn close(mut self) {
        self.kernel.shutdown().await;
    }

    /// Flatten the execution history into `notebook.ipynb` in the cache
    /// directory
    pub fn export_notebook(&self) -> std::io::Result<PathBuf> {
        let path = self.cache_dir.join("notebook.ipynb");
        self.kernel.export_notebook(&path)?;
        Ok(path)
    }
}

fn list_dir(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    Ok(names)
}
