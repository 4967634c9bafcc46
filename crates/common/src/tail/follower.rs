//! The follower capability: something that follows one file by name and
//! exposes its output as byte streams.
//!
//! [`TailCommand`] runs `tail -F` as a subprocess. Tests substitute a
//! scripted follower (see `testkit`).

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use super::TailError;

/// Where in the file a new follower starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowFrom {
    /// The first line. Used for files that were just created, so lines
    /// written before the follower started are not lost.
    Start,
    /// The current end. Used for files moved into a volume, whose existing
    /// content has already been seen under another name.
    End,
}

impl FollowFrom {
    /// The `-n` argument `tail` takes for this position
    pub fn tail_lines_arg(&self) -> &'static str {
        match self {
            FollowFrom::Start => "+1",
            FollowFrom::End => "0",
        }
    }
}

/// Starts followers for individual files
pub trait Follower: Send + Sync + 'static {
    /// Start following `path` from `from`. The returned streams yield the
    /// follower's output until it exits.
    fn follow(&self, path: &Path, from: FollowFrom) -> Result<Following, TailError>;
}

/// A running follower
pub struct Following {
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    pub child: Box<dyn FollowChild>,
}

impl std::fmt::Debug for Following {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Following")
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

/// Control over the follower's process
#[async_trait::async_trait]
pub trait FollowChild: Send {
    /// Wait for the process to exit
    async fn wait(&mut self) -> io::Result<ExitStatus>;

    /// Ask the process to terminate without waiting for it
    fn start_kill(&mut self) -> io::Result<()>;

    fn id(&self) -> Option<u32>;
}

#[async_trait::async_trait]
impl FollowChild for Child {
    async fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self).await
    }

    fn start_kill(&mut self) -> io::Result<()> {
        Child::start_kill(self)
    }

    fn id(&self) -> Option<u32> {
        Child::id(self)
    }
}

pub const DEFAULT_TAIL_PROGRAM: &str = "tail";

/// Follow by name: `tail -F`. The start position is appended per file.
pub fn default_tail_args() -> Vec<String> {
    vec!["-F".to_string()]
}

/// Follows files with an external `tail`-like program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl Default for TailCommand {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_PROGRAM, default_tail_args())
    }
}

impl TailCommand {
    /// `program` is invoked as `program <args...> -n <from> <path>`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Follower for TailCommand {
    fn follow(&self, path: &Path, from: FollowFrom) -> Result<Following, TailError> {
        tracing::info!(
            "starting {} to follow {} from {:?}",
            self.program.display(),
            path.display(),
            from
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(["-n", from.tail_lines_arg()])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TailError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(TailError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(TailError::MissingPipe("stderr"))?;

        Ok(Following {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            child: Box::new(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn test_default_command() {
        let cmd = TailCommand::default();
        assert_eq!(cmd.program(), Path::new("tail"));
        assert_eq!(cmd.args(), ["-F"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = TailCommand::new("/nonexistent/tail-binary", default_tail_args());
        let err = cmd
            .follow(Path::new("/tmp/whatever.log"), FollowFrom::Start)
            .unwrap_err();
        assert!(matches!(err, TailError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_follow_reads_existing_lines() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("app.log");
        std::fs::write(&file, b"one\ntwo\n").unwrap();

        let mut following = TailCommand::default()
            .follow(&file, FollowFrom::Start)
            .unwrap();
        let mut buf = vec![0u8; 8];
        following.stdout.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"one\ntwo\n");

        following.child.start_kill().unwrap();
        let status = following.child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_follow_from_end_skips_existing_lines() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("app.log.1");
        std::fs::write(&file, b"old\n").unwrap();

        let mut following = TailCommand::default()
            .follow(&file, FollowFrom::End)
            .unwrap();
        // give tail time to open the file and seek to its end
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let mut handle = std::fs::OpenOptions::new().append(true).open(&file).unwrap();
        std::io::Write::write_all(&mut handle, b"new\n").unwrap();

        let mut buf = vec![0u8; 4];
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            following.stdout.read_exact(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&buf, b"new\n");

        following.child.start_kill().unwrap();
        following.child.wait().await.unwrap();
    }
}
