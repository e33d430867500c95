//! Relay of the child's stdout/stderr into capture files and the wrapper's
//! own streams

use duct_core::{Outputs, Result};
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::paths::LogPaths;

const RELAY_BUFFER_SIZE: usize = 8192;

/// Where one of the child's streams goes
#[derive(Debug)]
pub enum StreamTarget {
    /// Shared with the wrapper's own stream
    Inherit,
    /// Discarded
    Null,
    /// Written by the child straight into the capture file
    File(File),
    /// Piped through the wrapper and copied to both the capture file and the
    /// wrapper's stream
    Tee(File),
}

impl StreamTarget {
    /// Capture and display are independent; the capture file is only created
    /// when capturing.
    pub fn open(capture: bool, display: bool, path: &Path) -> Result<Self> {
        Ok(match (capture, display) {
            (true, true) => StreamTarget::Tee(File::create(path)?),
            (true, false) => StreamTarget::File(File::create(path)?),
            (false, true) => StreamTarget::Inherit,
            (false, false) => StreamTarget::Null,
        })
    }

    /// What the child gets, plus the file the relay must copy into (tee only)
    pub fn into_stdio(self) -> (Stdio, Option<File>) {
        match self {
            StreamTarget::Inherit => (Stdio::inherit(), None),
            StreamTarget::Null => (Stdio::null(), None),
            StreamTarget::File(file) => (Stdio::from(file), None),
            StreamTarget::Tee(file) => (Stdio::piped(), Some(file)),
        }
    }

    pub fn is_tee(&self) -> bool {
        matches!(self, StreamTarget::Tee(_))
    }
}

/// Targets for both of the child's output streams
#[derive(Debug)]
pub struct StreamPlan {
    pub stdout: StreamTarget,
    pub stderr: StreamTarget,
}

impl StreamPlan {
    pub fn open(capture: Outputs, display: Outputs, paths: &LogPaths) -> Result<Self> {
        Ok(Self {
            stdout: StreamTarget::open(capture.has_stdout(), display.has_stdout(), &paths.stdout)?,
            stderr: StreamTarget::open(capture.has_stderr(), display.has_stderr(), &paths.stderr)?,
        })
    }
}

/// Copy everything from `reader` into `file` and `display` until the stream
/// closes. Resolves to the number of bytes captured.
///
/// A failing capture file is fatal for the relay. A failing display stream
/// (e.g. a closed pipe) only stops the display copy; capture continues.
pub fn spawn_relay<R, W>(name: &'static str, mut reader: R, file: File, mut display: W) -> JoinHandle<Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut file = tokio::fs::File::from_std(file);
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        let mut total: u64 = 0;
        let mut displaying = true;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            total += n as u64;

            if displaying {
                let shown = async {
                    display.write_all(&buf[..n]).await?;
                    display.flush().await
                }
                .await;
                if let Err(e) = shown {
                    warn!("Failed to relay {} to the terminal, capture continues: {}", name, e);
                    displaying = false;
                }
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        debug!("{} relay drained {} bytes", name, total);
        Ok(total)
    })
}
