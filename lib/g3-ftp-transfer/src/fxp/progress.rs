/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::FtpClient;
use crate::connection::FtpConnectionProvider;
use crate::error::FtpCommandError;

/// A control channel used only to watch the size of the file being written
/// on the destination server.
#[async_trait]
pub trait FtpFxpProgressChannel: Send {
    async fn remote_size(&mut self, path: &str) -> Result<Option<u64>, FtpCommandError>;

    async fn close(&mut self);
}

/// Open an extra logged in connection to the destination server.
///
/// None means progress will be reported at the start and the end only.
#[async_trait]
pub trait FtpFxpProgressFactory: Send {
    type Channel: FtpFxpProgressChannel;

    async fn open_progress_channel(&mut self) -> Option<Self::Channel>;
}

#[async_trait]
impl<CP, S, E, UD> FtpFxpProgressChannel for FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD> + Send,
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Error + Send + Sync + 'static,
    UD: Send + Sync,
{
    async fn remote_size(&mut self, path: &str) -> Result<Option<u64>, FtpCommandError> {
        self.get_file_size(path).await
    }

    async fn close(&mut self) {
        if let Err(e) = self.control.send_quit().await {
            debug!("failed to quit fxp progress channel: {e}");
        }
    }
}

/// No progress channel.
pub struct FtpNoFxpProgress;

#[async_trait]
impl FtpFxpProgressChannel for FtpNoFxpProgress {
    async fn remote_size(&mut self, _path: &str) -> Result<Option<u64>, FtpCommandError> {
        Ok(None)
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl FtpFxpProgressFactory for FtpNoFxpProgress {
    type Channel = FtpNoFxpProgress;

    async fn open_progress_channel(&mut self) -> Option<Self::Channel> {
        None
    }
}

/// Turn polled sizes of the destination file into progress positions.
pub(super) struct FtpFxpSizeWatcher {
    last_size: u64,
}

impl FtpFxpSizeWatcher {
    pub(super) fn new(start: u64) -> Self {
        FtpFxpSizeWatcher { last_size: start }
    }

    /// Return the new position, if it's worth a report.
    pub(super) fn update(&mut self, size: Option<u64>) -> Option<u64> {
        let size = size?;
        if size < self.last_size {
            // the file may be truncated before the first write
            return None;
        }
        self.last_size = size;
        Some(size)
    }

    #[inline]
    pub(super) fn last_size(&self) -> u64 {
        self.last_size
    }
}
