/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::str::FromStr;

mod line;
pub use line::FtpLineDataReceiver;
pub(crate) use line::FtpLineDataTransfer;

mod rate;
pub(crate) use rate::{FtpRateLimiter, calculate_chunk_size};

mod progress;
pub use progress::{FtpNoProgress, FtpProgress, FtpProgressSink};
pub(crate) use progress::FtpProgressTracker;

mod verify;
pub use verify::{FtpVerifyMethod, FtpVerifyOptions};
pub(crate) use verify::{FtpVerifyResult, FtpVerifyScope, checksum_matched};

mod exists;
pub use exists::{FtpLocalExists, FtpRemoteExists};

mod finish;
pub(crate) use finish::FtpNoopKeeper;

mod download;
pub use download::FtpDownloadOptions;

mod upload;
pub use upload::FtpUploadOptions;

mod list;
pub use list::FtpListCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpTransferType {
    Ascii,
    Image,
}

impl FromStr for FtpTransferType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" | "ascii" | "text" => Ok(FtpTransferType::Ascii),
            "i" | "image" | "binary" => Ok(FtpTransferType::Image),
            _ => Err(()),
        }
    }
}

/// The result of a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpTransferStatus {
    Success,
    /// the destination already exists and nothing was transferred
    Skipped,
    /// the transfer or the verification failed
    Failed,
}

impl FtpTransferStatus {
    /// A skipped file is already in place, so it counts as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, FtpTransferStatus::Failed)
    }
}

/// How one pass over a data connection ended.
#[derive(Debug)]
pub(crate) enum FtpStreamOutcome {
    Completed,
    /// the requested stop position was reached before the end of the stream
    EarlySuccess,
    Cancelled,
    RemoteFault(io::Error),
    LocalFault(io::Error),
}

/// How one transfer attempt ended, after the control channel has been drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FtpAttemptOutcome {
    Success,
    EarlySuccess,
    Failed,
}

/// Byte offsets of the transfer, only increasing within one attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FtpTransferState {
    pub(crate) local_position: u64,
    pub(crate) remote_position: u64,
    pub(crate) desired_length: Option<u64>,
    pub(crate) chunk_size: usize,
}

impl FtpTransferState {
    pub(crate) fn new(position: u64, desired_length: Option<u64>, chunk_size: usize) -> Self {
        FtpTransferState {
            local_position: position,
            remote_position: position,
            desired_length,
            chunk_size,
        }
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.local_position += n as u64;
        self.remote_position += n as u64;
    }

    pub(crate) fn reached_desired_length(&self) -> bool {
        self.desired_length
            .is_some_and(|len| self.remote_position >= len)
    }
}

/// Stream faults that may be recovered by reopening the data connection.
pub(crate) fn is_resumable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
