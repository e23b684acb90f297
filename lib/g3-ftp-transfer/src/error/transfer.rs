/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

use super::{FtpCommandError, FtpDataConnectError};

#[derive(Debug, Error)]
pub enum FtpLineDataReadError {
    #[error("read failed: {0:?}")]
    ReadFailed(#[from] io::Error),
    #[error("line {0} is too long")]
    LineTooLong(usize),
    #[error("too many lines")]
    TooManyLines,
    #[error("unsupported encoding")]
    UnsupportedEncoding,
    #[error("aborted by callback")]
    AbortedByCallback,
    #[error("timed out to read all lines")]
    TimedOut,
}

#[derive(Debug, Error)]
pub enum FtpTransferError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("command error: {0}")]
    Command(#[from] FtpCommandError),
    #[error("data connection error: {0}")]
    DataConnect(#[from] FtpDataConnectError),
    #[error("data stream fault at offset {position}: {source}")]
    StreamFault {
        position: u64,
        resumable: bool,
        #[source]
        source: io::Error,
    },
    #[error("failed to resume at offset {position} after {original}: {resume}")]
    ResumeFailed {
        position: u64,
        original: io::Error,
        #[source]
        resume: Box<FtpTransferError>,
    },
    #[error("local io error: {0}")]
    LocalIo(#[source] io::Error),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("verification failed for {0}")]
    Verification(String),
    #[error("remote file {0} not found")]
    RemoteFileNotFound(String),
    #[error("list data error: {0}")]
    ListData(#[from] FtpLineDataReadError),
    #[error("server reported failure of listing {0}")]
    ListFailed(String),
    #[error("timed out to wait fxp transfer end")]
    FxpTimedOut,
    #[error("control channel unusable after fxp transfer: {0}")]
    FxpChannelUnusable(#[source] FtpCommandError),
}

impl FtpTransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FtpTransferError::Cancelled)
    }

    /// The reply of the server if a command was rejected.
    pub fn rejected_reply(&self) -> Option<&crate::FtpReply> {
        match self {
            FtpTransferError::Command(e) => e.rejected_reply(),
            FtpTransferError::DataConnect(FtpDataConnectError::Command(e)) => e.rejected_reply(),
            FtpTransferError::ResumeFailed { resume, .. } => resume.rejected_reply(),
            _ => None,
        }
    }
}
