/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

use super::FtpRawResponseError;
use crate::control::{FtpCommand, FtpReply};

#[derive(Debug, Error)]
pub enum FtpCommandError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("unable to send command: {0:?}")]
    SendFailed(io::Error),
    #[error("unable to recv reply: {0}")]
    RecvFailed(#[from] FtpRawResponseError),
    #[error("service not available")]
    ServiceNotAvailable,
    #[error("command {0} rejected by server: {1}")]
    Rejected(FtpCommand, FtpReply),
    #[error("unexpected reply code ({0} -> {1})")]
    UnexpectedReplyCode(FtpCommand, u16),
    #[error("invalid reply {1} syntax to command {0}")]
    InvalidReplySyntax(FtpCommand, u16),
}

impl FtpCommandError {
    /// Map a reply that was expected to be positive to the matching error.
    pub(crate) fn from_reply(cmd: FtpCommand, reply: FtpReply) -> Self {
        match reply.code() {
            421 => FtpCommandError::ServiceNotAvailable,
            530 => FtpCommandError::NotLoggedIn,
            _ => FtpCommandError::Rejected(cmd, reply),
        }
    }

    pub fn rejected_reply(&self) -> Option<&FtpReply> {
        match self {
            FtpCommandError::Rejected(_, reply) => Some(reply),
            _ => None,
        }
    }
}
