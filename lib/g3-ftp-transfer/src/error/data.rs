/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::net::SocketAddr;

use thiserror::Error;

use super::FtpCommandError;
use crate::control::{FtpCommand, FtpReply};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FtpDataConnectError {
    #[error("unable to parse data address from reply to {0}: {1}")]
    MalformedServerResponse(FtpCommand, FtpReply),
    #[error("{0} is only available over ipv4, use the extended command for ipv6")]
    UnsupportedProtocol(FtpCommand),
    #[error("no suitable passive port found after {0} attempts")]
    PortExhausted(usize),
    #[error("timed out to connect to data address {0}")]
    ConnectTimeout(SocketAddr),
    #[error("failed to connect to data address {0}: {1}")]
    ConnectFailed(SocketAddr, BoxError),
    #[error("failed to listen for data connection: {0}")]
    ListenFailed(BoxError),
    #[error("timed out to accept data connection")]
    AcceptTimeout,
    #[error("failed to accept data connection: {0}")]
    AcceptFailed(BoxError),
    #[error("command failed: {0}")]
    Command(#[from] FtpCommandError),
    #[error("tls handshake on data connection failed: {0}")]
    TlsFailed(BoxError),
}

impl FtpDataConnectError {
    pub(crate) fn rejected(cmd: FtpCommand, reply: FtpReply) -> Self {
        FtpDataConnectError::Command(FtpCommandError::from_reply(cmd, reply))
    }
}
