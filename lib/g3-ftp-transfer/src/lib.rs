/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

mod debug;
pub use debug::{FTP_DEBUG_LOG_LEVEL, FTP_DEBUG_LOG_TARGET};

mod io;
mod state;

mod config;
pub use config::{FtpClientConfig, FtpControlConfig, FtpTransferConfig};

mod error;
pub use error::{
    FtpCommandError, FtpConnectError, FtpDataConnectError, FtpLineDataReadError,
    FtpRawResponseError, FtpSessionOpenError, FtpTransferError,
};

mod feature;
pub use feature::{FtpHashAlgorithm, FtpServerFeature};

mod connection;
pub use connection::{FtpConnectionProvider, FtpProxyKind};

mod control;
pub use control::{FtpCommand, FtpReply, FtpReplyType};

mod data;
pub use data::{FtpDataConnectionMode, FtpDataProtection};

mod local;
pub use local::{FtpLocalFile, FtpLocalSource, FtpLocalStream, FtpLocalTarget};

mod transfer;
pub use transfer::{
    FtpDownloadOptions, FtpLineDataReceiver, FtpListCommand, FtpLocalExists, FtpNoProgress,
    FtpProgress, FtpProgressSink, FtpRemoteExists, FtpTransferStatus, FtpTransferType,
    FtpUploadOptions, FtpVerifyMethod, FtpVerifyOptions,
};

mod fxp;
pub use fxp::{FtpFxpOptions, FtpFxpProgressChannel, FtpFxpProgressFactory, FtpNoFxpProgress};

mod client;
pub use client::FtpClient;

#[cfg(test)]
mod test_util;
