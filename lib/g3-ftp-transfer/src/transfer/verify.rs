/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::str::FromStr;

use bitflags::bitflags;
use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::FtpConnectionProvider;
use crate::client::FtpClient;
use crate::error::FtpTransferError;
use crate::local::FtpLocalStream;

bitflags! {
    /// What to compare between the two sides after a transfer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FtpVerifyMethod: u8 {
        const SIZE = 0b0001;
        const DATE = 0b0010;
        const CHECKSUM = 0b0100;
    }
}

impl Default for FtpVerifyMethod {
    fn default() -> Self {
        FtpVerifyMethod::CHECKSUM
    }
}

impl FromStr for FtpVerifyMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" | "length" => Ok(FtpVerifyMethod::SIZE),
            "date" | "mtime" => Ok(FtpVerifyMethod::DATE),
            "checksum" | "hash" => Ok(FtpVerifyMethod::CHECKSUM),
            _ => Err(()),
        }
    }
}

bitflags! {
    /// Verification policy of one transfer. No verification is done if empty.
    ///
    /// `DELETE` and `THROW` are applied only after all attempts failed, and
    /// may be combined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FtpVerifyOptions: u8 {
        /// restart the transfer, up to `retry_attempts` times in total
        const RETRY = 0b0001;
        /// delete the destination file if it is still bad
        const DELETE = 0b0010;
        /// return a verification error instead of a failed status
        const THROW = 0b0100;
        /// verify without the retry and terminal policy
        const ONLY_VERIFY = 0b1000;
    }
}

impl FtpVerifyOptions {
    #[inline]
    pub(crate) fn enabled(&self) -> bool {
        !self.is_empty()
    }

    /// The number of full transfer attempts allowed.
    pub(crate) fn attempts(&self, retry_attempts: usize) -> usize {
        if self.contains(FtpVerifyOptions::RETRY) && !self.contains(FtpVerifyOptions::ONLY_VERIFY)
        {
            retry_attempts.max(1)
        } else {
            1
        }
    }

    #[inline]
    pub(crate) fn delete_on_failure(&self) -> bool {
        self.contains(FtpVerifyOptions::DELETE) && !self.contains(FtpVerifyOptions::ONLY_VERIFY)
    }

    #[inline]
    pub(crate) fn throw_on_failure(&self) -> bool {
        self.contains(FtpVerifyOptions::THROW) && !self.contains(FtpVerifyOptions::ONLY_VERIFY)
    }
}

/// Result of a single verification method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FtpVerifyResult {
    Matched,
    Mismatched,
    /// the method can not be evaluated, counted as matched
    Unavailable,
}

impl FtpVerifyResult {
    pub(crate) fn compare<T: PartialEq>(a: Option<T>, b: Option<T>) -> Self {
        match (a, b) {
            (Some(a), Some(b)) if a == b => FtpVerifyResult::Matched,
            (Some(_), Some(_)) => FtpVerifyResult::Mismatched,
            _ => FtpVerifyResult::Unavailable,
        }
    }

    #[inline]
    pub(crate) fn passed(&self) -> bool {
        !matches!(self, FtpVerifyResult::Mismatched)
    }
}

/// Case insensitive compare of hex checksums.
pub(crate) fn checksum_matched(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Which side has been written, this decides the usable methods.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FtpVerifyScope {
    Download,
    Upload,
    /// the local data was appended to a remote file of `remote_base` bytes
    Append { remote_base: u64 },
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Compare the local stream with the remote file, using the configured methods.
    pub(crate) async fn verify_transfer<L>(
        &mut self,
        local: &mut L,
        remote_path: &str,
        scope: FtpVerifyScope,
    ) -> Result<bool, FtpTransferError>
    where
        L: FtpLocalStream + ?Sized,
    {
        let mut method = self.config.transfer.verify_method;
        if let FtpVerifyScope::Append { .. } = scope {
            method = FtpVerifyMethod::SIZE;
        } else if method == FtpVerifyMethod::CHECKSUM
            && self.server_feature.hash_algorithm().is_none()
        {
            method = FtpVerifyMethod::SIZE;
        }

        let mut passed = true;

        if method.contains(FtpVerifyMethod::SIZE) {
            let local_len = local
                .stream_len()
                .await
                .map_err(FtpTransferError::LocalIo)?;
            let expected = match scope {
                FtpVerifyScope::Append { remote_base } => remote_base + local_len,
                _ => local_len,
            };
            let remote = self.get_file_size(remote_path).await?;
            let r = FtpVerifyResult::compare(Some(expected), remote);
            info!("size verification of {remote_path}: {r:?}");
            passed &= r.passed();
        }

        if method.contains(FtpVerifyMethod::DATE) && matches!(scope, FtpVerifyScope::Download) {
            let local_time = local.modified().await.map_err(FtpTransferError::LocalIo)?;
            let remote_time = self.get_file_mtime(remote_path).await?;
            let r = FtpVerifyResult::compare(
                local_time.map(|t| t.timestamp()),
                remote_time.map(|t| t.timestamp()),
            );
            info!("date verification of {remote_path}: {r:?}");
            passed &= r.passed();
        }

        if method.contains(FtpVerifyMethod::CHECKSUM) {
            let r = match self.get_file_checksum(remote_path).await? {
                Some((alg, remote_hash)) => {
                    match local.checksum(alg).await.map_err(FtpTransferError::LocalIo)? {
                        Some(local_hash) if checksum_matched(&local_hash, &remote_hash) => {
                            FtpVerifyResult::Matched
                        }
                        Some(_) => FtpVerifyResult::Mismatched,
                        None => FtpVerifyResult::Unavailable,
                    }
                }
                None => FtpVerifyResult::Unavailable,
            };
            info!("checksum verification of {remote_path}: {r:?}");
            passed &= r.passed();
        }

        Ok(passed)
    }
}
