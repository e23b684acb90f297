/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::client::FtpClient;
use crate::connection::FtpConnectionProvider;
use crate::control::{FtpCommand, FtpControlChannel, FtpReply};
use crate::data::{format_port_param, parse_pasv_reply};
use crate::error::{
    FtpCommandError, FtpDataConnectError, FtpRawResponseError, FtpTransferError,
};
use crate::transfer::{
    FtpProgressSink, FtpProgressTracker, FtpRemoteExists, FtpTransferStatus, FtpVerifyOptions,
    FtpVerifyResult, checksum_matched,
};

mod progress;
pub use progress::{FtpFxpProgressChannel, FtpFxpProgressFactory, FtpNoFxpProgress};
use progress::FtpFxpSizeWatcher;

#[derive(Debug, Clone)]
pub struct FtpFxpOptions {
    pub remote_exists: FtpRemoteExists,
    pub verify: FtpVerifyOptions,
    pub file_index: usize,
    pub file_count: usize,
}

impl Default for FtpFxpOptions {
    fn default() -> Self {
        FtpFxpOptions {
            remote_exists: FtpRemoteExists::Resume,
            verify: FtpVerifyOptions::empty(),
            file_index: 0,
            file_count: 0,
        }
    }
}

/// Where the destination file should be written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FtpFxpStart {
    Skip,
    Store,
    Append(u64),
}

/// The state of the transfer command on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FtpFxpSide {
    Running,
    Done,
    Failed,
}

impl FtpFxpSide {
    fn after_start(reply: &FtpReply) -> Self {
        if reply.is_preliminary() {
            FtpFxpSide::Running
        } else {
            FtpFxpSide::Done
        }
    }

    fn after_end(reply: &FtpReply) -> Self {
        if reply.is_preliminary() {
            FtpFxpSide::Running
        } else if reply.is_negative() {
            FtpFxpSide::Failed
        } else {
            FtpFxpSide::Done
        }
    }
}

async fn read_fxp_end<T>(
    control: &mut FtpControlChannel<T>,
    stage: &'static str,
) -> Result<FtpFxpSide, FtpCommandError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let reply = control.read_delayed_reply(stage).await?;
    let side = FtpFxpSide::after_end(&reply);
    if side == FtpFxpSide::Failed {
        warn!("{stage}: {reply}");
    } else {
        debug!("{stage}: {reply}");
    }
    Ok(side)
}

async fn next_fxp_side<T>(
    control: &mut FtpControlChannel<T>,
    ready: Result<(), FtpRawResponseError>,
    stage: &'static str,
) -> Result<FtpFxpSide, FtpCommandError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    ready?;
    read_fxp_end(control, stage).await
}

/// Read the end reply of a transfer still running on one side, or abort it
/// if no reply arrives within `wait`.
async fn settle_fxp_side<T>(
    control: &mut FtpControlChannel<T>,
    side: FtpFxpSide,
    wait: Duration,
    end_wait_timeout: Duration,
) -> Result<(), FtpTransferError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if side != FtpFxpSide::Running {
        return Ok(());
    }

    if !wait.is_zero() {
        loop {
            match control.read_reply_within(wait, "wait fxp end").await {
                Ok(reply) if reply.is_preliminary() => {}
                Ok(reply) => {
                    debug!("late fxp end reply: {reply}");
                    return Ok(());
                }
                Err(FtpRawResponseError::ReadResponseTimedOut(_)) => break,
                Err(e) => return Err(FtpTransferError::FxpChannelUnusable(e.into())),
            }
        }
    }

    warn!("no fxp end reply, abort the transfer");
    control
        .abort_transfer(end_wait_timeout)
        .await
        .map_err(FtpTransferError::FxpChannelUnusable)
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Copy a file from this server to `dest` directly between the two servers.
    ///
    /// The destination server listens and this server connects to it. The
    /// progress channel, if opened by `progress_factory`, is closed before
    /// this function returns.
    #[allow(clippy::too_many_arguments)]
    pub async fn fxp_transfer_file<CP2, S2, E2, UD2, F, P>(
        &mut self,
        source_path: &str,
        dest: &mut FtpClient<CP2, S2, E2, UD2>,
        dest_path: &str,
        options: &FtpFxpOptions,
        progress_factory: &mut F,
        progress: &mut P,
    ) -> Result<FtpTransferStatus, FtpTransferError>
    where
        CP2: FtpConnectionProvider<S2, E2, UD2>,
        S2: AsyncRead + AsyncWrite + Unpin,
        E2: Error + Send + Sync + 'static,
        F: FtpFxpProgressFactory,
        P: FtpProgressSink + ?Sized,
    {
        if source_path.is_empty() || dest_path.is_empty() {
            return Err(FtpTransferError::InvalidArgument("empty fxp path"));
        }
        if options.remote_exists.is_add_to_end() {
            return Err(FtpTransferError::InvalidArgument(
                "add to end is not supported by fxp",
            ));
        }

        if !self.file_exists(source_path).await? {
            return Err(FtpTransferError::RemoteFileNotFound(source_path.to_string()));
        }

        let mut tracker = FtpProgressTracker::new(
            progress,
            source_path,
            dest_path,
            options.file_index,
            options.file_count,
        );

        let max_attempts = options.verify.attempts(self.config.transfer.retry_attempts);
        let mut exists = options.remote_exists;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let start = resolve_dest_start(dest, dest_path, exists).await?;
            if start == FtpFxpStart::Skip {
                info!("skip fxp transfer to {dest_path}, the destination file exists");
                tracker.report_skipped(0);
                return Ok(FtpTransferStatus::Skipped);
            }

            let mut channel = if tracker.enabled() {
                progress_factory.open_progress_channel().await
            } else {
                None
            };
            let r = self
                .fxp_attempt(
                    source_path,
                    dest,
                    dest_path,
                    start,
                    channel.as_mut(),
                    &mut tracker,
                )
                .await;
            if let Some(mut channel) = channel {
                channel.close().await;
            }
            if !r? {
                if attempt < max_attempts {
                    warn!("fxp transfer of {source_path} failed, retry {attempt}/{max_attempts}");
                    exists = FtpRemoteExists::Overwrite;
                    continue;
                }
                return Ok(FtpTransferStatus::Failed);
            }

            if !options.verify.enabled() {
                return Ok(FtpTransferStatus::Success);
            }
            if self.verify_fxp(source_path, dest, dest_path).await? {
                return Ok(FtpTransferStatus::Success);
            }

            if attempt < max_attempts {
                warn!("fxp verification of {dest_path} failed, retry {attempt}/{max_attempts}");
                exists = FtpRemoteExists::Overwrite;
                continue;
            }

            if options.verify.delete_on_failure() {
                dest.control.delete_file(dest_path).await?;
            }
            if options.verify.throw_on_failure() {
                return Err(FtpTransferError::Verification(dest_path.to_string()));
            }
            return Ok(FtpTransferStatus::Failed);
        }
    }

    /// Returns false if any of the servers reported failure.
    async fn fxp_attempt<CP2, S2, E2, UD2, C, P>(
        &mut self,
        source_path: &str,
        dest: &mut FtpClient<CP2, S2, E2, UD2>,
        dest_path: &str,
        start: FtpFxpStart,
        mut channel: Option<&mut C>,
        tracker: &mut FtpProgressTracker<'_, P>,
    ) -> Result<bool, FtpTransferError>
    where
        CP2: FtpConnectionProvider<S2, E2, UD2>,
        S2: AsyncRead + AsyncWrite + Unpin,
        E2: Error + Send + Sync + 'static,
        C: FtpFxpProgressChannel,
        P: FtpProgressSink + ?Sized,
    {
        let data_type = self.config.transfer.fxp_data_type;
        self.set_transfer_type(data_type).await?;
        dest.set_transfer_type(data_type).await?;

        let total = self.get_file_size(source_path).await?;

        // the destination listens, and the source connects to it
        let listen_addr = request_fxp_passive(dest).await?;
        let cmd = FtpCommand::PORT;
        let reply = self
            .control
            .execute(cmd, Some(&format_port_param(listen_addr)))
            .await?;
        if !reply.is_success() {
            return Err(FtpCommandError::from_reply(cmd, reply).into());
        }

        let (dest_cmd, offset) = match start {
            FtpFxpStart::Append(offset) => {
                self.control.request_restart(offset).await?;
                (FtpCommand::APPE, offset)
            }
            _ => (FtpCommand::STOR, 0),
        };
        tracker.restart(offset);

        let cmd = FtpCommand::RETR;
        let reply = self.control.execute(cmd, Some(source_path)).await?;
        if !reply.is_success() {
            return Err(FtpCommandError::from_reply(cmd, reply).into());
        }
        let mut source_side = FtpFxpSide::after_start(&reply);

        let source_wait = self.config.control.command_timeout;
        let dest_wait = dest.config.control.command_timeout;
        let end_wait_timeout = self.config.transfer.end_wait_timeout;

        let reply = match dest.control.execute(dest_cmd, Some(dest_path)).await {
            Ok(reply) if reply.is_success() => reply,
            Ok(reply) => {
                settle_fxp_side(&mut self.control, source_side, source_wait, end_wait_timeout)
                    .await?;
                return Err(FtpCommandError::from_reply(dest_cmd, reply).into());
            }
            Err(e) => {
                settle_fxp_side(&mut self.control, source_side, source_wait, end_wait_timeout)
                    .await?;
                return Err(e.into());
            }
        };
        let mut dest_side = FtpFxpSide::after_start(&reply);

        let poll_interval = self.config.transfer.fxp_progress_interval;
        let mut deadline = Instant::now() + self.config.transfer.fxp_read_timeout;
        let mut failed = false;
        let mut watcher = FtpFxpSizeWatcher::new(offset);

        let end = loop {
            if source_side != FtpFxpSide::Running && dest_side != FtpFxpSide::Running {
                break Ok(!failed);
            }

            tokio::select! {
                biased;

                r = self.control.wait_read_ready(), if source_side == FtpFxpSide::Running => {
                    match next_fxp_side(&mut self.control, r, "wait fxp source end").await {
                        Ok(side) => source_side = side,
                        Err(e) => {
                            source_side = FtpFxpSide::Failed;
                            break Err(e.into());
                        }
                    }
                }
                r = dest.control.wait_read_ready(), if dest_side == FtpFxpSide::Running => {
                    match next_fxp_side(&mut dest.control, r, "wait fxp destination end").await {
                        Ok(side) => dest_side = side,
                        Err(e) => {
                            dest_side = FtpFxpSide::Failed;
                            break Err(e.into());
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if failed {
                        warn!("no transfer end reply from the other side after fxp failure");
                        break Ok(false);
                    }
                    break Err(FtpTransferError::FxpTimedOut);
                }
                _ = tokio::time::sleep(poll_interval), if channel.is_some() && total.is_some() => {
                    let Some(c) = channel.as_mut() else {
                        continue;
                    };
                    match c.remote_size(dest_path).await {
                        Ok(size) => {
                            if let Some(position) = watcher.update(size) {
                                tracker.report(position, total);
                            }
                        }
                        Err(e) => {
                            warn!("fxp progress channel failed: {e}");
                            channel = None;
                        }
                    }
                }
            }

            if !failed
                && (source_side == FtpFxpSide::Failed || dest_side == FtpFxpSide::Failed)
            {
                // the other side should end soon
                failed = true;
                deadline = deadline.min(Instant::now() + end_wait_timeout);
            }
        };

        // no more end reply should be left on the control channels
        let (source_wait, dest_wait) = if matches!(end, Err(FtpTransferError::FxpTimedOut)) {
            (Duration::ZERO, Duration::ZERO)
        } else {
            (source_wait, dest_wait)
        };
        settle_fxp_side(&mut self.control, source_side, source_wait, end_wait_timeout).await?;
        settle_fxp_side(&mut dest.control, dest_side, dest_wait, end_wait_timeout).await?;

        if !end? {
            return Ok(false);
        }
        info!("fxp transfer of {source_path} to {dest_path} completed");
        tracker.report_complete(total.unwrap_or(watcher.last_size()));
        Ok(true)
    }

    /// Compare the checksums calculated by both servers with a common HASH
    /// algorithm. The check passes if there is no such algorithm.
    async fn verify_fxp<CP2, S2, E2, UD2>(
        &mut self,
        source_path: &str,
        dest: &mut FtpClient<CP2, S2, E2, UD2>,
        dest_path: &str,
    ) -> Result<bool, FtpTransferError>
    where
        CP2: FtpConnectionProvider<S2, E2, UD2>,
        S2: AsyncRead + AsyncWrite + Unpin,
        E2: Error + Send + Sync + 'static,
    {
        let Some(alg) = self
            .server_feature
            .common_hash_algorithm(&dest.server_feature)
        else {
            info!("no common hash algorithm for fxp verification of {dest_path}, skipped");
            return Ok(true);
        };

        self.select_hash_algorithm(alg).await?;
        dest.select_hash_algorithm(alg).await?;
        let source_hash = self.get_file_checksum(source_path).await?;
        let dest_hash = dest.get_file_checksum(dest_path).await?;
        let r = match (source_hash, dest_hash) {
            (Some((a1, h1)), Some((a2, h2))) if a1 == alg && a2 == alg => {
                if checksum_matched(&h1, &h2) {
                    FtpVerifyResult::Matched
                } else {
                    FtpVerifyResult::Mismatched
                }
            }
            // no usable hash from a server which says it supports one
            _ => FtpVerifyResult::Mismatched,
        };
        info!("fxp {alg} verification of {dest_path}: {r:?}");
        Ok(r.passed())
    }
}

/// Apply the exists policy on the destination.
async fn resolve_dest_start<CP, S, E, UD>(
    dest: &mut FtpClient<CP, S, E, UD>,
    dest_path: &str,
    exists: FtpRemoteExists,
) -> Result<FtpFxpStart, FtpCommandError>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    match exists {
        FtpRemoteExists::NoCheck => return Ok(FtpFxpStart::Store),
        FtpRemoteExists::ResumeNoCheck => {
            let offset = dest.get_file_size(dest_path).await?.unwrap_or(0);
            return Ok(FtpFxpStart::Append(offset));
        }
        _ => {}
    }

    if !dest.file_exists(dest_path).await? {
        return Ok(FtpFxpStart::Store);
    }
    match exists {
        FtpRemoteExists::Skip => Ok(FtpFxpStart::Skip),
        FtpRemoteExists::Resume => {
            let offset = dest.get_file_size(dest_path).await?.unwrap_or(0);
            if offset > 0 {
                Ok(FtpFxpStart::Append(offset))
            } else {
                Ok(FtpFxpStart::Store)
            }
        }
        _ => {
            dest.control.delete_file(dest_path).await?;
            Ok(FtpFxpStart::Store)
        }
    }
}

/// PASV on the destination, or CPSV if PASV is rejected.
async fn request_fxp_passive<CP, S, E, UD>(
    dest: &mut FtpClient<CP, S, E, UD>,
) -> Result<std::net::SocketAddrV4, FtpTransferError>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    let mut cmd = FtpCommand::PASV;
    let mut reply = dest.control.execute(cmd, None).await?;
    if !reply.is_success() {
        debug!("PASV rejected by fxp destination: {reply}, try CPSV");
        let cpsv_reply = dest.control.execute(FtpCommand::CPSV, None).await?;
        if !cpsv_reply.is_success() {
            return Err(FtpCommandError::from_reply(cmd, reply).into());
        }
        cmd = FtpCommand::CPSV;
        reply = cpsv_reply;
    }

    match parse_pasv_reply(reply.message()) {
        Some(addr) => Ok(addr),
        None => Err(FtpDataConnectError::MalformedServerResponse(cmd, reply).into()),
    }
}
