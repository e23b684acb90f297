/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::{
    FtpAttemptOutcome, FtpNoopKeeper, FtpProgressSink, FtpProgressTracker, FtpRateLimiter,
    FtpRemoteExists, FtpStreamOutcome, FtpTransferState, FtpTransferStatus, FtpVerifyOptions,
    FtpVerifyScope, is_resumable,
};
use crate::client::FtpClient;
use crate::connection::FtpConnectionProvider;
use crate::control::FtpCommand;
use crate::data::{FtpDataConnectionSpec, FtpDataProtection};
use crate::error::{FtpCommandError, FtpTransferError};
use crate::local::{FtpLocalFile, FtpLocalSource};

#[derive(Debug, Clone, Default)]
pub struct FtpUploadOptions<'a> {
    pub remote_exists: FtpRemoteExists,
    pub verify: FtpVerifyOptions,
    /// the local path shown in progress reports
    pub local_path: &'a str,
    pub file_index: usize,
    pub file_count: usize,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
struct FtpUploadPlan {
    command: FtpCommand,
    local_start: u64,
    remote_start: u64,
    /// length of the remote file after the upload
    desired_length: u64,
}

struct FtpUploadPass<'a> {
    state: FtpTransferState,
    limiter: FtpRateLimiter,
    keeper: FtpNoopKeeper,
    buf: Vec<u8>,
    local_len: u64,
    write_timeout: Duration,
    cancel: &'a CancellationToken,
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Upload `source` to the remote path.
    ///
    /// A broken data connection is resumed with APPE from the length the
    /// server has received.
    pub async fn upload_from_stream<T, P>(
        &mut self,
        source: &mut T,
        remote_path: &str,
        options: &FtpUploadOptions<'_>,
        progress: &mut P,
        user_data: &UD,
    ) -> Result<FtpTransferStatus, FtpTransferError>
    where
        T: FtpLocalSource,
        P: FtpProgressSink + ?Sized,
    {
        if remote_path.is_empty() {
            return Err(FtpTransferError::InvalidArgument("empty remote path"));
        }

        let mut tracker = FtpProgressTracker::new(
            progress,
            options.local_path,
            remote_path,
            options.file_index,
            options.file_count,
        );

        self.set_transfer_type(self.config.transfer.upload_data_type)
            .await?;
        let local_len = source
            .stream_len()
            .await
            .map_err(FtpTransferError::LocalIo)?;

        let max_attempts = options.verify.attempts(self.config.transfer.retry_attempts);
        let mut exists = options.remote_exists;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let Some(plan) = self.plan_upload(remote_path, exists, local_len).await? else {
                tracker.report_skipped(local_len);
                return Ok(FtpTransferStatus::Skipped);
            };
            if (plan.local_start > 0 || attempt > 1)
                && !source
                    .seek_to(plan.local_start)
                    .await
                    .map_err(FtpTransferError::LocalIo)?
            {
                return Err(FtpTransferError::InvalidArgument(
                    "local source is not seekable",
                ));
            }

            let outcome = self
                .upload_attempt(source, remote_path, plan, local_len, options, &mut tracker, user_data)
                .await?;
            if outcome == FtpAttemptOutcome::Failed {
                if attempt < max_attempts {
                    warn!("upload of {remote_path} failed, retry {attempt}/{max_attempts}");
                    exists = FtpRemoteExists::Overwrite;
                    continue;
                }
                return Ok(FtpTransferStatus::Failed);
            }

            if !options.verify.enabled() {
                return Ok(FtpTransferStatus::Success);
            }

            let scope = if exists.is_add_to_end() {
                FtpVerifyScope::Append {
                    remote_base: plan.remote_start,
                }
            } else {
                FtpVerifyScope::Upload
            };
            if self.verify_transfer(source, remote_path, scope).await? {
                return Ok(FtpTransferStatus::Success);
            }

            if attempt < max_attempts {
                warn!("verification of {remote_path} failed, retry {attempt}/{max_attempts}");
                exists = FtpRemoteExists::Overwrite;
                continue;
            }

            if options.verify.delete_on_failure() {
                self.control.delete_file(remote_path).await?;
            }
            if options.verify.throw_on_failure() {
                return Err(FtpTransferError::Verification(remote_path.to_string()));
            }
            return Ok(FtpTransferStatus::Failed);
        }
    }

    pub async fn upload_file<P>(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        options: &FtpUploadOptions<'_>,
        progress: &mut P,
        user_data: &UD,
    ) -> Result<FtpTransferStatus, FtpTransferError>
    where
        P: FtpProgressSink + ?Sized,
    {
        let mut file = FtpLocalFile::open_read(local_path)
            .await
            .map_err(FtpTransferError::LocalIo)?;
        self.upload_from_stream(&mut file, remote_path, options, progress, user_data)
            .await
    }

    /// Decide how to write the remote file. Ok(None) means skip.
    async fn plan_upload(
        &mut self,
        remote_path: &str,
        exists: FtpRemoteExists,
        local_len: u64,
    ) -> Result<Option<FtpUploadPlan>, FtpCommandError> {
        let remote_len = if exists == FtpRemoteExists::NoCheck {
            None
        } else if exists.skip_exists_check() {
            self.get_file_size(remote_path).await?
        } else if self.file_exists(remote_path).await? {
            match exists {
                FtpRemoteExists::Skip => {
                    info!("skip upload to {remote_path}, the remote file exists");
                    return Ok(None);
                }
                FtpRemoteExists::Overwrite => {
                    self.control.delete_file(remote_path).await?;
                    None
                }
                _ => Some(self.get_file_size(remote_path).await?.unwrap_or(0)),
            }
        } else {
            None
        };

        if exists.is_resume() && remote_len == Some(local_len) {
            info!("skip upload to {remote_path}, the remote file is complete");
            return Ok(None);
        }

        let base = remote_len.unwrap_or(0);
        let mut plan = FtpUploadPlan {
            command: FtpCommand::STOR,
            local_start: 0,
            remote_start: 0,
            desired_length: local_len,
        };
        if exists.is_add_to_end() {
            plan.command = FtpCommand::APPE;
            plan.remote_start = base;
            plan.desired_length = base + local_len;
        } else if exists.is_resume() && base > 0 && base < local_len {
            plan.command = FtpCommand::APPE;
            plan.local_start = base;
            plan.remote_start = base;
        } else if exists.is_resume() && base > local_len {
            debug!("remote file {remote_path} is larger than the local one, upload again");
        }
        Ok(Some(plan))
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_attempt<T, P>(
        &mut self,
        source: &mut T,
        remote_path: &str,
        plan: FtpUploadPlan,
        local_len: u64,
        options: &FtpUploadOptions<'_>,
        tracker: &mut FtpProgressTracker<'_, P>,
        user_data: &UD,
    ) -> Result<FtpAttemptOutcome, FtpTransferError>
    where
        T: FtpLocalSource,
        P: FtpProgressSink + ?Sized,
    {
        let config = Arc::clone(&self.config);
        let transfer_config = &config.transfer;

        let chunk_size = transfer_config.chunk_size_for_rate(transfer_config.upload_rate_limit);
        let mut pass = FtpUploadPass {
            state: FtpTransferState {
                local_position: plan.local_start,
                remote_position: plan.remote_start,
                desired_length: Some(plan.desired_length),
                chunk_size,
            },
            limiter: FtpRateLimiter::new(
                transfer_config.upload_rate_limit,
                transfer_config.rate_control_resolution,
            ),
            keeper: FtpNoopKeeper::new(transfer_config.noop_interval),
            buf: vec![0u8; chunk_size],
            local_len,
            write_timeout: transfer_config.data_read_timeout,
            cancel: &options.cancel,
        };
        tracker.restart(plan.local_start);

        let mut spec = FtpDataConnectionSpec::new(plan.command, remote_path);
        spec.mode = config.data_connection_mode;
        spec.encrypt = config.data_protection == FtpDataProtection::Private;
        let conn = self.open_transfer(&spec, user_data).await?;
        let mut stream = conn.stream;
        let mut wait_end_reply = conn.wait_end_reply;

        let mut resumed_at = None;
        loop {
            let outcome = self
                .send_data(&mut stream, source, &mut pass, tracker)
                .await?;
            drop(stream);

            match outcome {
                FtpStreamOutcome::Completed | FtpStreamOutcome::EarlySuccess => {
                    let success = self
                        .finish_transfer(wait_end_reply, &mut pass.keeper)
                        .await?;
                    if !success {
                        return Ok(FtpAttemptOutcome::Failed);
                    }
                    tracker.report_complete(pass.state.local_position);
                    return Ok(FtpAttemptOutcome::Success);
                }
                FtpStreamOutcome::Cancelled => {
                    self.drain_transfer_end(wait_end_reply, &mut pass.keeper)
                        .await;
                    return Err(FtpTransferError::Cancelled);
                }
                FtpStreamOutcome::LocalFault(e) => {
                    self.drain_transfer_end(wait_end_reply, &mut pass.keeper)
                        .await;
                    return Err(FtpTransferError::LocalIo(e));
                }
                FtpStreamOutcome::RemoteFault(e) => {
                    self.drain_transfer_end(wait_end_reply, &mut pass.keeper)
                        .await;

                    let position = pass.state.remote_position;
                    if !is_resumable(&e) {
                        return Err(FtpTransferError::StreamFault {
                            position,
                            resumable: false,
                            source: e,
                        });
                    }

                    // continue from what the server has got
                    let confirmed = match self.get_file_size(remote_path).await {
                        Ok(Some(len)) => len.min(position),
                        Ok(None) => position,
                        Err(resume) => {
                            return Err(FtpTransferError::ResumeFailed {
                                position,
                                original: e,
                                resume: Box::new(resume.into()),
                            });
                        }
                    };
                    if confirmed < plan.remote_start || resumed_at == Some(confirmed) {
                        return Err(FtpTransferError::StreamFault {
                            position,
                            resumable: true,
                            source: e,
                        });
                    }

                    let local_position = plan.local_start + (confirmed - plan.remote_start);
                    match source.seek_to(local_position).await {
                        Ok(true) => {}
                        Ok(false) => {
                            return Err(FtpTransferError::ResumeFailed {
                                position,
                                original: e,
                                resume: Box::new(FtpTransferError::InvalidArgument(
                                    "local source is not seekable",
                                )),
                            });
                        }
                        Err(resume) => {
                            return Err(FtpTransferError::ResumeFailed {
                                position,
                                original: e,
                                resume: Box::new(FtpTransferError::LocalIo(resume)),
                            });
                        }
                    }

                    crate::log_msg!("resume upload of {} at {}: {}", remote_path, confirmed, e);
                    resumed_at = Some(confirmed);
                    pass.state.local_position = local_position;
                    pass.state.remote_position = confirmed;
                    spec.command = FtpCommand::APPE;
                    match self.open_transfer(&spec, user_data).await {
                        Ok(conn) => {
                            stream = conn.stream;
                            wait_end_reply = conn.wait_end_reply;
                        }
                        Err(resume) => {
                            return Err(FtpTransferError::ResumeFailed {
                                position,
                                original: e,
                                resume: Box::new(resume.into()),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Copy the source to the data stream, and close it at the end.
    async fn send_data<T, P>(
        &mut self,
        stream: &mut S,
        source: &mut T,
        pass: &mut FtpUploadPass<'_>,
        tracker: &mut FtpProgressTracker<'_, P>,
    ) -> Result<FtpStreamOutcome, FtpCommandError>
    where
        T: FtpLocalSource,
        P: FtpProgressSink + ?Sized,
    {
        loop {
            if pass.cancel.is_cancelled() {
                return Ok(FtpStreamOutcome::Cancelled);
            }

            let nr = match source.read(&mut pass.buf).await {
                Ok(n) => n,
                Err(e) => return Ok(FtpStreamOutcome::LocalFault(e)),
            };
            if nr == 0 {
                return match tokio::time::timeout(pass.write_timeout, stream.shutdown()).await {
                    Ok(Ok(_)) => Ok(FtpStreamOutcome::Completed),
                    Ok(Err(e)) => Ok(FtpStreamOutcome::RemoteFault(e)),
                    Err(_) if pass.state.reached_desired_length() => {
                        debug!("timed out to close data connection after all data sent");
                        Ok(FtpStreamOutcome::Completed)
                    }
                    Err(_) => Ok(FtpStreamOutcome::RemoteFault(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "close data connection timed out",
                    ))),
                };
            }

            let data = &pass.buf[..nr];
            let write = async {
                stream.write_all(data).await?;
                stream.flush().await
            };
            match tokio::time::timeout(pass.write_timeout, write).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Ok(FtpStreamOutcome::RemoteFault(e)),
                Err(_) => {
                    return Ok(FtpStreamOutcome::RemoteFault(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "write data timed out",
                    )));
                }
            }

            pass.state.advance(nr);
            tracker.report(pass.state.local_position, Some(pass.local_len));

            self.keep_alive(&mut pass.keeper).await?;
            pass.limiter.limit(nr).await;
        }
    }
}
