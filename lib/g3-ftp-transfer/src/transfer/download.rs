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
    FtpAttemptOutcome, FtpLocalExists, FtpNoopKeeper, FtpProgressSink, FtpProgressTracker,
    FtpRateLimiter, FtpStreamOutcome, FtpTransferState, FtpTransferStatus, FtpTransferType,
    FtpVerifyMethod, FtpVerifyOptions, FtpVerifyScope, is_resumable,
};
use crate::client::FtpClient;
use crate::connection::FtpConnectionProvider;
use crate::control::FtpCommand;
use crate::data::{FtpDataConnectionSpec, FtpDataProtection};
use crate::error::{FtpCommandError, FtpTransferError};
use crate::local::{FtpLocalFile, FtpLocalStream, FtpLocalTarget};

/// SOCKS4 proxies may leave their 8 bytes reply on the data stream,
/// of which 6 bytes are seen before the payload.
pub(crate) const SOCKS4_DISCARD_BYTES: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct FtpDownloadOptions<'a> {
    pub local_exists: FtpLocalExists,
    pub verify: FtpVerifyOptions,
    /// end the download once this remote offset is reached
    pub stop_position: Option<u64>,
    /// the local path shown in progress reports
    pub local_path: &'a str,
    pub file_index: usize,
    pub file_count: usize,
    pub cancel: CancellationToken,
}

struct FtpDownloadPass<'a> {
    state: FtpTransferState,
    limiter: FtpRateLimiter,
    keeper: FtpNoopKeeper,
    buf: Vec<u8>,
    discard: usize,
    read_to_end: bool,
    total: Option<u64>,
    read_timeout: Duration,
    stop_position: Option<u64>,
    cancel: &'a CancellationToken,
}

/// Set up the target for a new attempt, and return the offset to start from.
///
/// Ok(None) means the target is already there and should not be touched.
async fn prepare_target<T>(
    target: &mut T,
    exists: FtpLocalExists,
    remote_size: Option<u64>,
) -> io::Result<Option<u64>>
where
    T: FtpLocalTarget,
{
    let len = target.stream_len().await?;
    match exists {
        FtpLocalExists::Skip if len > 0 => Ok(None),
        FtpLocalExists::Overwrite | FtpLocalExists::Skip => {
            target.truncate_to(0).await?;
            Ok(Some(0))
        }
        FtpLocalExists::Resume => match remote_size {
            Some(size) if len == size => Ok(None),
            Some(size) if len > size => {
                debug!("local file is larger than the remote one, download again");
                target.truncate_to(0).await?;
                Ok(Some(0))
            }
            _ => {
                target.truncate_to(len).await?;
                Ok(Some(len))
            }
        },
    }
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Download the remote file into `target`.
    ///
    /// Broken data connections are resumed from the last received offset.
    /// If verification is enabled, the whole download is retried as the
    /// verify options allow.
    pub async fn download_to_stream<T, P>(
        &mut self,
        target: &mut T,
        remote_path: &str,
        options: &FtpDownloadOptions<'_>,
        progress: &mut P,
        user_data: &UD,
    ) -> Result<FtpTransferStatus, FtpTransferError>
    where
        T: FtpLocalTarget,
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

        self.set_transfer_type(self.config.transfer.download_data_type)
            .await?;
        let remote_size = self.get_file_size(remote_path).await?;
        if remote_size == Some(0) && !self.config.transfer.download_zero_byte_files {
            info!("skip download of empty file {remote_path}");
            tracker.report_skipped(0);
            return Ok(FtpTransferStatus::Skipped);
        }

        let max_attempts = options.verify.attempts(self.config.transfer.retry_attempts);
        let mut exists = options.local_exists;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let start = prepare_target(target, exists, remote_size)
                .await
                .map_err(FtpTransferError::LocalIo)?;
            let Some(start) = start else {
                let len = target
                    .stream_len()
                    .await
                    .map_err(FtpTransferError::LocalIo)?;
                info!("skip download of {remote_path}, the local file exists");
                tracker.report_skipped(len);
                return Ok(FtpTransferStatus::Skipped);
            };

            let outcome = self
                .download_attempt(
                    target,
                    remote_path,
                    remote_size,
                    start,
                    options,
                    &mut tracker,
                    user_data,
                )
                .await?;
            match outcome {
                FtpAttemptOutcome::Success => {}
                FtpAttemptOutcome::EarlySuccess => return Ok(FtpTransferStatus::Success),
                FtpAttemptOutcome::Failed => {
                    if attempt < max_attempts {
                        warn!("download of {remote_path} failed, retry {attempt}/{max_attempts}");
                        exists = FtpLocalExists::Overwrite;
                        continue;
                    }
                    return Ok(FtpTransferStatus::Failed);
                }
            }

            if !options.verify.enabled() {
                return Ok(FtpTransferStatus::Success);
            }

            if self
                .config
                .transfer
                .verify_method
                .contains(FtpVerifyMethod::DATE)
                && let Some(mtime) = self.get_file_mtime(remote_path).await?
            {
                target
                    .set_modified(mtime)
                    .await
                    .map_err(FtpTransferError::LocalIo)?;
            }

            if self
                .verify_transfer(target, remote_path, FtpVerifyScope::Download)
                .await?
            {
                return Ok(FtpTransferStatus::Success);
            }

            if attempt < max_attempts {
                warn!("verification of {remote_path} failed, retry {attempt}/{max_attempts}");
                exists = FtpLocalExists::Overwrite;
                continue;
            }

            if options.verify.delete_on_failure() {
                target.discard().await.map_err(FtpTransferError::LocalIo)?;
            }
            if options.verify.throw_on_failure() {
                return Err(FtpTransferError::Verification(remote_path.to_string()));
            }
            return Ok(FtpTransferStatus::Failed);
        }
    }

    /// Download the remote file to a local file, creating the parent directories.
    pub async fn download_file<P>(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        options: &FtpDownloadOptions<'_>,
        progress: &mut P,
        user_data: &UD,
    ) -> Result<FtpTransferStatus, FtpTransferError>
    where
        P: FtpProgressSink + ?Sized,
    {
        let mut file = FtpLocalFile::open_write(local_path)
            .await
            .map_err(FtpTransferError::LocalIo)?;
        let r = self
            .download_to_stream(&mut file, remote_path, options, progress, user_data)
            .await;
        if r.is_err() && file.stream_len().await.is_ok_and(|len| len == 0) {
            // leave no empty file behind
            if let Err(e) = file.discard().await {
                debug!("failed to remove empty local file {}: {e}", local_path.display());
            }
        }
        r
    }

    pub(crate) fn socks4_discard(&self, position: u64) -> usize {
        if position == 0 && self.conn_provider.proxy_kind().is_socks4_family() {
            SOCKS4_DISCARD_BYTES
        } else {
            0
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn download_attempt<T, P>(
        &mut self,
        target: &mut T,
        remote_path: &str,
        remote_size: Option<u64>,
        start: u64,
        options: &FtpDownloadOptions<'_>,
        tracker: &mut FtpProgressTracker<'_, P>,
        user_data: &UD,
    ) -> Result<FtpAttemptOutcome, FtpTransferError>
    where
        T: FtpLocalTarget,
        P: FtpProgressSink + ?Sized,
    {
        let config = Arc::clone(&self.config);
        let transfer_config = &config.transfer;

        let read_to_end = matches!(remote_size, None | Some(0))
            || transfer_config.download_data_type == FtpTransferType::Ascii;
        let chunk_size = transfer_config.chunk_size_for_rate(transfer_config.download_rate_limit);
        let mut pass = FtpDownloadPass {
            state: FtpTransferState::new(
                start,
                if read_to_end { None } else { remote_size },
                chunk_size,
            ),
            limiter: FtpRateLimiter::new(
                transfer_config.download_rate_limit,
                transfer_config.rate_control_resolution,
            ),
            keeper: FtpNoopKeeper::new(transfer_config.noop_interval),
            buf: vec![0u8; chunk_size],
            discard: self.socks4_discard(start),
            read_to_end,
            total: remote_size,
            read_timeout: transfer_config.data_read_timeout,
            stop_position: options.stop_position,
            cancel: &options.cancel,
        };
        tracker.restart(start);

        let mut spec = FtpDataConnectionSpec::new(FtpCommand::RETR, remote_path);
        spec.mode = config.data_connection_mode;
        spec.encrypt = config.data_protection == FtpDataProtection::Private;
        spec.restart_offset = start;
        let conn = self.open_transfer(&spec, user_data).await?;
        let mut stream = conn.stream;
        let mut wait_end_reply = conn.wait_end_reply;

        let mut resumed_at = None;
        loop {
            let outcome = self
                .receive_data(&mut stream, target, &mut pass, tracker)
                .await?;
            drop(stream);

            match outcome {
                FtpStreamOutcome::Completed => {
                    let success = self
                        .finish_transfer(wait_end_reply, &mut pass.keeper)
                        .await?;
                    target.flush().await.map_err(FtpTransferError::LocalIo)?;
                    if !success {
                        return Ok(FtpAttemptOutcome::Failed);
                    }
                    tracker.report_complete(pass.state.remote_position);
                    return Ok(FtpAttemptOutcome::Success);
                }
                FtpStreamOutcome::EarlySuccess => {
                    if wait_end_reply {
                        match self
                            .control
                            .abort_transfer(transfer_config.end_wait_timeout)
                            .await
                        {
                            Ok(_) => {}
                            Err(
                                e @ (FtpCommandError::Rejected(..)
                                | FtpCommandError::UnexpectedReplyCode(..)),
                            ) => warn!("abort of {remote_path} after early stop: {e}"),
                            Err(e) => return Err(e.into()),
                        }
                    }
                    self.finish_transfer(false, &mut pass.keeper).await?;
                    target.flush().await.map_err(FtpTransferError::LocalIo)?;
                    tracker.report_complete(pass.state.remote_position);
                    return Ok(FtpAttemptOutcome::EarlySuccess);
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
                    let resumable = is_resumable(&e);
                    if !resumable || resumed_at == Some(position) {
                        return Err(FtpTransferError::StreamFault {
                            position,
                            resumable,
                            source: e,
                        });
                    }

                    crate::log_msg!("resume download of {} at {}: {}", remote_path, position, e);
                    resumed_at = Some(position);
                    pass.discard = self.socks4_discard(position);
                    spec.restart_offset = position;
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

    /// Copy the data stream to the target, until the end or a fault.
    async fn receive_data<T, P>(
        &mut self,
        stream: &mut S,
        target: &mut T,
        pass: &mut FtpDownloadPass<'_>,
        tracker: &mut FtpProgressTracker<'_, P>,
    ) -> Result<FtpStreamOutcome, FtpCommandError>
    where
        T: FtpLocalTarget,
        P: FtpProgressSink + ?Sized,
    {
        loop {
            if pass.cancel.is_cancelled() {
                return Ok(FtpStreamOutcome::Cancelled);
            }

            let mut to_read = pass.buf.len();
            if let Some(stop) = pass.stop_position {
                let position = pass.state.remote_position;
                if position >= stop {
                    return Ok(FtpStreamOutcome::EarlySuccess);
                }
                let left = usize::try_from(stop - position).unwrap_or(usize::MAX);
                to_read = to_read.min(left.saturating_add(pass.discard));
            }
            if !pass.read_to_end && pass.state.reached_desired_length() {
                return Ok(FtpStreamOutcome::Completed);
            }

            let nr = match tokio::time::timeout(
                pass.read_timeout,
                stream.read(&mut pass.buf[..to_read]),
            )
            .await
            {
                Ok(Ok(0)) => {
                    return if pass.read_to_end {
                        Ok(FtpStreamOutcome::Completed)
                    } else {
                        Ok(FtpStreamOutcome::RemoteFault(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "data connection closed before the end of file",
                        )))
                    };
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Ok(FtpStreamOutcome::RemoteFault(e)),
                Err(_) => {
                    if pass
                        .total
                        .is_some_and(|total| pass.state.remote_position >= total)
                    {
                        debug!("read timed out after all data received");
                        return Ok(FtpStreamOutcome::Completed);
                    }
                    return Ok(FtpStreamOutcome::RemoteFault(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "read data timed out",
                    )));
                }
            };

            let mut data = &pass.buf[..nr];
            if pass.discard > 0 {
                let n = pass.discard.min(data.len());
                pass.discard -= n;
                data = &data[n..];
                if data.is_empty() {
                    continue;
                }
            }

            let len = data.len();
            if let Err(e) = target.write_all(data).await {
                return Ok(FtpStreamOutcome::LocalFault(e));
            }
            pass.state.advance(len);
            tracker.report(pass.state.remote_position, pass.total);

            self.keep_alive(&mut pass.keeper).await?;
            pass.limiter.limit(len).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use tokio_test::io::Builder;

    use crate::FtpClientConfig;
    use crate::connection::FtpProxyKind;
    use crate::feature::FtpHashAlgorithm;
    use crate::test_util::*;
    use crate::transfer::{FtpNoProgress, FtpProgress};

    const SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)), 21);

    fn pasv_config() -> FtpClientConfig {
        let mut config = FtpClientConfig::default();
        config.data_connection_mode = crate::FtpDataConnectionMode::Pasv;
        config
    }

    #[tokio::test]
    async fn download_whole_file() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 11\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"226 Transfer complete.\r\n")
            .build();
        let data = Builder::new().read(b"hello ").read(b"world").build();
        let mut client = test_client(control, MockProvider::new(vec![data]), pasv_config(), SERVER);

        let mut target = Cursor::new(Vec::new());
        let mut reports = Vec::new();
        let mut sink = |p: &FtpProgress<'_>| reports.push((p.position, p.progress));
        let status = client
            .download_to_stream(
                &mut target,
                "/a.bin",
                &FtpDownloadOptions::default(),
                &mut sink,
                &(),
            )
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Success);
        assert_eq!(target.get_ref(), b"hello world");
        assert_eq!(reports.last(), Some(&(11, 100.0)));
    }

    #[tokio::test]
    async fn skip_existing_local() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 3\r\n")
            .build();
        let provider = MockProvider::new(vec![]);
        let mut client = test_client(control, provider, pasv_config(), SERVER);

        let mut target = Cursor::new(b"abc".to_vec());
        let mut reports = Vec::new();
        let mut sink = |p: &FtpProgress<'_>| reports.push((p.progress, p.transferred_bytes));
        let options = FtpDownloadOptions {
            local_exists: FtpLocalExists::Skip,
            ..Default::default()
        };
        let status = client
            .download_to_stream(&mut target, "/a.bin", &options, &mut sink, &())
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Skipped);
        assert_eq!(reports, vec![(100.0, 0)]);
        assert!(client.conn_provider.connected_addrs().is_empty());
        assert_eq!(target.get_ref(), b"abc");
    }

    #[tokio::test]
    async fn resume_local_file() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 6\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"REST 3\r\n")
            .read(b"350 Restart position accepted (3).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"226 Transfer complete.\r\n")
            .build();
        let data = Builder::new().read(b"def").build();
        let mut client = test_client(control, MockProvider::new(vec![data]), pasv_config(), SERVER);

        let mut target = Cursor::new(b"abc".to_vec());
        let options = FtpDownloadOptions {
            local_exists: FtpLocalExists::Resume,
            ..Default::default()
        };
        let status = client
            .download_to_stream(&mut target, "/a.bin", &options, &mut FtpNoProgress, &())
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Success);
        assert_eq!(target.get_ref(), b"abcdef");
    }

    #[tokio::test]
    async fn resume_after_reset() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 10\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"426 Connection closed; transfer aborted.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,81).\r\n")
            .write(b"REST 4\r\n")
            .read(b"350 Restart position accepted (4).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"226 Transfer complete.\r\n")
            .build();
        let data1 = Builder::new()
            .read(b"0123")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let data2 = Builder::new().read(b"456").read(b"789").build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![data1, data2]),
            pasv_config(),
            SERVER,
        );

        let mut target = Cursor::new(Vec::new());
        let mut positions = Vec::new();
        let mut sink = |p: &FtpProgress<'_>| positions.push(p.position);
        let status = client
            .download_to_stream(
                &mut target,
                "/a.bin",
                &FtpDownloadOptions::default(),
                &mut sink,
                &(),
            )
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Success);
        assert_eq!(target.get_ref(), b"0123456789");
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(positions.last(), Some(&10));
        assert_eq!(client.conn_provider.connected_addrs().len(), 2);
    }

    #[tokio::test]
    async fn resume_failed() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 10\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"426 Connection closed; transfer aborted.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,81).\r\n")
            .write(b"REST 4\r\n")
            .read(b"502 REST not implemented.\r\n")
            .build();
        let data1 = Builder::new().read(b"0123").build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![data1, Builder::new().build()]),
            pasv_config(),
            SERVER,
        );

        let mut target = Cursor::new(Vec::new());
        let e = client
            .download_to_stream(
                &mut target,
                "/a.bin",
                &FtpDownloadOptions::default(),
                &mut FtpNoProgress,
                &(),
            )
            .await
            .unwrap_err();
        let FtpTransferError::ResumeFailed {
            position, original, ..
        } = &e
        else {
            panic!("unexpected error {e}");
        };
        assert_eq!(*position, 4);
        assert_eq!(original.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(e.rejected_reply().map(|r| r.code()), Some(502));
    }

    #[tokio::test]
    async fn stop_position() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 10\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .write(b"ABOR\r\n")
            .read(b"426 Connection closed; transfer aborted.\r\n")
            .read(b"226 Closing data connection.\r\n")
            .build();
        let data = Builder::new().read(b"01234").build();
        let mut client = test_client(control, MockProvider::new(vec![data]), pasv_config(), SERVER);

        let mut target = Cursor::new(Vec::new());
        let options = FtpDownloadOptions {
            stop_position: Some(5),
            ..Default::default()
        };
        let status = client
            .download_to_stream(&mut target, "/a.bin", &options, &mut FtpNoProgress, &())
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Success);
        assert_eq!(target.get_ref(), b"01234");
    }

    #[tokio::test]
    async fn stop_position_after_transfer_end() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 10\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"226 Transfer complete.\r\n")
            .write(b"ABOR\r\n")
            .read(b"225 No transfer to ABOR.\r\n")
            .write(b"SIZE /b.bin\r\n")
            .read(b"213 7\r\n")
            .build();
        let data = Builder::new().read(b"01234").build();
        let mut client = test_client(control, MockProvider::new(vec![data]), pasv_config(), SERVER);

        let mut target = Cursor::new(Vec::new());
        let options = FtpDownloadOptions {
            stop_position: Some(5),
            ..Default::default()
        };
        let status = client
            .download_to_stream(&mut target, "/a.bin", &options, &mut FtpNoProgress, &())
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Success);
        assert_eq!(target.get_ref(), b"01234");
        assert_eq!(client.get_file_size("/b.bin").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn failed_download_leaves_no_empty_file() {
        let control = Builder::new().build();
        let mut client = test_client(control, MockProvider::new(vec![]), pasv_config(), SERVER);

        let dir = std::env::temp_dir().join(format!("g3-ftp-download-{}", std::process::id()));
        let path = dir.join("empty.bin");
        let r = client
            .download_file(
                &path,
                "",
                &FtpDownloadOptions::default(),
                &mut FtpNoProgress,
                &(),
            )
            .await;
        assert!(matches!(r, Err(FtpTransferError::InvalidArgument(_))));
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 1000\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"226 Transfer complete.\r\n")
            .build();
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let data = Builder::new().read(&content).build();
        let mut config = pasv_config();
        config.transfer.download_rate_limit = 1000;
        let mut client = test_client(control, MockProvider::new(vec![data]), config, SERVER);

        let mut target = Cursor::new(Vec::new());
        let mut reports = Vec::new();
        let mut sink = |p: &FtpProgress<'_>| reports.push(p.position);
        let start = tokio::time::Instant::now();
        let status = client
            .download_to_stream(
                &mut target,
                "/a.bin",
                &FtpDownloadOptions::default(),
                &mut sink,
                &(),
            )
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(status, FtpTransferStatus::Success);
        assert_eq!(target.get_ref(), &content);
        // 1000 bytes at 1000 B/s in chunks small enough for the 100ms resolution
        assert!(elapsed >= Duration::from_millis(950), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1200), "{elapsed:?}");
        assert_eq!(reports[0], 64);
        assert_eq!(reports.last(), Some(&1000));
    }

    #[tokio::test]
    async fn server_reported_failure() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"550 No such file.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"451 Local error in processing.\r\n")
            .build();
        let data = Builder::new().read(b"abc").build();
        let mut client = test_client(control, MockProvider::new(vec![data]), pasv_config(), SERVER);

        let mut target = Cursor::new(Vec::new());
        let status = client
            .download_to_stream(
                &mut target,
                "/a.bin",
                &FtpDownloadOptions::default(),
                &mut FtpNoProgress,
                &(),
            )
            .await
            .unwrap();
        assert_eq!(status, FtpTransferStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 10\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"426 Connection closed; transfer aborted.\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![Builder::new().build()]),
            pasv_config(),
            SERVER,
        );

        let options = FtpDownloadOptions::default();
        options.cancel.cancel();
        let mut target = Cursor::new(Vec::new());
        let e = client
            .download_to_stream(&mut target, "/a.bin", &options, &mut FtpNoProgress, &())
            .await
            .unwrap_err();
        assert!(e.is_cancelled());
    }

    #[tokio::test]
    async fn socks4_discard() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 5\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"RETR /a.bin\r\n")
            .read(b"150 Opening BINARY mode data connection.\r\n")
            .read(b"226 Transfer complete.\r\n")
            .build();
        let data = Builder::new().read(b"\0\x5a\0\0\0\0").read(b"hello").build();
        let mut provider = MockProvider::new(vec![data]);
        provider.proxy = FtpProxyKind::Socks4;
        let mut client = test_client(control, provider, pasv_config(), SERVER);

        let mut target = Cursor::new(Vec::new());
        client
            .download_to_stream(
                &mut target,
                "/a.bin",
                &FtpDownloadOptions::default(),
                &mut FtpNoProgress,
                &(),
            )
            .await
            .unwrap();
        assert_eq!(target.get_ref(), b"hello");
    }

    /// A target whose checksum never matches the server one.
    struct BadTarget {
        inner: Cursor<Vec<u8>>,
        discarded: usize,
    }

    #[async_trait::async_trait]
    impl FtpLocalStream for BadTarget {
        async fn stream_len(&mut self) -> io::Result<u64> {
            self.inner.stream_len().await
        }

        async fn checksum(&mut self, _alg: FtpHashAlgorithm) -> io::Result<Option<String>> {
            Ok(Some("00".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl FtpLocalTarget for BadTarget {
        async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.inner.truncate_to(len).await
        }

        async fn discard(&mut self) -> io::Result<()> {
            self.discarded += 1;
            self.inner.discard().await
        }
    }

    impl AsyncWrite for BadTarget {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            std::pin::Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::pin::Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::pin::Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn retry_bound() {
        let mut control = Builder::new();
        control
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.bin\r\n")
            .read(b"213 3\r\n");
        let mut data = Vec::new();
        for port in [80u8, 81] {
            control
                .write(b"PASV\r\n")
                .read(format!("227 Entering Passive Mode (203,0,113,1,195,{port}).\r\n").as_bytes())
                .write(b"RETR /a.bin\r\n")
                .read(b"150 Opening BINARY mode data connection.\r\n")
                .read(b"226 Transfer complete.\r\n")
                .write(b"HASH /a.bin\r\n")
                .read(b"213 SHA-256 0-2 9F86D081 /a.bin\r\n");
            data.push(Builder::new().read(b"abc").build());
        }
        let control = control.build();

        let mut config = pasv_config();
        config.transfer.retry_attempts = 2;
        let mut client = test_client(control, MockProvider::new(data), config, SERVER);
        client.server_feature.parse_and_set("HASH SHA-256*");

        let mut target = BadTarget {
            inner: Cursor::new(Vec::new()),
            discarded: 0,
        };
        let options = FtpDownloadOptions {
            verify: FtpVerifyOptions::RETRY | FtpVerifyOptions::DELETE | FtpVerifyOptions::THROW,
            ..Default::default()
        };
        let e = client
            .download_to_stream(&mut target, "/a.bin", &options, &mut FtpNoProgress, &())
            .await
            .unwrap_err();
        assert!(matches!(e, FtpTransferError::Verification(_)));
        assert_eq!(target.discarded, 1);
        assert_eq!(client.conn_provider.connected_addrs().len(), 2);
    }
}
