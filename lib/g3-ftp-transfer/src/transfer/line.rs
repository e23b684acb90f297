/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufStream};

use crate::config::FtpTransferConfig;
use crate::error::FtpLineDataReadError;
use crate::io::LimitedBufReadExt;

#[async_trait]
pub trait FtpLineDataReceiver: Send {
    async fn recv_line(&mut self, line: &str);
    fn should_return_early(&self) -> bool;
}

#[async_trait]
impl FtpLineDataReceiver for Vec<String> {
    async fn recv_line(&mut self, line: &str) {
        self.push(line.to_string());
    }

    fn should_return_early(&self) -> bool {
        false
    }
}

pub(crate) struct FtpLineDataTransfer<T: AsyncRead + AsyncWrite> {
    io: BufStream<T>,
    read_lines: usize,
    max_lines: usize,
    max_line_len: usize,
    line_buf: Vec<u8>,
    discard: usize,
}

impl<T> FtpLineDataTransfer<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: T, config: &FtpTransferConfig) -> Self {
        FtpLineDataTransfer {
            io: BufStream::new(io),
            read_lines: 0,
            max_lines: config.list_max_entries,
            max_line_len: config.list_max_line_len,
            line_buf: Vec::with_capacity(config.list_max_line_len),
            discard: 0,
        }
    }

    /// Skip the first `n` bytes of the stream.
    pub(crate) fn discard_leading(&mut self, n: usize) {
        self.discard = n;
    }

    async fn skip_discard(&mut self) -> Result<(), FtpLineDataReadError> {
        while self.discard > 0 {
            let buf = self.io.fill_buf().await?;
            if buf.is_empty() {
                break;
            }
            let n = buf.len().min(self.discard);
            self.io.consume(n);
            self.discard -= n;
        }
        Ok(())
    }

    async fn send_buf_to_receiver<R>(
        &mut self,
        receiver: &mut R,
    ) -> Result<(), FtpLineDataReadError>
    where
        R: FtpLineDataReceiver + ?Sized,
    {
        let line = std::str::from_utf8(&self.line_buf)
            .map_err(|_| FtpLineDataReadError::UnsupportedEncoding)?;
        receiver
            .recv_line(line.trim_end_matches(['\r', '\n']))
            .await;
        self.read_lines += 1;
        self.line_buf.clear();
        if receiver.should_return_early() {
            return Err(FtpLineDataReadError::AbortedByCallback);
        }
        Ok(())
    }

    pub(crate) async fn read_to_end<R>(
        mut self,
        receiver: &mut R,
    ) -> Result<(), FtpLineDataReadError>
    where
        R: FtpLineDataReceiver + ?Sized,
    {
        self.skip_discard().await?;

        while self.read_lines < self.max_lines {
            let (found, nr) = self
                .io
                .limited_read_until(b'\n', self.max_line_len, &mut self.line_buf)
                .await?;
            if nr == 0 {
                if !self.line_buf.is_empty() {
                    // last line without the line ending
                    self.send_buf_to_receiver(receiver).await?;
                }
                return Ok(());
            }

            if !found {
                if self.line_buf.len() >= self.max_line_len {
                    return Err(FtpLineDataReadError::LineTooLong(self.read_lines + 1));
                }
                continue;
            }

            self.send_buf_to_receiver(receiver).await?;
        }

        if self.io.fill_wait_data().await? {
            Err(FtpLineDataReadError::TooManyLines)
        } else {
            Ok(())
        }
    }
}
