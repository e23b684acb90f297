/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::{FtpControlChannel, FtpReply};
use crate::error::FtpRawResponseError;
use crate::io::LimitedBufReadExt;

fn parse_reply_code(line: &[u8]) -> Result<u16, FtpRawResponseError> {
    let mut code = 0u16;
    for c in &line[0..3] {
        if !c.is_ascii_digit() {
            return Err(FtpRawResponseError::InvalidReplyCode);
        }
        code = code * 10 + (*c - b'0') as u16;
    }
    if !(100..600).contains(&code) {
        return Err(FtpRawResponseError::InvalidReplyCode);
    }
    Ok(code)
}

fn line_text(line: &[u8]) -> Result<String, FtpRawResponseError> {
    let msg = std::str::from_utf8(line).map_err(|_| FtpRawResponseError::LineIsNotUtf8)?;
    Ok(msg.trim_end().to_string())
}

struct FtpMultiLineReplyParser {
    code: u16,
    end_prefix: [u8; 4],
    lines: Vec<String>,
}

impl FtpMultiLineReplyParser {
    fn new(line: &[u8], max_lines: usize) -> Result<Self, FtpRawResponseError> {
        let code = parse_reply_code(line)?;
        let end_prefix = [line[0], line[1], line[2], b' '];
        let mut lines = Vec::<String>::with_capacity(max_lines.min(16));
        lines.push(line_text(&line[4..])?);
        Ok(FtpMultiLineReplyParser {
            code,
            end_prefix,
            lines,
        })
    }

    fn feed_line(&mut self, line: &[u8]) -> Result<Option<FtpReply>, FtpRawResponseError> {
        if line.starts_with(&self.end_prefix) {
            let message = line_text(&line[4..])?;
            let info = std::mem::take(&mut self.lines);
            Ok(Some(FtpReply::new(self.code, message, info)))
        } else {
            // do not trim whitespace at beginning
            self.lines.push(line_text(line)?);
            Ok(None)
        }
    }
}

impl<T> FtpControlChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    async fn read_line(
        &mut self,
        buf: &mut Vec<u8>,
        min_len: usize,
    ) -> Result<(), FtpRawResponseError> {
        buf.clear();

        let (found, len) = self
            .stream
            .limited_read_until(b'\n', self.config.max_line_len, buf)
            .await
            .map_err(FtpRawResponseError::ReadFailed)?;
        if len == 0 {
            return Err(FtpRawResponseError::ConnectionClosed);
        }

        #[cfg(feature = "log-raw-io")]
        crate::debug::log_rsp(String::from_utf8_lossy(buf).trim_end());

        if len < min_len {
            Err(FtpRawResponseError::InvalidLineFormat)
        } else if !found {
            Err(FtpRawResponseError::LineTooLong)
        } else {
            Ok(())
        }
    }

    pub(super) async fn read_reply(&mut self) -> Result<FtpReply, FtpRawResponseError> {
        let mut buf = Vec::<u8>::with_capacity(self.config.max_line_len);
        // at least <code>\n
        self.read_line(&mut buf, 4).await?;

        match buf[3] {
            b' ' | b'\r' | b'\n' => {
                let code = parse_reply_code(&buf)?;
                let message = if buf.len() > 4 {
                    line_text(&buf[4..])?
                } else {
                    String::new()
                };
                Ok(FtpReply::new(code, message, Vec::new()))
            }
            b'-' => {
                let mut ml_parser = FtpMultiLineReplyParser::new(&buf, self.config.max_multi_lines)?;
                for _i in 0..self.config.max_multi_lines {
                    // at least "\n"
                    self.read_line(&mut buf, 1).await?;
                    if let Some(reply) = ml_parser.feed_line(&buf)? {
                        return Ok(reply);
                    }
                }
                Err(FtpRawResponseError::TooManyLines)
            }
            _ => Err(FtpRawResponseError::InvalidLineFormat),
        }
    }

    pub(super) async fn timed_read_reply(
        &mut self,
        stage: &'static str,
    ) -> Result<FtpReply, FtpRawResponseError> {
        let timeout = self.config.command_timeout;
        self.read_reply_within(timeout, stage).await
    }

    pub(crate) async fn read_reply_within(
        &mut self,
        timeout: Duration,
        stage: &'static str,
    ) -> Result<FtpReply, FtpRawResponseError> {
        match tokio::time::timeout(timeout, self.read_reply()).await {
            Ok(r) => r,
            Err(_) => Err(FtpRawResponseError::ReadResponseTimedOut(stage)),
        }
    }
}
