/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};

use crate::FtpControlConfig;
use crate::error::{FtpAuthStatus, FtpCommandError, FtpRawResponseError};
use crate::feature::{FtpHashAlgorithm, FtpServerFeature};
use crate::io::LimitedBufReadExt;
use crate::transfer::FtpTransferType;

mod command;
pub use command::FtpCommand;

mod reply;
pub use reply::{FtpReply, FtpReplyType};

mod response;
mod time_val;

pub(crate) struct FtpControlChannel<T>
where
    T: AsyncRead + AsyncWrite,
{
    config: FtpControlConfig,
    stream: BufStream<T>,
}

impl<T> FtpControlChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: T, config: FtpControlConfig) -> Self {
        FtpControlChannel {
            config,
            stream: BufStream::new(stream),
        }
    }

    /// Wait until there is reply data to read. This is cancel safe.
    pub(crate) async fn wait_read_ready(&mut self) -> Result<(), FtpRawResponseError> {
        match self.stream.fill_wait_data().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(FtpRawResponseError::ConnectionClosed),
            Err(e) => Err(FtpRawResponseError::ReadFailed(e)),
        }
    }

    pub(crate) async fn wait_greetings(&mut self) -> Result<(), FtpCommandError> {
        loop {
            let reply = self.read_reply().await?;
            return match reply.code() {
                120 => continue,
                220 => Ok(()),
                421 => Err(FtpCommandError::ServiceNotAvailable),
                n => Err(FtpCommandError::UnexpectedReplyCode(
                    FtpCommand::GREETING,
                    n,
                )),
            };
        }
    }

    pub(crate) async fn check_server_feature(
        &mut self,
    ) -> Result<FtpServerFeature, FtpCommandError> {
        let mut feature = FtpServerFeature::default();

        let cmd = FtpCommand::FEAT;
        self.send_cmd(cmd)
            .await
            .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("check server feature").await?;
        match reply.code() {
            500 | 501 | 502 => {}
            211 => {
                for line in reply.info_lines().iter().skip(1) {
                    if !line.starts_with(' ') {
                        break;
                    }
                    feature.parse_and_set(line.trim());
                }
            }
            421 => return Err(FtpCommandError::ServiceNotAvailable),
            n => return Err(FtpCommandError::UnexpectedReplyCode(cmd, n)),
        }

        Ok(feature)
    }

    pub(crate) async fn set_use_utf8(&mut self) -> Result<bool, FtpCommandError> {
        let cmd = FtpCommand::OPTS_UTF8_ON;
        self.send_cmd(cmd)
            .await
            .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("set use utf8").await?;
        match reply.code() {
            500 | 501 | 502 => Ok(false),
            200 => Ok(true),
            421 => Err(FtpCommandError::ServiceNotAvailable),
            n => Err(FtpCommandError::UnexpectedReplyCode(cmd, n)),
        }
    }

    pub(crate) async fn send_username(
        &mut self,
        name: Option<&str>,
    ) -> Result<FtpAuthStatus, FtpCommandError> {
        let cmd = FtpCommand::USER;
        let username = name.unwrap_or("anonymous");
        self.send_cmd1(cmd, username)
            .await
            .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("send username").await?;
        match reply.code() {
            530 => Ok(FtpAuthStatus::NotLoggedIn),
            230 => Ok(FtpAuthStatus::LoggedIn),
            331 => Ok(FtpAuthStatus::NeedPassword),
            332 => Ok(FtpAuthStatus::NeedAccount),
            421 => Err(FtpCommandError::ServiceNotAvailable),
            _ => Err(FtpCommandError::Rejected(cmd, reply)),
        }
    }

    pub(crate) async fn send_password(
        &mut self,
        pass: Option<&str>,
    ) -> Result<FtpAuthStatus, FtpCommandError> {
        let cmd = FtpCommand::PASS;
        let password = pass.unwrap_or("xxx");
        self.send_cmd1(cmd, password)
            .await
            .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("send password").await?;
        match reply.code() {
            530 => Ok(FtpAuthStatus::NotLoggedIn),
            202 | 230 => Ok(FtpAuthStatus::LoggedIn),
            332 => Ok(FtpAuthStatus::NeedAccount),
            421 => Err(FtpCommandError::ServiceNotAvailable),
            _ => Err(FtpCommandError::Rejected(cmd, reply)),
        }
    }

    pub(crate) async fn send_quit(&mut self) -> Result<(), FtpCommandError> {
        let cmd = FtpCommand::QUIT;
        self.send_cmd(cmd)
            .await
            .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("send quit").await?;
        match reply.code() {
            221 => Ok(()),
            n => Err(FtpCommandError::UnexpectedReplyCode(cmd, n)),
        }
    }

    /// Send a command and return whatever the server replies.
    pub(crate) async fn execute(
        &mut self,
        cmd: FtpCommand,
        param: Option<&str>,
    ) -> Result<FtpReply, FtpCommandError> {
        match param {
            Some(p) => self.send_cmd1(cmd, p).await,
            None => self.send_cmd(cmd).await,
        }
        .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("execute command").await?;
        Ok(reply)
    }

    /// Read the next reply, for commands whose reply will be sent later.
    pub(crate) async fn read_delayed_reply(
        &mut self,
        stage: &'static str,
    ) -> Result<FtpReply, FtpCommandError> {
        let reply = self.timed_read_reply(stage).await?;
        Ok(reply)
    }

    /// Send a NOOP without waiting for the reply.
    pub(crate) async fn send_noop(&mut self) -> Result<(), FtpCommandError> {
        self.send_cmd(FtpCommand::NOOP)
            .await
            .map_err(FtpCommandError::SendFailed)
    }

    pub(crate) async fn change_dir(&mut self, path: &str) -> Result<(), FtpCommandError> {
        let cmd = FtpCommand::CWD;
        let reply = self.execute(cmd, Some(path)).await?;
        match reply.code() {
            200 | 250 => Ok(()),
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    pub(crate) async fn delete_file(&mut self, path: &str) -> Result<(), FtpCommandError> {
        let cmd = FtpCommand::DELE;
        let reply = self.execute(cmd, Some(path)).await?;
        match reply.code() {
            200 | 250 => Ok(()),
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    /// Ok(None) is returned if the file is unavailable.
    pub(crate) async fn request_size(
        &mut self,
        path: &str,
    ) -> Result<Option<u64>, FtpCommandError> {
        if path.is_empty() {
            return Ok(None);
        }

        let cmd = FtpCommand::SIZE;
        let reply = self.execute(cmd, Some(path)).await?;
        match reply.code() {
            // SIZE is not allowed in ASCII mode by some servers
            550 if reply.message().to_ascii_lowercase().contains("ascii") => {
                Err(FtpCommandError::Rejected(cmd, reply))
            }
            550 => Ok(None),
            213 => {
                let size = u64::from_str(reply.message().trim())
                    .map_err(|_| FtpCommandError::InvalidReplySyntax(cmd, 213))?;
                Ok(Some(size))
            }
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    /// Ok(None) is returned if the file is unavailable.
    pub(crate) async fn request_mtime(
        &mut self,
        path: &str,
    ) -> Result<Option<DateTime<Utc>>, FtpCommandError> {
        let cmd = FtpCommand::MDTM;
        let reply = self.execute(cmd, Some(path)).await?;
        match reply.code() {
            550 => Ok(None),
            213 => {
                let mtime = time_val::parse_from_str(reply.message().trim())
                    .map_err(|_| FtpCommandError::InvalidReplySyntax(cmd, 213))?;
                Ok(Some(mtime))
            }
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    /// Get the checksum of the file, as calculated by the server with its selected algorithm.
    pub(crate) async fn request_hash(
        &mut self,
        path: &str,
    ) -> Result<Option<(FtpHashAlgorithm, String)>, FtpCommandError> {
        let cmd = FtpCommand::HASH;
        let reply = self.execute(cmd, Some(path)).await?;
        match reply.code() {
            550 => Ok(None),
            213 => {
                // <algorithm> <range> <hash> <path>
                let mut iter = reply.message().split_ascii_whitespace();
                let alg = iter
                    .next()
                    .and_then(|s| FtpHashAlgorithm::from_str(s).ok())
                    .ok_or(FtpCommandError::InvalidReplySyntax(cmd, 213))?;
                let hash = iter
                    .nth(1)
                    .ok_or(FtpCommandError::InvalidReplySyntax(cmd, 213))?;
                Ok(Some((alg, hash.to_string())))
            }
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    /// Select the algorithm to be used by HASH.
    pub(crate) async fn select_hash(
        &mut self,
        alg: FtpHashAlgorithm,
    ) -> Result<(), FtpCommandError> {
        let cmd = FtpCommand::OPTS_HASH;
        let reply = self.execute(cmd, Some(alg.as_str())).await?;
        match reply.code() {
            200 => Ok(()),
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    /// Abort a transfer whose end reply has not been read yet.
    ///
    /// The transfer may have ended before ABOR reaches the server, so two
    /// replies are expected: the end reply of the transfer and the reply to
    /// ABOR. The second one is waited for within `second_reply_timeout`,
    /// unless the first one is 426, which must be followed by a 226.
    pub(crate) async fn abort_transfer(
        &mut self,
        second_reply_timeout: Duration,
    ) -> Result<(), FtpCommandError> {
        let cmd = FtpCommand::ABOR;
        let reply = self.execute(cmd, None).await?;
        let timeout = match reply.code() {
            426 => self.config.command_timeout,
            225 | 226 | 451 => second_reply_timeout,
            _ => return Err(FtpCommandError::from_reply(cmd, reply)),
        };

        match self.read_reply_within(timeout, "wait abort reply").await {
            Ok(second) => match second.code() {
                225 | 226 => Ok(()),
                // use 1xxx to represent the second one of reply code
                n => Err(FtpCommandError::UnexpectedReplyCode(cmd, 1000 + n)),
            },
            Err(FtpRawResponseError::ReadResponseTimedOut(_)) if reply.code() != 426 => {
                debug!("single reply to ABOR: {reply}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn request_transfer_type(
        &mut self,
        t: FtpTransferType,
    ) -> Result<(), FtpCommandError> {
        let cmd = match t {
            FtpTransferType::Ascii => FtpCommand::TYPE_A,
            FtpTransferType::Image => FtpCommand::TYPE_I,
        };
        let reply = self.execute(cmd, None).await?;
        match reply.code() {
            200 => Ok(()),
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }

    /// Send PRET, return whether the server accepted it.
    pub(crate) async fn pre_transfer(
        &mut self,
        cmd: FtpCommand,
        path: &str,
    ) -> Result<bool, FtpCommandError> {
        self.send_pre_transfer_cmd1(cmd, path)
            .await
            .map_err(FtpCommandError::SendFailed)?;

        let reply = self.timed_read_reply("wait pre transfer reply").await?;
        match reply.code() {
            200 => Ok(true),
            421 => Err(FtpCommandError::ServiceNotAvailable),
            _ => Ok(false),
        }
    }

    pub(crate) async fn request_restart(&mut self, position: u64) -> Result<(), FtpCommandError> {
        let cmd = FtpCommand::REST;
        let reply = self.execute(cmd, Some(&position.to_string())).await?;
        match reply.code() {
            350 => Ok(()),
            _ => Err(FtpCommandError::from_reply(cmd, reply)),
        }
    }
}
