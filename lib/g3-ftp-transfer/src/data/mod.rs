/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::str::FromStr;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::FtpConnectionProvider;
use crate::client::FtpClient;
use crate::control::{FtpCommand, FtpReply};
use crate::error::FtpDataConnectError;
use crate::transfer::FtpNoopKeeper;

mod addr;
pub(crate) use addr::{format_port_param, parse_pasv_reply};

mod active;
mod passive;

/// How the data connection is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpDataConnectionMode {
    /// EPSV, then PASV if EPSV is rejected on an ipv4 control connection
    #[default]
    AutoPassive,
    Pasv,
    /// PASV, but connect to the control server ip with the returned port
    PasvEx,
    Epsv,
    /// EPRT, then PORT if EPRT is rejected on an ipv4 control connection
    AutoActive,
    Port,
    Eprt,
}

impl FtpDataConnectionMode {
    pub fn is_passive(&self) -> bool {
        matches!(
            self,
            FtpDataConnectionMode::AutoPassive
                | FtpDataConnectionMode::Pasv
                | FtpDataConnectionMode::PasvEx
                | FtpDataConnectionMode::Epsv
        )
    }
}

impl FromStr for FtpDataConnectionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "autopassive" | "passive" => Ok(FtpDataConnectionMode::AutoPassive),
            "pasv" => Ok(FtpDataConnectionMode::Pasv),
            "pasvex" => Ok(FtpDataConnectionMode::PasvEx),
            "epsv" => Ok(FtpDataConnectionMode::Epsv),
            "autoactive" | "active" => Ok(FtpDataConnectionMode::AutoActive),
            "port" => Ok(FtpDataConnectionMode::Port),
            "eprt" => Ok(FtpDataConnectionMode::Eprt),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpDataProtection {
    #[default]
    Clear,
    /// TLS on the data connection, done by the connection provider
    Private,
}

impl FromStr for FtpDataProtection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "clear" => Ok(FtpDataProtection::Clear),
            "p" | "private" | "tls" => Ok(FtpDataProtection::Private),
            _ => Err(()),
        }
    }
}

/// Everything needed to open one data connection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FtpDataConnectionSpec<'a> {
    pub(crate) mode: FtpDataConnectionMode,
    pub(crate) restart_offset: u64,
    pub(crate) command: FtpCommand,
    pub(crate) path: &'a str,
    pub(crate) encrypt: bool,
}

impl<'a> FtpDataConnectionSpec<'a> {
    pub(crate) fn new(command: FtpCommand, path: &'a str) -> Self {
        FtpDataConnectionSpec {
            mode: FtpDataConnectionMode::default(),
            restart_offset: 0,
            command,
            path,
            encrypt: false,
        }
    }

    fn param(&self) -> Option<&'a str> {
        if self.path.is_empty() {
            None
        } else {
            Some(self.path)
        }
    }
}

/// A data connection that is ready for transfer.
pub(crate) struct FtpDataConnection<S> {
    pub(crate) stream: S,
    pub(crate) command: FtpCommand,
    /// whether the server will send a reply when the transfer ends
    pub(crate) wait_end_reply: bool,
}

pub(crate) enum FtpDataStart<S> {
    Ready(FtpDataConnection<S>),
    /// the server has nothing to list, no data connection is needed
    EmptyList(FtpReply),
}

fn is_benign_empty_list(cmd: FtpCommand, reply: &FtpReply) -> bool {
    cmd == FtpCommand::NLST
        && matches!(reply.code(), 450 | 550)
        && reply.message().to_ascii_lowercase().contains("no files")
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Open a data connection for a file transfer command.
    pub(crate) async fn open_transfer(
        &mut self,
        spec: &FtpDataConnectionSpec<'_>,
        user_data: &UD,
    ) -> Result<FtpDataConnection<S>, FtpDataConnectError> {
        match self.open_data_connection(spec, user_data).await? {
            FtpDataStart::Ready(conn) => Ok(conn),
            FtpDataStart::EmptyList(reply) => {
                Err(FtpDataConnectError::rejected(spec.command, reply))
            }
        }
    }

    /// Open a data connection and start the transfer command on it.
    pub(crate) async fn open_data_connection(
        &mut self,
        spec: &FtpDataConnectionSpec<'_>,
        user_data: &UD,
    ) -> Result<FtpDataStart<S>, FtpDataConnectError> {
        let passive_stream = if spec.mode.is_passive() {
            Some(self.connect_passive(spec, user_data).await?)
        } else {
            self.prepare_active(spec, user_data).await?;
            None
        };

        if spec.restart_offset > 0 {
            self.send_restart(spec).await?;
        }

        let reply = self.control.execute(spec.command, spec.param()).await?;
        let wait_end_reply = match reply.code() {
            100..=199 => true,
            200..=299 => false,
            _ => {
                if is_benign_empty_list(spec.command, &reply) {
                    debug!("empty name list: {reply}");
                    return Ok(FtpDataStart::EmptyList(reply));
                }
                return Err(FtpDataConnectError::rejected(spec.command, reply));
            }
        };

        let stream = match passive_stream {
            Some(stream) => stream,
            None => match self.accept_active(user_data).await {
                Ok(stream) => stream,
                Err(e) => {
                    self.drain_transfer_end(wait_end_reply, &mut FtpNoopKeeper::new(None))
                        .await;
                    return Err(e);
                }
            },
        };

        let stream = if spec.encrypt && !self.state.data_tls_failed() {
            match self
                .conn_provider
                .secure_data_connection(stream, user_data)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    self.state.mark_data_tls_failed();
                    self.drain_transfer_end(wait_end_reply, &mut FtpNoopKeeper::new(None))
                        .await;
                    return Err(FtpDataConnectError::TlsFailed(Box::new(e)));
                }
            }
        } else {
            stream
        };

        Ok(FtpDataStart::Ready(FtpDataConnection {
            stream,
            command: spec.command,
            wait_end_reply,
        }))
    }

    async fn send_restart(
        &mut self,
        spec: &FtpDataConnectionSpec<'_>,
    ) -> Result<(), FtpDataConnectError> {
        if self.conn_provider.proxy_kind().is_proxied() {
            // some proxies report the restart offset wrongly, so only restart
            // if there is something left to transfer
            match self.control.request_size(spec.path).await? {
                Some(size) if spec.restart_offset < size => {}
                _ => {
                    debug!(
                        "skip REST {} for {} through proxy",
                        spec.restart_offset, spec.path
                    );
                    return Ok(());
                }
            }
        }
        self.control.request_restart(spec.restart_offset).await?;
        Ok(())
    }
}
