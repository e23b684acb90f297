/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::net::{IpAddr, SocketAddr};

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::addr::{is_non_routable, parse_epsv_reply, parse_pasv_reply};
use super::{FtpDataConnectionMode, FtpDataConnectionSpec};
use crate::FtpConnectionProvider;
use crate::client::FtpClient;
use crate::control::{FtpCommand, FtpReply};
use crate::error::FtpDataConnectError;

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    pub(super) async fn connect_passive(
        &mut self,
        spec: &FtpDataConnectionSpec<'_>,
        user_data: &UD,
    ) -> Result<S, FtpDataConnectError> {
        let max_attempts = self.config.transfer.passive_max_attempts.max(1);
        let mut attempts = 0;
        let addr = loop {
            let addr = self.request_passive_addr(spec).await?;
            if !self
                .config
                .transfer
                .passive_blocked_ports
                .contains(&addr.port())
            {
                break addr;
            }

            attempts += 1;
            if attempts >= max_attempts {
                return Err(FtpDataConnectError::PortExhausted(attempts));
            }
            debug!("passive port {} is blocked, try again", addr.port());
        };

        let timeout = self.config.transfer.data_connect_timeout;
        match tokio::time::timeout(
            timeout,
            self.conn_provider.new_data_connection(&addr, user_data),
        )
        .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(FtpDataConnectError::ConnectFailed(addr, Box::new(e))),
            Err(_) => Err(FtpDataConnectError::ConnectTimeout(addr)),
        }
    }

    async fn request_passive_addr(
        &mut self,
        spec: &FtpDataConnectionSpec<'_>,
    ) -> Result<SocketAddr, FtpDataConnectError> {
        let mode = spec.mode;
        if matches!(
            mode,
            FtpDataConnectionMode::Epsv | FtpDataConnectionMode::AutoPassive
        ) && !self.state.epsv_unsupported()
        {
            let cmd = FtpCommand::EPSV;
            let reply = self.control.execute(cmd, None).await?;
            if reply.is_success() {
                return self.parse_epsv_addr(reply);
            }

            if reply.is_negative()
                && mode == FtpDataConnectionMode::AutoPassive
                && self.server.is_ipv4()
            {
                debug!("EPSV is not supported: {reply}, fallback to PASV");
                self.state.mark_epsv_unsupported();
            } else {
                return Err(FtpDataConnectError::rejected(cmd, reply));
            }
        }

        if !self.server.is_ipv4() {
            return Err(FtpDataConnectError::UnsupportedProtocol(FtpCommand::PASV));
        }

        if self.server_feature.support_pre_transfer()
            && !self.control.pre_transfer(spec.command, spec.path).await?
        {
            debug!("PRET {} {} is not accepted", spec.command, spec.path);
        }

        let cmd = FtpCommand::PASV;
        let reply = self.control.execute(cmd, None).await?;
        if !reply.is_success() {
            return Err(FtpDataConnectError::rejected(cmd, reply));
        }
        self.parse_pasv_addr(cmd, mode, reply)
    }

    fn parse_epsv_addr(&self, reply: FtpReply) -> Result<SocketAddr, FtpDataConnectError> {
        match parse_epsv_reply(reply.message()) {
            Some(port) => Ok(SocketAddr::new(self.server.ip(), port)),
            // some servers send a PASV reply to EPSV
            None => self.parse_pasv_addr(
                FtpCommand::EPSV,
                FtpDataConnectionMode::AutoPassive,
                reply,
            ),
        }
    }

    fn parse_pasv_addr(
        &self,
        cmd: FtpCommand,
        mode: FtpDataConnectionMode,
        reply: FtpReply,
    ) -> Result<SocketAddr, FtpDataConnectError> {
        let Some(addr) = parse_pasv_reply(reply.message()) else {
            return Err(FtpDataConnectError::MalformedServerResponse(cmd, reply));
        };

        let ip = if mode == FtpDataConnectionMode::PasvEx {
            self.server.ip()
        } else if !self.conn_provider.proxy_kind().is_proxied() && is_non_routable(*addr.ip()) {
            debug!(
                "server replied non-routable address {}, use {} instead",
                addr.ip(),
                self.server.ip()
            );
            self.server.ip()
        } else {
            IpAddr::V4(*addr.ip())
        };
        Ok(SocketAddr::new(ip, addr.port()))
    }
}
