/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::net::SocketAddr;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::addr::{format_eprt_param, format_port_param};
use super::{FtpDataConnectionMode, FtpDataConnectionSpec};
use crate::FtpConnectionProvider;
use crate::client::FtpClient;
use crate::control::FtpCommand;
use crate::error::FtpDataConnectError;

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Listen locally and tell the server where to connect.
    pub(super) async fn prepare_active(
        &mut self,
        spec: &FtpDataConnectionSpec<'_>,
        user_data: &UD,
    ) -> Result<(), FtpDataConnectError> {
        let listen_addr = self
            .conn_provider
            .listen_data_connection(user_data)
            .await
            .map_err(|e| FtpDataConnectError::ListenFailed(Box::new(e)))?;
        let ip = self.config.active_external_ip.unwrap_or(listen_addr.ip());
        let addr = SocketAddr::new(ip, listen_addr.port());

        let mode = spec.mode;
        if matches!(
            mode,
            FtpDataConnectionMode::Eprt | FtpDataConnectionMode::AutoActive
        ) {
            let cmd = FtpCommand::EPRT;
            let reply = self
                .control
                .execute(cmd, Some(&format_eprt_param(addr)))
                .await?;
            if reply.is_success() {
                return Ok(());
            }

            if reply.is_negative()
                && mode == FtpDataConnectionMode::AutoActive
                && self.server.is_ipv4()
            {
                debug!("EPRT is not supported: {reply}, fallback to PORT");
            } else {
                return Err(FtpDataConnectError::rejected(cmd, reply));
            }
        }

        let cmd = FtpCommand::PORT;
        let SocketAddr::V4(addr) = addr else {
            return Err(FtpDataConnectError::UnsupportedProtocol(cmd));
        };
        let reply = self
            .control
            .execute(cmd, Some(&format_port_param(addr)))
            .await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(FtpDataConnectError::rejected(cmd, reply))
        }
    }

    pub(super) async fn accept_active(&mut self, user_data: &UD) -> Result<S, FtpDataConnectError> {
        let timeout = self.config.transfer.data_connect_timeout;
        match tokio::time::timeout(
            timeout,
            self.conn_provider.accept_data_connection(user_data),
        )
        .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(FtpDataConnectError::AcceptFailed(Box::new(e))),
            Err(_) => Err(FtpDataConnectError::AcceptTimeout),
        }
    }
}
