/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::FtpControlChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtpCommand(&'static str);

impl FtpCommand {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

macro_rules! ftp_commands {
    (
        $(
            $(#[$docs:meta])*
            ($konst:ident, $phrase:expr);
        )+
    ) => {
        impl FtpCommand {
        $(
            $(#[$docs])*
            pub const $konst: FtpCommand = FtpCommand($phrase);
        )+
        }
    };
}

ftp_commands! {
    /// a fake command for greeting
    (GREETING, "-");
    (FEAT, "FEAT");
    (OPTS_UTF8_ON, "OPTS UTF8 ON");
    (OPTS_HASH, "OPTS HASH");
    (USER, "USER");
    (PASS, "PASS");
    (QUIT, "QUIT");
    (CWD, "CWD");
    (NOOP, "NOOP");
    (DELE, "DELE");
    (TYPE_A, "TYPE A");
    (TYPE_I, "TYPE I");
    (PASV, "PASV");
    (CPSV, "CPSV");
    (EPSV, "EPSV");
    (PORT, "PORT");
    (EPRT, "EPRT");
    (SIZE, "SIZE");
    (MDTM, "MDTM");
    (HASH, "HASH");
    (ABOR, "ABOR");
    (PRET, "PRET");
    (LIST, "LIST");
    (NLST, "NLST");
    (MLSD, "MLSD");
    (REST, "REST");
    (RETR, "RETR");
    (STOR, "STOR");
    (APPE, "APPE");
}

impl<T> FtpControlChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    async fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        #[cfg(feature = "log-raw-io")]
        crate::debug::log_cmd(String::from_utf8_lossy(buf).trim_end());

        self.stream.write_all(buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub(super) async fn send_cmd(&mut self, cmd: FtpCommand) -> io::Result<()> {
        let len = cmd.0.len() + 2;
        let mut buf: Vec<u8> = Vec::with_capacity(len);
        buf.extend_from_slice(cmd.0.as_bytes());
        buf.extend_from_slice(b"\r\n");

        self.send_all(buf.as_ref()).await
    }

    pub(super) async fn send_cmd1(&mut self, cmd: FtpCommand, param1: &str) -> io::Result<()> {
        let len = cmd.0.len() + 1 + param1.len() + 2;
        let mut buf: Vec<u8> = Vec::with_capacity(len);
        buf.extend_from_slice(cmd.0.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(param1.as_bytes());
        buf.extend_from_slice(b"\r\n");

        self.send_all(buf.as_ref()).await
    }

    pub(super) async fn send_pre_transfer_cmd1(
        &mut self,
        cmd: FtpCommand,
        param1: &str,
    ) -> io::Result<()> {
        let len = 5 + cmd.0.len() + 1 + param1.len() + 2;
        let mut buf: Vec<u8> = Vec::with_capacity(len);
        buf.extend_from_slice(b"PRET ");
        buf.extend_from_slice(cmd.0.as_bytes());
        if !param1.is_empty() {
            buf.push(b' ');
            buf.extend_from_slice(param1.as_bytes());
        }
        buf.extend_from_slice(b"\r\n");

        self.send_all(buf.as_ref()).await
    }
}
