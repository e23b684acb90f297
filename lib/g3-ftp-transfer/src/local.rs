/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::feature::FtpHashAlgorithm;

/// The local side of a transfer.
#[async_trait]
pub trait FtpLocalStream: Send {
    async fn stream_len(&mut self) -> io::Result<u64>;

    async fn modified(&mut self) -> io::Result<Option<DateTime<Utc>>> {
        Ok(None)
    }

    /// The hex checksum of the whole stream, if it can be calculated with `alg`.
    async fn checksum(&mut self, _alg: FtpHashAlgorithm) -> io::Result<Option<String>> {
        Ok(None)
    }
}

#[async_trait]
pub trait FtpLocalSource: FtpLocalStream + AsyncRead + Unpin {
    /// Move the read position, return false if seeking is not supported.
    async fn seek_to(&mut self, position: u64) -> io::Result<bool>;
}

#[async_trait]
pub trait FtpLocalTarget: FtpLocalStream + AsyncWrite + Unpin {
    /// Cut the stream to `len` bytes, and continue writing from there.
    async fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    /// Throw away what has been written, used when the result failed verification.
    async fn discard(&mut self) -> io::Result<()>;

    /// Keep the modification time of the remote file.
    async fn set_modified(&mut self, _time: DateTime<Utc>) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FtpLocalStream for Cursor<Vec<u8>> {
    async fn stream_len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

#[async_trait]
impl FtpLocalSource for Cursor<Vec<u8>> {
    async fn seek_to(&mut self, position: u64) -> io::Result<bool> {
        self.set_position(position);
        Ok(true)
    }
}

#[async_trait]
impl FtpLocalTarget for Cursor<Vec<u8>> {
    async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| io::Error::other("length out of range"))?;
        self.get_mut().truncate(len);
        self.set_position(len as u64);
        Ok(())
    }

    async fn discard(&mut self) -> io::Result<()> {
        self.get_mut().clear();
        self.set_position(0);
        Ok(())
    }
}

/// A file on the local filesystem.
pub struct FtpLocalFile {
    path: PathBuf,
    file: File,
}

impl FtpLocalFile {
    pub async fn open_read<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(FtpLocalFile { path, file })
    }

    /// Open for writing, the parent directories are created if missing.
    ///
    /// Existing content is kept until [`FtpLocalTarget::truncate_to`] is called.
    pub async fn open_write<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        Ok(FtpLocalFile { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsyncRead for FtpLocalFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncWrite for FtpLocalFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait]
impl FtpLocalStream for FtpLocalFile {
    async fn stream_len(&mut self) -> io::Result<u64> {
        let meta = self.file.metadata().await?;
        Ok(meta.len())
    }

    async fn modified(&mut self) -> io::Result<Option<DateTime<Utc>>> {
        let meta = self.file.metadata().await?;
        Ok(meta.modified().ok().map(DateTime::<Utc>::from))
    }
}

#[async_trait]
impl FtpLocalSource for FtpLocalFile {
    async fn seek_to(&mut self, position: u64) -> io::Result<bool> {
        self.file.seek(SeekFrom::Start(position)).await?;
        Ok(true)
    }
}

#[async_trait]
impl FtpLocalTarget for FtpLocalFile {
    async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len).await?;
        self.file.seek(SeekFrom::Start(len)).await?;
        Ok(())
    }

    async fn discard(&mut self) -> io::Result<()> {
        self.file.set_len(0).await?;
        tokio::fs::remove_file(&self.path).await
    }

    async fn set_modified(&mut self, time: DateTime<Utc>) -> io::Result<()> {
        self.file.flush().await?;
        let file = self.file.try_clone().await?.into_std().await;
        tokio::task::spawn_blocking(move || file.set_modified(SystemTime::from(time)))
            .await
            .map_err(io::Error::other)?
    }
}
