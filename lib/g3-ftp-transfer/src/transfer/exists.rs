/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

/// What to do if the remote destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpRemoteExists {
    /// STOR without checking
    NoCheck,
    /// APPE from the current remote length without checking
    ResumeNoCheck,
    /// APPE the whole local file without checking
    AddToEndNoCheck,
    Skip,
    #[default]
    Overwrite,
    Resume,
    AddToEnd,
}

impl FtpRemoteExists {
    /// Continue from the length of the remote file.
    pub(crate) fn is_resume(&self) -> bool {
        matches!(
            self,
            FtpRemoteExists::Resume | FtpRemoteExists::ResumeNoCheck
        )
    }

    /// Append the whole source to the remote file.
    pub(crate) fn is_add_to_end(&self) -> bool {
        matches!(
            self,
            FtpRemoteExists::AddToEnd | FtpRemoteExists::AddToEndNoCheck
        )
    }

    /// Use the remote length without checking whether the file exists.
    pub(crate) fn skip_exists_check(&self) -> bool {
        matches!(
            self,
            FtpRemoteExists::NoCheck
                | FtpRemoteExists::ResumeNoCheck
                | FtpRemoteExists::AddToEndNoCheck
        )
    }
}

impl FromStr for FtpRemoteExists {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "nocheck" => Ok(FtpRemoteExists::NoCheck),
            "resumenocheck" => Ok(FtpRemoteExists::ResumeNoCheck),
            "addtoendnocheck" | "appendnocheck" => Ok(FtpRemoteExists::AddToEndNoCheck),
            "skip" => Ok(FtpRemoteExists::Skip),
            "overwrite" => Ok(FtpRemoteExists::Overwrite),
            "resume" => Ok(FtpRemoteExists::Resume),
            "addtoend" | "append" => Ok(FtpRemoteExists::AddToEnd),
            _ => Err(()),
        }
    }
}

/// What to do if the local destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpLocalExists {
    #[default]
    Overwrite,
    Resume,
    Skip,
}

impl FromStr for FtpLocalExists {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(FtpLocalExists::Overwrite),
            "resume" => Ok(FtpLocalExists::Resume),
            "skip" => Ok(FtpLocalExists::Skip),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(
            FtpRemoteExists::from_str("Resume_No-Check"),
            Ok(FtpRemoteExists::ResumeNoCheck)
        );
        assert_eq!(FtpRemoteExists::from_str("append"), Ok(FtpRemoteExists::AddToEnd));
        assert!(FtpRemoteExists::from_str("rename").is_err());
        assert_eq!(FtpLocalExists::from_str("SKIP"), Ok(FtpLocalExists::Skip));
        assert!(FtpRemoteExists::AddToEndNoCheck.is_add_to_end());
        assert!(FtpRemoteExists::ResumeNoCheck.is_resume());
        assert!(FtpRemoteExists::ResumeNoCheck.skip_exists_check());
        assert!(!FtpRemoteExists::Overwrite.is_resume());
    }
}
