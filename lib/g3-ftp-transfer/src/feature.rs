/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpHashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Md5,
    Crc,
}

impl FtpHashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            FtpHashAlgorithm::Sha1 => "SHA-1",
            FtpHashAlgorithm::Sha256 => "SHA-256",
            FtpHashAlgorithm::Sha512 => "SHA-512",
            FtpHashAlgorithm::Md5 => "MD5",
            FtpHashAlgorithm::Crc => "CRC",
        }
    }
}

impl fmt::Display for FtpHashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FtpHashAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHA-1" | "SHA1" => Ok(FtpHashAlgorithm::Sha1),
            "SHA-256" | "SHA256" => Ok(FtpHashAlgorithm::Sha256),
            "SHA-512" | "SHA512" => Ok(FtpHashAlgorithm::Sha512),
            "MD5" => Ok(FtpHashAlgorithm::Md5),
            "CRC" | "CRC32" => Ok(FtpHashAlgorithm::Crc),
            _ => Err(()),
        }
    }
}

/// The capability set of the server, as advertised in the FEAT reply.
#[derive(Debug, Clone, Default)]
pub struct FtpServerFeature {
    epsv: bool,
    pret: bool,
    size: bool,
    mdtm: bool,
    rest_stream: bool,
    utf8: bool,
    cpsv: bool,
    hash_algorithms: Vec<FtpHashAlgorithm>,
    hash_selected: Option<FtpHashAlgorithm>,
}

impl FtpServerFeature {
    pub(crate) fn parse_and_set(&mut self, line: &str) {
        let (name, params) = match memchr::memchr(b' ', line.as_bytes()) {
            Some(p) => (&line[..p], line[p + 1..].trim()),
            None => (line, ""),
        };

        match name.to_ascii_uppercase().as_str() {
            "EPSV" => self.epsv = true,
            "PRET" => self.pret = true,
            "SIZE" => self.size = true,
            "MDTM" => self.mdtm = true,
            "REST" => {
                if params.eq_ignore_ascii_case("STREAM") {
                    self.rest_stream = true;
                }
            }
            "UTF8" => self.utf8 = true,
            "CPSV" => self.cpsv = true,
            "HASH" => {
                for s in params.split(';') {
                    let (s, selected) = match s.strip_suffix('*') {
                        Some(s) => (s, true),
                        None => (s, false),
                    };
                    if let Ok(alg) = FtpHashAlgorithm::from_str(s.trim()) {
                        self.hash_algorithms.push(alg);
                        if selected {
                            self.hash_selected = Some(alg);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    #[inline]
    pub fn support_epsv(&self) -> bool {
        self.epsv
    }

    #[inline]
    pub fn support_pre_transfer(&self) -> bool {
        self.pret
    }

    #[inline]
    pub fn support_file_size(&self) -> bool {
        self.size
    }

    #[inline]
    pub fn support_file_mtime(&self) -> bool {
        self.mdtm
    }

    #[inline]
    pub fn support_rest_stream(&self) -> bool {
        self.rest_stream
    }

    #[inline]
    pub fn support_utf8_path(&self) -> bool {
        self.utf8
    }

    #[inline]
    pub fn support_cpsv(&self) -> bool {
        self.cpsv
    }

    pub fn hash_algorithms(&self) -> &[FtpHashAlgorithm] {
        &self.hash_algorithms
    }

    /// The algorithm the server will use for HASH, which is the marked one
    /// in the FEAT reply, or the first one listed.
    pub fn hash_algorithm(&self) -> Option<FtpHashAlgorithm> {
        self.hash_selected
            .or_else(|| self.hash_algorithms.first().copied())
    }

    pub(crate) fn set_hash_selected(&mut self, alg: FtpHashAlgorithm) {
        self.hash_selected = Some(alg);
    }

    /// The first algorithm supported by both servers, in the order of
    /// MD5, SHA-1, SHA-256, SHA-512 and CRC.
    pub fn common_hash_algorithm(&self, other: &FtpServerFeature) -> Option<FtpHashAlgorithm> {
        [
            FtpHashAlgorithm::Md5,
            FtpHashAlgorithm::Sha1,
            FtpHashAlgorithm::Sha256,
            FtpHashAlgorithm::Sha512,
            FtpHashAlgorithm::Crc,
        ]
        .into_iter()
        .find(|alg| self.hash_algorithms.contains(alg) && other.hash_algorithms.contains(alg))
    }
}
