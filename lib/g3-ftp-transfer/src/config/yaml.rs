/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::ParseError;
use humanize_rs::bytes::Bytes;
use yaml_rust::{Yaml, yaml};

use super::{FtpClientConfig, FtpControlConfig, FtpTransferConfig};
use crate::data::{FtpDataConnectionMode, FtpDataProtection};
use crate::transfer::{FtpTransferType, FtpVerifyMethod};

fn foreach_kv<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        if let Yaml::String(key) = k {
            f(key, v).context(format!("failed to parse value of key {key}"))?;
        } else {
            return Err(anyhow!("key in hash should be string"));
        }
    }
    Ok(())
}

fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => Ok(usize::from_str(s)?),
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'usize' should be 'string' or 'integer'"
        )),
    }
}

fn as_u16(v: &Yaml) -> anyhow::Result<u16> {
    match v {
        Yaml::String(s) => Ok(u16::from_str(s)?),
        Yaml::Integer(i) => Ok(u16::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'u16' should be 'string' or 'integer'"
        )),
    }
}

fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Boolean(value) => Ok(*value),
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

fn as_str(v: &Yaml) -> anyhow::Result<&str> {
    match v {
        Yaml::String(s) => Ok(s.as_str()),
        _ => Err(anyhow!("yaml value type should be 'string'")),
    }
}

fn as_humanize_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(value) => {
            let v = value.parse::<Bytes>()?;
            Ok(v.size())
        }
        Yaml::Integer(value) => Ok(usize::try_from(*value)?),
        _ => Err(anyhow!(
            "yaml value type for humanize usize should be 'string' or 'integer'"
        )),
    }
}

fn as_humanize_u64(v: &Yaml) -> anyhow::Result<u64> {
    match v {
        Yaml::String(value) => {
            let v = value.parse::<Bytes<u64>>()?;
            Ok(v.size())
        }
        Yaml::Integer(value) => Ok(u64::try_from(*value)?),
        _ => Err(anyhow!(
            "yaml value type for humanize u64 should be 'string' or 'integer'"
        )),
    }
}

fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(v) => Ok(v),
            Err(ParseError::MissingUnit) => {
                let u = u64::from_str(value).map_err(|_| anyhow!("invalid duration string"))?;
                Ok(Duration::from_secs(u))
            }
            Err(e) => Err(anyhow!("invalid humanize duration string: {e}")),
        },
        Yaml::Integer(value) => {
            let u = u64::try_from(*value).map_err(|_| anyhow!("unsupported duration value"))?;
            Ok(Duration::from_secs(u))
        }
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string' or 'integer'"
        )),
    }
}

fn as_transfer_type(v: &Yaml) -> anyhow::Result<FtpTransferType> {
    let s = as_str(v)?;
    FtpTransferType::from_str(s).map_err(|_| anyhow!("invalid transfer type {s}"))
}

fn as_verify_method(v: &Yaml) -> anyhow::Result<FtpVerifyMethod> {
    match v {
        Yaml::String(s) => {
            FtpVerifyMethod::from_str(s).map_err(|_| anyhow!("invalid verify method {s}"))
        }
        Yaml::Array(seq) => {
            let mut method = FtpVerifyMethod::empty();
            for (i, v) in seq.iter().enumerate() {
                method |= as_verify_method(v).context(format!("invalid value for #{i}"))?;
            }
            Ok(method)
        }
        _ => Err(anyhow!(
            "yaml value type for verify method should be 'string' or 'array'"
        )),
    }
}

impl FtpControlConfig {
    pub fn parse_yaml(value: &Yaml) -> anyhow::Result<Self> {
        if let Yaml::Hash(map) = value {
            let mut config = FtpControlConfig::default();
            foreach_kv(map, |k, v| match normalize_key(k).as_str() {
                "max_line_len" | "max_line_length" => {
                    config.max_line_len = as_humanize_usize(v)
                        .context(format!("invalid humanize usize value for key {k}"))?;
                    Ok(())
                }
                "max_multi_lines" => {
                    config.max_multi_lines =
                        as_usize(v).context(format!("invalid usize value for key {k}"))?;
                    Ok(())
                }
                "command_timeout" => {
                    config.command_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                _ => Err(anyhow!("invalid key {k}")),
            })?;
            Ok(config)
        } else {
            Err(anyhow!("invalid yaml type"))
        }
    }
}

impl FtpTransferConfig {
    pub fn parse_yaml(value: &Yaml) -> anyhow::Result<Self> {
        if let Yaml::Hash(map) = value {
            let mut config = FtpTransferConfig::default();
            foreach_kv(map, |k, v| match normalize_key(k).as_str() {
                "list_max_line_len" | "list_max_line_length" => {
                    config.list_max_line_len = as_humanize_usize(v)
                        .context(format!("invalid humanize usize value for key {k}"))?;
                    Ok(())
                }
                "list_max_entries" => {
                    config.list_max_entries =
                        as_usize(v).context(format!("invalid usize value for key {k}"))?;
                    Ok(())
                }
                "list_all_timeout" => {
                    config.list_all_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "end_wait_timeout" => {
                    config.end_wait_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "chunk_size" => {
                    let size = as_humanize_usize(v)
                        .context(format!("invalid humanize usize value for key {k}"))?;
                    if size < super::MIN_CHUNK_SIZE {
                        return Err(anyhow!(
                            "chunk size should be at least {} bytes",
                            super::MIN_CHUNK_SIZE
                        ));
                    }
                    config.chunk_size = size;
                    Ok(())
                }
                "download_rate_limit" => {
                    config.download_rate_limit = as_humanize_u64(v)
                        .context(format!("invalid humanize u64 value for key {k}"))?;
                    Ok(())
                }
                "upload_rate_limit" => {
                    config.upload_rate_limit = as_humanize_u64(v)
                        .context(format!("invalid humanize u64 value for key {k}"))?;
                    Ok(())
                }
                "rate_control_resolution" => {
                    let resolution = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    if resolution.is_zero() {
                        return Err(anyhow!("rate control resolution should not be zero"));
                    }
                    config.rate_control_resolution = resolution;
                    Ok(())
                }
                "data_connect_timeout" => {
                    config.data_connect_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "data_read_timeout" => {
                    config.data_read_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "passive_blocked_ports" => {
                    config.passive_blocked_ports.clear();
                    match v {
                        Yaml::Array(seq) => {
                            for (i, v) in seq.iter().enumerate() {
                                let port = as_u16(v)
                                    .context(format!("invalid port value for {k}#{i}"))?;
                                config.passive_blocked_ports.push(port);
                            }
                        }
                        _ => {
                            let port = as_u16(v).context(format!("invalid port value for {k}"))?;
                            config.passive_blocked_ports.push(port);
                        }
                    }
                    Ok(())
                }
                "passive_max_attempts" => {
                    config.passive_max_attempts =
                        as_usize(v).context(format!("invalid usize value for key {k}"))?;
                    Ok(())
                }
                "noop_interval" => {
                    let interval = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    config.noop_interval = if interval.is_zero() {
                        None
                    } else {
                        Some(interval)
                    };
                    Ok(())
                }
                "retry_attempts" => {
                    config.retry_attempts =
                        as_usize(v).context(format!("invalid usize value for key {k}"))?;
                    Ok(())
                }
                "download_data_type" => {
                    config.download_data_type = as_transfer_type(v)
                        .context(format!("invalid transfer type value for key {k}"))?;
                    Ok(())
                }
                "upload_data_type" => {
                    config.upload_data_type = as_transfer_type(v)
                        .context(format!("invalid transfer type value for key {k}"))?;
                    Ok(())
                }
                "fxp_data_type" => {
                    config.fxp_data_type = as_transfer_type(v)
                        .context(format!("invalid transfer type value for key {k}"))?;
                    Ok(())
                }
                "fxp_progress_interval" => {
                    let interval = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    if interval.is_zero() {
                        return Err(anyhow!("fxp progress interval should not be zero"));
                    }
                    config.fxp_progress_interval = interval;
                    Ok(())
                }
                "fxp_read_timeout" => {
                    config.fxp_read_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "download_zero_byte_files" => {
                    config.download_zero_byte_files =
                        as_bool(v).context(format!("invalid bool value for key {k}"))?;
                    Ok(())
                }
                "verify_method" => {
                    config.verify_method = as_verify_method(v)
                        .context(format!("invalid verify method value for key {k}"))?;
                    Ok(())
                }
                _ => Err(anyhow!("invalid key {k}")),
            })?;
            Ok(config)
        } else {
            Err(anyhow!("invalid yaml type"))
        }
    }
}

impl FtpClientConfig {
    pub fn parse_yaml(value: &Yaml) -> anyhow::Result<Self> {
        if let Yaml::Hash(map) = value {
            let mut config = FtpClientConfig::default();
            foreach_kv(map, |k, v| match normalize_key(k).as_str() {
                "control" => {
                    config.control = FtpControlConfig::parse_yaml(v).context(format!(
                        "invalid ftp control connection config value for key {k}"
                    ))?;
                    Ok(())
                }
                "transfer" => {
                    config.transfer = FtpTransferConfig::parse_yaml(v).context(format!(
                        "invalid ftp transfer connection config value for key {k}"
                    ))?;
                    Ok(())
                }
                "connect_timeout" => {
                    config.connect_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "greeting_timeout" => {
                    config.greeting_timeout = as_duration(v)
                        .context(format!("invalid humanize duration value for key {k}"))?;
                    Ok(())
                }
                "data_connection_mode" | "data_connection_type" => {
                    let s = as_str(v)?;
                    config.data_connection_mode = FtpDataConnectionMode::from_str(s)
                        .map_err(|_| anyhow!("invalid data connection mode {s}"))?;
                    Ok(())
                }
                "data_protection" => {
                    config.data_protection = match v {
                        Yaml::Boolean(true) => FtpDataProtection::Private,
                        Yaml::Boolean(false) => FtpDataProtection::Clear,
                        _ => {
                            let s = as_str(v)?;
                            FtpDataProtection::from_str(s)
                                .map_err(|_| anyhow!("invalid data protection level {s}"))?
                        }
                    };
                    Ok(())
                }
                "active_external_ip" => {
                    let s = as_str(v)?;
                    let ip = s
                        .parse()
                        .map_err(|e| anyhow!("invalid ip address {s}: {e}"))?;
                    config.active_external_ip = Some(ip);
                    Ok(())
                }
                _ => Err(anyhow!("invalid key {k}")),
            })?;
            Ok(config)
        } else {
            Err(anyhow!("invalid yaml type"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yaml_rust::YamlLoader;

    fn yaml_doc(s: &str) -> Yaml {
        YamlLoader::load_from_str(s).unwrap().remove(0)
    }

    #[test]
    fn ftp_control_config_parse_ok() {
        let yaml = yaml_doc(
            r#"
                max_line_len: "2KB"
                max_multi_lines: 256
                command_timeout: "30s"
            "#,
        );
        let config = FtpControlConfig::parse_yaml(&yaml).unwrap();
        assert_eq!(config.max_line_len, 2000);
        assert_eq!(config.max_multi_lines, 256);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
    }

    #[test]
    fn ftp_control_config_parse_err() {
        let yaml = yaml_doc(
            r#"
                invalid_key: "value"
            "#,
        );
        assert!(FtpControlConfig::parse_yaml(&yaml).is_err());

        let yaml = yaml_doc(
            r#"
                max_multi_lines: -1
            "#,
        );
        assert!(FtpControlConfig::parse_yaml(&yaml).is_err());

        assert!(FtpControlConfig::parse_yaml(&Yaml::Integer(1)).is_err());
    }

    #[test]
    fn ftp_transfer_config_parse_ok() {
        let yaml = yaml_doc(
            r#"
                chunk_size: "32KiB"
                download_rate_limit: "1MiB"
                upload-rate-limit: 4096
                rate_control_resolution: "200ms"
                passive_blocked_ports: [21, 22]
                passive_max_attempts: 5
                noop_interval: "15s"
                retry_attempts: 5
                download_data_type: ascii
                fxp_progress_interval: "500ms"
                download_zero_byte_files: false
                verify_method: [size, date]
            "#,
        );
        let config = FtpTransferConfig::parse_yaml(&yaml).unwrap();
        assert_eq!(config.chunk_size, 32 * 1024);
        assert_eq!(config.download_rate_limit, 1024 * 1024);
        assert_eq!(config.upload_rate_limit, 4096);
        assert_eq!(config.rate_control_resolution, Duration::from_millis(200));
        assert_eq!(config.passive_blocked_ports, vec![21, 22]);
        assert_eq!(config.passive_max_attempts, 5);
        assert_eq!(config.noop_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.download_data_type, FtpTransferType::Ascii);
        assert_eq!(config.upload_data_type, FtpTransferType::Image);
        assert_eq!(config.fxp_progress_interval, Duration::from_millis(500));
        assert!(!config.download_zero_byte_files);
        assert_eq!(
            config.verify_method,
            FtpVerifyMethod::SIZE | FtpVerifyMethod::DATE
        );

        let yaml = yaml_doc(
            r#"
                noop_interval: 0
                verify_method: checksum
            "#,
        );
        let config = FtpTransferConfig::parse_yaml(&yaml).unwrap();
        assert_eq!(config.noop_interval, None);
        assert_eq!(config.verify_method, FtpVerifyMethod::CHECKSUM);
    }

    #[test]
    fn ftp_transfer_config_parse_err() {
        let yaml = yaml_doc(
            r#"
                chunk_size: 16
            "#,
        );
        assert!(FtpTransferConfig::parse_yaml(&yaml).is_err());

        let yaml = yaml_doc(
            r#"
                passive_blocked_ports: [70000]
            "#,
        );
        assert!(FtpTransferConfig::parse_yaml(&yaml).is_err());

        let yaml = yaml_doc(
            r#"
                verify_method: md5
            "#,
        );
        assert!(FtpTransferConfig::parse_yaml(&yaml).is_err());

        let yaml = yaml_doc(
            r#"
                rate_control_resolution: 0
            "#,
        );
        assert!(FtpTransferConfig::parse_yaml(&yaml).is_err());
    }

    #[test]
    fn ftp_client_config_parse_ok() {
        let yaml = yaml_doc(
            r#"
                control:
                  command_timeout: "15s"
                transfer:
                  end_wait_timeout: "1s"
                connect_timeout: "10s"
                greeting_timeout: "5s"
                data_connection_mode: epsv
                data_protection: true
                active_external_ip: "192.0.2.1"
            "#,
        );
        let config = FtpClientConfig::parse_yaml(&yaml).unwrap();
        assert_eq!(config.control.command_timeout, Duration::from_secs(15));
        assert_eq!(config.transfer.end_wait_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.greeting_timeout, Duration::from_secs(5));
        assert_eq!(config.data_connection_mode, FtpDataConnectionMode::Epsv);
        assert_eq!(config.data_protection, FtpDataProtection::Private);
        assert_eq!(
            config.active_external_ip,
            Some("192.0.2.1".parse().unwrap())
        );
    }

    #[test]
    fn ftp_client_config_parse_err() {
        let yaml = yaml_doc(
            r#"
                data_connection_mode: spsv
            "#,
        );
        assert!(FtpClientConfig::parse_yaml(&yaml).is_err());

        let yaml = yaml_doc(
            r#"
                active_external_ip: "not an ip"
            "#,
        );
        assert!(FtpClientConfig::parse_yaml(&yaml).is_err());

        let yaml = yaml_doc(
            r#"
                transfer: 1234
            "#,
        );
        assert!(FtpClientConfig::parse_yaml(&yaml).is_err());
    }
}
