/*
 * Created on Sat May 17 2025
 *
 * This file is a part of ArborDB
 * ArborDB is a free and open-source in-memory key/value database written
 * by Sayan Nandan ("the Author") that serves a line-oriented command
 * protocol over a concurrently locked binary search tree
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Server configuration
//!
//! Settings are layered: built-in defaults, then the YAML config file (if
//! `--config` names one), then `ARBORD_*` environment variables, then CLI
//! flags. A later source always overrides an earlier one.

use {
    crate::dbnet::MAXIMUM_CONNECTION_LIMIT,
    serde::Deserialize,
    std::{
        fmt, fs,
        net::{IpAddr, Ipv4Addr},
        str::FromStr,
    },
};

#[cfg(test)]
mod tests;

// server defaults
const DEFAULT_IPV4: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
const DEFAULT_PORT: u16 = 2003;

/// The resolved settings the server runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSet {
    pub host: IpAddr,
    pub port: u16,
    pub maxcon: usize,
    pub noart: bool,
}

impl Default for ConfigurationSet {
    fn default() -> Self {
        Self {
            host: DEFAULT_IPV4,
            port: DEFAULT_PORT,
            maxcon: MAXIMUM_CONNECTION_LIMIT,
            noart: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ConfigFileIoError(String, std::io::Error),
    ConfigFileParseError(serde_yaml::Error),
    BadValue(&'static str, String),
    BadConnectionLimit(usize),
    UnknownFlag(String),
    MissingValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFileIoError(path, e) => {
                write!(f, "Failed to read the config file {path}: {e}")
            }
            Self::ConfigFileParseError(e) => write!(f, "Failed to parse the config file: {e}"),
            Self::BadValue(key, bad) => write!(f, "Bad value {bad:?} for `{key}`"),
            Self::BadConnectionLimit(got) => write!(
                f,
                "The connection limit must lie in 1..={MAXIMUM_CONNECTION_LIMIT} (got {got})"
            ),
            Self::UnknownFlag(flag) => write!(f, "Unknown flag {flag:?}"),
            Self::MissingValue(flag) => write!(f, "The flag {flag:?} expects a value"),
        }
    }
}

/// The on-disk layer
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    host: Option<IpAddr>,
    port: Option<u16>,
    maxcon: Option<usize>,
    noart: Option<bool>,
}

/// The CLI layer, as scanned (values still unparsed)
#[derive(Debug, Default)]
struct CliArgs {
    config: Option<String>,
    host: Option<String>,
    port: Option<String>,
    maxcon: Option<String>,
    noart: bool,
}

/// Resolve the full configuration from the process environment
pub fn get_config() -> Result<ConfigurationSet, ConfigError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_from(&args, |key| std::env::var(key).ok())
}

fn parse_from(
    args: &[String],
    getenv: impl Fn(&str) -> Option<String>,
) -> Result<ConfigurationSet, ConfigError> {
    let cli = scan_args(args)?;
    let mut cfg = ConfigurationSet::default();
    // file layer
    if let Some(path) = &cli.config {
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::ConfigFileIoError(path.clone(), e))?;
        let file: ConfigFile =
            serde_yaml::from_str(&raw).map_err(ConfigError::ConfigFileParseError)?;
        if let Some(host) = file.host {
            cfg.host = host;
        }
        if let Some(port) = file.port {
            cfg.port = port;
        }
        if let Some(maxcon) = file.maxcon {
            cfg.maxcon = maxcon;
        }
        if let Some(noart) = file.noart {
            cfg.noart = noart;
        }
    }
    // environment layer
    set_parsed(&mut cfg.host, "ARBORD_HOST", getenv("ARBORD_HOST"))?;
    set_parsed(&mut cfg.port, "ARBORD_PORT", getenv("ARBORD_PORT"))?;
    set_parsed(&mut cfg.maxcon, "ARBORD_MAXCON", getenv("ARBORD_MAXCON"))?;
    set_parsed(&mut cfg.noart, "ARBORD_NOART", getenv("ARBORD_NOART"))?;
    // CLI layer
    set_parsed(&mut cfg.host, "--host", cli.host)?;
    set_parsed(&mut cfg.port, "--port", cli.port)?;
    set_parsed(&mut cfg.maxcon, "--maxcon", cli.maxcon)?;
    cfg.noart |= cli.noart;
    if cfg.maxcon == 0 || cfg.maxcon > MAXIMUM_CONNECTION_LIMIT {
        return Err(ConfigError::BadConnectionLimit(cfg.maxcon));
    }
    Ok(cfg)
}

fn scan_args(args: &[String]) -> Result<CliArgs, ConfigError> {
    let mut out = CliArgs::default();
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => out.config = Some(value_of(arg, args.next())?),
            "--host" => out.host = Some(value_of(arg, args.next())?),
            "--port" => out.port = Some(value_of(arg, args.next())?),
            "--maxcon" => out.maxcon = Some(value_of(arg, args.next())?),
            "--noart" => out.noart = true,
            unknown => return Err(ConfigError::UnknownFlag(unknown.to_owned())),
        }
    }
    Ok(out)
}

fn value_of(flag: &str, value: Option<&String>) -> Result<String, ConfigError> {
    value
        .cloned()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_owned()))
}

fn set_parsed<T: FromStr>(
    target: &mut T,
    key: &'static str,
    source: Option<String>,
) -> Result<(), ConfigError> {
    if let Some(raw) = source {
        match raw.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => return Err(ConfigError::BadValue(key, raw)),
        }
    }
    Ok(())
}
