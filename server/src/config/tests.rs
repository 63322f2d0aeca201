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

use super::{parse_from, ConfigError, ConfigurationSet};
use std::{env, fs};

fn no_env(_: &str) -> Option<String> {
    None
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_defaults() {
    let cfg = parse_from(&[], no_env).unwrap();
    assert_eq!(cfg, ConfigurationSet::default());
}

#[test]
fn test_cli_overrides() {
    let cfg = parse_from(
        &args(&["--host", "0.0.0.0", "--port", "2010", "--maxcon", "50", "--noart"]),
        no_env,
    )
    .unwrap();
    assert_eq!(cfg.host.to_string(), "0.0.0.0");
    assert_eq!(cfg.port, 2010);
    assert_eq!(cfg.maxcon, 50);
    assert!(cfg.noart);
}

#[test]
fn test_env_layer() {
    let cfg = parse_from(&[], |key| match key {
        "ARBORD_PORT" => Some("2222".to_owned()),
        "ARBORD_NOART" => Some("true".to_owned()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.port, 2222);
    assert!(cfg.noart);
}

#[test]
fn test_cli_beats_env() {
    let cfg = parse_from(&args(&["--port", "2333"]), |key| match key {
        "ARBORD_PORT" => Some("2222".to_owned()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.port, 2333);
}

#[test]
fn test_file_layer_is_weakest() {
    let path = env::temp_dir().join(format!("arbord-cfgtest-{}.yaml", std::process::id()));
    fs::write(&path, "host: 0.0.0.0\nport: 3000\nnoart: true\n").unwrap();
    let cfg = parse_from(
        &args(&["--config", path.to_str().unwrap(), "--port", "3001"]),
        no_env,
    )
    .unwrap();
    assert_eq!(cfg.host.to_string(), "0.0.0.0");
    // the CLI layer overrides the file
    assert_eq!(cfg.port, 3001);
    assert!(cfg.noart);
    fs::remove_file(path).unwrap();
}

#[test]
fn test_bad_values_are_rejected() {
    assert!(matches!(
        parse_from(&args(&["--port", "not-a-port"]), no_env),
        Err(ConfigError::BadValue("--port", _))
    ));
    assert!(matches!(
        parse_from(&[], |key| (key == "ARBORD_HOST").then(|| "nowhere".to_owned())),
        Err(ConfigError::BadValue("ARBORD_HOST", _))
    ));
}

#[test]
fn test_unknown_and_dangling_flags() {
    assert!(matches!(
        parse_from(&args(&["--frobnicate"]), no_env),
        Err(ConfigError::UnknownFlag(_))
    ));
    assert!(matches!(
        parse_from(&args(&["--port"]), no_env),
        Err(ConfigError::MissingValue(_))
    ));
}

#[test]
fn test_connection_limit_bounds() {
    assert!(matches!(
        parse_from(&args(&["--maxcon", "0"]), no_env),
        Err(ConfigError::BadConnectionLimit(0))
    ));
    assert!(matches!(
        parse_from(&args(&["--maxcon", "50001"]), no_env),
        Err(ConfigError::BadConnectionLimit(50001))
    ));
    assert!(parse_from(&args(&["--maxcon", "50000"]), no_env).is_ok());
}

#[test]
fn test_missing_config_file() {
    assert!(matches!(
        parse_from(&args(&["--config", "/definitely/not/here.yaml"]), no_env),
        Err(ConfigError::ConfigFileIoError(_, _))
    ));
}
