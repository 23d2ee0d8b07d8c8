//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Daemon configuration.
//!
//! Options come from three places, later ones winning: the XML
//! configuration file, `option key=value` overrides, and the individual
//! command-line flags. Every option is addressable by its key through
//! [`Config::set_option`].

use std::path::{Path, PathBuf};

use nacre_datastore::xml;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogDestination {
    Syslog,
    Stderr,
    Stdout,
    File(PathBuf),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketFamily {
    Unix,
    Ipv4,
    Ipv6,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartupMode {
    None,
    Init,
    Running,
    Startup,
}

/// RFC 6241 compatibility variants of the commit engine: `candidate`
/// stages edits for an explicit commit, `set` commits edits to running
/// immediately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompatMode {
    Candidate,
    Set,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub debug_level: u8,
    pub log_destination: LogDestination,
    pub plugin_dir: PathBuf,
    pub yang_dirs: Vec<PathBuf>,
    pub yang_main_file: Option<PathBuf>,
    pub datastore_dir: PathBuf,
    pub socket_family: SocketFamily,
    pub socket_address: String,
    pub socket_group: String,
    pub pid_file: PathBuf,
    pub startup_mode: Option<StartupMode>,
    pub extra_xml: Option<PathBuf>,
    pub storage_plugin: String,
    pub compat_mode: CompatMode,
    pub pretty_store: bool,
}

// ===== impl LogDestination =====

impl LogDestination {
    /// Parses the `log-destination` option: `s`, `e`, `o` or `f<path>`.
    pub fn parse(value: &str) -> Result<LogDestination, String> {
        match value.split_at_checked(1) {
            Some(("s", "")) => Ok(LogDestination::Syslog),
            Some(("e", "")) => Ok(LogDestination::Stderr),
            Some(("o", "")) => Ok(LogDestination::Stdout),
            Some(("f", path)) if !path.is_empty() => {
                Ok(LogDestination::File(PathBuf::from(path)))
            }
            _ => Err(format!("invalid log destination '{value}'")),
        }
    }
}

// ===== impl SocketFamily =====

impl std::str::FromStr for SocketFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<SocketFamily, String> {
        match s {
            "UNIX" => Ok(SocketFamily::Unix),
            "IPv4" => Ok(SocketFamily::Ipv4),
            "IPv6" => Ok(SocketFamily::Ipv6),
            _ => Err(format!("invalid socket family '{s}'")),
        }
    }
}

// ===== impl StartupMode =====

impl std::str::FromStr for StartupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<StartupMode, String> {
        match s {
            "none" => Ok(StartupMode::None),
            "init" => Ok(StartupMode::Init),
            "running" => Ok(StartupMode::Running),
            "startup" => Ok(StartupMode::Startup),
            _ => Err(format!("invalid startup mode '{s}'")),
        }
    }
}

// ===== impl Config =====

impl Config {
    pub const DFLT_FILEPATH: &'static str = "/usr/local/etc/nacre.xml";

    /// Reads the XML configuration file. A missing default file falls back
    /// to the built-in defaults; an explicitly named file must exist.
    pub fn load(config_file: Option<&Path>) -> Result<Config, String> {
        let mut config = Config::default();
        let path =
            config_file.unwrap_or_else(|| Path::new(Config::DFLT_FILEPATH));

        if !path.exists() {
            if config_file.is_some() {
                return Err(format!(
                    "configuration file not found: {}",
                    path.display()
                ));
            }
            return Ok(config);
        }

        let data = std::fs::read(path).map_err(|error| {
            format!("failed to read {}: {error}", path.display())
        })?;
        let tree = xml::parse(&data).map_err(|error| {
            format!("failed to parse {}: {error}", path.display())
        })?;
        let Some(root) = tree.roots().next() else {
            return Ok(config);
        };
        for child in root.children() {
            let value = child.body().unwrap_or_default();
            config.set_option(child.name(), value)?;
        }
        Ok(config)
    }

    /// Applies one `key=value` option, overriding whatever was configured
    /// before.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "debug-level" => {
                self.debug_level = value
                    .parse()
                    .map_err(|_| format!("invalid debug level '{value}'"))?;
            }
            "log-destination" => {
                self.log_destination = LogDestination::parse(value)?;
            }
            "plugin-dir" => self.plugin_dir = PathBuf::from(value),
            "yang-dir" => self.yang_dirs.push(PathBuf::from(value)),
            "yang-main-file" => {
                self.yang_main_file = Some(PathBuf::from(value))
            }
            "datastore-dir" => self.datastore_dir = PathBuf::from(value),
            "socket-family" => self.socket_family = value.parse()?,
            "socket-address" => self.socket_address = value.to_owned(),
            "socket-group" => self.socket_group = value.to_owned(),
            "pid-file" => self.pid_file = PathBuf::from(value),
            "startup-mode" => self.startup_mode = Some(value.parse()?),
            "extra-xml" => self.extra_xml = Some(PathBuf::from(value)),
            "storage-plugin" => self.storage_plugin = value.to_owned(),
            "compat-mode" => {
                self.compat_mode = match value {
                    "candidate" => CompatMode::Candidate,
                    "set" => CompatMode::Set,
                    _ => {
                        return Err(format!(
                            "invalid compatibility mode '{value}'"
                        ));
                    }
                };
            }
            "pretty-store" => {
                self.pretty_store = value.parse().map_err(|_| {
                    format!("invalid boolean value '{value}'")
                })?;
            }
            _ => return Err(format!("unknown option '{key}'")),
        }
        Ok(())
    }

    pub fn module_state_path(&self) -> PathBuf {
        self.datastore_dir.join("modules-state.json")
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            debug_level: 0,
            log_destination: LogDestination::Stderr,
            plugin_dir: PathBuf::from("/usr/local/lib/nacre/backend"),
            yang_dirs: vec![PathBuf::from("/usr/local/share/nacre/yang")],
            yang_main_file: None,
            datastore_dir: PathBuf::from("/usr/local/var/nacre"),
            socket_family: SocketFamily::Unix,
            socket_address: "/usr/local/var/nacre/nacred.sock".to_owned(),
            socket_group: "nacre".to_owned(),
            pid_file: PathBuf::from("/usr/local/var/nacre/nacred.pid"),
            startup_mode: None,
            extra_xml: None,
            storage_plugin: "xml".to_owned(),
            compat_mode: CompatMode::Candidate,
            pretty_store: true,
        }
    }
}
