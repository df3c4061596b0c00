//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CONVERTER_BINARY: &str = "wkhtmltopdf";
const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCRATCH_DIR: &str = "/tmp/stampa-scratch";

/// Command-line arguments for the Stampa binary.
#[derive(Debug, Parser)]
#[command(name = "stampa", version, about = "Stampa HTML-to-PDF conversion server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Stampa HTTP service.
    Serve(ServeArgs),
    /// Convert a local markup file to PDF without starting the server.
    Convert(ConvertArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub overrides: ConverterOverrides,

    /// Path to the markup file to convert.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Path to the PDF file to write.
    #[arg(value_name = "OUTPUT", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ConverterOverrides {
    /// Override the converter executable path.
    #[arg(long = "converter-binary-path", value_name = "PATH")]
    pub binary_path: Option<PathBuf>,

    /// Override the converter timeout in seconds.
    #[arg(long = "converter-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Override the parent directory for per-request scratch space.
    #[arg(long = "converter-scratch-dir", value_name = "PATH")]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub converter: ConverterOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub converter: ConverterSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ConverterSettings {
    pub binary_path: PathBuf,
    pub timeout: Duration,
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("STAMPA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Convert(args)) => raw.apply_converter_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    converter: RawConverterSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_converter_overrides(&overrides.converter);
    }

    fn apply_converter_overrides(&mut self, overrides: &ConverterOverrides) {
        if let Some(path) = overrides.binary_path.as_ref() {
            self.converter.binary_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.converter.timeout_seconds = Some(seconds);
        }
        if let Some(dir) = overrides.scratch_dir.as_ref() {
            self.converter.scratch_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            converter,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let converter = build_converter_settings(converter)?;

        Ok(Self {
            server,
            logging,
            converter,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_converter_settings(
    converter: RawConverterSettings,
) -> Result<ConverterSettings, LoadError> {
    let binary_path = converter
        .binary_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERTER_BINARY));
    if binary_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "converter.binary_path",
            "path must not be empty",
        ));
    }

    let timeout_secs = converter
        .timeout_seconds
        .unwrap_or(DEFAULT_CONVERTER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "converter.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let scratch_dir = converter
        .scratch_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));
    if scratch_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "converter.scratch_dir",
            "path must not be empty",
        ));
    }

    Ok(ConverterSettings {
        binary_path,
        timeout: Duration::from_secs(timeout_secs),
        scratch_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConverterSettings {
    binary_path: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    scratch_dir: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_all_interfaces_on_8000() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.server.addr.to_string(), "0.0.0.0:8000");
        assert_eq!(
            settings.converter.binary_path,
            PathBuf::from(DEFAULT_CONVERTER_BINARY)
        );
        assert_eq!(settings.converter.timeout, Duration::from_secs(30));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn converter_overrides_apply_to_serve_and_convert() {
        let mut raw = RawSettings::default();
        let overrides = ConverterOverrides {
            binary_path: Some(PathBuf::from("/opt/wkhtmltopdf/bin/wkhtmltopdf")),
            timeout_seconds: Some(5),
            ..Default::default()
        };

        raw.apply_converter_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(
            settings.converter.binary_path,
            PathBuf::from("/opt/wkhtmltopdf/bin/wkhtmltopdf")
        );
        assert_eq!(settings.converter.timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut raw = RawSettings::default();
        raw.converter.timeout_seconds = Some(0);

        let err = Settings::from_raw(raw).expect_err("zero timeout must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "converter.timeout_seconds",
                ..
            }
        ));
    }

    #[test]
    fn empty_binary_path_is_rejected() {
        let mut raw = RawSettings::default();
        raw.converter.binary_path = Some(PathBuf::new());

        let err = Settings::from_raw(raw).expect_err("empty binary path must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "converter.binary_path",
                ..
            }
        ));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["stampa"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn parse_convert_arguments() {
        let args = CliArgs::parse_from([
            "stampa",
            "convert",
            "--converter-binary-path",
            "/usr/local/bin/wkhtmltopdf",
            "/tmp/page.html",
            "/tmp/page.pdf",
        ]);

        match args.command.expect("convert command") {
            Command::Convert(convert) => {
                assert_eq!(
                    convert.overrides.binary_path.as_deref(),
                    Some(std::path::Path::new("/usr/local/bin/wkhtmltopdf"))
                );
                assert_eq!(convert.input, std::path::Path::new("/tmp/page.html"));
                assert_eq!(convert.output, std::path::Path::new("/tmp/page.pdf"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "stampa",
            "serve",
            "--server-host",
            "127.0.0.1",
            "--converter-timeout-seconds",
            "10",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
                assert_eq!(serve.overrides.converter.timeout_seconds, Some(10));
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
