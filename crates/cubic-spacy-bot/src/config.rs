use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "please provide a bot token with command line option '--token' or environment variable \
         'TELEGRAM_BOT_TOKEN'"
    )]
    MissingToken,
    #[error("webhook mode requires '--webhook-listen-address'")]
    MissingListenAddress,
    #[error("invalid tcp listen address `{0}`")]
    InvalidTcpAddress(String),
    #[error("invalid file mode `{0}` for webhook socket, expected octal such as 0660")]
    InvalidSocketMode(String),
    #[error("socket owner, group and mode only apply to the unix listen network")]
    PermissionsRequireUnix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListenNetwork {
    Tcp,
    Unix,
}

#[derive(Debug, Parser)]
#[command(name = "cubic-spacy-bot")]
#[command(version, about = "Telegram inline bot that spaces out, scrambles and mirrors your text")]
pub struct Args {
    /// Telegram bot API token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true, default_value = "")]
    pub token: String,
    /// Custom Telegram bot API URL
    #[arg(long, env = "TELEGRAM_BOT_URL")]
    pub url: Option<String>,
    /// Network for webhook listener
    #[arg(
        long,
        env = "TELEGRAM_BOT_WEBHOOK_LISTEN_NETWORK",
        value_enum,
        default_value_t = ListenNetwork::Tcp
    )]
    pub webhook_listen_network: ListenNetwork,
    /// Address for webhook listener (e.g., 127.0.0.1:8080, /run/cubic-spacy-bot.sock)
    #[arg(long, env = "TELEGRAM_BOT_WEBHOOK_LISTEN_ADDRESS")]
    pub webhook_listen_address: Option<String>,
    /// Owner for webhook unix domain socket (user name or uid)
    #[arg(long, env = "TELEGRAM_BOT_WEBHOOK_LISTEN_OWNER")]
    pub webhook_listen_owner: Option<String>,
    /// Group for webhook unix domain socket (group name or gid)
    #[arg(long, env = "TELEGRAM_BOT_WEBHOOK_LISTEN_GROUP")]
    pub webhook_listen_group: Option<String>,
    /// File mode for webhook unix domain socket (e.g., 0660)
    #[arg(long, env = "TELEGRAM_BOT_WEBHOOK_LISTEN_MODE")]
    pub webhook_listen_mode: Option<String>,
    /// Secret token for webhook authentication
    #[arg(long, env = "TELEGRAM_BOT_WEBHOOK_SECRET_TOKEN", hide_env_values = true)]
    pub webhook_secret_token: Option<String>,
    /// Webhook URL to set for the bot; long polling is used when empty
    #[arg(long, env = "TELEGRAM_BOT_WEBHOOK_URL")]
    pub webhook_url: Option<String>,
    /// Log filter directive, e.g. `debug` or `cubic_spacy_bot=debug,info`
    #[arg(long, default_value = "info")]
    pub log_level: String,
    /// Disable colors in log output
    #[arg(long, default_value_t = false)]
    pub log_no_color: bool,
    /// Disable timestamps in log output
    #[arg(long, default_value_t = false)]
    pub log_no_time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub color: bool,
    pub timestamps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketPermissions {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

impl SocketPermissions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub listen: ListenAddress,
    pub permissions: SocketPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Polling,
    Webhook(WebhookConfig),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub token: String,
    pub api_url: Option<String>,
    pub secret_token: Option<String>,
    pub mode: Mode,
    pub log: LogConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("secret_token", &self.secret_token.as_ref().map(|_| "<redacted>"))
            .field("mode", &self.mode)
            .field("log", &self.log)
            .finish()
    }
}

impl Config {
    /// URL registered with `setWebhook`. Empty in polling mode, which removes
    /// any webhook left over from an earlier deployment.
    #[must_use]
    pub fn webhook_url(&self) -> &str {
        match &self.mode {
            Mode::Polling => "",
            Mode::Webhook(webhook) => &webhook.url,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_tcp_address(address: &str) -> Result<SocketAddr, ConfigError> {
    // Accept the `:8080` shorthand for all interfaces.
    let normalized =
        if address.starts_with(':') { format!("0.0.0.0{address}") } else { address.to_string() };
    normalized.parse().map_err(|_| ConfigError::InvalidTcpAddress(address.to_string()))
}

fn parse_socket_mode(mode: &str) -> Result<u32, ConfigError> {
    match u32::from_str_radix(mode.trim_start_matches("0o"), 8) {
        Ok(bits) if bits <= 0o7777 => Ok(bits),
        _ => Err(ConfigError::InvalidSocketMode(mode.to_string())),
    }
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let token = args.token.trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let permissions = SocketPermissions {
            owner: non_empty(args.webhook_listen_owner),
            group: non_empty(args.webhook_listen_group),
            mode: non_empty(args.webhook_listen_mode)
                .map(|mode| parse_socket_mode(&mode))
                .transpose()?,
        };

        let mode = match non_empty(args.webhook_url) {
            None => Mode::Polling,
            Some(url) => {
                let address = non_empty(args.webhook_listen_address)
                    .ok_or(ConfigError::MissingListenAddress)?;
                let listen = match args.webhook_listen_network {
                    ListenNetwork::Tcp => {
                        if !permissions.is_empty() {
                            return Err(ConfigError::PermissionsRequireUnix);
                        }
                        ListenAddress::Tcp(parse_tcp_address(&address)?)
                    }
                    ListenNetwork::Unix => ListenAddress::Unix(PathBuf::from(address)),
                };
                Mode::Webhook(WebhookConfig { url, listen, permissions })
            }
        };

        Ok(Self {
            token,
            api_url: non_empty(args.url),
            secret_token: non_empty(args.webhook_secret_token),
            mode,
            log: LogConfig {
                level: args.log_level,
                color: !args.log_no_color,
                timestamps: !args.log_no_time,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["cubic-spacy-bot"];
        argv.extend_from_slice(args);
        let args = Args::try_parse_from(argv).unwrap_or_else(|err| panic!("clap rejected args: {err}"));
        Config::try_from(args)
    }

    #[test]
    fn token_only_selects_polling_mode() {
        let config = parse(&["--token", "123:abc"]).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(config.mode, Mode::Polling);
        assert_eq!(config.webhook_url(), "");
        assert_eq!(config.api_url, None);
        assert_eq!(
            config.log,
            LogConfig { level: "info".to_string(), color: true, timestamps: true }
        );
    }

    #[test]
    fn blank_token_is_rejected() {
        assert_eq!(parse(&["--token", "  "]), Err(ConfigError::MissingToken));
    }

    #[test]
    fn webhook_over_tcp_accepts_port_shorthand() {
        let config = parse(&[
            "--token",
            "123:abc",
            "--webhook-url",
            "https://example.com/cubic-spacy-bot",
            "--webhook-listen-address",
            ":8080",
        ])
        .unwrap_or_else(|err| panic!("{err}"));

        let Mode::Webhook(webhook) = config.mode else {
            panic!("expected webhook mode");
        };
        assert_eq!(webhook.url, "https://example.com/cubic-spacy-bot");
        assert_eq!(webhook.listen, ListenAddress::Tcp(SocketAddr::from(([0, 0, 0, 0], 8080))));
    }

    #[test]
    fn webhook_requires_listen_address() {
        assert_eq!(
            parse(&["--token", "t", "--webhook-url", "https://example.com/hook"]),
            Err(ConfigError::MissingListenAddress)
        );
    }

    #[test]
    fn unix_socket_permissions_are_parsed() {
        let config = parse(&[
            "--token",
            "t",
            "--webhook-url",
            "https://example.com/hook",
            "--webhook-listen-network",
            "unix",
            "--webhook-listen-address",
            "/run/cubic-spacy-bot.sock",
            "--webhook-listen-owner",
            "http",
            "--webhook-listen-group",
            "33",
            "--webhook-listen-mode",
            "0660",
        ])
        .unwrap_or_else(|err| panic!("{err}"));

        let Mode::Webhook(webhook) = config.mode else {
            panic!("expected webhook mode");
        };
        assert_eq!(webhook.listen, ListenAddress::Unix(PathBuf::from("/run/cubic-spacy-bot.sock")));
        assert_eq!(
            webhook.permissions,
            SocketPermissions {
                owner: Some("http".to_string()),
                group: Some("33".to_string()),
                mode: Some(0o660),
            }
        );
    }

    #[test]
    fn invalid_socket_mode_is_rejected() {
        assert_eq!(
            parse(&["--token", "t", "--webhook-listen-mode", "0999"]),
            Err(ConfigError::InvalidSocketMode("0999".to_string()))
        );
    }

    #[test]
    fn socket_permissions_on_tcp_are_rejected() {
        assert_eq!(
            parse(&[
                "--token",
                "t",
                "--webhook-url",
                "https://example.com/hook",
                "--webhook-listen-address",
                "127.0.0.1:8080",
                "--webhook-listen-mode",
                "0660",
            ]),
            Err(ConfigError::PermissionsRequireUnix)
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = parse(&["--token", "123:abc", "--webhook-secret-token", "hunter2"])
            .unwrap_or_else(|err| panic!("{err}"));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("123:abc"));
        assert!(!rendered.contains("hunter2"));
    }
}
