use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::error::{Result, SessionError};

const DEFAULT_STUN_SERVER_URL: &str = "stun:stun.l.google.com:19302";

pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub report: ReportConfig,
    pub mail: MailConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub stun_server_url: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between the host leaving and the room being purged
    pub grace_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// Offset used when rendering report timestamps
    pub utc_offset_minutes: i32,
}

impl ReportConfig {
    pub fn timezone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            SessionError::InvalidConfiguration(format!(
                "REPORT_UTC_OFFSET_MINUTES out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 5000)?,
                stun_server_url: env::var("STUN_SERVER_URL")
                    .unwrap_or_else(|_| DEFAULT_STUN_SERVER_URL.to_string()),
            },
            session: SessionConfig {
                grace_period: Duration::from_secs(parse_var("SESSION_GRACE_PERIOD_SECS", 5)?),
            },
            report: ReportConfig {
                output_dir: env::var("REPORT_OUTPUT_DIR")
                    .unwrap_or_else(|_| "./reports".to_string())
                    .into(),
                utc_offset_minutes: parse_var("REPORT_UTC_OFFSET_MINUTES", 330)?,
            },
            mail: MailConfig {
                api_url: env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty()),
                api_key: env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
                from: env::var("MAIL_FROM").unwrap_or_else(|_| "reports@localhost".to_string()),
                timeout_secs: parse_var("MAIL_TIMEOUT_SECS", 30)?,
            },
        })
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            SessionError::ConfigurationParseFailed(format!("{} has invalid value {:?}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}
