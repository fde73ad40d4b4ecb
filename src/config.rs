use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Deserializer};
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "examshelf")]
#[command(about = "Runs the examshelf service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".examshelf")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    database: String,
    port: u16,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub turso_url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub turso_auth_token: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

fn default_sync_interval() -> u64 {
    60
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Auth {
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_signin_base")]
    pub signin_base: String,
    #[serde(default)]
    pub public_paths: Vec<String>,
    #[serde(default = "default_session_sweep")]
    pub session_sweep_seconds: u64,
}

fn default_session_cookie() -> String {
    "session".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_signin_base() -> String {
    "/api/auth/signin".to_string()
}

fn default_session_sweep() -> u64 {
    300
}

impl Default for Auth {
    fn default() -> Self {
        Auth {
            session_cookie: default_session_cookie(),
            login_path: default_login_path(),
            provider: default_provider(),
            signin_base: default_signin_base(),
            public_paths: Vec::new(),
            session_sweep_seconds: default_session_sweep(),
        }
    }
}

// `${VAR:-}` substitutes to an empty string; treat that as unset.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub auth: Auth,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = %var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
