use actix_web::http::header::HeaderValue;
use serde::Deserialize;
use sim::{ParamSpec, SimRunner};
use std::{path::PathBuf, time::Duration};

pub mod api;
pub mod error;

fn match_wildcard(pat: &str, origin: &HeaderValue) -> bool {
    let Ok(mut origin_str) = origin.to_str() else {
        return false;
    };

    let mut segments = pat.split('*');

    let Some(first) = segments.next() else {
        return false;
    };
    origin_str = match origin_str.strip_prefix(first) {
        Some(s) => s,
        None => return false,
    };

    for s in segments {
        if s.is_empty() {
            continue;
        }
        match origin_str.find(s) {
            Some(pos) => {
                let wildcard = &origin_str[..pos];
                if !wildcard.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return false;
                }
                origin_str = &origin_str[pos..];
            }
            None => {
                return false;
            }
        }
    }

    true
}

#[derive(Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "SimulationConfig::default_program")]
    pub program: String,
    #[serde(default = "SimulationConfig::default_args")]
    pub args: Vec<String>,
    #[serde(default = "SimulationConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Required-parameter list override; the list has changed between
    /// simulator revisions, so it is configuration, not a constant.
    #[serde(default)]
    pub required_params: Option<Vec<String>>,
}

impl SimulationConfig {
    pub fn default_program() -> String {
        "python3".to_owned()
    }

    pub fn default_args() -> Vec<String> {
        vec!["../simulation/simrunner.py".to_owned()]
    }

    pub fn default_timeout_secs() -> u64 {
        180
    }

    pub fn param_spec(&self) -> ParamSpec {
        match &self.required_params {
            Some(keys) => ParamSpec::new(keys.iter().cloned()),
            None => ParamSpec::default(),
        }
    }

    pub fn runner(&self) -> SimRunner {
        SimRunner::new(&self.program)
            .base_args(self.args.iter().cloned())
            .timeout(Duration::from_secs(self.timeout_secs))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            args: Self::default_args(),
            timeout_secs: Self::default_timeout_secs(),
            required_params: None,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(default = "Config::default_host")]
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,
    /// Empty means any origin is allowed; the UI is served separately.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "Config::default_cache_root")]
    pub cache_root: PathBuf,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            cors_origins: Vec::new(),
            cache_root: Self::default_cache_root(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    pub fn default_host() -> String {
        "127.0.0.1".to_owned()
    }

    pub fn default_port() -> u16 {
        5000
    }

    pub fn default_cache_root() -> PathBuf {
        PathBuf::from("./cache")
    }

    pub fn get_config() -> Self {
        match std::env::args().nth(1) {
            Some(s) => if s == "-" {
                use std::io::Read;
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|error| {
                        tracing::error!("Error reading STDIN: {}", error);
                    })
                    .map(move |_| buf)
            } else {
                std::fs::read_to_string(s).map_err(|error| {
                    tracing::error!("Error reading config: {}", error);
                })
            }
            .and_then(|s| {
                toml::from_str(&s).map_err(|error| {
                    tracing::error!("Error parsing config: {}", error);
                })
            })
            .map_err(|_| {
                tracing::warn!("Invalid config file, using default");
            })
            .unwrap_or_default(),
            None => {
                tracing::info!("No config specified, using default");
                Config::default()
            }
        }
    }

    /// Build a CORS middleware. With no configured origins every origin is
    /// allowed; otherwise only the listed ones (wildcards supported).
    pub fn cors(&self) -> actix_cors::Cors {
        let mut cors = actix_cors::Cors::default()
            .allow_any_header()
            .allow_any_method();
        if self.cors_origins.is_empty() {
            return cors.allow_any_origin();
        }
        for origin in &self.cors_origins {
            if origin.contains('*') {
                let pattern = origin.clone();
                cors = cors.allowed_origin_fn(move |origin, _| match_wildcard(&pattern, origin));
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors
    }
}
