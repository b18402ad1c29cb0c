use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Environment variable error: {0}")]
  EnvVar(#[from] std::env::VarError),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Connection error: {0}")]
  Connection(String),

  #[error("Gateway error: {0}")]
  Gateway(String),

  #[error("Request timed out: {0}")]
  Timeout(String),

  #[error("Invalid contract: {0}")]
  InvalidContract(String),

  #[error("Serialization error")]
  Serde(#[from] serde_json::Error),

  #[error("YAML error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("Date parsing error")]
  ParseDate(#[from] chrono::ParseError),

  #[error("Missing required field: {0}")]
  MissingField(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Parse error: {0}")]
  Parse(String),

  #[error("Unexpected error: {0}")]
  Unexpected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
