use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Outcome of one (symbol, date) archive attempt, as persisted in the
/// status ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarStatus {
  #[serde(rename = "COMPLETE")]
  Complete,
  #[serde(rename = "EARLY_CLOSE")]
  EarlyClose,
  #[serde(rename = "HOLIDAY")]
  Holiday,
  #[serde(rename = "ERROR")]
  Error,
  #[serde(rename = "PENDING")]
  Pending,
}

impl BarStatus {
  /// Terminal statuses are never revisited by the planner: the day's
  /// outcome is settled.
  pub fn is_terminal(&self) -> bool {
    matches!(self, BarStatus::Complete | BarStatus::EarlyClose | BarStatus::Holiday)
  }

  /// Statuses counted as successful archives.
  pub fn is_success(&self) -> bool {
    matches!(self, BarStatus::Complete | BarStatus::EarlyClose)
  }
}

impl std::fmt::Display for BarStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BarStatus::Complete => "COMPLETE",
      BarStatus::EarlyClose => "EARLY_CLOSE",
      BarStatus::Holiday => "HOLIDAY",
      BarStatus::Error => "ERROR",
      BarStatus::Pending => "PENDING",
    };
    write!(f, "{s}")
  }
}

impl std::str::FromStr for BarStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "COMPLETE" => Ok(BarStatus::Complete),
      "EARLY_CLOSE" => Ok(BarStatus::EarlyClose),
      "HOLIDAY" => Ok(BarStatus::Holiday),
      "ERROR" => Ok(BarStatus::Error),
      "PENDING" => Ok(BarStatus::Pending),
      other => Err(Error::Parse(format!("Unknown bar status: {other}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_round_trip() {
    for status in [
      BarStatus::Complete,
      BarStatus::EarlyClose,
      BarStatus::Holiday,
      BarStatus::Error,
      BarStatus::Pending,
    ] {
      assert_eq!(status.to_string().parse::<BarStatus>().unwrap(), status);
    }
  }

  #[test]
  fn test_terminal_statuses() {
    assert!(BarStatus::Complete.is_terminal());
    assert!(BarStatus::EarlyClose.is_terminal());
    assert!(BarStatus::Holiday.is_terminal());
    assert!(!BarStatus::Error.is_terminal());
    assert!(!BarStatus::Pending.is_terminal());
  }

  #[test]
  fn test_success_statuses() {
    assert!(BarStatus::Complete.is_success());
    assert!(BarStatus::EarlyClose.is_success());
    assert!(!BarStatus::Holiday.is_success());
    assert!(!BarStatus::Error.is_success());
  }

  #[test]
  fn test_unknown_status_is_parse_error() {
    assert!("DONE".parse::<BarStatus>().is_err());
  }
}
