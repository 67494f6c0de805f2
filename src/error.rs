use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot find table rule and default data source with logic table: '{0}'")]
    TableRuleNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sharding algorithm error: {0}")]
    Algorithm(String),

    #[error("Unsupported route: {0}")]
    UnsupportedRoute(String),

    #[error("Query result error: {0}")]
    QueryResult(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ShardingResult<T> = Result<T, ShardingError>;

impl serde::Serialize for ShardingError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl ShardingError {
    /// Shorthand used across the rule model
    pub fn config(msg: impl Into<String>) -> Self {
        ShardingError::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ShardingError::InvalidArgument("Data sources cannot be empty.".to_string());
        assert_eq!(err.to_string(), "Invalid argument: Data sources cannot be empty.");

        let err = ShardingError::TableRuleNotFound("t_order".to_string());
        assert_eq!(
            err.to_string(),
            "Cannot find table rule and default data source with logic table: 't_order'"
        );

        let err = ShardingError::config("no data node");
        assert_eq!(err.to_string(), "Configuration error: no data node");

        let err = ShardingError::Algorithm("not a number".to_string());
        assert_eq!(err.to_string(), "Sharding algorithm error: not a number");

        let err = ShardingError::QueryResult("connection reset".to_string());
        assert_eq!(err.to_string(), "Query result error: connection reset");
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err = ShardingError::Merge("no current row".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("Merge error: no current row"));
    }

    #[test]
    fn test_error_debug() {
        let err = ShardingError::TableRuleNotFound("test".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("TableRuleNotFound"));
    }
}
