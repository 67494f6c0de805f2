pub mod config;
pub mod error;
pub mod merge;
pub mod route;
pub mod rule;
pub mod strategy;
pub mod value;

pub use config::{AlgorithmConfig, ShardingRuleConfig, ShardingStrategyConfig, TableRuleConfig};
pub use error::{ShardingError, ShardingResult};
pub use merge::{MergeEngine, MergedResult, QueryResult, SelectContext};
pub use route::{RouteContext, RouteResult, RoutingEngine, SqlStatement};
pub use rule::{DataNode, ShardingRule, TableRule};
pub use strategy::{AlgorithmRegistry, HintManager, ShardingStrategy};
