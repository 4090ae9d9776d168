/// 蓝牙信标室内定位
///
/// - `algorithms`：RSSI 滤波、距离估计与定位算法
/// - `positioning`：位置估计器与定位引擎
/// - `scanner`：实时蓝牙扫描与定位循环
/// - `replay`：离线轨迹回放与参数扫描

pub mod algorithms;
pub mod cli;
pub mod config;
pub mod error;
pub mod positioning;
pub mod replay;
pub mod scanner;

pub use config::{DistanceSettings, EngineConfig, Parameters, PositionSettings};
pub use error::{ConfigError, ParseError, PositioningError, ReplayError, ScanError};
pub use positioning::{PositionEstimator, PositioningEngine, PositioningMethod};
