/// 定位算法模块
///
/// - 信标与锚点表
/// - RSSI 历史与滑动窗口滤波
/// - RSSI 转距离模型与距离估计器
/// - 多种定位算法（加权中点、三边定位、加权质心、概率网格）

pub mod location_algorithms;
pub mod rssi_model;
pub mod rssi_filter;
pub mod distance;
pub mod beacon;
pub mod results;

pub use location_algorithms::*;
pub use rssi_model::*;
pub use rssi_filter::*;
pub use distance::*;
pub use beacon::*;
pub use results::*;
