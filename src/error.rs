/// 错误类型定义
///
/// 定位失败属于可恢复错误：调用方跳过本轮扫描周期即可，
/// 距离估计器本身从不返回错误。

use thiserror::Error;

/// 定位错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositioningError {
    /// 检测到的信标数量不足
    #[error("信标数量不足：检测到 {detected} 个，至少需要 {required} 个")]
    InsufficientBeacons { detected: usize, required: usize },

    /// 信标坐标未知，或锚点表为空
    #[error("{}", missing_anchor_message(.address))]
    MissingAnchorData { address: Option<String> },

    /// 几何退化（共线、同心等）
    #[error("几何退化，无法求解：{reason}")]
    DegenerateGeometry { reason: String },
}

fn missing_anchor_message(address: &Option<String>) -> String {
    match address {
        Some(address) => format!("缺少信标 {} 的锚点坐标", address),
        None => "没有可用的锚点坐标".to_string(),
    }
}

impl PositioningError {
    pub(crate) fn missing_anchor(address: &str) -> Self {
        PositioningError::MissingAnchorData {
            address: Some(address.to_string()),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        PositioningError::DegenerateGeometry {
            reason: reason.into(),
        }
    }
}

/// 枚举名称解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("未知的{kind}：\"{value}\"")]
    UnknownVariant { kind: &'static str, value: String },
}

/// 配置加载与校验错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件格式错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("无效的信标地址: \"{0}\"")]
    InvalidAddress(String),

    #[error("信标地址重复: {0}")]
    DuplicateAnchor(String),

    #[error("窗口大小 {value} 超出范围 1..={max}")]
    InvalidWindowSize { value: usize, max: usize },

    #[error("参数 {name} 无效: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// 蓝牙扫描错误
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("蓝牙错误: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error("未找到蓝牙适配器")]
    NoAdapter,

    #[error("扫描周期接收端已关闭")]
    ChannelClosed,
}

/// 轨迹回放错误
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("读写轨迹文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("轨迹文件格式错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("真值时间戳数量不足：定位结果 {results} 个，时间戳 {timestamps} 个")]
    TimestampMismatch { results: usize, timestamps: usize },
}
