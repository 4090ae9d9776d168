/// 蓝牙信标定义和相关数据结构

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// 广播包未携带发射功率时使用的默认值 (dBm)
pub const DEFAULT_TX_POWER: i16 = -59;

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9A-F]{2}:){5}[0-9A-F]{2}$").expect("地址正则表达式有效")
});

/// 校验并规范化信标 MAC 地址（统一为大写）
pub fn normalize_address(address: &str) -> Result<String, ConfigError> {
    let upper = address.trim().to_ascii_uppercase();
    if ADDRESS_PATTERN.is_match(&upper) {
        Ok(upper)
    } else {
        Err(ConfigError::InvalidAddress(address.to_string()))
    }
}

/// 单次信标检测结果（由外部扫描模块产生，不可变）
#[derive(Clone, Debug, PartialEq)]
pub struct BeaconReading {
    /// 信标 MAC 地址
    pub address: String,
    /// RSSI 值 (dBm)
    pub rssi: i16,
    /// 广播包中携带的发射功率 (dBm)
    pub observed_tx_power: i16,
    /// 检测时间（回放时来自记录文件）
    pub timestamp: Option<DateTime<Utc>>,
}

impl BeaconReading {
    pub fn new(address: impl Into<String>, rssi: i16) -> Self {
        BeaconReading {
            address: address.into(),
            rssi,
            observed_tx_power: DEFAULT_TX_POWER,
            timestamp: None,
        }
    }

    pub fn with_timestamp(address: impl Into<String>, rssi: i16, timestamp: DateTime<Utc>) -> Self {
        BeaconReading {
            timestamp: Some(timestamp),
            ..Self::new(address, rssi)
        }
    }

    /// 指定广播发射功率
    pub fn with_tx_power(mut self, tx_power: i16) -> Self {
        self.observed_tx_power = tx_power;
        self
    }
}

/// 信标锚点：安装位置（厘米）及校准发射功率
#[derive(Clone, Debug, PartialEq)]
pub struct Anchor {
    pub address: String,
    pub x: f64,
    pub y: f64,
    /// 校准后的 1 米处参考功率，未校准时为 None
    pub tx_power: Option<i16>,
}

impl Anchor {
    pub fn new(address: impl Into<String>, x: f64, y: f64) -> Self {
        Anchor {
            address: address.into(),
            x,
            y,
            tx_power: None,
        }
    }

    pub fn with_tx_power(mut self, tx_power: i16) -> Self {
        self.tx_power = Some(tx_power);
        self
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// 锚点表 - 地址到安装坐标和校准功率的映射
///
/// 启动时填充一次，之后只读。
#[derive(Clone, Debug, Default)]
pub struct AnchorMap {
    anchors: HashMap<String, Anchor>,
}

impl AnchorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从锚点向量创建
    pub fn from_vec(anchors: Vec<Anchor>) -> Self {
        let mut map = AnchorMap::new();
        for anchor in anchors {
            map.insert(anchor);
        }
        map
    }

    /// 参考安装环境（10 个已校准信标）
    pub fn reference_installation() -> Self {
        AnchorMap::from_vec(vec![
            Anchor::new("00:CD:FF:0E:5E:B9", 25.0, 438.0).with_tx_power(-68),
            Anchor::new("20:18:FF:00:3F:E4", 230.0, 608.0).with_tx_power(-66),
            Anchor::new("20:18:FF:00:3F:E7", 390.0, 283.0).with_tx_power(-66),
            Anchor::new("20:18:FF:00:40:02", 575.0, 283.0).with_tx_power(-66),
            Anchor::new("20:18:FF:00:40:07", 600.0, 593.0).with_tx_power(-66),
            Anchor::new("20:18:FF:00:40:08", 820.0, 598.0).with_tx_power(-66),
            Anchor::new("20:18:FF:00:40:20", 920.0, 78.0).with_tx_power(-64),
            Anchor::new("20:18:FF:00:40:2C", 1120.0, 298.0).with_tx_power(-67),
            Anchor::new("20:18:FF:00:40:2D", 1100.0, 580.0).with_tx_power(-68),
            Anchor::new("20:18:FF:00:40:2E", 740.0, 320.0).with_tx_power(-66),
        ])
    }

    pub fn insert(&mut self, anchor: Anchor) {
        self.anchors.insert(anchor.address.clone(), anchor);
    }

    pub fn get(&self, address: &str) -> Option<&Anchor> {
        self.anchors.get(address)
    }

    /// 锚点坐标；未知地址返回 None，不能当作原点处理
    pub fn coordinates(&self, address: &str) -> Option<(f64, f64)> {
        self.anchors.get(address).map(Anchor::coordinates)
    }

    /// 校准发射功率
    pub fn tx_power(&self, address: &str) -> Option<i16> {
        self.anchors.get(address).and_then(|a| a.tx_power)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Anchor)> {
        self.anchors.iter()
    }
}
