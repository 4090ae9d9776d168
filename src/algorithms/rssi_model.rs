/// RSSI 到距离转换模型
///
/// 支持对数路径损耗模型和三组经验拟合模型（平均、视距、非视距），
/// 以及滑动窗口的滤波方式选择。

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 距离模型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// 对数距离路径损耗: d = 10^((txPower - RSSI) / (10 * n))
    #[default]
    PathLoss,
    /// 全部测量数据的指数拟合
    FittedAverage,
    /// 视距 (LOS) 测量数据的指数拟合
    FittedLos,
    /// 非视距 (NLOS) 测量数据的指数拟合
    FittedNlos,
}

impl DistanceModel {
    pub const ALL: [DistanceModel; 4] = [
        DistanceModel::PathLoss,
        DistanceModel::FittedAverage,
        DistanceModel::FittedLos,
        DistanceModel::FittedNlos,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DistanceModel::PathLoss => "path_loss",
            DistanceModel::FittedAverage => "fitted_average",
            DistanceModel::FittedLos => "fitted_los",
            DistanceModel::FittedNlos => "fitted_nlos",
        }
    }

    /// 根据滤波后的 RSSI 计算距离（米）
    ///
    /// 拟合模型形如 d = exp((RSSI + a) / -b)，系数来自实测曲线拟合，不可改动。
    pub fn distance(&self, rssi: f64, tx_power: i16, path_loss_exponent: f64) -> f64 {
        match self {
            DistanceModel::PathLoss => {
                10_f64.powf((f64::from(tx_power) - rssi) / (10.0 * path_loss_exponent))
            }
            DistanceModel::FittedAverage => ((rssi + 71.317) / -5.094).exp(),
            DistanceModel::FittedLos => ((rssi + 66.765) / -6.338).exp(),
            DistanceModel::FittedNlos => ((rssi + 75.869) / -3.851).exp(),
        }
    }
}

impl fmt::Display for DistanceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceModel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistanceModel::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ParseError::UnknownVariant {
                kind: "距离模型",
                value: s.to_string(),
            })
    }
}

/// RSSI 滤波方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMethod {
    /// 算术平均（与 Mean 相同）
    Average,
    Mean,
    #[default]
    Median,
    /// 众数，无众数时退化为中位数
    Mode,
    /// 不滤波，直接使用本次读数
    Raw,
}

impl DistanceMethod {
    pub const ALL: [DistanceMethod; 5] = [
        DistanceMethod::Average,
        DistanceMethod::Mean,
        DistanceMethod::Median,
        DistanceMethod::Mode,
        DistanceMethod::Raw,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMethod::Average => "average",
            DistanceMethod::Mean => "mean",
            DistanceMethod::Median => "median",
            DistanceMethod::Mode => "mode",
            DistanceMethod::Raw => "raw",
        }
    }
}

impl fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistanceMethod::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ParseError::UnknownVariant {
                kind: "滤波方式",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_path_loss_at_reference_power() {
        // RSSI 等于参考功率时距离为 1 米
        let d = DistanceModel::PathLoss.distance(-66.0, -66, 2.0);
        assert_relative_eq!(d, 1.0);
    }

    #[test]
    fn test_path_loss_exponent() {
        // 衰减 20 dB，n = 2 时距离为 10 米
        let d = DistanceModel::PathLoss.distance(-86.0, -66, 2.0);
        assert_relative_eq!(d, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fitted_models() {
        assert_relative_eq!(DistanceModel::FittedAverage.distance(-71.317, -59, 2.0), 1.0);
        assert_relative_eq!(DistanceModel::FittedLos.distance(-66.765, -59, 2.0), 1.0);
        assert_relative_eq!(DistanceModel::FittedNlos.distance(-75.869, -59, 2.0), 1.0);
        assert_relative_eq!(
            DistanceModel::FittedLos.distance(-73.103, -59, 2.0),
            1.0_f64.exp(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("fitted_nlos".parse::<DistanceModel>(), Ok(DistanceModel::FittedNlos));
        assert_eq!("mode".parse::<DistanceMethod>(), Ok(DistanceMethod::Mode));
        assert!(matches!(
            "kalman".parse::<DistanceMethod>(),
            Err(ParseError::UnknownVariant { .. })
        ));
        assert!("PATH_LOSS".parse::<DistanceModel>().is_err());
    }

    #[test]
    fn test_serde_uses_config_names() {
        let json = serde_json::to_string(&DistanceModel::FittedAverage).unwrap();
        assert_eq!(json, "\"fitted_average\"");
        let method: DistanceMethod = serde_json::from_str("\"average\"").unwrap();
        assert_eq!(method, DistanceMethod::Average);
    }
}
