/// 定位引擎配置
///
/// - 距离估计参数与定位参数（带默认值）
/// - 参数组合 `Parameters`，用作回放扫描的分组键
/// - JSON 配置文件加载与校验

use crate::algorithms::{
    Anchor, AnchorMap, DistanceMethod, DistanceModel, MeanDivisor, RssiHistory, SearchGrid,
    normalize_address,
};
use crate::error::ConfigError;
use crate::positioning::PositioningMethod;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

// ============================================================================
// 距离估计与定位参数
// ============================================================================

/// 距离估计默认参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceSettings {
    pub distance_model: DistanceModel,
    pub distance_method: DistanceMethod,
    /// 滑动窗口大小 (1..=10)
    pub window_size: usize,
    /// 路径损耗指数 n
    pub path_loss_exponent: f64,
    pub mean_divisor: MeanDivisor,
}

impl Default for DistanceSettings {
    fn default() -> Self {
        DistanceSettings {
            distance_model: DistanceModel::PathLoss,
            distance_method: DistanceMethod::Median,
            window_size: 5,
            path_loss_exponent: 2.0,
            mean_divisor: MeanDivisor::Window,
        }
    }
}

impl DistanceSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_window_size(self.window_size)?;
        if !self.path_loss_exponent.is_finite() || self.path_loss_exponent <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "path_loss_exponent",
                value: self.path_loss_exponent,
            });
        }
        Ok(())
    }
}

/// 定位默认参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSettings {
    pub positioning_method: PositioningMethod,
    /// 加权质心的权重指数 k (w = 1 / d^k)
    pub weight_exponent: f64,
    /// 概率网格搜索的平滑系数
    pub pdf_sharpness: f64,
    /// 是否允许少于 3 个信标时定位
    pub allow_fewer_than_three_beacons: bool,
    pub grid: SearchGrid,
}

impl Default for PositionSettings {
    fn default() -> Self {
        PositionSettings {
            positioning_method: PositioningMethod::WeightedCentroid,
            weight_exponent: 1.0,
            pdf_sharpness: 0.5,
            allow_fewer_than_three_beacons: false,
            grid: SearchGrid::default(),
        }
    }
}

impl PositionSettings {
    /// 两圆交点法退化为加权质心时使用的权重指数
    ///
    /// 参数扫描中三边定位组合的权重指数记为 -1（未使用），此时按 1 处理；
    /// 加权质心方法本身直接使用 `weight_exponent`。
    pub fn fallback_weight_exponent(&self) -> f64 {
        if self.weight_exponent < 0.0 {
            1.0
        } else {
            self.weight_exponent
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.weight_exponent.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "weight_exponent",
                value: self.weight_exponent,
            });
        }
        if !self.pdf_sharpness.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "pdf_sharpness",
                value: self.pdf_sharpness,
            });
        }
        if self.grid.step == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "grid.step",
                value: 0.0,
            });
        }
        Ok(())
    }
}

fn validate_window_size(window_size: usize) -> Result<(), ConfigError> {
    if window_size == 0 || window_size > RssiHistory::CAPACITY {
        return Err(ConfigError::InvalidWindowSize {
            value: window_size,
            max: RssiHistory::CAPACITY,
        });
    }
    Ok(())
}

// ============================================================================
// 参数组合
// ============================================================================

/// 一组完整的定位参数
///
/// 按值比较：浮点字段逐位比较，因此 NaN 等于 NaN，0.0 不等于 -0.0。
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Parameters {
    pub window_size: usize,
    pub distance_method: DistanceMethod,
    pub distance_model: DistanceModel,
    pub path_loss_exponent: f64,
    pub positioning_method: PositioningMethod,
    pub weight_exponent: f64,
    pub pdf_sharpness: f64,
}

impl Parameters {
    /// 由两组默认参数组合
    pub fn from_settings(distance: &DistanceSettings, position: &PositionSettings) -> Self {
        Parameters {
            window_size: distance.window_size,
            distance_method: distance.distance_method,
            distance_model: distance.distance_model,
            path_loss_exponent: distance.path_loss_exponent,
            positioning_method: position.positioning_method,
            weight_exponent: position.weight_exponent,
            pdf_sharpness: position.pdf_sharpness,
        }
    }

    /// 回放输出文件名（不含扩展名）
    ///
    /// 枚举取值写作大写常量名（如 `WEIGHTED_CENTROID`），与已有的结果分析脚本保持一致。
    pub fn to_file_name(&self) -> String {
        let distance_method = if self.window_size == 1 || self.distance_method == DistanceMethod::Raw {
            "-1".to_string()
        } else {
            file_label(self.distance_method.name())
        };

        format!(
            "windowSize={}_distanceMethod={}_distanceModel={}_pathLossExponent={:.1}_positioningMethod={}_weightExponent={:?}_pdfSharpness={:?}",
            self.window_size,
            distance_method,
            file_label(self.distance_model.name()),
            self.path_loss_exponent,
            file_label(self.positioning_method.name()),
            self.weight_exponent,
            self.pdf_sharpness,
        )
    }

    fn float_bits(&self) -> [u64; 3] {
        [
            self.path_loss_exponent.to_bits(),
            self.weight_exponent.to_bits(),
            self.pdf_sharpness.to_bits(),
        ]
    }
}

fn file_label(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl PartialEq for Parameters {
    fn eq(&self, other: &Self) -> bool {
        self.window_size == other.window_size
            && self.distance_method == other.distance_method
            && self.distance_model == other.distance_model
            && self.positioning_method == other.positioning_method
            && self.float_bits() == other.float_bits()
    }
}

impl Eq for Parameters {}

impl Hash for Parameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.window_size.hash(state);
        self.distance_method.hash(state);
        self.distance_model.hash(state);
        self.positioning_method.hash(state);
        self.float_bits().hash(state);
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parameters{{windowSize={}, distanceMethod={}, distanceModel={}, pathLossExponent={:.1}, positioningMethod={}, weightExponent={}, pdfSharpness={}}}",
            self.window_size,
            self.distance_method,
            self.distance_model,
            self.path_loss_exponent,
            self.positioning_method,
            self.weight_exponent,
            self.pdf_sharpness,
        )
    }
}

// ============================================================================
// 配置文件
// ============================================================================

/// 锚点配置记录（与定位服务端的信标记录格式一致）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub beacon_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_power: Option<i16>,
    pub coordinates: CoordinatesRecord,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatesRecord {
    pub x: f64,
    pub y: f64,
}

/// 引擎配置文件
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub anchors: Vec<AnchorRecord>,
    pub distance: DistanceSettings,
    pub positioning: PositionSettings,
}

impl EngineConfig {
    /// 从 JSON 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.distance.validate()?;
        self.positioning.validate()?;

        let mut seen = HashSet::new();
        for record in &self.anchors {
            let address = normalize_address(&record.beacon_address)?;
            if !seen.insert(address.clone()) {
                return Err(ConfigError::DuplicateAnchor(address));
            }
        }
        Ok(())
    }

    /// 构建锚点表（地址统一为大写）
    pub fn anchor_map(&self) -> Result<AnchorMap, ConfigError> {
        let mut anchors = Vec::with_capacity(self.anchors.len());
        for record in &self.anchors {
            let address = normalize_address(&record.beacon_address)?;
            let mut anchor = Anchor::new(address, record.coordinates.x, record.coordinates.y);
            anchor.tx_power = record.tx_power;
            anchors.push(anchor);
        }
        Ok(AnchorMap::from_vec(anchors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(parameters: &Parameters) -> u64 {
        let mut hasher = DefaultHasher::new();
        parameters.hash(&mut hasher);
        hasher.finish()
    }

    fn sample() -> Parameters {
        Parameters {
            window_size: 5,
            distance_method: DistanceMethod::Median,
            distance_model: DistanceModel::PathLoss,
            path_loss_exponent: 1.5 + 0.1 * 3.0,
            positioning_method: PositioningMethod::WeightedCentroid,
            weight_exponent: 2.5,
            pdf_sharpness: -1.0,
        }
    }

    #[test]
    fn test_parameters_value_equality() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = Parameters {
            weight_exponent: 3.0,
            ..a
        };
        assert_ne!(a, c);
    }

    #[test]
    fn test_parameters_native_float_equality() {
        let nan = Parameters {
            pdf_sharpness: f64::NAN,
            ..sample()
        };
        assert_eq!(nan, nan);

        let zero = Parameters {
            pdf_sharpness: 0.0,
            ..sample()
        };
        let negative_zero = Parameters {
            pdf_sharpness: -0.0,
            ..sample()
        };
        assert_ne!(zero, negative_zero);
    }

    #[test]
    fn test_file_name() {
        let name = sample().to_file_name();
        assert_eq!(
            name,
            "windowSize=5_distanceMethod=MEDIAN_distanceModel=PATH_LOSS_pathLossExponent=1.8_positioningMethod=WEIGHTED_CENTROID_weightExponent=2.5_pdfSharpness=-1.0"
        );

        let fitted = Parameters {
            distance_model: DistanceModel::FittedAverage,
            path_loss_exponent: -1.0,
            positioning_method: PositioningMethod::Probability,
            weight_exponent: -1.0,
            pdf_sharpness: 3.5,
            ..sample()
        };
        assert_eq!(
            fitted.to_file_name(),
            "windowSize=5_distanceMethod=MEDIAN_distanceModel=FITTED_AVERAGE_pathLossExponent=-1.0_positioningMethod=PROBABILITY_weightExponent=-1.0_pdfSharpness=3.5"
        );

        let single = Parameters {
            window_size: 1,
            distance_method: DistanceMethod::Raw,
            ..sample()
        };
        assert!(single.to_file_name().contains("distanceMethod=-1_"));
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.distance.window_size, 5);
        assert_eq!(config.distance.distance_method, DistanceMethod::Median);
        assert_eq!(config.positioning.positioning_method, PositioningMethod::WeightedCentroid);
        assert!(!config.positioning.allow_fewer_than_three_beacons);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_backend_anchor_records() {
        let json = r#"{
            "anchors": [
                {"beaconAddress": "20:18:ff:00:40:2e", "txPower": -66, "coordinates": {"x": 740, "y": 320}},
                {"beaconAddress": "20:18:FF:00:40:2D", "coordinates": {"x": 1100, "y": 580}}
            ],
            "distance": {"distance_model": "fitted_los", "window_size": 10},
            "positioning": {"positioning_method": "probability", "grid": {"outline": "open"}}
        }"#;

        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.distance.distance_model, DistanceModel::FittedLos);
        assert_eq!(config.distance.distance_method, DistanceMethod::Median);
        assert_eq!(config.positioning.grid.step, 20);

        let anchors = config.anchor_map().unwrap();
        assert_eq!(anchors.coordinates("20:18:FF:00:40:2E"), Some((740.0, 320.0)));
        assert_eq!(anchors.tx_power("20:18:FF:00:40:2E"), Some(-66));
        assert_eq!(anchors.tx_power("20:18:FF:00:40:2D"), None);
    }

    #[test]
    fn test_negative_weight_exponent_kept() {
        let config = EngineConfig::from_json(r#"{"positioning": {"weight_exponent": -2.0}}"#).unwrap();
        assert_eq!(config.positioning.weight_exponent, -2.0);
        assert_eq!(config.positioning.fallback_weight_exponent(), 1.0);

        let swept = PositionSettings {
            weight_exponent: 2.5,
            ..PositionSettings::default()
        };
        assert_eq!(swept.fallback_weight_exponent(), 2.5);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let oversized = r#"{"distance": {"window_size": 20}}"#;
        assert!(matches!(
            EngineConfig::from_json(oversized),
            Err(ConfigError::InvalidWindowSize { value: 20, .. })
        ));

        let unknown_model = r#"{"distance": {"distance_model": "free_space"}}"#;
        assert!(matches!(EngineConfig::from_json(unknown_model), Err(ConfigError::Json(_))));

        let duplicate = r#"{"anchors": [
            {"beaconAddress": "20:18:FF:00:40:2E", "coordinates": {"x": 0, "y": 0}},
            {"beaconAddress": "20:18:ff:00:40:2e", "coordinates": {"x": 1, "y": 1}}
        ]}"#;
        assert!(matches!(
            EngineConfig::from_json(duplicate),
            Err(ConfigError::DuplicateAnchor(_))
        ));

        let bad_address = r#"{"anchors": [{"beaconAddress": "beacon-1", "coordinates": {"x": 0, "y": 0}}]}"#;
        assert!(matches!(
            EngineConfig::from_json(bad_address),
            Err(ConfigError::InvalidAddress(_))
        ));
    }
}
