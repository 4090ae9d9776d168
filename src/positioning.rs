/// 蓝牙室内定位模块
///
/// 支持的功能：
/// - 按信标数量分情况定位（单信标、双信标加权中点、三个及以上信标多点定位）
/// - 四种多点定位方法的选择与分发
/// - 距离估计器与位置估计器组合为一个定位引擎，按扫描周期处理

use crate::algorithms::{
    AnchorMap, BeaconReading, Coordinates, DistanceEstimator, LocationAlgorithm, RangedAnchor,
};
use crate::config::{DistanceSettings, EngineConfig, Parameters, PositionSettings};
use crate::error::{ConfigError, ParseError, PositioningError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// 不允许少信标定位时所需的最少信标数
const MINIMUM_BEACONS: usize = 3;

// ============================================================================
// 定位方法
// ============================================================================

/// 多点定位方法（三个及以上信标时使用）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositioningMethod {
    /// 两圆交点 + 第三信标消歧
    Trilateration,
    /// 三圆方程线性化，克莱姆法则求解
    Trilateration2,
    #[default]
    WeightedCentroid,
    /// 楼层网格上的最大似然搜索
    Probability,
}

impl PositioningMethod {
    pub const ALL: [PositioningMethod; 4] = [
        PositioningMethod::Trilateration,
        PositioningMethod::Trilateration2,
        PositioningMethod::WeightedCentroid,
        PositioningMethod::Probability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PositioningMethod::Trilateration => "trilateration",
            PositioningMethod::Trilateration2 => "trilateration2",
            PositioningMethod::WeightedCentroid => "weighted_centroid",
            PositioningMethod::Probability => "probability",
        }
    }
}

impl fmt::Display for PositioningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PositioningMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PositioningMethod::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| ParseError::UnknownVariant {
                kind: "定位方法",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// 位置估计器
// ============================================================================

pub struct PositionEstimator {
    anchors: Arc<AnchorMap>,
    settings: PositionSettings,
}

impl PositionEstimator {
    pub fn new(anchors: Arc<AnchorMap>, settings: PositionSettings) -> Self {
        PositionEstimator { anchors, settings }
    }

    pub fn settings(&self) -> &PositionSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: PositionSettings) {
        debug!(
            method = %settings.positioning_method,
            weight_exponent = settings.weight_exponent,
            pdf_sharpness = settings.pdf_sharpness,
            "定位参数已更新"
        );
        self.settings = settings;
    }

    /// 计算一个扫描周期的位置
    ///
    /// 1 个信标返回其锚点坐标，2 个信标返回加权中点，两者均不设置置信度；
    /// 3 个及以上信标按距离升序排序后按 `method` 分发，置信度取最近 3 个信标。
    pub fn get_position(
        &self,
        distances: &DistanceEstimator,
        readings: &[BeaconReading],
        method: PositioningMethod,
    ) -> Result<Coordinates, PositioningError> {
        let required = if self.settings.allow_fewer_than_three_beacons {
            1
        } else {
            MINIMUM_BEACONS
        };
        if readings.len() < required {
            return Err(PositioningError::InsufficientBeacons {
                detected: readings.len(),
                required,
            });
        }
        if self.anchors.is_empty() {
            return Err(PositioningError::MissingAnchorData { address: None });
        }

        match readings {
            [single] => {
                let (x, y) = self.resolve(single)?;
                debug!(address = %single.address, "单信标定位，使用锚点坐标");
                Ok(Coordinates::new(x, y))
            }
            [first, second] => {
                let first = self.ranged(first, distances.distance(first))?;
                let second = self.ranged(second, distances.distance(second))?;
                Ok(LocationAlgorithm::weighted_midpoint(&first, &second))
            }
            _ => self.multilaterate(distances, readings, method),
        }
    }

    fn multilaterate(
        &self,
        distances: &DistanceEstimator,
        readings: &[BeaconReading],
        method: PositioningMethod,
    ) -> Result<Coordinates, PositioningError> {
        let mut sorted: Vec<(&BeaconReading, f64)> = readings
            .iter()
            .map(|reading| (reading, distances.distance(reading)))
            .collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));

        let nearest: Vec<&BeaconReading> = sorted.iter().take(3).map(|(r, _)| *r).collect();

        let position = match method {
            PositioningMethod::Trilateration => {
                let anchors = self.nearest_three(&sorted)?;
                LocationAlgorithm::trilateration(&anchors, self.settings.fallback_weight_exponent())?
            }
            PositioningMethod::Trilateration2 => {
                let anchors = self.nearest_three(&sorted)?;
                LocationAlgorithm::trilateration_linear(&anchors)?
            }
            PositioningMethod::WeightedCentroid => {
                let anchors = self.resolvable(&sorted);
                LocationAlgorithm::weighted_centroid(&anchors, self.settings.weight_exponent)?
            }
            PositioningMethod::Probability => {
                let anchors = self.resolvable(&sorted);
                if anchors.is_empty() {
                    return Err(PositioningError::MissingAnchorData { address: None });
                }
                LocationAlgorithm::probability_grid(
                    &anchors,
                    &self.settings.grid,
                    self.settings.pdf_sharpness,
                )?
            }
        };

        let confidence = distances.confidence(&nearest);
        debug!(%method, %position, confidence, beacons = readings.len(), "定位完成");
        Ok(position.with_confidence(confidence))
    }

    /// 最近的三个信标，锚点必须全部已知
    fn nearest_three(
        &self,
        sorted: &[(&BeaconReading, f64)],
    ) -> Result<[RangedAnchor; 3], PositioningError> {
        let first = self.ranged(sorted[0].0, sorted[0].1)?;
        let second = self.ranged(sorted[1].0, sorted[1].1)?;
        let third = self.ranged(sorted[2].0, sorted[2].1)?;
        Ok([first, second, third])
    }

    /// 所有锚点已知的信标；未知锚点跳过
    fn resolvable(&self, sorted: &[(&BeaconReading, f64)]) -> Vec<RangedAnchor> {
        sorted
            .iter()
            .filter_map(|(reading, distance)| {
                let (x, y) = self.anchors.coordinates(&reading.address)?;
                Some(RangedAnchor::new(x, y, *distance))
            })
            .collect()
    }

    fn ranged(&self, reading: &BeaconReading, distance: f64) -> Result<RangedAnchor, PositioningError> {
        let (x, y) = self.resolve(reading)?;
        Ok(RangedAnchor::new(x, y, distance))
    }

    fn resolve(&self, reading: &BeaconReading) -> Result<(f64, f64), PositioningError> {
        self.anchors
            .coordinates(&reading.address)
            .ok_or_else(|| PositioningError::missing_anchor(&reading.address))
    }
}

// ============================================================================
// 定位引擎
// ============================================================================

/// 定位引擎：距离估计器与位置估计器共享同一张只读锚点表
///
/// 一个会话（或一条回放轨迹）对应一个引擎实例；会话之间调用 `reset`。
pub struct PositioningEngine {
    distance: DistanceEstimator,
    position: PositionEstimator,
}

impl PositioningEngine {
    pub fn new(
        anchors: Arc<AnchorMap>,
        distance: DistanceSettings,
        position: PositionSettings,
    ) -> Self {
        PositioningEngine {
            distance: DistanceEstimator::new(Arc::clone(&anchors), distance),
            position: PositionEstimator::new(anchors, position),
        }
    }

    /// 由配置文件创建；锚点表为空时使用参考安装环境
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let anchors = if config.anchors.is_empty() {
            AnchorMap::reference_installation()
        } else {
            config.anchor_map()?
        };
        Ok(Self::new(
            Arc::new(anchors),
            config.distance.clone(),
            config.positioning.clone(),
        ))
    }

    pub fn distance_estimator(&self) -> &DistanceEstimator {
        &self.distance
    }

    pub fn position_estimator(&self) -> &PositionEstimator {
        &self.position
    }

    /// 当前参数组合
    pub fn parameters(&self) -> Parameters {
        Parameters::from_settings(self.distance.settings(), self.position.settings())
    }

    /// 切换参数组合（保留 RSSI 历史）
    pub fn apply(&mut self, parameters: &Parameters) {
        let distance = DistanceSettings {
            distance_model: parameters.distance_model,
            distance_method: parameters.distance_method,
            window_size: parameters.window_size,
            path_loss_exponent: parameters.path_loss_exponent,
            ..self.distance.settings().clone()
        };
        let position = PositionSettings {
            positioning_method: parameters.positioning_method,
            weight_exponent: parameters.weight_exponent,
            pdf_sharpness: parameters.pdf_sharpness,
            ..self.position.settings().clone()
        };
        self.distance.update_settings(distance);
        self.position.update_settings(position);
    }

    /// 记录一个扫描周期的测量
    pub fn ingest(&mut self, readings: &[BeaconReading]) {
        self.distance.add_measurements(readings);
    }

    /// 使用默认定位方法计算位置
    pub fn locate(&self, readings: &[BeaconReading]) -> Result<Coordinates, PositioningError> {
        self.locate_with(readings, self.position.settings().positioning_method)
    }

    pub fn locate_with(
        &self,
        readings: &[BeaconReading],
        method: PositioningMethod,
    ) -> Result<Coordinates, PositioningError> {
        self.position.get_position(&self.distance, readings, method)
    }

    /// 先记录测量，再定位
    pub fn process_cycle(
        &mut self,
        readings: &[BeaconReading],
    ) -> Result<Coordinates, PositioningError> {
        self.ingest(readings);
        self.locate(readings)
    }

    /// 清空全部 RSSI 历史
    pub fn reset(&mut self) {
        debug!("清空 RSSI 历史");
        self.distance.reset();
    }
}
