/// 多种定位算法实现
///
/// 支持：
/// - 双信标加权中点
/// - 三边定位（两圆交点 + 第三信标消歧）
/// - 线性三边定位（三圆方程相减，克莱姆法则求解）
/// - 加权质心
/// - 概率网格搜索（限制在楼层轮廓内）
///
/// 锚点坐标单位为厘米，估计距离单位为米。

use crate::algorithms::Coordinates;
use crate::algorithms::results::euclidean;
use crate::error::{ParseError, PositioningError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// 米到厘米
pub const CENTIMETERS_PER_METER: f64 = 100.0;

/// 线性三边定位的相对共线容差
const COLLINEAR_TOLERANCE: f64 = 1e-10;

// ============================================================================
// 输入数据结构
// ============================================================================

/// 已解析锚点坐标并估计了距离的信标
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangedAnchor {
    /// 锚点 X 坐标（厘米）
    pub x: f64,
    /// 锚点 Y 坐标（厘米）
    pub y: f64,
    /// 估计距离（米）
    pub distance: f64,
}

impl RangedAnchor {
    pub fn new(x: f64, y: f64, distance: f64) -> Self {
        RangedAnchor { x, y, distance }
    }

    fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    fn radius_cm(&self) -> f64 {
        self.distance * CENTIMETERS_PER_METER
    }
}

// ============================================================================
// 搜索网格与楼层轮廓
// ============================================================================

/// 楼层轮廓，决定网格中哪些格点参与概率搜索
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorOutline {
    /// 不限制，整个矩形区域均可
    Open,
    /// 测试楼层：x > 700 的主体区域（去掉右下角 x >= 1140 且 y <= 620 的部分），
    /// 加上 x <= 700 处 240 < y < 640 的走廊
    #[default]
    Building,
}

impl FloorOutline {
    pub fn name(&self) -> &'static str {
        match self {
            FloorOutline::Open => "open",
            FloorOutline::Building => "building",
        }
    }

    /// 格点是否位于楼层内
    ///
    /// 判定式描述的是楼层内部：为真的格子参与搜索（按格子左下角判定）。
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match self {
            FloorOutline::Open => true,
            FloorOutline::Building => {
                (x > 700.0 && (x < 1140.0 || y > 620.0))
                    || (x <= 700.0 && y < 640.0 && y > 240.0)
            }
        }
    }
}

impl fmt::Display for FloorOutline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FloorOutline {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(FloorOutline::Open),
            "building" => Ok(FloorOutline::Building),
            _ => Err(ParseError::UnknownVariant {
                kind: "楼层轮廓",
                value: s.to_string(),
            }),
        }
    }
}

/// 概率搜索网格（厘米）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchGrid {
    pub width: u32,
    pub height: u32,
    pub step: u32,
    pub outline: FloorOutline,
}

impl Default for SearchGrid {
    fn default() -> Self {
        SearchGrid {
            width: 1200,
            height: 960,
            step: 20,
            outline: FloorOutline::Building,
        }
    }
}

impl SearchGrid {
    /// 楼层内所有格子的中心点
    ///
    /// 外层 x 递增，内层 y 递增；轮廓判断使用格子左下角格点。
    pub fn cells(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let step = self.step.max(1);
        let half = f64::from(step) / 2.0;

        (0..=self.width).step_by(step as usize).flat_map(move |x| {
            (0..=self.height)
                .step_by(step as usize)
                .filter(move |&y| self.outline.contains(f64::from(x), f64::from(y)))
                .map(move |y| (f64::from(x) + half, f64::from(y) + half))
        })
    }
}

// ============================================================================
// 定位算法集合
// ============================================================================

/// 定位算法集合
pub struct LocationAlgorithm;

impl LocationAlgorithm {
    /// 双信标加权中点
    ///
    /// 权重 w = r1 / (r1 + r2)，结果 = (1 - w) * p1 + w * p2，距离越近越靠近该信标。
    pub fn weighted_midpoint(first: &RangedAnchor, second: &RangedAnchor) -> Coordinates {
        let r1 = first.radius_cm();
        let r2 = second.radius_cm();
        let weight = r1 / (r1 + r2);

        let x = (1.0 - weight) * first.x + weight * second.x;
        let y = (1.0 - weight) * first.y + weight * second.y;
        Coordinates::new(x, y)
    }

    /// 三边定位 - 两最近信标的圆交点，用第三个信标选择交点
    ///
    /// 两圆不相交（包含或相离）时退化为三个信标的加权质心。
    /// 参考: http://paulbourke.net/geometry/circlesphere/
    pub fn trilateration(
        nearest: &[RangedAnchor; 3],
        weight_exponent: f64,
    ) -> Result<Coordinates, PositioningError> {
        let [first, second, third] = nearest;
        let (x1, y1) = first.position();
        let (x2, y2) = second.position();
        let r1 = first.radius_cm();
        let r2 = second.radius_cm();

        let distance = (x2 - x1).hypot(y2 - y1);
        if distance < (r1 - r2).abs() {
            debug!("两圆无交点（一圆包含另一圆），使用加权质心");
            return Self::weighted_centroid(nearest, weight_exponent);
        }
        if distance > r1 + r2 {
            debug!("两圆无交点（测量误差导致相离），使用加权质心");
            return Self::weighted_centroid(nearest, weight_exponent);
        }
        if distance == 0.0 {
            debug!("两锚点重合，使用加权质心");
            return Self::weighted_centroid(nearest, weight_exponent);
        }

        // 交点连线与圆心连线的交点 p
        let a = (r1 * r1 - r2 * r2 + distance * distance) / (2.0 * distance);
        let px = x1 + (a / distance) * (x2 - x1);
        let py = y1 + (a / distance) * (y2 - y1);

        if distance == r1 + r2 {
            return Ok(Coordinates::new(px, py));
        }

        let h = (r1 * r1 - a * a).max(0.0).sqrt();
        let first_intersection = (
            px + (h / distance) * (y2 - y1),
            py - (h / distance) * (x2 - x1),
        );
        let second_intersection = (
            px - (h / distance) * (y2 - y1),
            py + (h / distance) * (x2 - x1),
        );

        let (x, y) = if euclidean(first_intersection, third.position())
            < euclidean(second_intersection, third.position())
        {
            first_intersection
        } else {
            second_intersection
        };
        Ok(Coordinates::new(x, y))
    }

    /// 线性三边定位 - 三个圆方程两两相减得到线性方程组
    ///
    /// 三锚点共线时方程组奇异，返回几何退化错误。
    pub fn trilateration_linear(nearest: &[RangedAnchor; 3]) -> Result<Coordinates, PositioningError> {
        let [(a1, b1, c1), (a2, b2, c2), (a3, b3, c3)] = nearest.map(|anchor| {
            let r = anchor.radius_cm();
            (
                -2.0 * anchor.x,
                -2.0 * anchor.y,
                anchor.x * anchor.x + anchor.y * anchor.y - r * r,
            )
        });

        let t1 = (a1 - a2) * (b2 - b3);
        let t2 = (a2 - a3) * (b1 - b2);
        let denominator = t1 - t2;
        if denominator.abs() <= COLLINEAR_TOLERANCE * t1.abs().max(t2.abs()) {
            return Err(PositioningError::degenerate("三个锚点共线"));
        }

        let x = ((c2 - c1) * (b2 - b3) - (c3 - c2) * (b1 - b2)) / denominator;
        let y = ((c3 - c2) * (a1 - a2) - (c2 - c1) * (a2 - a3)) / denominator;
        Ok(Coordinates::new(x, y))
    }

    /// 加权质心 - 权重为 1 / d^k
    pub fn weighted_centroid(
        anchors: &[RangedAnchor],
        weight_exponent: f64,
    ) -> Result<Coordinates, PositioningError> {
        let mut x = 0.0;
        let mut y = 0.0;
        let mut weight_sum = 0.0;

        for anchor in anchors {
            let weight = 1.0 / anchor.distance.powf(weight_exponent);
            x += anchor.x * weight;
            y += anchor.y * weight;
            weight_sum += weight;
        }

        if weight_sum == 0.0 {
            return Err(PositioningError::MissingAnchorData { address: None });
        }

        let (x, y) = (x / weight_sum, y / weight_sum);
        if !x.is_finite() || !y.is_finite() {
            return Err(PositioningError::degenerate("加权质心权重无效"));
        }
        Ok(Coordinates::new(x, y))
    }

    /// 概率网格搜索 - 穷举楼层内每个格子，取联合似然最大者
    ///
    /// 似然相同时先扫描到的格子胜出。
    pub fn probability_grid(
        anchors: &[RangedAnchor],
        grid: &SearchGrid,
        pdf_sharpness: f64,
    ) -> Result<Coordinates, PositioningError> {
        let mut best: Option<(f64, (f64, f64))> = None;

        for cell in grid.cells() {
            let probability = Self::likelihood(cell, anchors, pdf_sharpness);
            if best.is_none_or(|(max, _)| probability > max) {
                best = Some((probability, cell));
            }
        }

        match best {
            Some((_, (x, y))) => Ok(Coordinates::new(x, y)),
            None => Err(PositioningError::degenerate("搜索区域内没有格子")),
        }
    }

    /// 位置 `point` 的联合似然: Π 1 / ((|point - anchor| - d)^2 + s)
    pub fn likelihood(point: (f64, f64), anchors: &[RangedAnchor], pdf_sharpness: f64) -> f64 {
        anchors
            .iter()
            .map(|anchor| {
                let distance = euclidean(point, anchor.position()) / CENTIMETERS_PER_METER;
                1.0 / ((distance - anchor.distance).powi(2) + pdf_sharpness)
            })
            .product()
    }
}
