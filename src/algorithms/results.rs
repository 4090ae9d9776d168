/// 定位结果数据结构
///
/// 包含定位输出坐标、置信度以及回放轨迹的序列化格式

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 定位坐标（厘米）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    /// 置信度，大致位于 [0, 1]；-1 表示未设置
    pub confidence: f64,
}

impl Coordinates {
    /// 未设置置信度的标记值
    pub const UNSET_CONFIDENCE: f64 = -1.0;

    pub fn new(x: f64, y: f64) -> Self {
        Coordinates {
            x,
            y,
            confidence: Self::UNSET_CONFIDENCE,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn has_confidence(&self) -> bool {
        self.confidence != Self::UNSET_CONFIDENCE
    }

    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

pub(crate) fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_confidence() {
            write!(
                f,
                "({:.2}, {:.2}) [{:.1}%]",
                self.x,
                self.y,
                self.confidence * 100.0
            )
        } else {
            write!(f, "({:.2}, {:.2})", self.x, self.y)
        }
    }
}

/// 回放轨迹输出的单个点
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    /// 对应真值轨迹的时间戳
    pub time: String,
}

/// 定位结果序列（一组参数在一条轨迹上的全部输出）
#[derive(Clone, Debug, Default)]
pub struct PositionTrace {
    results: Vec<Coordinates>,
}

impl PositionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: Coordinates) {
        self.results.push(result);
    }

    pub fn last(&self) -> Option<&Coordinates> {
        self.results.last()
    }

    pub fn all(&self) -> &[Coordinates] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 按下标与真值时间戳对齐：第 i 个结果对应第 i 个时间戳
    ///
    /// 时间戳不足时返回 None。
    pub fn align(&self, timestamps: &[DateTime<Utc>]) -> Option<Vec<TracePoint>> {
        if timestamps.len() < self.results.len() {
            return None;
        }

        let points = self
            .results
            .iter()
            .zip(timestamps)
            .map(|(c, t)| TracePoint {
                x: c.x,
                y: c.y,
                confidence: c.confidence,
                time: t.to_rfc3339_opts(SecondsFormat::Millis, true),
            })
            .collect();
        Some(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_confidence_sentinel() {
        let c = Coordinates::new(1.0, 2.0);
        assert!(!c.has_confidence());
        assert_eq!(c.confidence, -1.0);
        assert!(c.with_confidence(0.4).has_confidence());
    }

    #[test]
    fn test_distance_calculation() {
        assert_eq!(euclidean((0.0, 0.0), (3.0, 4.0)), 5.0);
        assert_eq!(euclidean((-1.0, 2.0), (-1.0, 2.0)), 0.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Coordinates::new(1.0, 2.5).to_string(), "(1.00, 2.50)");
        assert_eq!(
            Coordinates::new(1.0, 2.5).with_confidence(0.5).to_string(),
            "(1.00, 2.50) [50.0%]"
        );
    }

    #[test]
    fn test_align_by_index() {
        let mut trace = PositionTrace::new();
        trace.push(Coordinates::new(10.0, 20.0).with_confidence(0.5));
        trace.push(Coordinates::new(11.0, 21.0).with_confidence(0.6));

        let t0 = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::milliseconds(1500);
        let t2 = t0 + chrono::Duration::milliseconds(3000);

        let points = trace.align(&[t0, t1, t2]).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].time, "2021-03-01T12:00:00.000Z");
        assert_eq!(points[1].time, "2021-03-01T12:00:01.500Z");
        assert_eq!(points[1].x, 11.0);

        assert!(trace.align(&[t0]).is_none());
    }
}
