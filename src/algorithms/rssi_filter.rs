/// RSSI 滑动窗口滤波
///
/// 每个信标保留最近 `CAPACITY` 个原始 RSSI 样本（先进先出），
/// 滤波时取最近的 `window_size` 个样本，窗口内按时间先后排列。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// 均值滤波的除数策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanDivisor {
    /// 固定除以窗口大小（窗口未满时结果偏向 0，与历史记录数据保持一致）
    #[default]
    Window,
    /// 除以实际样本数
    Available,
}

/// 单个信标的 RSSI 历史
#[derive(Clone, Debug, Default)]
pub struct RssiHistory {
    samples: VecDeque<i16>,
}

impl RssiHistory {
    /// 历史容量，同时也是窗口大小的上限
    pub const CAPACITY: usize = 10;

    pub fn new() -> Self {
        RssiHistory {
            samples: VecDeque::with_capacity(Self::CAPACITY),
        }
    }

    /// 追加样本，满时丢弃最旧的样本
    pub fn push(&mut self, rssi: i16) {
        if self.samples.len() >= Self::CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(rssi);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<i16> {
        self.samples.back().copied()
    }

    /// 最近 `window_size` 个样本，按时间先后
    pub fn window(&self, window_size: usize) -> impl Iterator<Item = i16> + '_ {
        let skip = self.samples.len().saturating_sub(window_size);
        self.samples.iter().skip(skip).copied()
    }

    /// 窗口均值；历史为空时返回 None
    pub fn mean(&self, window_size: usize, divisor: MeanDivisor) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let sum: f64 = self.window(window_size).map(f64::from).sum();
        let count = match divisor {
            MeanDivisor::Window => window_size,
            MeanDivisor::Available => window_size.min(self.samples.len()),
        };
        Some(sum / count.max(1) as f64)
    }

    /// 窗口中位数，窗口大小不超过容量
    pub fn median(&self, window_size: usize) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<i16> = self.window(window_size.min(Self::CAPACITY)).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();

        let middle = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((f64::from(sorted[middle - 1]) + f64::from(sorted[middle])) / 2.0)
        } else {
            Some(f64::from(sorted[middle]))
        }
    }

    /// 窗口众数
    ///
    /// 出现次数相同时先达到该次数的值胜出；所有值均只出现一次时返回 None，
    /// 由调用方退化为中位数。
    pub fn mode(&self, window_size: usize) -> Option<i16> {
        let mut frequencies: HashMap<i16, usize> = HashMap::new();
        let mut mode = None;
        let mut max_count = 0;

        for rssi in self.window(window_size) {
            let count = frequencies.entry(rssi).or_insert(0);
            *count += 1;
            if *count > max_count {
                max_count = *count;
                mode = Some(rssi);
            }
        }

        if max_count <= 1 {
            return None;
        }
        mode
    }

    /// 窗口标准差（以 `mean` 为中心，总体标准差）
    pub fn std_dev(&self, window_size: usize, mean: f64) -> Option<f64> {
        let count = window_size.min(self.samples.len());
        if count == 0 {
            return None;
        }

        let sum_sq: f64 = self
            .window(window_size)
            .map(|rssi| (f64::from(rssi) - mean).powi(2))
            .sum();
        Some((sum_sq / count as f64).sqrt())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn history(values: &[i16]) -> RssiHistory {
        let mut h = RssiHistory::new();
        for &v in values {
            h.push(v);
        }
        h
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let h = history(&[-1, -2, -3, -4, -5, -6, -7, -8, -9, -10, -11, -12]);
        assert_eq!(h.len(), RssiHistory::CAPACITY);
        assert_eq!(h.window(10).next(), Some(-3));
        assert_eq!(h.latest(), Some(-12));
    }

    #[test]
    fn test_window_takes_most_recent() {
        let h = history(&[-90, -80, -70, -60]);
        assert_eq!(h.window(2).collect::<Vec<_>>(), vec![-70, -60]);
        assert_eq!(h.window(9).count(), 4);
    }

    #[test]
    fn test_mean_fixed_divisor_biases_partial_window() {
        let h = history(&[-60, -70]);
        assert_relative_eq!(h.mean(2, MeanDivisor::Window).unwrap(), -65.0);
        assert_relative_eq!(h.mean(4, MeanDivisor::Window).unwrap(), -32.5);
        assert_relative_eq!(h.mean(4, MeanDivisor::Available).unwrap(), -65.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_relative_eq!(history(&[-70, -50, -60]).median(5).unwrap(), -60.0);
        assert_relative_eq!(history(&[-70, -50, -60, -40]).median(5).unwrap(), -55.0);
        // 窗口只取最近两个
        assert_relative_eq!(history(&[-10, -70, -50]).median(2).unwrap(), -60.0);
    }

    #[test]
    fn test_median_window_clamped_to_capacity() {
        let h = history(&[-50, -51, -52, -53, -54, -55, -56, -57, -58, -59]);
        assert_eq!(h.median(20), h.median(RssiHistory::CAPACITY));
    }

    #[test]
    fn test_mode() {
        assert_eq!(history(&[-60, -62, -60, -61]).mode(4), Some(-60));
        // 平局：先出现两次的值胜出
        assert_eq!(history(&[-61, -60, -60, -61]).mode(4), Some(-60));
        assert_eq!(history(&[-60, -61, -62]).mode(3), None);
    }

    #[test]
    fn test_empty_history() {
        let h = RssiHistory::new();
        assert_eq!(h.mean(5, MeanDivisor::Window), None);
        assert_eq!(h.median(5), None);
        assert_eq!(h.mode(5), None);
        assert_eq!(h.std_dev(5, 0.0), None);
    }

    #[test]
    fn test_std_dev() {
        let h = history(&[-60, -62, -64]);
        let mean = h.mean(3, MeanDivisor::Window).unwrap();
        assert_relative_eq!(h.std_dev(3, mean).unwrap(), (8.0_f64 / 3.0).sqrt());
    }
}
