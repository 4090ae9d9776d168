/// 距离估计器
///
/// 维护每个信标的 RSSI 历史，按所选滤波方式和距离模型估计距离，
/// 并给出定位置信度。估计器从不返回错误：缺少数据时返回 0 值。

use crate::algorithms::{AnchorMap, BeaconReading, DistanceMethod, DistanceModel, RssiHistory};
use crate::config::DistanceSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 距离置信度的 RSSI 线性插值区间 (dBm)
const MINIMUM_RSSI: f64 = -100.0;
const MAXIMUM_RSSI: f64 = -40.0;

pub struct DistanceEstimator {
    histories: HashMap<String, RssiHistory>,
    anchors: Arc<AnchorMap>,
    settings: DistanceSettings,
}

impl DistanceEstimator {
    pub fn new(anchors: Arc<AnchorMap>, settings: DistanceSettings) -> Self {
        DistanceEstimator {
            histories: HashMap::new(),
            anchors,
            settings,
        }
    }

    pub fn settings(&self) -> &DistanceSettings {
        &self.settings
    }

    /// 更新默认参数（不影响已有历史）
    pub fn update_settings(&mut self, settings: DistanceSettings) {
        debug!(
            model = %settings.distance_model,
            method = %settings.distance_method,
            window_size = settings.window_size,
            path_loss_exponent = settings.path_loss_exponent,
            "距离参数已更新"
        );
        self.settings = settings;
    }

    /// 记录一次测量，历史满时丢弃最旧样本
    pub fn add_measurement(&mut self, address: &str, rssi: i16) {
        self.histories
            .entry(address.to_string())
            .or_insert_with(RssiHistory::new)
            .push(rssi);
    }

    /// 记录一个扫描周期的全部测量
    pub fn add_measurements(&mut self, readings: &[BeaconReading]) {
        for reading in readings {
            self.add_measurement(&reading.address, reading.rssi);
        }
    }

    /// 清空全部历史（会话或回放轨迹之间必须调用）
    pub fn reset(&mut self) {
        self.histories.clear();
    }

    pub fn history(&self, address: &str) -> Option<&RssiHistory> {
        self.histories.get(address)
    }

    /// 使用默认参数的滤波 RSSI
    pub fn filtered_rssi(&self, reading: &BeaconReading) -> f64 {
        self.filtered_rssi_with(
            reading,
            self.settings.distance_method,
            self.settings.window_size,
        )
    }

    /// 滤波后的 RSSI；无历史时均值、中位数、众数均返回 0
    pub fn filtered_rssi_with(
        &self,
        reading: &BeaconReading,
        method: DistanceMethod,
        window_size: usize,
    ) -> f64 {
        let history = self.histories.get(&reading.address);

        match method {
            DistanceMethod::Mean | DistanceMethod::Average => history
                .and_then(|h| h.mean(window_size, self.settings.mean_divisor))
                .unwrap_or(0.0),
            DistanceMethod::Median => history.and_then(|h| h.median(window_size)).unwrap_or(0.0),
            DistanceMethod::Mode => match history {
                None => 0.0,
                Some(h) if h.is_empty() => 0.0,
                Some(h) => match h.mode(window_size) {
                    Some(mode) => f64::from(mode),
                    None => {
                        debug!(address = %reading.address, "无众数，使用中位数");
                        h.median(window_size).unwrap_or(0.0)
                    }
                },
            },
            DistanceMethod::Raw => f64::from(reading.rssi),
        }
    }

    /// 使用默认参数估计距离（米）
    pub fn distance(&self, reading: &BeaconReading) -> f64 {
        self.distance_with(
            reading,
            self.settings.distance_model,
            self.settings.distance_method,
            self.settings.window_size,
            self.settings.path_loss_exponent,
        )
    }

    /// 估计距离（米）
    ///
    /// 优先使用锚点表中的校准发射功率，否则使用广播包中的值。
    pub fn distance_with(
        &self,
        reading: &BeaconReading,
        model: DistanceModel,
        method: DistanceMethod,
        window_size: usize,
        path_loss_exponent: f64,
    ) -> f64 {
        let tx_power = self
            .anchors
            .tx_power(&reading.address)
            .unwrap_or(reading.observed_tx_power);

        let rssi = self.filtered_rssi_with(reading, method, window_size);
        model.distance(rssi, tx_power, path_loss_exponent)
    }

    /// 定位置信度：标准差置信度与信号强度置信度的平均值
    ///
    /// 少于 3 个信标时返回 0。
    pub fn confidence(&self, beacons: &[&BeaconReading]) -> f64 {
        if beacons.len() < 3 {
            return 0.0;
        }

        let deviation = self.deviation_confidence(beacons);
        let distance = self.distance_confidence(beacons);
        debug!(deviation, distance, "置信度");

        (deviation + distance) / 2.0
    }

    /// exp(-平均标准差)；无历史的信标跳过，但仍计入除数
    fn deviation_confidence(&self, beacons: &[&BeaconReading]) -> f64 {
        let window_size = self.settings.window_size;

        let total: f64 = beacons
            .iter()
            .filter_map(|beacon| self.histories.get(&beacon.address))
            .filter_map(|history| {
                let mean = history.mean(window_size, self.settings.mean_divisor)?;
                history.std_dev(window_size, mean)
            })
            .sum();

        (-(total / beacons.len() as f64)).exp()
    }

    /// 平均滤波 RSSI 在 [-100, -40] dBm 之间线性插值，区间外不截断
    fn distance_confidence(&self, beacons: &[&BeaconReading]) -> f64 {
        let slope = 1.0 / (MAXIMUM_RSSI - MINIMUM_RSSI);
        let intercept = -(slope * MINIMUM_RSSI);

        let average_rssi = beacons
            .iter()
            .map(|beacon| self.filtered_rssi(beacon))
            .sum::<f64>()
            / beacons.len() as f64;

        slope * average_rssi + intercept
    }
}
