/// 实时定位：蓝牙扫描任务与定位消费循环
///
/// 扫描任务按固定间隔轮询适配器，每轮结果作为一个扫描周期发送到通道；
/// 定位循环是唯一的消费者，独占引擎及全部 RSSI 历史。

use crate::algorithms::{BeaconReading, Coordinates, DEFAULT_TX_POWER};
use crate::error::ScanError;
use crate::positioning::PositioningEngine;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 扫描任务配置
#[derive(Clone, Debug)]
pub struct ScannerConfig {
    /// 轮询间隔
    pub interval: Duration,
    /// 设备名称过滤，None 表示不过滤
    pub name_pattern: Option<Regex>,
    /// 广播包未携带发射功率时的默认值
    pub default_tx_power: i16,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            interval: Duration::from_millis(500),
            name_pattern: None,
            default_tx_power: DEFAULT_TX_POWER,
        }
    }
}

impl ScannerConfig {
    /// 按名称过滤并转换为信标读数；没有 RSSI 的设备跳过
    pub fn reading(
        &self,
        address: &str,
        name: Option<&str>,
        rssi: Option<i16>,
        tx_power: Option<i16>,
        timestamp: DateTime<Utc>,
    ) -> Option<BeaconReading> {
        if let Some(pattern) = &self.name_pattern {
            if !name.is_some_and(|name| pattern.is_match(name)) {
                return None;
            }
        }

        let reading = BeaconReading::with_timestamp(address.to_ascii_uppercase(), rssi?, timestamp)
            .with_tx_power(tx_power.unwrap_or(self.default_tx_power));
        Some(reading)
    }
}

/// 打开平台蓝牙管理器并取第一个适配器
pub async fn first_adapter() -> Result<Adapter, ScanError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(ScanError::NoAdapter)
}

/// 启动蓝牙扫描任务
///
/// 接收端关闭后停止扫描并返回 `ScanError::ChannelClosed`。
pub fn spawn_ble_scanner(
    adapter: Adapter,
    config: ScannerConfig,
    sender: mpsc::Sender<Vec<BeaconReading>>,
) -> JoinHandle<Result<(), ScanError>> {
    tokio::spawn(async move {
        adapter.start_scan(ScanFilter::default()).await?;
        info!(interval_ms = config.interval.as_millis() as u64, "蓝牙扫描已启动");

        let result = loop {
            sleep(config.interval).await;

            let cycle = match scan_cycle(&adapter, &config).await {
                Ok(cycle) => cycle,
                Err(e) => {
                    warn!("获取外设失败: {}", e);
                    continue;
                }
            };
            debug!(beacons = cycle.len(), "扫描周期完成");

            if sender.send(cycle).await.is_err() {
                break Err(ScanError::ChannelClosed);
            }
        };

        if let Err(e) = adapter.stop_scan().await {
            warn!("停止扫描失败: {}", e);
        }
        result
    })
}

async fn scan_cycle(adapter: &Adapter, config: &ScannerConfig) -> Result<Vec<BeaconReading>, ScanError> {
    let now = Utc::now();
    let mut cycle = Vec::new();

    for peripheral in adapter.peripherals().await? {
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        let address = properties.address.to_string();
        if let Some(reading) = config.reading(
            &address,
            properties.local_name.as_deref(),
            properties.rssi,
            properties.tx_power_level,
            now,
        ) {
            cycle.push(reading);
        }
    }
    Ok(cycle)
}

/// 定位消费循环
///
/// 每个扫描周期先记录测量再定位；定位失败只跳过本周期。
/// 输入通道关闭（或输出通道关闭）时结束并交还引擎。
pub async fn run_positioning_loop(
    mut engine: PositioningEngine,
    mut cycles: mpsc::Receiver<Vec<BeaconReading>>,
    positions: mpsc::Sender<Coordinates>,
) -> PositioningEngine {
    while let Some(cycle) = cycles.recv().await {
        match engine.process_cycle(&cycle) {
            Ok(position) => {
                if positions.send(position).await.is_err() {
                    debug!("定位结果接收端已关闭");
                    break;
                }
            }
            Err(e) => debug!(beacons = cycle.len(), "跳过本周期: {}", e),
        }
    }
    engine
}
