/// 离线轨迹回放与参数扫描
///
/// 每条轨迹目录包含 `measurements.json`（信标测量记录）和 `trace.json`（真值轨迹时间戳）。
/// 测量记录按时间排序后切分为扫描周期，每个周期对全部参数组合各定位一次，
/// 每个参数组合的结果写入一个 JSON 文件。

use crate::algorithms::{
    BeaconReading, DistanceMethod, DistanceModel, PositionTrace, RssiHistory,
};
use crate::config::Parameters;
use crate::error::ReplayError;
use crate::positioning::{PositioningEngine, PositioningMethod};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 相邻测量间隔超过该值 (ms) 视为新的扫描周期
pub const SCAN_PERIOD_THRESHOLD_MS: i64 = 400;

pub const MEASUREMENTS_FILE: &str = "measurements.json";
pub const GROUND_TRUTH_FILE: &str = "trace.json";

/// 未使用的调优参数取值
const UNUSED: f64 = -1.0;

// ============================================================================
// 记录文件
// ============================================================================

/// 一条信标测量记录
#[derive(Clone, Debug, Deserialize)]
pub struct MeasurementRecord {
    pub beacon_address: String,
    pub rssi: i16,
    #[serde(rename = "system.totimestamp(timeuuid)")]
    pub time: DateTime<Utc>,
}

impl MeasurementRecord {
    fn into_reading(self) -> BeaconReading {
        BeaconReading::with_timestamp(self.beacon_address.to_ascii_uppercase(), self.rssi, self.time)
    }
}

/// 一条真值轨迹记录（只关心时间）
#[derive(Clone, Debug, Deserialize)]
pub struct GroundTruthRecord {
    #[serde(rename = "system.totimestamp(timeuuid)")]
    pub time: DateTime<Utc>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ReplayError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// 读取测量记录并按时间升序（稳定）排序
pub fn load_measurements(path: impl AsRef<Path>) -> Result<Vec<BeaconReading>, ReplayError> {
    let mut records: Vec<MeasurementRecord> = read_json(path.as_ref())?;
    records.sort_by_key(|record| record.time);
    Ok(records.into_iter().map(MeasurementRecord::into_reading).collect())
}

/// 读取真值轨迹时间戳（升序）
pub fn load_ground_truth(path: impl AsRef<Path>) -> Result<Vec<DateTime<Utc>>, ReplayError> {
    let records: Vec<GroundTruthRecord> = read_json(path.as_ref())?;
    let mut timestamps: Vec<_> = records.into_iter().map(|record| record.time).collect();
    timestamps.sort();
    Ok(timestamps)
}

/// 按时间间隔切分扫描周期
///
/// 与上一条测量间隔超过 400 ms 时开始新周期；最后一个周期保留，不产生空周期。
pub fn group_scan_cycles(readings: Vec<BeaconReading>) -> Vec<Vec<BeaconReading>> {
    let mut cycles = Vec::new();
    let mut buffer: Vec<BeaconReading> = Vec::new();

    for reading in readings {
        let gap = buffer
            .last()
            .and_then(|previous| Some((reading.timestamp? - previous.timestamp?).num_milliseconds()));

        if gap.is_some_and(|gap| gap > SCAN_PERIOD_THRESHOLD_MS) {
            cycles.push(std::mem::take(&mut buffer));
        }
        buffer.push(reading);
    }
    if !buffer.is_empty() {
        cycles.push(buffer);
    }
    cycles
}

// ============================================================================
// 参数网格
// ============================================================================

/// 参数扫描网格
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterGrid {
    pub window_sizes: Vec<usize>,
    /// 窗口大于 1 时使用的滤波方式；窗口为 1 时固定为原始值
    pub distance_methods: Vec<DistanceMethod>,
    pub distance_models: Vec<DistanceModel>,
    /// 仅用于路径损耗模型，拟合模型记为 -1
    pub path_loss_exponents: Vec<f64>,
    pub positioning_methods: Vec<PositioningMethod>,
    pub weight_exponents: Vec<f64>,
    pub pdf_sharpness: Vec<f64>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        ParameterGrid {
            window_sizes: vec![1, 5, RssiHistory::CAPACITY],
            distance_methods: vec![DistanceMethod::Mean, DistanceMethod::Median, DistanceMethod::Mode],
            distance_models: DistanceModel::ALL.to_vec(),
            path_loss_exponents: steps(1.5, 0.1, 21),
            positioning_methods: vec![
                PositioningMethod::Trilateration,
                PositioningMethod::WeightedCentroid,
                PositioningMethod::Probability,
            ],
            weight_exponents: steps(0.5, 0.5, 7),
            pdf_sharpness: steps(0.5, 0.5, 7),
        }
    }
}

/// start, start + step, ...（共 count 个，按一位小数取整避免累加误差）
fn steps(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| ((start + step * i as f64) * 10.0).round() / 10.0)
        .collect()
}

impl ParameterGrid {
    /// 展开全部参数组合
    ///
    /// 顺序：窗口 -> 滤波方式 -> 距离模型 -> 路径损耗指数 -> 定位方法 -> 调优参数。
    pub fn combinations(&self) -> Vec<Parameters> {
        let mut combinations = Vec::new();

        for &window_size in &self.window_sizes {
            let methods = if window_size == 1 {
                vec![DistanceMethod::Raw]
            } else {
                self.distance_methods.clone()
            };

            for &distance_method in &methods {
                for &distance_model in &self.distance_models {
                    let exponents = match distance_model {
                        DistanceModel::PathLoss => self.path_loss_exponents.clone(),
                        _ => vec![UNUSED],
                    };

                    for &path_loss_exponent in &exponents {
                        for &positioning_method in &self.positioning_methods {
                            let tuning: Vec<(f64, f64)> = match positioning_method {
                                PositioningMethod::WeightedCentroid => {
                                    self.weight_exponents.iter().map(|&w| (w, UNUSED)).collect()
                                }
                                PositioningMethod::Probability => {
                                    self.pdf_sharpness.iter().map(|&s| (UNUSED, s)).collect()
                                }
                                _ => vec![(UNUSED, UNUSED)],
                            };

                            for (weight_exponent, pdf_sharpness) in tuning {
                                combinations.push(Parameters {
                                    window_size,
                                    distance_method,
                                    distance_model,
                                    path_loss_exponent,
                                    positioning_method,
                                    weight_exponent,
                                    pdf_sharpness,
                                });
                            }
                        }
                    }
                }
            }
        }
        combinations
    }
}

// ============================================================================
// 回放
// ============================================================================

/// 回放一条轨迹的全部扫描周期
///
/// 开始前清空 RSSI 历史；每个周期只记录一次测量，然后逐个参数组合定位，
/// 失败的组合在该周期没有输出。
pub fn replay_trace(
    engine: &mut PositioningEngine,
    cycles: &[Vec<BeaconReading>],
    combinations: &[Parameters],
) -> HashMap<Parameters, PositionTrace> {
    engine.reset();
    let mut traces: HashMap<Parameters, PositionTrace> = HashMap::new();

    for cycle in cycles {
        engine.ingest(cycle);

        for parameters in combinations {
            engine.apply(parameters);
            match engine.locate(cycle) {
                Ok(position) => traces.entry(*parameters).or_default().push(position),
                Err(e) => debug!(%parameters, "定位失败: {}", e),
            }
        }
    }
    traces
}

/// 写出一个参数组合的轨迹：`<dir>/<文件名>.json`
pub fn write_trace(
    dir: &Path,
    parameters: &Parameters,
    trace: &PositionTrace,
    timestamps: &[DateTime<Utc>],
) -> Result<PathBuf, ReplayError> {
    let points = trace.align(timestamps).ok_or(ReplayError::TimestampMismatch {
        results: trace.len(),
        timestamps: timestamps.len(),
    })?;

    let path = dir.join(format!("{}.json", parameters.to_file_name()));
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(&mut writer, &points)?;
    writer.flush()?;
    Ok(path)
}

/// 单条轨迹的回放统计
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub name: String,
    pub cycles: usize,
    pub written: usize,
    /// 因真值时间戳不足而跳过的参数组合
    pub skipped: usize,
}

/// 回放一个轨迹目录并写出结果到 `<out_dir>/<轨迹名>/`
pub fn replay_trace_dir(
    engine: &mut PositioningEngine,
    trace_dir: &Path,
    out_dir: &Path,
    combinations: &[Parameters],
) -> Result<TraceSummary, ReplayError> {
    let name = trace_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let readings = load_measurements(trace_dir.join(MEASUREMENTS_FILE))?;
    let cycles = group_scan_cycles(readings);
    let timestamps = load_ground_truth(trace_dir.join(GROUND_TRUTH_FILE))?;
    info!(trace = %name, cycles = cycles.len(), timestamps = timestamps.len(), "开始回放");

    let traces = replay_trace(engine, &cycles, combinations);

    let target = out_dir.join(&name);
    fs::create_dir_all(&target)?;

    let mut summary = TraceSummary {
        name,
        cycles: cycles.len(),
        ..TraceSummary::default()
    };
    for (parameters, trace) in &traces {
        match write_trace(&target, parameters, trace, &timestamps) {
            Ok(_) => summary.written += 1,
            Err(e @ ReplayError::TimestampMismatch { .. }) => {
                warn!(trace = %summary.name, %parameters, "{}", e);
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(trace = %summary.name, written = summary.written, skipped = summary.skipped, "回放完成");
    Ok(summary)
}

/// 回放 `traces_dir` 下每个包含测量文件的子目录（按名称排序）
///
/// 单条轨迹失败只记录警告，继续下一条。
pub fn replay_directory(
    engine: &mut PositioningEngine,
    traces_dir: &Path,
    out_dir: &Path,
    grid: &ParameterGrid,
) -> Result<Vec<TraceSummary>, ReplayError> {
    let mut trace_dirs: Vec<PathBuf> = fs::read_dir(traces_dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.join(MEASUREMENTS_FILE).is_file())
        .collect();
    trace_dirs.sort();

    let combinations = grid.combinations();
    info!(traces = trace_dirs.len(), combinations = combinations.len(), "参数扫描");

    let mut summaries = Vec::with_capacity(trace_dirs.len());
    for trace_dir in &trace_dirs {
        match replay_trace_dir(engine, trace_dir, out_dir, &combinations) {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(trace = %trace_dir.display(), "回放失败: {}", e),
        }
    }
    Ok(summaries)
}
