/// 轨迹回放端到端测试
///
/// 在临时目录中生成测量记录与真值轨迹，回放后检查输出文件的数量、命名与时间对齐。

use bleloc::algorithms::{AnchorMap, DistanceMethod, DistanceModel};
use bleloc::replay::{
    self, GROUND_TRUTH_FILE, MEASUREMENTS_FILE, ParameterGrid, group_scan_cycles,
    load_measurements,
};
use bleloc::{DistanceSettings, PositionSettings, PositioningEngine, PositioningMethod};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const BEACONS: [&str; 4] = [
    "20:18:FF:00:40:2E",
    "20:18:FF:00:40:02",
    "20:18:FF:00:40:08",
    "20:18:FF:00:40:07",
];

fn engine() -> PositioningEngine {
    PositioningEngine::new(
        Arc::new(AnchorMap::reference_installation()),
        DistanceSettings::default(),
        PositionSettings::default(),
    )
}

fn timestamp(ms: u64) -> String {
    format!("2021-03-01T12:{:02}:{:02}.{:03}Z", ms / 60_000, (ms / 1000) % 60, ms % 1000)
}

/// 三个扫描周期（间隔 500 ms），每个周期 4 个信标；记录顺序打乱
fn write_trace(dir: &Path, ground_truth_points: usize) {
    fs::create_dir_all(dir).unwrap();

    let mut measurements = Vec::new();
    for cycle in (0..3u64).rev() {
        for (i, address) in BEACONS.iter().enumerate() {
            measurements.push(json!({
                "beacon_address": address.to_lowercase(),
                "rssi": -60 - 4 * i as i64 - cycle as i64,
                "system.totimestamp(timeuuid)": timestamp(1000 + cycle * 500 + i as u64 * 20),
            }));
        }
    }
    fs::write(dir.join(MEASUREMENTS_FILE), Value::Array(measurements).to_string()).unwrap();

    let truth: Vec<Value> = (0..ground_truth_points as u64)
        .rev()
        .map(|i| json!({"x": 100 * i, "y": 400, "system.totimestamp(timeuuid)": timestamp(1200 + i * 500)}))
        .collect();
    fs::write(dir.join(GROUND_TRUTH_FILE), Value::Array(truth).to_string()).unwrap();
}

fn small_grid() -> ParameterGrid {
    ParameterGrid {
        window_sizes: vec![1, 5],
        distance_methods: vec![DistanceMethod::Median],
        distance_models: vec![DistanceModel::PathLoss, DistanceModel::FittedLos],
        path_loss_exponents: vec![2.0],
        positioning_methods: vec![PositioningMethod::Trilateration, PositioningMethod::WeightedCentroid],
        weight_exponents: vec![1.0, 2.0],
        pdf_sharpness: vec![0.5],
    }
}

#[test]
fn test_measurements_sorted_and_grouped() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("trace1");
    write_trace(&dir, 3);

    let readings = load_measurements(dir.join(MEASUREMENTS_FILE)).unwrap();
    assert_eq!(readings.len(), 12);
    assert!(readings.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(readings[0].address, "20:18:FF:00:40:2E");

    let cycles = group_scan_cycles(readings);
    assert_eq!(cycles.len(), 3);
    assert!(cycles.iter().all(|cycle| cycle.len() == 4));
}

#[test]
fn test_replay_directory_writes_one_file_per_combination() {
    let temp = TempDir::new().unwrap();
    let traces = temp.path().join("traces");
    let output = temp.path().join("replayed-traces");
    write_trace(&traces.join("trace1"), 3);
    // 没有测量文件的目录被忽略
    fs::create_dir_all(traces.join("notes")).unwrap();

    let grid = small_grid();
    let combinations = grid.combinations();
    // (窗口 1 + 窗口 5) * 2 个模型 * (1 + 2) 个定位组合
    assert_eq!(combinations.len(), 12);

    let mut engine = engine();
    let summaries = replay::replay_directory(&mut engine, &traces, &output, &grid).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "trace1");
    assert_eq!(summaries[0].cycles, 3);
    assert_eq!(summaries[0].written, combinations.len());
    assert_eq!(summaries[0].skipped, 0);

    let written = fs::read_dir(output.join("trace1")).unwrap().count();
    assert_eq!(written, combinations.len());

    let name = "windowSize=5_distanceMethod=MEDIAN_distanceModel=FITTED_LOS_pathLossExponent=-1.0_positioningMethod=WEIGHTED_CENTROID_weightExponent=2.0_pdfSharpness=-1.0.json";
    let content = fs::read_to_string(output.join("trace1").join(name)).unwrap();
    let points: Vec<Value> = serde_json::from_str(&content).unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0]["time"], "2021-03-01T12:00:01.200Z");
    assert_eq!(points[2]["time"], "2021-03-01T12:00:02.200Z");
    assert!(points[0]["x"].as_f64().is_some());
    assert!(points[0]["confidence"].as_f64().unwrap() >= 0.0);

    let raw = "windowSize=1_distanceMethod=-1_distanceModel=PATH_LOSS_pathLossExponent=2.0_positioningMethod=TRILATERATION_weightExponent=-1.0_pdfSharpness=-1.0.json";
    assert!(output.join("trace1").join(raw).is_file());
}

#[test]
fn test_short_ground_truth_skips_combinations() {
    let temp = TempDir::new().unwrap();
    let traces = temp.path().join("traces");
    let output = temp.path().join("out");
    write_trace(&traces.join("trace2"), 2);

    let mut engine = engine();
    let summaries = replay::replay_directory(&mut engine, &traces, &output, &small_grid()).unwrap();
    assert_eq!(summaries[0].written, 0);
    assert_eq!(summaries[0].skipped, 12);
}

#[test]
fn test_replay_resets_histories_between_traces() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("trace1");
    write_trace(&dir, 3);
    let cycles = group_scan_cycles(load_measurements(dir.join(MEASUREMENTS_FILE)).unwrap());
    let combinations = small_grid().combinations();

    let mut engine = engine();
    let first = replay::replay_trace(&mut engine, &cycles, &combinations);
    let second = replay::replay_trace(&mut engine, &cycles, &combinations);

    assert_eq!(first.len(), second.len());
    for (parameters, trace) in &first {
        assert_eq!(trace.all(), second[parameters].all());
    }
}
