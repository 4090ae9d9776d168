/// 命令行接口
///
/// - `replay`：回放轨迹目录并扫描参数组合
/// - `live`：实时蓝牙扫描定位
/// - `locate`：对单个扫描周期定位

use crate::algorithms::BeaconReading;
use crate::config::EngineConfig;
use crate::positioning::{PositioningEngine, PositioningMethod};
use crate::replay::{self, ParameterGrid};
use crate::scanner::{self, ScannerConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// 扫描周期通道容量
const CHANNEL_CAPACITY: usize = 16;

/// 蓝牙信标室内定位工具
#[derive(Parser, Debug)]
#[command(name = "bleloc")]
#[command(author, version, about = "BLE beacon indoor positioning")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 引擎配置文件（JSON），缺省时使用参考安装环境与默认参数
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 回放轨迹并扫描全部参数组合
    Replay(ReplayArgs),

    /// 实时蓝牙扫描定位
    Live(LiveArgs),

    /// 对一个扫描周期定位
    Locate(LocateArgs),
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// 轨迹根目录（每个子目录包含 measurements.json 与 trace.json）
    pub traces: PathBuf,

    /// 输出目录
    #[arg(short, long, default_value = "replayed-traces")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    /// 设备名称过滤正则
    #[arg(short, long)]
    pub name: Option<String>,

    /// 轮询间隔（毫秒）
    #[arg(short, long, default_value = "500")]
    pub interval: u64,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    /// 信标读数，格式为 地址=RSSI，例如 20:18:FF:00:40:2E=-70
    #[arg(short, long = "reading", value_parser = parse_reading, required = true)]
    pub readings: Vec<BeaconReading>,

    /// 定位方法，缺省时使用配置中的方法
    #[arg(short, long)]
    pub method: Option<PositioningMethod>,
}

/// 解析 `地址=RSSI`
fn parse_reading(s: &str) -> Result<BeaconReading, String> {
    let (address, rssi) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("读数格式应为 地址=RSSI: \"{}\"", s))?;
    let address = crate::algorithms::normalize_address(address).map_err(|e| e.to_string())?;
    let rssi: i16 = rssi
        .trim()
        .parse()
        .map_err(|e| format!("无效的 RSSI \"{}\": {}", rssi, e))?;
    Ok(BeaconReading::new(address, rssi))
}

/// 加载配置并创建引擎
pub fn load_engine(config: Option<&Path>) -> Result<PositioningEngine> {
    let config = match config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(PositioningEngine::from_config(&config)?)
}

pub async fn execute(cli: Cli) -> Result<()> {
    let mut engine = load_engine(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay(args) => replay(&mut engine, args),
        Commands::Live(args) => live(engine, args).await,
        Commands::Locate(args) => locate(&mut engine, args),
    }
}

fn replay(engine: &mut PositioningEngine, args: ReplayArgs) -> Result<()> {
    let summaries = replay::replay_directory(engine, &args.traces, &args.output, &ParameterGrid::default())
        .with_context(|| format!("无法读取轨迹目录 {}", args.traces.display()))?;

    for summary in &summaries {
        println!(
            "{}: {} 个扫描周期，写出 {} 个结果文件，跳过 {} 个",
            summary.name, summary.cycles, summary.written, summary.skipped
        );
    }
    Ok(())
}

async fn live(engine: PositioningEngine, args: LiveArgs) -> Result<()> {
    let name_pattern = args
        .name
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("无效的设备名称过滤正则")?;
    let config = ScannerConfig {
        interval: Duration::from_millis(args.interval),
        name_pattern,
        ..ScannerConfig::default()
    };

    let adapter = scanner::first_adapter().await?;
    let (cycle_tx, cycle_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (position_tx, mut position_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let scan = scanner::spawn_ble_scanner(adapter, config, cycle_tx);
    let positioning = tokio::spawn(scanner::run_positioning_loop(engine, cycle_rx, position_tx));
    info!("实时定位已启动，Ctrl+C 退出");

    loop {
        tokio::select! {
            position = position_rx.recv() => match position {
                Some(position) => println!("位置: {}", position),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // 中止扫描任务会释放周期发送端，定位循环处理完缓冲的周期后结束
    drop(position_rx);
    scan.abort();
    let _engine = positioning.await?;
    info!("实时定位已停止");
    Ok(())
}

fn locate(engine: &mut PositioningEngine, args: LocateArgs) -> Result<()> {
    engine.ingest(&args.readings);
    let position = match args.method {
        Some(method) => engine.locate_with(&args.readings, method),
        None => engine.locate(&args.readings),
    }?;
    println!("{}", position);
    Ok(())
}
