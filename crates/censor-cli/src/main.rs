mod batch;

use anyhow::{Context, Result};
use censor_core::rules::{builtin_rule_set, load_rule_set};
use censor_core::{Config, Detector, RuleSet};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 默认规则文件路径；不存在时回退到内置规则
const DEFAULT_RULES_PATH: &str = "./rules/default.toml";

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "censor", version, about = "Streaming sensitive-content detector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描文件、目录或标准输入并生成 JSON 结果
    Scan {
        /// 输入文件或目录；"-" 表示标准输入
        #[arg(long)]
        input: PathBuf,

        /// 输出文件（JSON 数组）
        #[arg(long, default_value = "./result.json")]
        output: PathBuf,

        /// 规则文件路径（TOML），默认 ./rules/default.toml
        #[arg(long)]
        rules: Option<PathBuf>,

        /// 检测器配置文件（TOML）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 并行扫描的文件数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 单个块内规则并行评估的工作者数，覆盖配置文件
        #[arg(long)]
        concurrency: Option<u16>,

        /// 每次读取的块大小（字节），覆盖配置文件
        #[arg(long)]
        chunk_size: Option<u32>,

        /// 严格模式：有命中即以失败退出（结果仍完整写出）
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { input, output, rules, config, threads, concurrency, chunk_size, strict } => {
            info!(?input, ?output, "starting scan");

            let mut cfg = match &config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            if let Some(c) = concurrency { cfg.concurrency = c; }
            if let Some(c) = chunk_size { cfg.chunk_size = c; }
            cfg.strict_mode |= strict;

            let rule_set = resolve_rules(rules.as_deref())?;
            info!(rules = rule_set.len(), max_match_span = rule_set.max_match_span(), "rules ready");
            let detector = Detector::with_rules(cfg, rule_set).context("build detector")?;

            // 以缓冲方式打开输出文件，按 JSON 数组流式写入
            let mut out = BufWriter::new(File::create(&output).context("create output file")?);

            let stats = if input.as_os_str() == "-" {
                let stdin = std::io::stdin();
                batch::scan_reader_and_write("-", stdin.lock(), &detector, &mut out)
            } else {
                let files = batch::collect_files(&input)?;
                let threads = parse_threads(&threads).unwrap_or_else(num_cpus::get);
                batch::scan_files_and_write(&files, &detector, &mut out, threads)
            }
            .context("scan and write failed")?;
            out.flush().context("flush output file")?;

            info!(
                sources_scanned = stats.sources_scanned,
                sources_failed = stats.sources_failed,
                matches_written = stats.matches_written,
                "scan finished"
            );
            if stats.strict_violations > 0 {
                anyhow::bail!(
                    "detection failed: sensitive content found in {} input(s) (strict mode)",
                    stats.strict_violations
                );
            }
        }
    }

    Ok(())
}

/// 选择规则来源：显式文件 → 默认路径文件 → 内置规则
fn resolve_rules(explicit: Option<&Path>) -> Result<RuleSet> {
    if let Some(path) = explicit {
        return load_rule_set(path);
    }
    let default_path = Path::new(DEFAULT_RULES_PATH);
    if default_path.is_file() {
        return load_rule_set(default_path);
    }
    warn!(path = DEFAULT_RULES_PATH, "rules file not found, using built-in rules");
    Ok(builtin_rule_set()?)
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") { return None; }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
