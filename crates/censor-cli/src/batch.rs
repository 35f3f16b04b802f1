//! 批量扫描：遍历输入、并行扫描文件并按稳定顺序流式写出 JSON 数组
use anyhow::{Context, Result};
use censor_core::{Detection, Detector, Match};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// 输出项（result.json 的单个元素）
#[derive(Debug, Serialize)]
struct OutputItem<'a> {
    source: &'a str,
    #[serde(flatten)]
    found: &'a Match,
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub sources_scanned: usize,
    pub sources_failed: usize,
    pub matches_written: usize,
    /// 严格模式下存在命中的输入数
    pub strict_violations: usize,
}

/// 收集待扫描文件：目录递归遍历，按路径排序以保证输出顺序可复现
pub fn collect_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skip unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() && !input.exists() {
        anyhow::bail!("input not found: {}", input.display());
    }
    Ok(files)
}

/// 流式扫描单个输入（stdin 或文件）并写出 JSON 数组
pub fn scan_reader_and_write(
    source: &str,
    reader: impl Read,
    detector: &Detector,
    out: &mut dyn Write,
) -> Result<BatchStats> {
    let mut stats = BatchStats::default();
    let detection = detector.scan(reader);
    write!(out, "[")?;
    let mut first = true;
    record(source, detection, out, &mut first, &mut stats)?;
    write!(out, "]")?;
    Ok(stats)
}

/// 并行扫描文件列表：
/// - 使用 Rayon 线程池按文件并行（每个文件一个独立的扫描会话）
/// - 单线程 Writer 按下标重排并流式写 JSON，保证稳定顺序
pub fn scan_files_and_write(
    files: &[PathBuf],
    detector: &Detector,
    out: &mut dyn Write,
    threads: usize,
) -> Result<BatchStats> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    let mut stats = BatchStats::default();
    write!(out, "[")?;
    let mut first = true;

    type Msg = (usize /*idx*/, String /*source*/, Result<Detection>);
    let (tx, rx) = channel::bounded::<Msg>(256);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .context("build scan thread pool")?;

    std::thread::scope(|scope| -> Result<()> {
        // 扫描在后台线程内的线程池执行；Writer 保持在当前线程
        scope.spawn(move || {
            pool.install(|| {
                // Writer 退出后 send 失败，剩余文件不再扫描
                let _ = files.par_iter().enumerate().try_for_each_with(tx, |tx, (idx, path)| {
                    let source = path.display().to_string();
                    let res = scan_file(path, detector);
                    tx.send((idx, source, res))
                });
            });
        });

        let mut next_idx: usize = 0;
        let mut buffer: BTreeMap<usize, (String, Result<Detection>)> = BTreeMap::new();
        let mut written = Ok(());
        // 所有 Sender 被丢弃后 recv 返回错误，循环结束
        'recv: while let Ok((idx, source, res)) = rx.recv() {
            buffer.insert(idx, (source, res));
            while let Some((source, res)) = buffer.remove(&next_idx) {
                match res {
                    Ok(detection) => {
                        if let Err(e) = record(&source, detection, out, &mut first, &mut stats) {
                            written = Err(e);
                            break 'recv;
                        }
                    }
                    Err(e) => {
                        warn!(source = %source, error = %format!("{e:#}"), "skip file");
                        stats.sources_failed += 1;
                    }
                }
                next_idx += 1;
            }
        }
        // 必须在 scope 等待扫描线程之前丢弃接收端，否则扫描线程会阻塞在已满的通道上
        drop(rx);
        written
    })?;

    write!(out, "]")?;
    Ok(stats)
}

fn scan_file(path: &Path, detector: &Detector) -> Result<Detection> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(detector.scan(BufReader::new(file)))
}

/// 写出一个输入的全部命中并更新统计
fn record(
    source: &str,
    detection: Detection,
    out: &mut dyn Write,
    first: &mut bool,
    stats: &mut BatchStats,
) -> Result<()> {
    if let Some(cause) = detection.abort_cause() {
        // 已扫描部分的命中照常写出
        warn!(source, error = %cause, matches = detection.matches.len(), "scan aborted");
        stats.sources_failed += 1;
    } else {
        stats.sources_scanned += 1;
    }
    if detection.is_strict_violation() {
        stats.strict_violations += 1;
    }
    for found in &detection.matches {
        if !*first {
            write!(out, ",")?;
        } else {
            *first = false;
        }
        serde_json::to_writer(&mut *out, &OutputItem { source, found })?;
        stats.matches_written += 1;
    }
    Ok(())
}
