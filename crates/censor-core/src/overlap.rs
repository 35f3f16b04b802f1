//! 重叠窗口：保留上一块的尾部，与新读入的块拼成下一次匹配的窗口
use std::io::{self, Read};

/// 断言上下文余量（字节）：一个 UTF-8 字符的最大长度，
/// 覆盖 `\b` 等断言在匹配两侧需要查看的字符。
pub(crate) const LOOKAROUND_MARGIN: usize = 4;

/// 单次读取预留的缓冲上限；更大的块大小按多次短读处理
const MAX_READ_RESERVE: usize = 1 << 20;

/// 扫描会话独占的滑动窗口与行号计数
#[derive(Debug)]
pub(crate) struct OverlapWindow {
    buf: Vec<u8>,
    /// buf[0] 的全局偏移
    start: u64,
    /// 全局 [0, start) 内的换行数
    newlines_before: u64,
    /// 滑动时保留的尾部长度
    tail_len: usize,
}

impl OverlapWindow {
    /// `span` 为定稿距离：起点距窗口末尾不足 `span` 的命中需等待更多数据
    pub(crate) fn new(span: usize) -> Self {
        Self { buf: Vec::new(), start: 0, newlines_before: 0, tail_len: span + LOOKAROUND_MARGIN }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn start(&self) -> u64 {
        self.start
    }

    /// 已读入数据的全局末尾偏移
    pub(crate) fn end(&self) -> u64 {
        self.start + self.buf.len() as u64
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 从 reader 读取至多 `max` 字节（且不超过 `MAX_READ_RESERVE`）追加到窗口末尾。
    /// `Interrupted` 视为重试点；返回 0 表示流结束。
    pub(crate) fn fill_from<R: Read>(&mut self, reader: &mut R, max: usize) -> io::Result<usize> {
        let old = self.buf.len();
        self.buf.resize(old + max.min(MAX_READ_RESERVE), 0);
        let res = loop {
            match reader.read(&mut self.buf[old..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        let n = *res.as_ref().unwrap_or(&0);
        self.buf.truncate(old + n);
        res
    }

    /// 丢弃尾部之前的字节，仅保留最后 `tail_len` 字节；被丢弃部分的换行计入累计
    pub(crate) fn slide(&mut self) {
        let drop = self.buf.len().saturating_sub(self.tail_len);
        if drop == 0 {
            return;
        }
        self.newlines_before += count_newlines(&self.buf[..drop]);
        self.buf.drain(..drop);
        self.start += drop as u64;
    }

    /// 行号游标；查询位置需单调不减
    pub(crate) fn lines(&self) -> LineCursor<'_> {
        LineCursor { buf: &self.buf, pos: 0, newlines: self.newlines_before }
    }
}

/// 在窗口内按单调递增的位置计算行号（从 1 开始）
pub(crate) struct LineCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    newlines: u64,
}

impl LineCursor<'_> {
    pub(crate) fn line_at(&mut self, local: usize) -> u32 {
        debug_assert!(local >= self.pos);
        if local > self.pos {
            self.newlines += count_newlines(&self.buf[self.pos..local]);
            self.pos = local;
        }
        u32::try_from(self.newlines + 1).unwrap_or(u32::MAX)
    }
}

fn count_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u64
}
