use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use phf::phf_map;

use crate::ctrl::request::ReqKind;

/// Anything that feeds `(address, kind)` pairs to the memory system.
pub trait RequestSource {
    /// `Ok(None)` once the source is exhausted.
    fn next_request(&mut self) -> Result<Option<(u64, ReqKind)>>;
}

static TRACE_OPS: phf::Map<&'static str, ReqKind> = phf_map! {
    "R" => ReqKind::Read,
    "W" => ReqKind::Write,
    "RD" => ReqKind::Read,
    "WR" => ReqKind::Write,
};

/// Parses one `<hex addr> <R|W>` line. Blank lines and `#` comments yield
/// `None`.
pub fn parse_line(line: &str) -> Result<Option<(u64, ReqKind)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    let (Some(addr), Some(op)) = (fields.next(), fields.next()) else {
        bail!("expected '<addr> <R|W>', got '{line}'");
    };
    let digits = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    let addr = u64::from_str_radix(digits, 16).with_context(|| format!("bad address '{addr}'"))?;
    let Some(kind) = TRACE_OPS.get(op) else {
        bail!("unknown request type '{op}'");
    };
    Ok(Some((addr, *kind)))
}

/// Line-oriented DRAM request trace.
pub struct DramTrace {
    lines: Box<dyn BufRead>,
    line_no: usize,
    buf: String,
}

impl DramTrace {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open trace {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        Self {
            lines: Box::new(reader),
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl RequestSource for DramTrace {
    fn next_request(&mut self) -> Result<Option<(u64, ReqKind)>> {
        loop {
            self.buf.clear();
            if self.lines.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let parsed = parse_line(&self.buf).with_context(|| format!("trace line {}", self.line_no))?;
            if parsed.is_some() {
                return Ok(parsed);
            }
        }
    }
}
