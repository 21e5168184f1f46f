//! GPU memory report built from snapshot logs.
//!
//! Snapshot lines look like `3: nid001 | 1200MiB | 0MiB | 79000MiB | 81559MiB`
//! (rank label, host, used, reserved, free, total). Lines before the separator are the
//! start collection, lines after it the end collection. Samples are averaged per host.
use std::{fmt, path::Path, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::error::DiagError;

pub mod probe;

/// Default marker splitting start and end collections.
pub const DEFAULT_SEPARATOR: &str = "post-launch";

fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<rank>\d+):\s+(?P<host>\S+)\s+\|\s+(\d+)\s*MiB\s+\|\s+(\d+)\s*MiB\s+\|\s+(\d+)\s*MiB\s+\|\s+(\d+)\s*MiB",
        )
        .expect("static pattern")
    })
}

/// Average memory of one host in MiB.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMemory {
    pub host: String,
    pub used: f64,
    pub reserved: f64,
    pub free: f64,
    pub total: f64,
}

impl HostMemory {
    fn values(&self) -> [f64; 4] {
        [self.used, self.reserved, self.free, self.total]
    }

    fn from_values(host: String, v: [f64; 4]) -> Self {
        Self {
            host,
            used: v[0],
            reserved: v[1],
            free: v[2],
            total: v[3],
        }
    }
}

/// Per-host averages, ordered by the lowest rank seen on each host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MemoryTable(pub Vec<HostMemory>);

impl MemoryTable {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, host: &str) -> Option<&HostMemory> {
        self.0.iter().find(|h| h.host == host)
    }

    /// `self - base` for every host of `base` also present in `self`.
    pub fn diff(&self, base: &MemoryTable) -> MemoryTable {
        MemoryTable(
            base.0
                .iter()
                .filter_map(|b| {
                    let e = self.get(&b.host)?;
                    let (ev, bv) = (e.values(), b.values());
                    Some(HostMemory::from_values(
                        b.host.clone(),
                        std::array::from_fn(|i| ev[i] - bv[i]),
                    ))
                })
                .collect(),
        )
    }

    fn from_samples(mut samples: Vec<(u32, String, [u64; 4])>) -> Self {
        samples.sort();
        let mut acc: Vec<(String, [f64; 4], u32)> = Vec::new();
        for (_, host, v) in samples {
            let idx = match acc.iter().position(|(h, _, _)| *h == host) {
                Some(i) => i,
                None => {
                    acc.push((host, [0.0; 4], 0));
                    acc.len() - 1
                }
            };
            let slot = &mut acc[idx];
            for (sum, x) in slot.1.iter_mut().zip(v) {
                *sum += x as f64;
            }
            slot.2 += 1;
        }
        MemoryTable(
            acc.into_iter()
                .map(|(host, sums, n)| {
                    HostMemory::from_values(host, sums.map(|s| s / f64::from(n)))
                })
                .collect(),
        )
    }
}

impl fmt::Display for MemoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, h) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", h.host)?;
            for v in h.values() {
                write!(f, " | {} MiB", v.trunc() as i64)?;
            }
        }
        Ok(())
    }
}

/// Split `text` into (start, end) tables at the first line containing `separator`.
pub fn parse(text: &str, separator: &str) -> (MemoryTable, MemoryTable) {
    let mut start = Vec::new();
    let mut end = Vec::new();
    let mut after = false;
    for line in text.lines() {
        if !after && line.contains(separator) {
            after = true;
            continue;
        }
        let Some(caps) = line_pattern().captures(line) else {
            continue;
        };
        let Ok(rank) = caps["rank"].parse::<u32>() else {
            continue;
        };
        let mut values = [0u64; 4];
        let mut ok = true;
        for (i, slot) in values.iter_mut().enumerate() {
            match caps.get(i + 3).map(|m| m.as_str().parse::<u64>()) {
                Some(Ok(v)) => *slot = v,
                _ => ok = false,
            }
        }
        if ok {
            let sample = (rank, caps["host"].to_string(), values);
            if after { end.push(sample) } else { start.push(sample) }
        }
    }
    (MemoryTable::from_samples(start), MemoryTable::from_samples(end))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    pub start: MemoryTable,
    pub end: MemoryTable,
    pub post_job: MemoryTable,
    pub end_vs_start: Option<MemoryTable>,
    pub post_job_vs_start: Option<MemoryTable>,
}

impl MemoryReport {
    pub fn build(start: MemoryTable, end: MemoryTable, post_job: MemoryTable) -> Self {
        let end_vs_start = (!end.is_empty()).then(|| end.diff(&start));
        let post_job_vs_start = (!post_job.is_empty()).then(|| post_job.diff(&start));
        Self {
            start,
            end,
            post_job,
            end_vs_start,
            post_job_vs_start,
        }
    }

    /// Read the snapshot log and, if present, its `.mem` sibling.
    pub fn from_log(path: &Path, separator: &str) -> Result<Self, DiagError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DiagError::Io(format!("{}: {e}", path.display())))?;
        let (start, end) = parse(&text, separator);

        let post_job = match post_job_path(path) {
            Some(mem) if mem.exists() => {
                let text = std::fs::read_to_string(&mem)
                    .map_err(|e| DiagError::Io(format!("{}: {e}", mem.display())))?;
                parse(&text, separator).0
            }
            _ => MemoryTable::default(),
        };
        Ok(Self::build(start, end, post_job))
    }

    pub fn to_json(&self) -> Result<String, DiagError> {
        serde_json::to_string_pretty(self).map_err(|e| DiagError::Io(e.to_string()))
    }
}

/// `<stem>.snapshot.log` → `<stem>.mem`; any other `<x>.log` → `<x>.mem`.
pub fn post_job_path(log: &Path) -> Option<std::path::PathBuf> {
    let name = log.file_name()?.to_str()?;
    let stem = name
        .strip_suffix(".snapshot.log")
        .or_else(|| name.strip_suffix(".log"))?;
    Some(log.with_file_name(format!("{stem}.mem")))
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Start GPU memory:\n{}\n", self.start)?;
        writeln!(f, "End GPU memory:\n{}\n", self.end)?;
        if !self.post_job.is_empty() {
            writeln!(f, "Post-job GPU memory:\n{}\n", self.post_job)?;
        }
        match &self.end_vs_start {
            Some(d) => writeln!(f, "Difference in GPU memory (End vs Start):\n{d}")?,
            None => writeln!(f, "No GPU memory data for End")?,
        }
        match &self.post_job_vs_start {
            Some(d) => write!(f, "Difference in GPU memory (Post-job vs Start):\n{d}"),
            None => write!(f, "No GPU memory data for Post-job"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
### orun snapshot: pre-launch
1: nid002 | 100MiB | 0MiB | 900MiB | 1000MiB
0: nid001 | 10MiB | 0MiB | 990MiB | 1000MiB
2: nid001 | 20MiB | 0MiB | 980MiB | 1000MiB
srun: some noise
### orun snapshot: post-launch
0: nid001 | 510MiB | 0MiB | 490MiB | 1000MiB
1: nid002 | 300MiB | 0MiB | 700MiB | 1000MiB
";

    #[test]
    fn averages_per_host_in_rank_order() {
        let (start, end) = parse(LOG, DEFAULT_SEPARATOR);
        assert_eq!(start.0.len(), 2);
        assert_eq!(start.0[0].host, "nid001");
        assert_eq!(start.0[0].used, 15.0);
        assert_eq!(start.0[1].host, "nid002");
        assert_eq!(end.get("nid002").unwrap().free, 700.0);
    }

    #[test]
    fn diff_and_display() {
        let (start, end) = parse(LOG, DEFAULT_SEPARATOR);
        let report = MemoryReport::build(start, end, MemoryTable::default());

        let diff = report.end_vs_start.as_ref().unwrap();
        assert_eq!(diff.get("nid001").unwrap().used, 495.0);
        assert_eq!(diff.get("nid002").unwrap().used, 200.0);
        assert!(report.post_job_vs_start.is_none());

        let text = report.to_string();
        assert!(text.contains("nid001 | 15 MiB | 0 MiB | 985 MiB | 1000 MiB"));
        assert!(text.contains("nid001 | 495 MiB | 0 MiB | -495 MiB | 0 MiB"));
        assert!(text.ends_with("No GPU memory data for Post-job"));
    }

    #[test]
    fn missing_end_collection() {
        let (start, end) = parse("0: h1 | 1MiB | 2MiB | 3MiB | 4MiB\n", DEFAULT_SEPARATOR);
        let report = MemoryReport::build(start, end, MemoryTable::default());
        assert!(report.end_vs_start.is_none());
        assert!(report.to_string().contains("No GPU memory data for End"));
    }

    #[test]
    fn reads_post_job_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("train_11.snapshot.log");
        std::fs::write(&log, LOG).unwrap();
        std::fs::write(
            dir.path().join("train_11.mem"),
            "0: nid001 | 12MiB | 0MiB | 988MiB | 1000MiB\n",
        )
        .unwrap();

        let report = MemoryReport::from_log(&log, DEFAULT_SEPARATOR).unwrap();
        let pj = report.post_job_vs_start.as_ref().unwrap();
        assert_eq!(pj.0.len(), 1);
        assert_eq!(pj.get("nid001").unwrap().used, -3.0);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["postJob"][0]["host"], "nid001");
        assert_eq!(json["start"][1]["total"], 1000.0);
    }

    #[test]
    fn post_job_path_mapping() {
        assert_eq!(
            post_job_path(Path::new("/l/a_1.snapshot.log")).unwrap(),
            Path::new("/l/a_1.mem")
        );
        assert_eq!(post_job_path(Path::new("/l/out.log")).unwrap(), Path::new("/l/out.mem"));
        assert!(post_job_path(Path::new("/l/out.txt")).is_none());
    }
}
