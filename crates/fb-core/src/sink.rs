use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use fb_config::OutputConfig;

use crate::record::FlowRecord;

/// Trait for record output destinations.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: &FlowRecord) -> Result<()>;
}

/// Appends records as JSON Lines to a file.
pub struct FileRecordSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileRecordSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl RecordSink for FileRecordSink {
    fn emit(&self, record: &FlowRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut w = self.writer.lock().expect("record sink lock poisoned");
        w.write_all(json.as_bytes())?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }
}

/// Writes records as JSON Lines to stdout.
pub struct StdoutRecordSink;

impl RecordSink for StdoutRecordSink {
    fn emit(&self, record: &FlowRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut out = std::io::stdout().lock();
        out.write_all(json.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

/// Build the sink the `[output]` section asks for.
pub fn build_sink(cfg: &OutputConfig) -> Result<Box<dyn RecordSink>> {
    if cfg.is_stdout() {
        Ok(Box::new(StdoutRecordSink))
    } else {
        Ok(Box::new(FileRecordSink::open(&cfg.path)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Counters, Direction, FlowTuple, Proto};
    use std::io::Read;
    use std::net::{IpAddr, Ipv4Addr};

    fn sample_record() -> FlowRecord {
        FlowRecord {
            start_micros: 1_700_000_000_000_000,
            end_micros: 1_700_000_005_000_000,
            flow: FlowTuple {
                saddr: IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)),
                daddr: IpAddr::V4(Ipv4Addr::new(10, 4, 5, 6)),
                sport: 51234,
                dport: 443,
                proto: Proto::Tcp,
            },
            counters: Counters {
                src_pkts: 12,
                dst_pkts: 9,
                src_bytes: 2400,
                dst_bytes: 11800,
            },
            direction: Direction::Forward,
            tcp: None,
            icmp: None,
            written: false,
            rank: None,
        }
    }

    #[test]
    fn file_sink_writes_jsonl() {
        let dir = std::env::temp_dir().join("fb_test_record_sink");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("records.jsonl");
        let _ = std::fs::remove_file(&path);

        {
            let sink = FileRecordSink::open(&path).unwrap();
            sink.emit(&sample_record()).unwrap();

            let mut second = sample_record();
            second.rank = Some(2);
            sink.emit(&second).unwrap();
        }

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();

        let lines: Vec<&str> = contents.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["flow"]["dport"], 443);
        assert_eq!(parsed["counters"]["src_pkts"], 12);
        // the written flag is internal bookkeeping, not wire format
        assert!(parsed.get("written").is_none());
        assert!(parsed.get("rank").is_none());

        let parsed2: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed2["rank"], 2);

        // Cleanup
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn build_sink_honours_stdout_path() {
        let cfg = OutputConfig::default();
        assert!(cfg.is_stdout());
        // constructing it must not touch the filesystem
        assert!(build_sink(&cfg).is_ok());
    }
}
