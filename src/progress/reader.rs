use std::io::{self, Read};

use crate::progress::sink::{SharedProgressSink, TaskProgressSink};

/// Wraps a reader and reports the running byte count after every read
pub struct ProgressReader<R> {
    inner: R,
    sink: SharedProgressSink,
    sub_task: Option<String>,
    bytes_read: u64,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, sink: SharedProgressSink) -> Self {
        Self {
            inner,
            sink,
            sub_task: None,
            bytes_read: 0,
        }
    }

    /// Label each report with a sub-task name
    pub fn with_sub_task(mut self, sub_task: impl Into<String>) -> Self {
        self.sub_task = Some(sub_task.into());
        self
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn report(&self) {
        let message = format!("{} read", format_size(self.bytes_read));
        self.sink.make_progress(
            i64::try_from(self.bytes_read).unwrap_or(i64::MAX),
            self.sub_task.as_deref(),
            Some(&message),
        );
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.bytes_read += n as u64;
            self.report();
        }
        Ok(n)
    }
}

/// Human readable byte count, e.g. `1.5 MB`
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::sink::FnProgressSink;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.00 GB");
    }

    #[test]
    fn test_counts_every_read() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let sink = Arc::new(FnProgressSink::new(move |p, sub: Option<&str>, msg: Option<&str>| {
            recorder
                .lock()
                .push((p, sub.map(str::to_string), msg.map(str::to_string)))
        }));

        let data = vec![7u8; 2500];
        let mut reader = ProgressReader::new(&data[..], sink).with_sub_task("Restoring");
        let mut buf = [0u8; 1000];
        while reader.read(&mut buf).unwrap() > 0 {}

        assert_eq!(reader.bytes_read(), 2500);
        let seen = seen.lock();
        let counts: Vec<i64> = seen.iter().map(|(p, _, _)| *p).collect();
        assert_eq!(counts, vec![1000, 2000, 2500]);
        assert_eq!(seen[2].1.as_deref(), Some("Restoring"));
        assert_eq!(seen[2].2.as_deref(), Some("2.4 KB read"));
    }
}
