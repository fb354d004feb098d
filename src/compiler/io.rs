//! Overlapped reading of input source files.
//!
//! This is the only concurrency in the whole pipeline: all file reads are
//! issued up front so the OS can fill buffers while earlier files are being
//! parsed, and the parser blocks only when it actually needs a file's
//! contents (which may already be ready).  One helper thread per file is
//! plenty at this fan out; everything downstream of the reads is strictly
//! sequential.

use std::path::PathBuf;
use std::thread::JoinHandle;

/// A batch of in flight reads.  `start` fires every request; `wait` blocks
/// for one file's contents at first use.
pub struct AsyncReader {
    pending: Vec<Option<JoinHandle<Result<String, String>>>>,
    paths: Vec<PathBuf>,
}

impl AsyncReader {
    pub fn new(paths: Vec<PathBuf>) -> AsyncReader {
        AsyncReader {
            pending: Vec::new(),
            paths,
        }
    }

    /// Issue a read for every registered file.
    pub fn start(&mut self) {
        for path in &self.paths {
            let p = path.clone();
            self.pending.push(Some(std::thread::spawn(move || {
                std::fs::read_to_string(&p).map_err(|e| format!("{}", e))
            })));
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn path(&self, i: usize) -> &PathBuf {
        &self.paths[i]
    }

    /// Block until the `i`th file's contents are available.  Each file may
    /// be waited on exactly once.  An unreadable source file is a fatal
    /// error for the run, so the error carries the rendered reason.
    pub fn wait(&mut self, i: usize) -> Result<String, String> {
        let handle = self.pending[i]
            .take()
            .expect("file contents already consumed");
        match handle.join() {
            Ok(r) => r,
            Err(_) => Err("read thread panicked".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_all_files_in_any_order() {
        let dir = std::env::temp_dir();
        let mut paths = vec![];
        for (i, text) in ["alpha", "beta"].iter().enumerate() {
            let p = dir.join(format!("sable_io_test_{}.sbl", i));
            let mut f = std::fs::File::create(&p).unwrap();
            write!(f, "{}", text).unwrap();
            paths.push(p);
        }

        let mut rdr = AsyncReader::new(paths.clone());
        rdr.start();
        // Wait out of order: readiness must not depend on request order.
        assert_eq!(rdr.wait(1).unwrap(), "beta");
        assert_eq!(rdr.wait(0).unwrap(), "alpha");

        for p in paths {
            std::fs::remove_file(p).ok();
        }
    }

    #[test]
    fn missing_file_reports_error() {
        let mut rdr = AsyncReader::new(vec![PathBuf::from("/nonexistent/sable/module.sbl")]);
        rdr.start();
        assert!(rdr.wait(0).is_err());
    }
}
