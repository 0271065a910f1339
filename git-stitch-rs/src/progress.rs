use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Job counter rendered as a single updating line on stderr.
pub struct Progress {
    total: usize,
    done: AtomicUsize,
    quiet: bool,
}

impl Progress {
    pub fn new(total: usize, quiet: bool) -> Self {
        Progress {
            total,
            done: AtomicUsize::new(0),
            quiet,
        }
    }

    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.quiet || self.total == 0 {
            return;
        }
        let pct = 100.0 * done as f64 / self.total as f64;
        eprint!("\rProgress: {:.1}%", pct);
        let _ = io::stderr().flush();
    }

    pub fn finish(&self) {
        if !self.quiet && self.total > 0 && self.done.load(Ordering::Relaxed) > 0 {
            eprintln!();
        }
    }
}
