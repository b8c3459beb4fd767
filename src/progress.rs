use std::cell::Cell;

/// Completed-subtask counter out of a fixed total.
#[derive(Debug)]
pub struct ProgressTracker {
    completed: Cell<usize>,
    total: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            completed: Cell::new(0),
            total,
        }
    }

    pub fn reset(&self) {
        self.completed.set(0);
    }

    pub fn complete_subtask(&self) {
        self.completed.set((self.completed.get() + 1).min(self.total));
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed.get(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_saturates_at_the_total() {
        let tracker = ProgressTracker::new(2);
        for _ in 0..3 {
            tracker.complete_subtask();
        }
        assert_eq!(tracker.progress(), Progress { completed: 2, total: 2 });
        assert_eq!(tracker.progress().fraction(), 1.0);
        tracker.reset();
        assert_eq!(tracker.progress().completed, 0);
    }
}
