/// Receives percent-complete updates (0..=100) from a running operation.
pub trait Progress {
    fn report(&mut self, percent: f64);
}

impl<F: FnMut(f64)> Progress for F {
    fn report(&mut self, percent: f64) {
        self(percent)
    }
}

/// Discards progress updates.
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: f64) {}
}

/// Turns "n of total items done" into percent updates.
pub struct ProgressCounter<'a> {
    sink: &'a mut dyn Progress,
    total: usize,
    done: usize,
}

impl<'a> ProgressCounter<'a> {
    pub fn new(sink: &'a mut dyn Progress, total: usize) -> Self {
        Self {
            sink,
            total,
            done: 0,
        }
    }

    pub fn step(&mut self) {
        self.done = (self.done + 1).min(self.total);
        let percent = if self.total == 0 {
            100.0
        } else {
            self.done as f64 / self.total as f64 * 100.0
        };
        self.sink.report(percent);
    }

    pub fn done(&self) -> usize {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_reports_fractions_of_total() {
        let mut seen = Vec::new();
        let mut sink = |p: f64| seen.push(p);
        let mut counter = ProgressCounter::new(&mut sink, 4);
        for _ in 0..4 {
            counter.step();
        }
        assert_eq!(counter.done(), 4);
        drop(counter);
        assert_eq!(seen, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn counter_never_exceeds_total() {
        let mut last = 0.0;
        let mut sink = |p: f64| last = p;
        let mut counter = ProgressCounter::new(&mut sink, 1);
        counter.step();
        counter.step();
        drop(counter);
        assert_eq!(last, 100.0);
    }
}
