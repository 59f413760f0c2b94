use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress and warning sink handed to the fetch phase.
pub trait Progress: Send + Sync {
    fn start(&self, message: &str);
    fn step(&self, current: usize, total: usize, name: &str);
    fn warn(&self, message: &str);
    fn finish(&self);
}

/// Terminal spinner on stderr. Quiet mode keeps the warnings but drops the spinner.
pub struct Spinner {
    bar: Option<ProgressBar>,
}

impl Spinner {
    pub fn new(quiet: bool) -> Self {
        if quiet {
            return Self { bar: None };
        }
        Self::with_bar(ProgressBar::new_spinner())
    }

    /// Style `bar` and start its ticker. Later updates only change the message.
    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }
}

impl Progress for Spinner {
    fn start(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    fn step(&self, current: usize, total: usize, name: &str) {
        self.start(&format!("Fetching License Info ({}/{}): {}", current, total, name));
    }

    fn warn(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.suspend(|| log::warn!("{}", message)),
            None => log::warn!("{}", message),
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
pub mod recorder {
    use std::sync::Mutex;

    use super::Progress;

    /// Captures every progress event as a line of text.
    #[derive(Default)]
    pub struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        pub fn warnings(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("warn: ").map(str::to_string))
                .collect()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Progress for Recorder {
        fn start(&self, message: &str) {
            self.push(format!("start: {}", message));
        }

        fn step(&self, current: usize, total: usize, name: &str) {
            self.push(format!("step: {}/{} {}", current, total, name));
        }

        fn warn(&self, message: &str) {
            self.push(format!("warn: {}", message));
        }

        fn finish(&self) {
            self.push("finish".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_only_update_message() {
        let bar = ProgressBar::hidden();
        let spinner = Spinner::with_bar(bar.clone());

        spinner.start("Fetching License Info: web");
        assert_eq!(bar.message(), "Fetching License Info: web");
        for i in 1..=3 {
            spinner.step(i, 3, "chalk");
        }
        assert_eq!(bar.message(), "Fetching License Info (3/3): chalk");
        assert!(!bar.is_finished());

        spinner.finish();
        assert!(bar.is_finished());
    }

    #[test]
    fn test_quiet_spinner_has_no_bar() {
        let spinner = Spinner::new(true);
        assert!(spinner.bar.is_none());
        spinner.step(1, 1, "chalk");
        spinner.warn("no revision found for npm+chalk$2.4.1");
        spinner.finish();
    }
}
