//! Step-by-step progress narration on stdout

use std::io::{self, Write};

/// Width the step message is padded to so the status column lines up
const STEP_WIDTH: usize = 56;

#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    quiet: bool,
}

impl Progress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn quiet() -> Self {
        Self::new(true)
    }

    /// Announce a step; the status follows on the same line
    pub fn step(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "{:<width$}", message, width = STEP_WIDTH);
        let _ = stdout.flush();
    }

    /// Close the current step with `[OK]` or `[ERROR]` and pass the result on
    pub fn report<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        if !self.quiet {
            println!("{}", if result.is_ok() { "[OK]" } else { "[ERROR]" });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_passes_result_through() {
        let progress = Progress::new(false);
        progress.step("Checking...");
        assert_eq!(progress.report::<_, String>(Ok(7)), Ok(7));

        progress.step("Failing...");
        assert_eq!(
            progress.report::<u8, _>(Err("boom".to_string())),
            Err("boom".to_string())
        );
    }

    #[test]
    fn test_quiet_constructor() {
        let quiet = Progress::quiet();
        quiet.step("Hidden...");
        assert_eq!(quiet.report::<_, String>(Ok("done")), Ok("done"));
        assert!(!Progress::default().quiet);
    }
}
