use clap::ValueEnum;
use utm_conformance::report::CheckRecord;

/// Console progress of a qualification run.
#[derive(Clone, Copy, Debug)]
pub struct OutputWriter {
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    #[default]
    PlainText,
}

impl OutputWriter {
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn write_str(self, line: &str) {
        match self.format {
            OutputFormat::Markdown => println!("{line}  "),
            OutputFormat::PlainText => println!("{line}"),
        }
    }

    pub fn write_header(self, header: &str, level: usize) {
        match self.format {
            OutputFormat::Markdown => {
                println!("{} {header}  ", "#".repeat(level.saturating_add(1)));
            }
            OutputFormat::PlainText => {
                let rule = if level <= 1 { "=" } else { "-" };
                println!("{} {header} {}", rule.repeat(3), rule.repeat(3));
            }
        }
    }

    /// One line per check, followed by one line per failure.
    pub fn write_check(self, check: &CheckRecord) {
        let (mark, failure_prefix) = match self.format {
            OutputFormat::Markdown if check.passed() => (":white_check_mark:", ""),
            OutputFormat::Markdown => (":x:", "- "),
            OutputFormat::PlainText if check.passed() => ("[PASS]", ""),
            OutputFormat::PlainText => ("[FAIL]", "    "),
        };
        self.write_str(&format!(
            "{mark} {} ({})",
            check.name,
            check.participants.join(", ")
        ));

        for failure in &check.failures {
            self.write_str(&format!(
                "{failure_prefix}{:?}: {}",
                failure.severity, failure.summary
            ));
        }
    }
}
