use console::style;
use std::io;

use crate::dataset::GeneratedDataset;
use crate::seed::{Outcome, SeedReport};

/// User-facing terminal output. Diagnostics go through `tracing` instead.
pub struct OutputHandler {
    verbose: bool,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn section(&mut self, title: &str) -> io::Result<()> {
        println!();
        println!("{}", style(title).cyan().bold());
        Ok(())
    }

    pub fn info(&mut self, content: &str) -> io::Result<()> {
        println!("{} {}", style("ℹ").blue(), content);
        Ok(())
    }

    pub fn success(&mut self, content: &str) -> io::Result<()> {
        println!("{} {}", style("✓").green().bold(), content);
        Ok(())
    }

    pub fn warning(&mut self, content: &str) -> io::Result<()> {
        println!("{} {}", style("⚠").yellow().bold(), content);
        Ok(())
    }

    pub fn error(&mut self, content: &str) -> io::Result<()> {
        eprintln!("{} {}", style("✗").red().bold(), style(content).red());
        Ok(())
    }

    pub fn print_banner(&mut self) -> io::Result<()> {
        println!("{}", style("╔═══════════════════════════════════════╗").cyan().bold());
        println!("{}", style("║      Formbricks Automation Tool       ║").cyan().bold());
        println!("{}", style("╚═══════════════════════════════════════╝").cyan().bold());
        Ok(())
    }

    pub fn print_dataset_summary(&mut self, dataset: &GeneratedDataset) -> io::Result<()> {
        println!("  {} {}", style("Surveys:").dim(), dataset.surveys.len());
        for survey in &dataset.surveys {
            println!(
                "    • {} {}",
                survey.name,
                style(format!("({} questions)", survey.questions.len())).dim()
            );
        }
        println!("  {} {}", style("Users:").dim(), dataset.users.len());
        Ok(())
    }

    /// Final seeding summary. Failures carry enough context to retry by hand.
    pub fn print_seed_report(&mut self, report: &SeedReport) -> io::Result<()> {
        println!();
        println!("{}", style("┌─ Seeding Summary ─────────────────────").dim());
        let counts = report.counts();
        self.print_counts("Users", counts.users_created, counts.users_failed);
        self.print_counts("Surveys", counts.surveys_created, counts.surveys_failed);
        self.print_counts("Responses", counts.responses_created, counts.responses_failed);

        let failures: Vec<&Outcome> = report.failures().collect();
        if !failures.is_empty() {
            println!("│");
            println!("│ {}", style("Failures:").red().bold());
            for outcome in failures {
                if let Err(failure) = &outcome.result {
                    let status = failure
                        .status
                        .map(|s| format!("HTTP {}", s))
                        .unwrap_or_else(|| "no status".to_string());
                    println!(
                        "│   {} {} {}",
                        style(&outcome.label).bold(),
                        style(format!("[{}]", status)).yellow(),
                        style(self.truncate(&failure.message, 3)).dim()
                    );
                }
            }
        }

        if self.verbose {
            let created: Vec<(&str, &str)> = report.created_ids().collect();
            if !created.is_empty() {
                println!("│");
                println!("│ {}", style("Platform ids:").bold());
                for (label, id) in created {
                    println!("│   {} → {}", label, style(id).green());
                }
            }
        }

        println!("{}", style("└───────────────────────────────────────").dim());
        Ok(())
    }

    fn print_counts(&self, name: &str, created: usize, failed: usize) {
        let failed_text = if failed > 0 {
            style(format!("{} failed", failed)).red().bold()
        } else {
            style(format!("{} failed", failed)).dim()
        };
        println!(
            "│ {:<10} {} created, {}",
            name,
            style(created).green(),
            failed_text
        );
    }

    fn truncate(&self, output: &str, max_lines: usize) -> String {
        let max_lines = if self.verbose { max_lines * 10 } else { max_lines };
        let lines: Vec<&str> = output.lines().collect();

        if lines.len() <= max_lines {
            output.to_string()
        } else {
            format!(
                "{}\n... ({} more lines)",
                lines[..max_lines].join("\n"),
                lines.len() - max_lines
            )
        }
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{EntityKind, Failure};

    fn outcome(kind: EntityKind, label: &str, result: Result<&str, u16>) -> Outcome {
        Outcome {
            kind,
            index: 0,
            label: label.to_string(),
            result: result.map(str::to_string).map_err(|status| Failure {
                status: Some(status),
                message: "line one\nline two\nline three\nline four".to_string(),
            }),
        }
    }

    #[test]
    fn test_seed_report_prints_partial_run() {
        let mut report = SeedReport::default();
        report.record(outcome(EntityKind::User, "user A <a@x.io>", Ok("usr_1")));
        report.record(outcome(EntityKind::Survey, "survey \"Broken\"", Err(400)));
        report.record(outcome(EntityKind::Survey, "survey \"Fine\"", Ok("srv_2")));

        let counts = report.counts();
        assert_eq!((counts.surveys_created, counts.surveys_failed), (1, 1));

        let mut quiet = OutputHandler::new();
        quiet.print_seed_report(&report).unwrap();
        let mut verbose = OutputHandler::new().with_verbose(true);
        verbose.print_seed_report(&report).unwrap();
    }

    #[test]
    fn test_truncate_respects_verbosity() {
        let text = "1\n2\n3\n4\n5";
        assert_eq!(OutputHandler::new().truncate(text, 3), "1\n2\n3\n... (2 more lines)");
        assert_eq!(OutputHandler::new().with_verbose(true).truncate(text, 3), text);
    }
}
