// Copyright 2025 The mssh Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use owo_colors::OwoColorize;
use std::error::Error as StdError;
use std::time::Duration;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::error::Error;
use crate::outcome::{ExecOutcome, TransferOutcome};

pub struct OutputFormatter;

impl OutputFormatter {
    /// `>>> address`, green on success and red on failure.
    pub fn format_host_header(address: &str, success: bool) -> String {
        let header = format!(">>> {address}");
        if success {
            format!("{}\n", header.green().bold())
        } else {
            format!("{}\n", header.red().bold())
        }
    }

    pub fn format_transfer_outcome(outcome: &TransferOutcome) -> String {
        let mut output = Self::format_host_header(&outcome.address, outcome.is_success());

        match &outcome.result {
            Ok(summary) => {
                output.push_str(&format!("{} {}\n", "✓".green(), summary.description));
                output.push_str(&format!(
                    "  {} file(s), {} bytes\n",
                    summary.file_count(),
                    summary.total_bytes()
                ));
            }
            Err(e) => output.push_str(&Self::format_error(e)),
        }

        output
    }

    pub fn format_exec_outcome(outcome: &ExecOutcome) -> String {
        let mut output = Self::format_host_header(&outcome.address, outcome.is_success());

        match &outcome.result {
            Ok(stdout) => {
                if !stdout.is_empty() {
                    output.push_str(&Self::format_output_box(stdout));
                }
            }
            Err(e) => {
                if outcome.exit_status >= 0 {
                    output.push_str(&format!(
                        "{} Exit code: {}\n",
                        "⚠".yellow(),
                        outcome.exit_status.to_string().yellow()
                    ));
                }
                output.push_str(&Self::format_error(e));
            }
        }

        output
    }

    /// Error with its source chain, one cause per line.
    pub fn format_error(error: &Error) -> String {
        let mut output = format!("{} Error: {}\n", "✗".red(), error.to_string().red());
        let mut source = error.source();
        while let Some(cause) = source {
            output.push_str(&format!("  {} {}\n", "caused by:".dimmed(), cause));
            source = cause.source();
        }
        output
    }

    /// `N hosts: X succeeded, Y failed`
    pub fn format_summary(total: usize, succeeded: usize, failed: usize) -> String {
        let succeeded_text = format!("{succeeded} succeeded");
        let failed_text = format!("{failed} failed");

        format!(
            "\n{} {}, {}\n",
            format!("{total} hosts:").bold(),
            if succeeded > 0 {
                succeeded_text.green().to_string()
            } else {
                succeeded_text
            },
            if failed > 0 {
                failed_text.red().to_string()
            } else {
                failed_text
            }
        )
    }

    /// Human-readable elapsed time: `850.0 ms`, `3.25 s`, `2m 5s`.
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs_f64();

        if total_seconds < 1.0 {
            format!("{:.1} ms", total_seconds * 1000.0)
        } else if total_seconds < 60.0 {
            format!("{total_seconds:.2} s")
        } else {
            let minutes = duration.as_secs() / 60;
            let seconds = duration.as_secs() % 60;
            if seconds == 0 {
                format!("{minutes}m")
            } else {
                format!("{minutes}m {seconds}s")
            }
        }
    }

    fn format_output_box(content: &str) -> String {
        let terminal_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        let mut output = String::new();
        let indent = "  ";
        let max_width = terminal_width.saturating_sub(4).max(1);

        for line in content.lines() {
            let mut remaining = line;
            while remaining.width() > max_width {
                let (chunk, rest) = Self::split_at_width(remaining, max_width);
                if chunk.is_empty() {
                    break;
                }
                output.push_str(&format!("{indent}{chunk}\n"));
                remaining = rest;
            }
            output.push_str(&format!("{indent}{remaining}\n"));
        }

        output
    }

    fn split_at_width(s: &str, max_width: usize) -> (&str, &str) {
        let mut width = 0;
        let mut split_pos = 0;

        for (i, ch) in s.char_indices() {
            let ch_width = ch.width().unwrap_or(0);
            if width + ch_width > max_width {
                break;
            }
            width += ch_width;
            split_pos = i + ch.len_utf8();
        }

        s.split_at(split_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Side;
    use crate::outcome::TransferSummary;

    #[test]
    fn test_split_at_width_respects_wide_chars() {
        let (head, tail) = OutputFormatter::split_at_width("가나다라", 5);
        assert_eq!(head, "가나");
        assert_eq!(tail, "다라");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(
            OutputFormatter::format_duration(Duration::from_millis(850)),
            "850.0 ms"
        );
        assert_eq!(
            OutputFormatter::format_duration(Duration::from_millis(3250)),
            "3.25 s"
        );
        assert_eq!(OutputFormatter::format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(OutputFormatter::format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_summary_counts() {
        let summary = OutputFormatter::format_summary(3, 2, 1);
        assert!(summary.contains("3 hosts:"));
        assert!(summary.contains("2 succeeded"));
        assert!(summary.contains("1 failed"));
    }

    #[test]
    fn test_exec_outcome_output() {
        let outcome = ExecOutcome {
            address: "h:22".to_string(),
            exit_status: 0,
            result: Ok("line one\nline two\n".to_string()),
        };
        let text = OutputFormatter::format_exec_outcome(&outcome);
        assert!(text.contains(">>> h:22"));
        assert!(text.contains("  line one\n"));
        assert!(text.contains("  line two\n"));
    }

    #[test]
    fn test_not_run_has_no_exit_code_line() {
        let outcome = ExecOutcome {
            address: "h:22".to_string(),
            exit_status: -1,
            result: Err(Error::Transport("reset".to_string())),
        };
        let text = OutputFormatter::format_exec_outcome(&outcome);
        assert!(!text.contains("Exit code"));
        assert!(text.contains("reset"));
    }

    #[test]
    fn test_transfer_outcome() {
        let ok = TransferOutcome {
            address: "h:22".to_string(),
            result: Ok(TransferSummary {
                description: "a -> h:22:/b".to_string(),
                entries: Vec::new(),
            }),
        };
        assert!(OutputFormatter::format_transfer_outcome(&ok).contains("a -> h:22:/b"));

        let failed = TransferOutcome {
            address: "h:22".to_string(),
            result: Err(Error::Conflict {
                side: Side::Remote,
                path: "/b".to_string(),
            }),
        };
        assert!(OutputFormatter::format_transfer_outcome(&failed)
            .contains("remote file /b already exists"));
    }

    #[test]
    fn test_error_chain_lists_causes() {
        let err = Error::Io {
            path: "/tmp/x".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = OutputFormatter::format_error(&err);
        assert!(text.contains("caused by:"));
        assert!(text.contains("denied"));
    }
}
