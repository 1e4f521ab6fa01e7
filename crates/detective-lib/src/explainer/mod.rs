//! Failure explanations
//!
//! Turns a [`FailureRecord`] into a plain-text diagnostic: what happened,
//! what it means, how to fix it and which commands help debug it. The
//! narrative is chosen from a closed set keyed on the failure reason, and
//! every section is rendered in a fixed order so that output is stable
//! across runs.

mod exit_code;
mod narrative;

pub use exit_code::exit_code_annotation;
pub use narrative::Narrative;

use crate::models::FailureRecord;

/// Line written after every explanation block
pub const SEPARATOR: &str = "=====================================";

/// Render the diagnostic explanation for a failure
pub fn explain(record: &FailureRecord) -> String {
    let narrative = Narrative::for_reason(&record.reason);
    let template = narrative.template(record);

    let mut out = String::new();
    out.push_str("🚨 PROBLEM DETECTED\n");
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(&format!("Pod: {}\n", record.workload));
    if record.init_container {
        out.push_str(&format!("Container: {} (init container)\n", record.container));
    } else {
        out.push_str(&format!("Container: {}\n", record.container));
    }
    if record.restart_count > 0 {
        out.push_str(&format!("Restarts: {}\n", record.restart_count));
    }
    out.push('\n');
    template.render_into(&mut out, record);
    out
}

/// One numbered entry of the debug command list
pub(crate) struct DebugCommand {
    title: &'static str,
    lines: Vec<String>,
}

impl DebugCommand {
    pub(crate) fn new(title: &'static str, command: String) -> Self {
        Self {
            title,
            lines: vec![command],
        }
    }

    pub(crate) fn multi(title: &'static str, lines: Vec<String>) -> Self {
        Self { title, lines }
    }
}

/// A headed block written after the debug commands
pub(crate) struct Section {
    heading: &'static str,
    lines: Vec<String>,
}

impl Section {
    pub(crate) fn new(heading: &'static str, lines: Vec<String>) -> Self {
        Self { heading, lines }
    }

    pub(crate) fn bullets(heading: &'static str, items: &[&str]) -> Self {
        Self {
            heading,
            lines: items.iter().map(|item| format!("- {}", item)).collect(),
        }
    }
}

/// Narrative content before rendering
pub(crate) struct Template {
    pub(crate) summary: String,
    pub(crate) meaning: &'static [&'static str],
    /// Whether the kubelet message adds information for this narrative
    pub(crate) show_message: bool,
    pub(crate) fixes: &'static [&'static str],
    pub(crate) commands: Vec<DebugCommand>,
    pub(crate) sections: Vec<Section>,
}

impl Template {
    fn render_into(&self, out: &mut String, record: &FailureRecord) {
        out.push_str("❌ WHAT HAPPENED:\n");
        out.push_str(&self.summary);
        out.push_str("\n\n");

        if !self.meaning.is_empty() {
            out.push_str("🤔 WHAT THIS MEANS:\n");
            for line in self.meaning {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }

        if self.show_message && !record.message.is_empty() {
            out.push_str("📝 ERROR MESSAGE:\n");
            out.push_str(&record.message);
            out.push_str("\n\n");
        }

        if record.exit_code != 0 {
            out.push_str(&format!("Exit Code: {}\n", record.exit_code));
            out.push_str(&exit_code_annotation(record.exit_code));
            out.push_str("\n\n");
        }

        if !record.log_tail.is_empty() {
            out.push_str("📝 LAST ERROR MESSAGE:\n");
            out.push_str(&record.log_tail);
            out.push_str("\n\n");
        }

        if !self.fixes.is_empty() {
            out.push_str("🔧 HOW TO FIX:\n");
            for (i, fix) in self.fixes.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, fix));
            }
            out.push('\n');
        }

        out.push_str("🐛 DEBUG COMMANDS:\n");
        out.push_str("-------------------\n\n");
        for (i, command) in self.commands.iter().enumerate() {
            out.push_str(&format!("# {}. {}\n", i + 1, command.title));
            for line in &command.lines {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }

        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(section.heading);
            out.push_str(":\n");
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkloadRef;

    fn record(reason: &str, exit_code: i32, log_tail: &str) -> FailureRecord {
        FailureRecord {
            workload: WorkloadRef::new("prod", "web-7d9f"),
            container: "app".to_string(),
            reason: reason.to_string(),
            message: String::new(),
            exit_code,
            image: "registry.example.com/web:1.4.2".to_string(),
            log_tail: log_tail.to_string(),
            restart_count: 0,
            init_container: false,
        }
    }

    #[test]
    fn test_header_marks_init_container_and_restarts() {
        let mut failing = record("CreateContainerConfigError", 0, "");
        failing.container = "migrate".to_string();
        failing.init_container = true;
        failing.restart_count = 4;

        let out = explain(&failing);

        assert!(out.contains("Container: migrate (init container)\nRestarts: 4\n\n❌ WHAT HAPPENED:"));
    }

    #[test]
    fn test_header_and_section_order() {
        let out = explain(&record("CrashLoopBackOff", 1, "boom"));

        assert!(out.starts_with(
            "🚨 PROBLEM DETECTED\n=====================================\nPod: prod/web-7d9f\nContainer: app\n\n"
        ));

        let positions: Vec<usize> = [
            "❌ WHAT HAPPENED:",
            "🤔 WHAT THIS MEANS:",
            "Exit Code: 1",
            "📝 LAST ERROR MESSAGE:",
            "🔧 HOW TO FIX:",
            "🐛 DEBUG COMMANDS:",
            "📊 COMMON CAUSES:",
        ]
        .iter()
        .map(|marker| out.find(marker).unwrap_or_else(|| panic!("missing {marker}")))
        .collect();

        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_crash_loop_with_oom_kill_scenario() {
        let out = explain(&record("CrashLoopBackOff", 137, "fatal: OOM"));

        assert!(out.contains("Your container keeps crashing and restarting."));
        assert!(out.contains("Exit Code: 137\n"));
        assert!(out.contains("Killed by SIGKILL (usually OOM or forced termination)"));
        assert!(out.contains("📝 LAST ERROR MESSAGE:\nfatal: OOM\n\n"));
        assert!(out.contains("kubectl logs web-7d9f -n prod -c app --previous"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let failure = record("ImagePullBackOff", 0, "");
        assert_eq!(explain(&failure), explain(&failure));
    }

    #[test]
    fn test_exit_code_and_logs_omitted_when_absent() {
        let out = explain(&record("CrashLoopBackOff", 0, ""));

        assert!(!out.contains("Exit Code:"));
        assert!(!out.contains("LAST ERROR MESSAGE"));
    }

    #[test]
    fn test_image_pull_variants_share_narrative() {
        let backoff = explain(&record("ImagePullBackOff", 0, ""));
        let err = explain(&record("ErrImagePull", 0, ""));

        assert_eq!(backoff, err);
        assert!(backoff.contains("Kubernetes cannot download your container image."));
        assert!(backoff.contains("docker pull registry.example.com/web:1.4.2"));
        assert!(backoff.contains("💡 CREATE IMAGE PULL SECRET:"));
    }

    #[test]
    fn test_generic_narrative_shows_reason_and_message() {
        let mut failure = record("Error", 3, "");
        failure.message = "exec format error".to_string();

        let out = explain(&failure);

        assert!(out.contains("❌ WHAT HAPPENED:\nError\n\n"));
        assert!(out.contains("📝 ERROR MESSAGE:\nexec format error\n\n"));
        assert!(out.contains("→ Exit code 3: Check application documentation"));
    }

    #[test]
    fn test_crash_loop_message_is_not_repeated() {
        let mut failure = record("CrashLoopBackOff", 0, "");
        failure.message = "back-off 5m0s restarting failed container".to_string();

        assert!(!explain(&failure).contains("back-off 5m0s"));
    }

    #[test]
    fn test_debug_commands_are_numbered_in_order() {
        let out = explain(&record("CreateContainerConfigError", 0, ""));

        let first = out.find("# 1. ").unwrap();
        let second = out.find("# 2. ").unwrap();
        assert!(first < second);
        assert!(out.contains("kubectl get configmaps -n prod"));
    }

    #[test]
    fn test_output_ends_with_common_causes() {
        let out = explain(&record("CrashLoopBackOff", 0, ""));
        assert!(out.ends_with("- File system permissions\n"));
    }
}
