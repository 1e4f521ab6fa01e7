//! Human descriptions for container exit codes

/// Describe a container exit code
pub fn exit_code_annotation(code: i32) -> String {
    let description = match code {
        0 => "Success (but should not crash)",
        1 => "Application error - check your code for bugs",
        2 => "Misuse of shell command",
        126 => "Command cannot execute (permission problem?)",
        127 => "Command not found (binary doesn't exist?)",
        130 => "Terminated by Ctrl+C (SIGINT)",
        137 => "Killed by SIGKILL (usually OOM or forced termination)",
        139 => "Segmentation fault (memory access violation)",
        143 => "Terminated by SIGTERM (graceful shutdown)",
        255 => "Exit status out of range",
        _ => "Check application documentation",
    };

    format!("→ Exit code {}: {}", code, description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_exit_codes() {
        assert_eq!(
            exit_code_annotation(1),
            "→ Exit code 1: Application error - check your code for bugs"
        );
        assert!(exit_code_annotation(137).contains("SIGKILL"));
        assert!(exit_code_annotation(139).contains("Segmentation fault"));
        assert!(exit_code_annotation(143).contains("SIGTERM"));
        assert!(exit_code_annotation(127).contains("Command not found"));
    }

    #[test]
    fn test_unknown_exit_codes_fall_back() {
        for code in [3, 42, 128, 254, 256, -1] {
            let annotation = exit_code_annotation(code);
            assert!(annotation.contains("Check application documentation"));
            assert!(annotation.contains(&code.to_string()));
        }
    }
}
