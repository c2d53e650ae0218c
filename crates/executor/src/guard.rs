use crate::command_executor::ExecutorError;

const SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "fish", "ksh"];

/// Structural checks on argv before anything is spawned.
pub struct ArgvGuard;

impl ArgvGuard {
    pub fn validate(argv: &[String]) -> Result<(), ExecutorError> {
        let Some(program) = argv.first() else {
            return Err(ExecutorError::InvalidArgv("empty argv".into()));
        };

        if program.trim().is_empty() {
            return Err(ExecutorError::InvalidArgv("empty program".into()));
        }

        if program.chars().any(char::is_whitespace) {
            return Err(ExecutorError::InvalidArgv(format!(
                "program must be a single token: {:?}",
                program
            )));
        }

        for arg in argv {
            if arg.contains('\0') {
                return Err(ExecutorError::InvalidArgv(
                    "argument contains null byte".into(),
                ));
            }
        }

        // Dynamic values are passed as discrete arguments, never through a shell
        let base = program.rsplit('/').next().unwrap_or(program);
        if SHELLS.contains(&base) && argv[1..].iter().any(|a| a == "-c") {
            return Err(ExecutorError::InvalidArgv(format!(
                "shell interpolation is not allowed: {}",
                base
            )));
        }

        // `sudo [flags] -- <argv>`: the wrapped command gets the same checks
        if base == "sudo" {
            if let Some(split) = argv.iter().position(|a| a == "--") {
                return Self::validate(&argv[split + 1..]);
            }
        }

        Ok(())
    }
}
