use std::sync::Arc;
use sysdeck_core::distro::{self, DistroResolver};
use sysdeck_core::{Orchestrator, PanelConfig, PromptBackend};
use sysdeck_executor::{CommandRunner, SystemRunner};
use sysdeck_privilege::{running_as_root, HelperPrompt, PrivilegeBroker, SecretPrompt, TerminalPrompt};

/// Wire the real executor, prompt backend and broker into an orchestrator.
pub fn build(config: &PanelConfig) -> Orchestrator {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let prompt: Arc<dyn SecretPrompt> = match config.prompt {
        PromptBackend::Helper => Arc::new(
            HelperPrompt::new(runner.clone(), config.prompt_helper.clone())
                .with_timeout(config.action_timeout()),
        ),
        PromptBackend::Terminal => Arc::new(TerminalPrompt),
    };

    let distro = DistroResolver::new();
    let root = running_as_root();
    if root {
        tracing::info!("running as root, privilege prompts disabled");
    }

    let mut broker = PrivilegeBroker::new(runner.clone(), prompt)
        .with_root_passthrough(root)
        .with_validate_timeout(config.probe_timeout());
    if config.prompt == PromptBackend::Helper {
        if let Some(argv) = distro::remediation_argv(distro.resolve(), &config.prompt_helper) {
            broker = broker.with_remediation(argv);
        }
    }

    Orchestrator::new(runner, Arc::new(broker), config.clone()).with_distro(distro)
}
