use std::collections::HashMap;

use super::*;

/// What the build stage produced
#[derive(Debug)]
pub enum BuildOutcome {
    /// Path of the executable inside the workspace
    Built(PathBuf),
    /// The submission did not build; no test may run
    Failed(BuildFailure),
}

impl Sandbox {
    /// Compiles the prepared source inside `workspace`
    ///
    /// Only toolchain launch problems are returned as errors; anything the
    /// submitted code causes ends up in [`BuildOutcome::Failed`].
    pub(super) async fn compile_source_code(
        &self,
        workspace: &Workspace,
        deadline: Duration,
    ) -> Result<BuildOutcome> {
        let artifact_name = self.toolchain.artifact_name();
        let artifact = workspace.path().join(&artifact_name);

        let command = generate_compile_command(
            &self.toolchain.command,
            &self.toolchain.file_name,
            &artifact_name,
        );
        let (program, args) = command.split_first().ok_or(SandboxError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.toolchain.env)
            .current_dir(workspace.path());

        log::debug!("Compiling with {command:?} (deadline {deadline:?})");
        let output =
            match run_with_deadline(cmd, None, deadline, self.config.max_output_bytes).await {
                Ok(output) => output,
                Err(ProcessError::TimedOut(_)) => {
                    return Ok(BuildOutcome::Failed(BuildFailure::TimedOut(deadline)));
                }
                Err(ProcessError::Spawn(source)) => {
                    return Err(SandboxError::Toolchain {
                        program: program.clone(),
                        source,
                    });
                }
                Err(ProcessError::Io(e)) => return Err(SandboxError::Io(e)),
            };

        log::debug!(
            "Toolchain exited with {} after {:?}",
            output.status,
            output.elapsed
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Ok(BuildOutcome::Failed(BuildFailure::Failed(stderr)));
        }

        if !artifact.exists() {
            return Ok(BuildOutcome::Failed(BuildFailure::Failed(format!(
                "toolchain produced no executable `{artifact_name}`"
            ))));
        }

        Ok(BuildOutcome::Built(artifact))
    }
}

/// Applies template substitutions to every argument of the command
fn generate_compile_command(
    template: &[String],
    source_name: &str,
    executable_name: &str,
) -> Vec<String> {
    let mut mapping = HashMap::<&str, &str>::new();
    mapping.insert("%INPUT%", source_name);
    mapping.insert("%OUTPUT%", executable_name);

    template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}
