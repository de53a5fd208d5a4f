#![allow(dead_code)]

use std::path::{Path, PathBuf};

use edu_sandbox::config::{SandboxConfig, Second, ToolchainConfig};
use edu_sandbox::sandbox::Sandbox;

/// Stand-in for `go build`: fails on `SYNTAX ERROR`, hangs on `SLOW BUILD`,
/// otherwise emits a shell script made of the source's `// run: ` lines.
pub const FAKE_COMPILER: &str = r#"
src="$1"
out="$2"
if grep -q 'SYNTAX ERROR' "$src"; then
    echo "./$src:3:1: syntax error: unexpected newline" >&2
    exit 2
fi
if grep -q 'SLOW BUILD' "$src"; then
    sleep 30
fi
printf '#!/bin/sh\n' > "$out"
sed -n 's|^// run: ||p' "$src" >> "$out"
chmod +x "$out"
"#;

pub fn fake_toolchain() -> ToolchainConfig {
    ToolchainConfig {
        name: "fake-go".to_string(),
        command: ["/bin/sh", "-c", FAKE_COMPILER, "fakecc", "%INPUT%", "%OUTPUT%"]
            .into_iter()
            .map(String::from)
            .collect(),
        ..ToolchainConfig::default()
    }
}

/// Submission whose "compiled" program runs `script`
pub fn program(script: &str) -> String {
    format!("func main() {{}}\n// run: {script}\n")
}

// Helper function to create an isolated workspace root for one test
pub fn create_test_root() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("sandbox-test-")
        .tempdir_in(env!("CARGO_TARGET_TMPDIR"))
        .expect("Failed to create test root")
}

pub fn test_config(root: &Path) -> SandboxConfig {
    SandboxConfig {
        workspace_root: root.join("workspaces"),
        default_time_limit: Second(5),
        max_time_limit: Second(10),
        ..SandboxConfig::default()
    }
}

// Helper function to create a sandbox that builds with the fake compiler
pub fn create_test_sandbox(root: &Path) -> Sandbox {
    Sandbox::build(test_config(root), fake_toolchain()).expect("Failed to build sandbox")
}

/// Entries left under the workspace root
pub fn leftover_workspaces(sandbox: &Sandbox) -> Vec<PathBuf> {
    std::fs::read_dir(sandbox.workspace_root())
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}
