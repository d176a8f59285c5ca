use std::process::Command;

/// Run a command and return its trimmed stdout when it succeeds.
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn main() {
    if let Some(commit) = capture("git", &["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=GARDEN_GIT_COMMIT={commit}");
    }
    if let Some(timestamp) = capture("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]) {
        println!("cargo:rustc-env=GARDEN_BUILD_TIMESTAMP={timestamp}");
    }
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
