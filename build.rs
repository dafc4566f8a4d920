use std::process::Command;

fn main() {
    let datetime = std::env::var("BUILD_DATETIME")
        .unwrap_or_else(|_| chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

    let git_hash = std::env::var("BUILD_GIT_HASH")
        .ok()
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=BUILD_DATETIME={datetime}");
    println!("cargo:rustc-env=BUILD_GIT_HASH={git_hash}");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=BUILD_DATETIME");
    println!("cargo:rerun-if-env-changed=BUILD_GIT_HASH");
}

/// Short commit hash from the git CLI, suffixed with `-dirty` for uncommitted changes.
fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;

    let dirty = Command::new("git")
        .args(["diff", "--quiet"])
        .status()
        .is_ok_and(|status| !status.success());

    Some(format!("{}{}", hash.trim(), if dirty { "-dirty" } else { "" }))
}
