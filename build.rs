use std::process::Command;

fn main() {
    // Build number comes from CI when available, otherwise 0 for local builds
    let build_number: u64 = std::env::var("EFC_BUILD_NUMBER")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "debug".to_string());
    let is_release = profile == "release";

    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=EFC_VERSION={}", version);
    println!("cargo:rustc-env=EFC_BUILD={}", build_number);
    println!("cargo:rustc-env=EFC_PROFILE={}", if is_release { "release" } else { "development" });
    println!("cargo:rustc-env=EFC_GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-env-changed=EFC_BUILD_NUMBER");
    println!("cargo:rerun-if-env-changed=PROFILE");
}
